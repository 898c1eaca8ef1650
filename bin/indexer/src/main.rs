mod config;
mod indexer;
mod processor;
mod reorg;

use indexer::{index_step, Erc20EventsIndexer, EthereumIndexer, InternalTxIndexer, ProxyFactoryIndexer};
use processor::SafeTxProcessor;
use reorg::ReorgHandler;

use alloy::providers::Provider;

use eyre::Result;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use safescan_db::{connect, MonitoredAddressKind, MonitoredAddressModel};
use safescan_primitives::{new_http_provider, EthereumRpcProvider};
use std::{str::FromStr, sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinSet, time::sleep};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const IDLE_TICK: Duration = Duration::from_secs(5);
const ERROR_BACKOFF: Duration = Duration::from_secs(15);
const REORG_TICK: Duration = Duration::from_secs(60);

/// Monitored master copies and factories from config; idempotent on restart.
fn seed_monitored_addresses(db_pool: &Pool<SqliteConnectionManager>) -> Result<()> {
    let mut conn = db_pool.get()?;
    let tx = conn.transaction()?;
    for (address, initial_block_number) in config::SAFE_MASTER_COPY_ADDRESSES.iter() {
        MonitoredAddressModel::new(*address, MonitoredAddressKind::MasterCopy, *initial_block_number)
            .insert(&tx)?;
    }
    for (address, initial_block_number) in config::PROXY_FACTORY_ADDRESSES.iter() {
        MonitoredAddressModel::new(*address, MonitoredAddressKind::ProxyFactory, *initial_block_number)
            .insert(&tx)?;
    }
    tx.commit()?;
    Ok(())
}

/// Runs one indexer until shutdown: windows back to back while catching up, one
/// idle tick when there is nothing left, a longer backoff after errors.
/// Cancellation is only honored between windows, never mid-transaction.
async fn indexer_task<I, P>(
    indexer: I,
    rpc_provider: Arc<EthereumRpcProvider<P>>,
    db_pool: Arc<Pool<SqliteConnectionManager>>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()>
where
    I: EthereumIndexer,
    P: Provider + Clone + 'static,
{
    while !*shutdown.borrow() {
        let step = async {
            let current_block_number = rpc_provider.current_block_number().await?;
            index_step(&indexer, &db_pool, current_block_number).await
        };
        let wait = match step.await {
            Ok(0) => IDLE_TICK,
            Ok(_) => continue,
            Err(error) => {
                warn!(indexer = indexer.name(), error = %error, "Indexer step failed");
                ERROR_BACKOFF
            }
        };
        tokio::select! {
            _ = sleep(wait) => {}
            _ = shutdown.changed() => {}
        }
    }
    info!(indexer = indexer.name(), "Indexer stopped");
    Ok(())
}

async fn processor_task(
    tx_processor: SafeTxProcessor,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    while !*shutdown.borrow() {
        let wait = match tx_processor.process_pending() {
            Ok(0) => IDLE_TICK,
            Ok(_) => continue,
            Err(error) => {
                warn!(error = %error, "Processor step failed");
                ERROR_BACKOFF
            }
        };
        tokio::select! {
            _ = sleep(wait) => {}
            _ = shutdown.changed() => {}
        }
    }
    info!(
        anomalies = tx_processor.anomalies(),
        "Processor stopped"
    );
    Ok(())
}

async fn reorg_task<P>(
    reorg_handler: ReorgHandler<P>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()>
where
    P: Provider + Clone + 'static,
{
    while !*shutdown.borrow() {
        if let Err(error) = reorg_handler.check_reorgs().await {
            warn!(error = %error, "Reorg check failed");
        }
        tokio::select! {
            _ = sleep(REORG_TICK) => {}
            _ = shutdown.changed() => {}
        }
    }
    info!("Reorg handler stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let file_appender =
        tracing_appender::rolling::hourly(config::LOG_DIR.clone(), "safescan-indexer.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_str(&config::RUST_LOG).unwrap_or_default())
        .with_span_events(config::TRACING_SPAN_EVENTS.clone())
        .with_ansi(false)
        .with_writer(non_blocking)
        .init();

    info!(
        rust_log = *config::RUST_LOG,
        node_url = config::ETHEREUM_NODE_URL.as_str(),
        tracing_node_url = config::ETHEREUM_TRACING_NODE_URL.as_str(),
        block_process_limit = *config::ETH_INTERNAL_TXS_BLOCK_PROCESS_LIMIT,
        no_filter = *config::ETH_INTERNAL_NO_FILTER,
        reorg_blocks = *config::ETH_REORG_BLOCKS,
        "start"
    );

    let db_pool = Arc::new(connect(&config::DB_PATH)?);
    seed_monitored_addresses(&db_pool)?;

    let rpc_provider = Arc::new(new_http_provider(config::ETHEREUM_NODE_URL.clone()));
    let tracing_provider = Arc::new(new_http_provider(config::ETHEREUM_TRACING_NODE_URL.clone()));

    let (shutdown_sender, shutdown) = watch::channel(false);

    let task_enabled =
        |name: &str| config::WORKER_TASKS.is_empty() || config::WORKER_TASKS.iter().any(|task| task == name);

    let mut tasks = JoinSet::new();
    if task_enabled("indexer-safe-master-copies") {
        tasks.spawn(indexer_task(
            InternalTxIndexer::new(
                Arc::clone(&tracing_provider),
                Arc::clone(&db_pool),
                *config::ETH_INTERNAL_TXS_BLOCK_PROCESS_LIMIT,
                *config::ETH_REORG_BLOCKS,
                *config::ETH_INTERNAL_NO_FILTER,
            ),
            Arc::clone(&tracing_provider),
            Arc::clone(&db_pool),
            shutdown.clone(),
        ));
    }
    if task_enabled("indexer-proxy-factories") {
        tasks.spawn(indexer_task(
            ProxyFactoryIndexer::new(
                Arc::clone(&rpc_provider),
                Arc::clone(&db_pool),
                *config::ETH_REORG_BLOCKS,
            ),
            Arc::clone(&rpc_provider),
            Arc::clone(&db_pool),
            shutdown.clone(),
        ));
    }
    if task_enabled("indexer-safe-contracts") {
        tasks.spawn(indexer_task(
            Erc20EventsIndexer::new(
                Arc::clone(&rpc_provider),
                Arc::clone(&db_pool),
                *config::ETH_REORG_BLOCKS,
            ),
            Arc::clone(&rpc_provider),
            Arc::clone(&db_pool),
            shutdown.clone(),
        ));
    }
    if task_enabled("processor") {
        tasks.spawn(processor_task(
            SafeTxProcessor::new(Arc::clone(&db_pool)),
            shutdown.clone(),
        ));
    }
    if task_enabled("reorg") {
        tasks.spawn(reorg_task(
            ReorgHandler::new(
                Arc::clone(&rpc_provider),
                Arc::clone(&db_pool),
                *config::ETH_REORG_BLOCKS,
            ),
            shutdown.clone(),
        ));
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            let _ = shutdown_sender.send(true);
        }
    });

    let mut failed = false;
    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                error!(error = %error, "Task failed");
                failed = true;
            }
            Err(error) => {
                error!(error = %error, "Task panicked");
                failed = true;
            }
        }
    }

    info!("complete");
    if failed {
        std::process::exit(1);
    }
    Ok(())
}
