use super::{
    ethereum_indexer::{AddressCursor, EthereumIndexer},
    index_service::IndexService,
    internal_tx_indexer::dedup_first_seen,
};

use alloy::{
    primitives::{Address, BlockNumber},
    providers::Provider,
    rpc::types::Filter,
    sol_types::SolEvent,
};

use eyre::Result;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Transaction;
use safescan_db::{
    EthereumEventModel, MonitoredAddressKind, MonitoredAddressModel, SafeContractModel,
};
use safescan_primitives::{EthereumRpcProvider, GnosisSafeProxyFactory, PROXY_CREATION_TOPIC};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

const BLOCK_PROCESS_LIMIT: u64 = 5_000;
const UPDATED_BLOCKS_BEHIND: u64 = 200;

/// Watches the proxy factories for `ProxyCreation` events and registers each new
/// Safe so the ERC-20 indexer and the processor pick it up.
pub struct ProxyFactoryIndexer<P: Provider + Clone> {
    rpc_provider: Arc<EthereumRpcProvider<P>>,
    index_service: IndexService<P>,
    db_pool: Arc<Pool<SqliteConnectionManager>>,
    reorg_blocks: u64,
}

impl<P> ProxyFactoryIndexer<P>
where
    P: Provider + Clone + 'static,
{
    pub fn new(
        rpc_provider: Arc<EthereumRpcProvider<P>>,
        db_pool: Arc<Pool<SqliteConnectionManager>>,
        reorg_blocks: u64,
    ) -> Self {
        Self {
            index_service: IndexService::new(Arc::clone(&rpc_provider)),
            rpc_provider,
            db_pool,
            reorg_blocks,
        }
    }
}

impl<P> EthereumIndexer for ProxyFactoryIndexer<P>
where
    P: Provider + Clone + 'static,
{
    fn name(&self) -> &'static str {
        "proxy-factory-indexer"
    }

    fn block_process_limit(&self) -> u64 {
        BLOCK_PROCESS_LIMIT
    }

    fn confirmations(&self) -> u64 {
        0
    }

    fn updated_blocks_behind(&self) -> u64 {
        UPDATED_BLOCKS_BEHIND
    }

    fn almost_updated_cursors(
        &self,
        tx: &Transaction,
        current_block_number: BlockNumber,
    ) -> Result<Vec<AddressCursor>> {
        Ok(MonitoredAddressModel::query_almost_updated(
            tx,
            MonitoredAddressKind::ProxyFactory,
            current_block_number,
            self.updated_blocks_behind(),
            self.confirmations(),
        )?
        .into_iter()
        .filter_map(|row| {
            row.tx_block_number.map(|cursor| AddressCursor {
                address: row.address.into(),
                block_number: cursor.into(),
            })
        })
        .collect())
    }

    fn not_updated_cursors(
        &self,
        tx: &Transaction,
        current_block_number: BlockNumber,
    ) -> Result<Vec<AddressCursor>> {
        Ok(MonitoredAddressModel::query_not_updated(
            tx,
            MonitoredAddressKind::ProxyFactory,
            current_block_number,
            self.confirmations(),
        )?
        .into_iter()
        .filter_map(|row| {
            row.tx_block_number.map(|cursor| AddressCursor {
                address: row.address.into(),
                block_number: cursor.into(),
            })
        })
        .collect())
    }

    fn update_cursors(
        &self,
        tx: &Transaction,
        addresses: &[Address],
        from_block: BlockNumber,
        to_block: BlockNumber,
    ) -> Result<usize> {
        MonitoredAddressModel::update_cursor(
            tx,
            MonitoredAddressKind::ProxyFactory,
            addresses,
            from_block,
            to_block,
        )
    }

    async fn index_window(
        &self,
        addresses: &[Address],
        from_block: BlockNumber,
        to_block: BlockNumber,
        current_block_number: BlockNumber,
    ) -> Result<u64> {
        let filter = Filter::new()
            .address(addresses.to_vec())
            .event_signature(PROXY_CREATION_TOPIC)
            .from_block(from_block)
            .to_block(to_block);
        let logs = self.rpc_provider.get_logs(&filter).await?;
        if logs.is_empty() {
            return Ok(0);
        }

        let tx_hashes = dedup_first_seen(logs.iter().filter_map(|log| log.transaction_hash));
        let txs_with_blocks = self
            .index_service
            .fetch_txs_with_blocks(&tx_hashes, current_block_number, self.reorg_blocks)
            .await?;

        let mut stored = 0;
        {
            let mut conn = self.db_pool.get()?;
            let tx = conn.transaction()?;

            for tx_with_block in &txs_with_blocks {
                tx_with_block.block.insert(&tx)?;
                tx_with_block.ethereum_tx.insert(&tx)?;
            }

            for log in &logs {
                let (Some(tx_hash), Some(log_index), Some(block_number)) =
                    (log.transaction_hash, log.log_index, log.block_number)
                else {
                    continue;
                };
                let proxy_creation =
                    match GnosisSafeProxyFactory::ProxyCreation::decode_log(&log.inner) {
                        Ok(proxy_creation) => proxy_creation,
                        Err(error) => {
                            warn!(tx_hash = %tx_hash, error = %error, "Undecodable ProxyCreation log");
                            continue;
                        }
                    };
                let proxy: Address = proxy_creation.data.proxy;

                EthereumEventModel {
                    ethereum_tx_hash: tx_hash.into(),
                    log_index: log_index as i64,
                    address: log.address().into(),
                    topic: PROXY_CREATION_TOPIC.into(),
                    topics: json!([format!("{PROXY_CREATION_TOPIC}")]),
                    arguments: json!({ "proxy": proxy.to_checksum(None) }),
                }
                .insert(&tx)?;

                SafeContractModel::new(proxy, tx_hash, block_number).insert(&tx)?;
                stored += 1;
            }

            tx.commit()?;
        }

        Ok(stored)
    }
}
