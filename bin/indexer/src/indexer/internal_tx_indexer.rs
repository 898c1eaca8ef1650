use super::{
    ethereum_indexer::{AddressCursor, EthereumIndexer, FindRelevantElementsError},
    index_service::IndexService,
};

use alloy::{
    primitives::{Address, BlockNumber, TxHash},
    providers::Provider,
    rpc::types::trace::parity::{Action, LocalizedTransactionTrace},
};

use eyre::Result;
use fnv::FnvHashSet;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Transaction;
use safescan_db::{
    has_errored_ancestor, InternalTxModel, MonitoredAddressKind, MonitoredAddressModel,
    NewInternalTxDecodedModel, NewInternalTxModel,
};
use safescan_primitives::{decode_transaction, EthereumRpcProvider};
use std::sync::Arc;
use tracing::{debug, warn};

/// `trace_block` covers this many blocks below the head, where filters may lag.
const NUMBER_TRACE_BLOCKS: u64 = 10;

/// Cursor distance under which master copies share one window.
const UPDATED_BLOCKS_BEHIND: u64 = 20;

/// Hack to process all the addresses together when `trace_filter` is disabled:
/// every cursor looks "almost updated", so the single `trace_block` pass covers
/// the whole registry. Tuning knob inherited from production deployments.
const TRACE_BLOCK_UPDATED_BLOCKS_BEHIND: u64 = 2_641_600;

/// Which trace API serves a `[from, to]` window given the `trace_block` boundary
/// (`head - NUMBER_TRACE_BLOCKS`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceStrategy {
    /// Entire window is near the head
    Block,
    /// Entire window is historical
    Filter,
    /// Window straddles the boundary: filter below it, block at and above it
    Mixed { boundary: BlockNumber },
}

pub fn select_trace_strategy(
    from_block: BlockNumber,
    to_block: BlockNumber,
    trace_block_boundary: BlockNumber,
) -> TraceStrategy {
    if from_block > trace_block_boundary {
        TraceStrategy::Block
    } else if to_block < trace_block_boundary {
        TraceStrategy::Filter
    } else {
        TraceStrategy::Mixed {
            boundary: trace_block_boundary,
        }
    }
}

/// Insertion-ordered set semantics: first occurrence wins.
pub fn dedup_first_seen(tx_hashes: impl IntoIterator<Item = TxHash>) -> Vec<TxHash> {
    let mut seen = FnvHashSet::default();
    tx_hashes
        .into_iter()
        .filter(|tx_hash| seen.insert(*tx_hash))
        .collect()
}

fn trace_from(trace: &LocalizedTransactionTrace) -> Option<Address> {
    match &trace.trace.action {
        Action::Call(call) => Some(call.from),
        Action::Create(create) => Some(create.from),
        _ => None,
    }
}

fn trace_to(trace: &LocalizedTransactionTrace) -> Option<Address> {
    match &trace.trace.action {
        Action::Call(call) => Some(call.to),
        _ => None,
    }
}

/// Discovers and stores every trace frame touching the Safe master copies, and
/// decodes the delegate-calls into pending processor work.
pub struct InternalTxIndexer<P: Provider + Clone> {
    tracing_provider: Arc<EthereumRpcProvider<P>>,
    index_service: IndexService<P>,
    db_pool: Arc<Pool<SqliteConnectionManager>>,
    block_process_limit: u64,
    reorg_blocks: u64,
    /// `trace_block`-only mode for nodes without a usable `trace_filter`
    no_filter: bool,
}

impl<P> InternalTxIndexer<P>
where
    P: Provider + Clone + 'static,
{
    pub fn new(
        tracing_provider: Arc<EthereumRpcProvider<P>>,
        db_pool: Arc<Pool<SqliteConnectionManager>>,
        block_process_limit: u64,
        reorg_blocks: u64,
        no_filter: bool,
    ) -> Self {
        Self {
            index_service: IndexService::new(Arc::clone(&tracing_provider)),
            tracing_provider,
            db_pool,
            block_process_limit,
            reorg_blocks,
            no_filter,
        }
    }

    async fn find_with_trace_block(
        &self,
        addresses: &FnvHashSet<Address>,
        from_block: BlockNumber,
        to_block: BlockNumber,
    ) -> Result<Vec<TxHash>, FindRelevantElementsError> {
        debug!(from_block = from_block, to_block = to_block, "Using trace_block");
        let traces = self
            .tracing_provider
            .trace_blocks(from_block..=to_block)
            .await?;
        let tx_hashes = traces
            .iter()
            .zip(from_block..=to_block)
            .flat_map(|(block_traces, block_number)| {
                if block_traces.is_empty() {
                    warn!(block_number = block_number, "Empty trace_block");
                }
                block_traces.iter().filter_map(|trace| {
                    let relevant = trace_from(trace).map_or(false, |from| addresses.contains(&from))
                        || trace_to(trace).map_or(false, |to| addresses.contains(&to));
                    (relevant).then_some(trace.transaction_hash).flatten()
                })
            })
            .collect::<Vec<_>>();
        Ok(dedup_first_seen(tx_hashes))
    }

    async fn find_with_trace_filter(
        &self,
        addresses: &[Address],
        from_block: BlockNumber,
        to_block: BlockNumber,
    ) -> Result<Vec<TxHash>, FindRelevantElementsError> {
        debug!(from_block = from_block, to_block = to_block, "Using trace_filter");
        let traces = self
            .tracing_provider
            .trace_filter(addresses, from_block, to_block)
            .await?;
        Ok(dedup_first_seen(
            traces.iter().filter_map(|trace| trace.transaction_hash),
        ))
    }

    /// Tx hashes with frames relevant to `addresses` inside the window, in
    /// first-seen order. Partial results are discarded on failure.
    pub async fn find_relevant_tx_hashes(
        &self,
        addresses: &[Address],
        from_block: BlockNumber,
        to_block: BlockNumber,
        current_block_number: BlockNumber,
    ) -> Result<Vec<TxHash>, FindRelevantElementsError> {
        let address_set = addresses.iter().copied().collect::<FnvHashSet<_>>();
        let boundary = current_block_number.saturating_sub(NUMBER_TRACE_BLOCKS);

        let strategy = if self.no_filter {
            TraceStrategy::Block
        } else {
            select_trace_strategy(from_block, to_block, boundary)
        };

        match strategy {
            TraceStrategy::Block => {
                self.find_with_trace_block(&address_set, from_block, to_block)
                    .await
            }
            TraceStrategy::Filter => {
                self.find_with_trace_filter(addresses, from_block, to_block)
                    .await
            }
            TraceStrategy::Mixed { boundary } => {
                let mut tx_hashes = self
                    .find_with_trace_filter(addresses, from_block, boundary)
                    .await?;
                tx_hashes.extend(
                    self.find_with_trace_block(&address_set, boundary, to_block)
                        .await?,
                );
                Ok(dedup_first_seen(tx_hashes))
            }
        }
    }

    /// Persist one transaction's frames and whatever decodes. Runs inside the
    /// batch transaction so decoded rows are never visible without their frames.
    fn store_traces(
        tx: &Transaction,
        tx_hash: TxHash,
        tx_success: bool,
        traces: &[LocalizedTransactionTrace],
    ) -> Result<u64> {
        let frames = traces
            .iter()
            .filter_map(|trace| NewInternalTxModel::from_trace(tx_hash, trace))
            .collect::<Vec<_>>();

        let mut stored = 0;
        for frame in &frames {
            frame.insert(tx)?;
            stored += 1;

            let decodable = frame.is_delegate_call()
                && frame.error.is_none()
                && frame.data.as_ref().map_or(false, |data| !data.is_empty())
                && tx_success
                && !has_errored_ancestor(&frames, &frame.trace_address);
            if !decodable {
                continue;
            }

            let data = frame.data.as_deref().unwrap_or_default();
            match decode_transaction(data) {
                Ok((function_name, arguments)) => {
                    let internal_tx_id =
                        InternalTxModel::query_id_by_unique(tx, tx_hash, &frame.trace_address)?
                            .ok_or_else(|| eyre::eyre!("internal tx row vanished"))?;
                    NewInternalTxDecodedModel {
                        internal_tx_id,
                        function_name,
                        arguments,
                    }
                    .insert(tx)?;
                }
                // Not every delegate-call into a master copy is a Safe method
                Err(cannot_decode) => {
                    debug!(tx_hash = %tx_hash, error = %cannot_decode, "Skipping undecodable frame");
                }
            }
        }

        Ok(stored)
    }
}

impl<P> EthereumIndexer for InternalTxIndexer<P>
where
    P: Provider + Clone + 'static,
{
    fn name(&self) -> &'static str {
        "internal-tx-indexer"
    }

    fn block_process_limit(&self) -> u64 {
        self.block_process_limit
    }

    fn confirmations(&self) -> u64 {
        0
    }

    fn updated_blocks_behind(&self) -> u64 {
        if self.no_filter {
            TRACE_BLOCK_UPDATED_BLOCKS_BEHIND
        } else {
            UPDATED_BLOCKS_BEHIND
        }
    }

    fn almost_updated_cursors(
        &self,
        tx: &Transaction,
        current_block_number: BlockNumber,
    ) -> Result<Vec<AddressCursor>> {
        Ok(MonitoredAddressModel::query_almost_updated(
            tx,
            MonitoredAddressKind::MasterCopy,
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
            MonitoredAddressKind::MasterCopy,
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
            MonitoredAddressKind::MasterCopy,
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
        let tx_hashes = self
            .find_relevant_tx_hashes(addresses, from_block, to_block, current_block_number)
            .await?;
        if tx_hashes.is_empty() {
            return Ok(0);
        }

        let txs_with_blocks = self
            .index_service
            .fetch_txs_with_blocks(&tx_hashes, current_block_number, self.reorg_blocks)
            .await?;
        let traces = self
            .tracing_provider
            .trace_transactions(&tx_hashes)
            .await?;

        let mut stored = 0;
        {
            let mut conn = self.db_pool.get()?;
            let tx = conn.transaction()?;

            for tx_with_block in &txs_with_blocks {
                tx_with_block.block.insert(&tx)?;
                tx_with_block.ethereum_tx.insert(&tx)?;
            }

            for (tx_hash, tx_traces) in tx_hashes.iter().zip(&traces) {
                let Some(tx_with_block) = txs_with_blocks
                    .iter()
                    .find(|tx_with_block| tx_with_block.tx_hash == *tx_hash)
                else {
                    continue;
                };
                let tx_success = tx_with_block.ethereum_tx.success().unwrap_or(false);
                stored += Self::store_traces(&tx, *tx_hash, tx_success, tx_traces)?;
            }

            tx.commit()?;
        }

        Ok(stored)
    }
}

#[cfg(test)]
mod tests {

    use super::{dedup_first_seen, select_trace_strategy, TraceStrategy};
    use alloy::primitives::B256;

    #[test]
    fn test_select_trace_strategy_boundaries() {
        // head = 1000, boundary = 990
        assert_eq!(select_trace_strategy(991, 1_000, 990), TraceStrategy::Block);
        assert_eq!(select_trace_strategy(100, 989, 990), TraceStrategy::Filter);
        assert_eq!(
            select_trace_strategy(100, 995, 990),
            TraceStrategy::Mixed { boundary: 990 }
        );
        // Window touching the boundary on either side is mixed
        assert_eq!(
            select_trace_strategy(990, 990, 990),
            TraceStrategy::Mixed { boundary: 990 }
        );
    }

    #[test]
    fn test_dedup_first_seen_preserves_order() {
        let a = B256::repeat_byte(1);
        let b = B256::repeat_byte(2);
        let c = B256::repeat_byte(3);
        assert_eq!(dedup_first_seen(vec![b, a, b, c, a]), vec![b, a, c]);
        assert!(dedup_first_seen(vec![]).is_empty());
    }
}
