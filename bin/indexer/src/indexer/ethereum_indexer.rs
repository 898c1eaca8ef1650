use alloy::primitives::{Address, BlockNumber};

use eyre::Result;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Transaction;
use safescan_primitives::ProviderError;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct AddressCursor {
    pub address: Address,
    pub block_number: BlockNumber,
}

/// Discovery failed mid-window; partial results were discarded and the caller
/// retries the whole window.
#[derive(Debug, thiserror::Error)]
#[error("could not discover relevant elements: {0}")]
pub struct FindRelevantElementsError(#[from] pub ProviderError);

impl FindRelevantElementsError {
    pub fn is_retriable(&self) -> bool {
        self.0.is_retriable()
    }
}

/// `[from, to]` window the next scan should cover, or None when the cursor has
/// caught up to the confirmed head.
pub fn scan_window(
    cursor: BlockNumber,
    block_process_limit: u64,
    current_block_number: BlockNumber,
    confirmations: u64,
) -> Option<(BlockNumber, BlockNumber)> {
    let from_block = cursor + 1;
    let to_block = std::cmp::min(
        cursor + 1 + block_process_limit,
        current_block_number.checked_sub(confirmations)?,
    );
    (from_block <= to_block).then_some((from_block, to_block))
}

/// Shared scaffolding of the block-range indexers: which addresses to scan, how
/// to advance their cursors, and how one window is turned into rows. Ordering
/// and idempotence live here; discovery and persistence are per-indexer.
pub trait EthereumIndexer {
    fn name(&self) -> &'static str;
    fn block_process_limit(&self) -> u64;
    fn confirmations(&self) -> u64;
    /// Cursors within this distance of the head are batched into one window.
    fn updated_blocks_behind(&self) -> u64;

    fn almost_updated_cursors(
        &self,
        tx: &Transaction,
        current_block_number: BlockNumber,
    ) -> Result<Vec<AddressCursor>>;
    fn not_updated_cursors(
        &self,
        tx: &Transaction,
        current_block_number: BlockNumber,
    ) -> Result<Vec<AddressCursor>>;
    fn update_cursors(
        &self,
        tx: &Transaction,
        addresses: &[Address],
        from_block: BlockNumber,
        to_block: BlockNumber,
    ) -> Result<usize>;

    /// Discover, fetch and persist everything relevant to `addresses` within
    /// `[from_block, to_block]`. Returns the number of stored elements.
    async fn index_window(
        &self,
        addresses: &[Address],
        from_block: BlockNumber,
        to_block: BlockNumber,
        current_block_number: BlockNumber,
    ) -> Result<u64>;
}

async fn run_window<I: EthereumIndexer>(
    indexer: &I,
    db_pool: &Pool<SqliteConnectionManager>,
    addresses: &[Address],
    from_block: BlockNumber,
    to_block: BlockNumber,
    current_block_number: BlockNumber,
) -> Result<u64> {
    let elements = indexer
        .index_window(addresses, from_block, to_block, current_block_number)
        .await?;

    // The cursor only advances after the window's rows are committed, so a crash
    // in between re-scans the window; inserts are conflict-ignored.
    {
        let mut conn = db_pool.get()?;
        let tx = conn.transaction()?;
        indexer.update_cursors(&tx, addresses, from_block, to_block)?;
        tx.commit()?;
    }

    if elements > 0 {
        info!(
            indexer = indexer.name(),
            from_block = from_block,
            to_block = to_block,
            elements = elements,
            "Indexed window"
        );
    } else {
        debug!(
            indexer = indexer.name(),
            from_block = from_block,
            to_block = to_block,
            "Empty window"
        );
    }

    Ok(elements)
}

/// One scheduler tick: a single shared window over the almost-updated addresses,
/// then one window per straggler so a lagging address cannot stall the rest.
/// Returns the number of windows scanned (zero once fully caught up).
pub async fn index_step<I: EthereumIndexer>(
    indexer: &I,
    db_pool: &Pool<SqliteConnectionManager>,
    current_block_number: BlockNumber,
) -> Result<u64> {
    let (almost_updated, not_updated) = {
        let mut conn = db_pool.get()?;
        let tx = conn.transaction()?;
        let almost_updated = indexer.almost_updated_cursors(&tx, current_block_number)?;
        let not_updated = indexer.not_updated_cursors(&tx, current_block_number)?;
        tx.rollback()?;
        (almost_updated, not_updated)
    };

    let mut windows = 0;

    if let Some(min_cursor) = almost_updated
        .iter()
        .map(|cursor| cursor.block_number)
        .min()
    {
        if let Some((from_block, to_block)) = scan_window(
            min_cursor,
            indexer.block_process_limit(),
            current_block_number,
            indexer.confirmations(),
        ) {
            let addresses = almost_updated
                .iter()
                .map(|cursor| cursor.address)
                .collect::<Vec<_>>();
            run_window(
                indexer,
                db_pool,
                &addresses,
                from_block,
                to_block,
                current_block_number,
            )
            .await?;
            windows += 1;
        }
    }

    for cursor in not_updated {
        if almost_updated
            .iter()
            .any(|almost| almost.address == cursor.address)
        {
            continue;
        }
        if let Some((from_block, to_block)) = scan_window(
            cursor.block_number,
            indexer.block_process_limit(),
            current_block_number,
            indexer.confirmations(),
        ) {
            run_window(
                indexer,
                db_pool,
                &[cursor.address],
                from_block,
                to_block,
                current_block_number,
            )
            .await?;
            windows += 1;
        }
    }

    Ok(windows)
}

#[cfg(test)]
mod tests {

    use super::scan_window;

    #[test]
    fn test_scan_window_bounds() {
        // Window is capped by the process limit
        assert_eq!(scan_window(100, 50, 1_000, 0), Some((101, 151)));
        // ... and by the confirmed head
        assert_eq!(scan_window(100, 50, 120, 10), Some((101, 110)));
        // Caught up: nothing to scan
        assert_eq!(scan_window(110, 50, 120, 10), None);
        // Head shallower than the confirmation depth
        assert_eq!(scan_window(0, 50, 5, 10), None);
    }
}
