use alloy::{primitives::BlockNumber, providers::Provider};

use eyre::Result;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Transaction;
use safescan_db::{BlockModel, MonitoredAddressModel, SafeContractModel};
use safescan_primitives::EthereumRpcProvider;
use std::sync::Arc;
use tracing::{error, info};

/// Compares stored unconfirmed blocks against the live chain, confirming the
/// ones that match deep enough and rolling everything back from the first that
/// does not.
pub struct ReorgHandler<P: Provider + Clone> {
    rpc_provider: Arc<EthereumRpcProvider<P>>,
    db_pool: Arc<Pool<SqliteConnectionManager>>,
    reorg_blocks: u64,
}

/// Deletes every block from `block_number` on; the foreign keys cascade through
/// txs, frames, decoded rows, statuses, confirmations and module txs, and unlink
/// executed multisig txs. Cursors drop to just before the reorged block so the
/// indexers re-scan the replaced range.
pub fn recover_from_reorg(tx: &Transaction, block_number: BlockNumber) -> Result<usize> {
    MonitoredAddressModel::rewind_cursors(tx, block_number.saturating_sub(1))?;
    SafeContractModel::rewind_erc20_cursors(tx, block_number.saturating_sub(1))?;
    BlockModel::delete_from_number(tx, block_number)
}

impl<P> ReorgHandler<P>
where
    P: Provider + Clone + 'static,
{
    pub fn new(
        rpc_provider: Arc<EthereumRpcProvider<P>>,
        db_pool: Arc<Pool<SqliteConnectionManager>>,
        reorg_blocks: u64,
    ) -> Self {
        Self {
            rpc_provider,
            db_pool,
            reorg_blocks,
        }
    }

    /// One tick: confirm or roll back. Returns the reorged block number if a
    /// rollback happened.
    pub async fn check_reorgs(&self) -> Result<Option<BlockNumber>> {
        let current_block_number = self.rpc_provider.current_block_number().await?;

        let not_confirmed = {
            let mut conn = self.db_pool.get()?;
            let tx = conn.transaction()?;
            let not_confirmed = BlockModel::query_not_confirmed(&tx, current_block_number)?;
            tx.rollback()?;
            not_confirmed
        };

        for stored in not_confirmed {
            let number: BlockNumber = stored.number.into();
            let live_hash = self
                .rpc_provider
                .get_block(number)
                .await?
                .map(|block| block.header.hash);

            if live_hash == Some(stored.hash.clone().into()) {
                if current_block_number.saturating_sub(number) >= self.reorg_blocks {
                    let mut conn = self.db_pool.get()?;
                    let tx = conn.transaction()?;
                    BlockModel::set_confirmed(&tx, number)?;
                    tx.commit()?;
                }
                continue;
            }

            // Stored branch diverges from the live chain at this height
            error!(
                block_number = number,
                "Reorg detected, rolling back derived state"
            );
            let deleted = {
                let mut conn = self.db_pool.get()?;
                let tx = conn.transaction()?;
                let deleted = recover_from_reorg(&tx, number)?;
                tx.commit()?;
                deleted
            };
            info!(
                block_number = number,
                deleted_blocks = deleted,
                "Reorg rollback complete"
            );
            return Ok(Some(number));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {

    use super::recover_from_reorg;
    use alloy::primitives::{Address, B256, U256};
    use eyre::Result;
    use safescan_db::{
        connect as connect_db,
        primitives::FixedBytes,
        BlockModel, CallType, EthereumTxModel, InternalTxModel, MonitoredAddressKind,
        MonitoredAddressModel, NewInternalTxDecodedModel, NewInternalTxModel,
        PendingDecodedTxModel, SafeContractModel, SafeStatusModel, TxType,
    };

    fn insert_chain_at(
        tx: &rusqlite::Transaction,
        block_number: u64,
        safe: Address,
        nonce: u64,
    ) -> Result<()> {
        BlockModel {
            number: block_number.into(),
            hash: B256::with_last_byte(block_number as u8).into(),
            parent_hash: B256::with_last_byte(block_number.saturating_sub(1) as u8).into(),
            timestamp: (1_600_000_000 + block_number * 15).into(),
            gas_used: 100_000.into(),
            gas_limit: 12_000_000.into(),
            confirmed: false,
        }
        .insert(tx)?;

        let hash = B256::with_last_byte(block_number as u8);
        EthereumTxModel {
            tx_hash: hash.into(),
            block_number: Some(block_number.into()),
            from_address: Some(Address::repeat_byte(0xEE).into()),
            to_address: Some(safe.into()),
            value: U256::ZERO.into(),
            gas: U256::from(100_000u64).into(),
            gas_price: U256::from(1u64).into(),
            nonce: 0.into(),
            data: None,
            logs: Some(serde_json::json!([])),
            status: Some(1),
            gas_used: Some(U256::ZERO.into()),
            transaction_index: Some(0.into()),
        }
        .insert(tx)?;

        NewInternalTxModel {
            ethereum_tx_hash: hash.into(),
            trace_address: "0".to_string(),
            from_address: Some(FixedBytes::from(safe)),
            to_address: Some(FixedBytes::from(Address::repeat_byte(0x99))),
            value: U256::ZERO.into(),
            gas: U256::from(100_000u64).into(),
            data: Some(vec![0xAA]),
            gas_used: U256::ZERO.into(),
            contract_address: None,
            code: None,
            output: None,
            refund_address: None,
            tx_type: TxType::Call,
            call_type: Some(CallType::DelegateCall),
            error: None,
        }
        .insert(tx)?;
        let internal_tx_id = InternalTxModel::query_id_by_unique(tx, hash, "0")?.unwrap();

        NewInternalTxDecodedModel {
            internal_tx_id,
            function_name: "changeThreshold".to_string(),
            arguments: serde_json::json!({ "_threshold": "1" }),
        }
        .insert(tx)?;

        SafeStatusModel::new(
            internal_tx_id,
            safe,
            &[Address::repeat_byte(0x01)],
            1,
            nonce,
            Address::repeat_byte(0x99),
            Address::ZERO,
            &[],
        )
        .insert(tx)?;

        Ok(())
    }

    #[test]
    fn test_recover_from_reorg_drops_derived_rows_and_rewinds_cursors() -> Result<()> {
        let pool = connect_db(&String::from(":memory:"))?;

        let mut conn = pool.get()?;
        let tx = conn.transaction()?;

        let safe = Address::repeat_byte(0x11);
        for block_number in 100..=110 {
            insert_chain_at(&tx, block_number, safe, block_number - 100)?;
        }

        let master_copy = Address::repeat_byte(0x99);
        MonitoredAddressModel::new(master_copy, MonitoredAddressKind::MasterCopy, 50).insert(&tx)?;
        MonitoredAddressModel::update_cursor(
            &tx,
            MonitoredAddressKind::MasterCopy,
            &[master_copy],
            51,
            110,
        )?;
        SafeContractModel::new(safe, B256::with_last_byte(100), 100).insert(&tx)?;
        SafeContractModel::update_erc20_cursor(&tx, &[safe], 101, 110)?;

        // Block 108 is replaced on the live chain
        recover_from_reorg(&tx, 108)?;

        // Blocks and all rows derived from 108..=110 are gone
        for block_number in 108..=110u64 {
            assert!(BlockModel::query_by_number(&tx, block_number)?.is_none());
            assert!(
                EthereumTxModel::query_by_hash(&tx, B256::with_last_byte(block_number as u8))?
                    .is_none()
            );
        }
        assert!(BlockModel::query_by_number(&tx, 107)?.is_some());

        // Latest surviving status is the one written at block 107
        let status = SafeStatusModel::query_last_for_address(&tx, safe)?.unwrap();
        assert_eq!(status.nonce, 7.into());

        // Pending queue holds nothing from the deleted range
        assert!(PendingDecodedTxModel::query_pending(&tx, 100)?
            .iter()
            .all(|pending| pending.block_number.unwrap() <= 107.into()));

        // Cursors rewound to just before the reorg point
        let cursors =
            MonitoredAddressModel::query_not_updated(&tx, MonitoredAddressKind::MasterCopy, 1_000, 0)?;
        assert_eq!(cursors[0].tx_block_number, Some(107.into()));
        assert_eq!(
            SafeContractModel::query_by_address(&tx, safe)?
                .unwrap()
                .erc20_block_number,
            107.into()
        );

        tx.rollback()?;

        Ok(())
    }
}
