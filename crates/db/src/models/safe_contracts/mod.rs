use crate::primitives::{FixedBytes, U64};

use alloy::primitives::{Address, BlockNumber, TxHash};

use eyre::Result;
use fallible_iterator::FallibleIterator;
use rusqlite::{named_params, OptionalExtension, Transaction};

/// A Safe proxy discovered by the proxy-factory indexer or a processed `setup`.
#[derive(Debug, Clone)]
pub struct SafeContract {
    pub address: FixedBytes<20>,
    pub ethereum_tx_hash: FixedBytes<32>,
    pub erc20_block_number: U64,
}

impl SafeContract {
    pub fn new(address: Address, ethereum_tx_hash: TxHash, created_block_number: BlockNumber) -> Self {
        Self {
            address: address.into(),
            ethereum_tx_hash: ethereum_tx_hash.into(),
            // Token transfers cannot predate the Safe
            erc20_block_number: created_block_number.into(),
        }
    }

    pub fn insert(&self, tx: &Transaction) -> Result<()> {
        tx.prepare_cached(include_str!("./insert.sql"))?
            .execute(named_params! {
                ":address": self.address,
                ":ethereum_tx_hash": self.ethereum_tx_hash,
                ":erc20_block_number": self.erc20_block_number,
            })
            .map(|_| ())
            .map_err(Into::into)
    }

    pub fn query_by_address(tx: &Transaction, address: Address) -> Result<Option<Self>> {
        tx.prepare_cached(include_str!("./query_by_address.sql"))?
            .query_row(
                named_params! { ":address": FixedBytes::from(address) },
                |row| SafeContract::try_from(row),
            )
            .optional()
            .map_err(Into::into)
    }

    /// Same reorg guard as the monitored-address cursor.
    pub fn update_erc20_cursor(
        tx: &Transaction,
        addresses: &[Address],
        from_block_number: BlockNumber,
        to_block_number: BlockNumber,
    ) -> Result<usize> {
        let mut statement = tx.prepare_cached(include_str!("./update_erc20_cursor.sql"))?;
        let mut updated = 0;
        for address in addresses {
            updated += statement.execute(named_params! {
                ":address": FixedBytes::from(*address),
                ":from_block_number": U64(from_block_number),
                ":to_block_number": U64(to_block_number),
            })?;
        }
        Ok(updated)
    }

    pub fn query_erc20_not_updated(
        tx: &Transaction,
        current_block_number: BlockNumber,
        confirmations: u64,
    ) -> Result<Vec<Self>> {
        tx.prepare_cached(include_str!("./query_erc20_not_updated.sql"))?
            .query(named_params! {
                ":current_block_number": U64(current_block_number),
                ":confirmations": U64(confirmations),
            })?
            .map(|row| SafeContract::try_from(row))
            .collect()
            .map_err(Into::into)
    }

    pub fn query_erc20_almost_updated(
        tx: &Transaction,
        current_block_number: BlockNumber,
        updated_blocks_behind: u64,
        confirmations: u64,
    ) -> Result<Vec<Self>> {
        tx.prepare_cached(include_str!("./query_erc20_almost_updated.sql"))?
            .query(named_params! {
                ":current_block_number": U64(current_block_number),
                ":updated_blocks_behind": U64(updated_blocks_behind),
                ":confirmations": U64(confirmations),
            })?
            .map(|row| SafeContract::try_from(row))
            .collect()
            .map_err(Into::into)
    }

    pub fn rewind_erc20_cursors(tx: &Transaction, block_number: BlockNumber) -> Result<usize> {
        tx.prepare_cached(include_str!("./rewind_erc20_cursor.sql"))?
            .execute(named_params! { ":block_number": U64(block_number) })
            .map_err(Into::into)
    }
}

impl<'stmt> TryFrom<&rusqlite::Row<'stmt>> for SafeContract {
    type Error = rusqlite::Error;

    fn try_from(row: &rusqlite::Row<'stmt>) -> rusqlite::Result<Self> {
        Ok(Self {
            address: row.get(0)?,
            ethereum_tx_hash: row.get(1)?,
            erc20_block_number: row.get(2)?,
        })
    }
}

#[cfg(test)]
mod tests {

    use super::SafeContract;
    use crate::{
        connect as connect_db,
        models::{blocks::test_util::test_block, ethereum_txs::test_util::test_tx},
    };

    use alloy::primitives::{Address, B256};
    use eyre::Result;

    #[test]
    pub fn test_insert_and_cursor_roundtrip() -> Result<()> {
        let pool = connect_db(&String::from(":memory:"))?;

        let mut conn = pool.get()?;
        let tx = conn.transaction()?;

        test_block(100).insert(&tx)?;
        let hash = B256::repeat_byte(8);
        test_tx(hash, 100, 0).insert(&tx)?;

        let safe = Address::repeat_byte(0x11);
        SafeContract::new(safe, hash, 100).insert(&tx)?;
        // Registration races (indexer vs processor) are benign
        SafeContract::new(safe, hash, 100).insert(&tx)?;

        let updated = SafeContract::update_erc20_cursor(&tx, &[safe], 101, 150)?;
        assert_eq!(updated, 1);
        assert_eq!(
            SafeContract::query_by_address(&tx, safe)?
                .unwrap()
                .erc20_block_number,
            150.into()
        );

        // Reorg guard: scanning [180, 200] after a rewind to 150 must not update
        let skipped = SafeContract::update_erc20_cursor(&tx, &[safe], 180, 200)?;
        assert_eq!(skipped, 0);

        SafeContract::rewind_erc20_cursors(&tx, 107)?;
        assert_eq!(
            SafeContract::query_by_address(&tx, safe)?
                .unwrap()
                .erc20_block_number,
            107.into()
        );

        tx.rollback()?;

        Ok(())
    }

    #[test]
    pub fn test_reorged_creation_tx_deletes_safe() -> Result<()> {
        let pool = connect_db(&String::from(":memory:"))?;

        let mut conn = pool.get()?;
        let tx = conn.transaction()?;

        test_block(100).insert(&tx)?;
        let hash = B256::repeat_byte(8);
        test_tx(hash, 100, 0).insert(&tx)?;
        let safe = Address::repeat_byte(0x11);
        SafeContract::new(safe, hash, 100).insert(&tx)?;

        crate::models::blocks::Block::delete_from_number(&tx, 100)?;
        assert!(SafeContract::query_by_address(&tx, safe)?.is_none());

        tx.rollback()?;

        Ok(())
    }
}
