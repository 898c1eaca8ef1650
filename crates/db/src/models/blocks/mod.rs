use crate::primitives::{FixedBytes, U64};

use alloy::{primitives::BlockNumber, rpc::types::Header};

use eyre::Result;
use fallible_iterator::FallibleIterator;
use rusqlite::{named_params, OptionalExtension, Transaction};

#[derive(Debug, Clone)]
pub struct Block {
    pub number: U64,
    pub hash: FixedBytes<32>,
    pub parent_hash: FixedBytes<32>,
    pub timestamp: U64,
    pub gas_used: U64,
    pub gas_limit: U64,
    pub confirmed: bool,
}

impl Block {
    pub fn from_header(header: &Header, confirmed: bool) -> Self {
        Self {
            number: header.number.into(),
            hash: header.hash.into(),
            parent_hash: header.parent_hash.into(),
            timestamp: header.timestamp.into(),
            gas_used: header.gas_used.into(),
            gas_limit: header.gas_limit.into(),
            confirmed,
        }
    }

    /// Idempotent on `number`; a concurrent insert of the same block loses the race
    /// silently. A different hash at the same number is left for the reorg check.
    pub fn insert(&self, tx: &Transaction) -> Result<()> {
        tx.prepare_cached(include_str!("./insert.sql"))?
            .execute(named_params! {
                ":number": self.number,
                ":hash": self.hash,
                ":parent_hash": self.parent_hash,
                ":timestamp": self.timestamp,
                ":gas_used": self.gas_used,
                ":gas_limit": self.gas_limit,
                ":confirmed": self.confirmed,
            })
            .map(|_| ())
            .map_err(Into::into)
    }

    pub fn query_by_number(tx: &Transaction, number: BlockNumber) -> Result<Option<Self>> {
        tx.prepare_cached(include_str!("./query_by_number.sql"))?
            .query_row(named_params! { ":number": U64(number) }, |row| {
                Block::try_from(row)
            })
            .optional()
            .map_err(Into::into)
    }

    pub fn query_not_confirmed(tx: &Transaction, to_number: BlockNumber) -> Result<Vec<Self>> {
        tx.prepare_cached(include_str!("./query_not_confirmed.sql"))?
            .query(named_params! { ":to_number": U64(to_number) })?
            .map(|row| Block::try_from(row))
            .collect()
            .map_err(Into::into)
    }

    pub fn set_confirmed(tx: &Transaction, number: BlockNumber) -> Result<()> {
        tx.prepare_cached(include_str!("./set_confirmed.sql"))?
            .execute(named_params! { ":number": U64(number) })
            .map(|_| ())
            .map_err(Into::into)
    }

    /// Reorg rollback. Cascades through ethereum_txs into every derived table.
    pub fn delete_from_number(tx: &Transaction, number: BlockNumber) -> Result<usize> {
        tx.prepare_cached(include_str!("./delete_from_number.sql"))?
            .execute(named_params! { ":number": U64(number) })
            .map_err(Into::into)
    }
}

impl<'stmt> TryFrom<&rusqlite::Row<'stmt>> for Block {
    type Error = rusqlite::Error;

    fn try_from(row: &rusqlite::Row<'stmt>) -> rusqlite::Result<Self> {
        Ok(Self {
            number: row.get(0)?,
            hash: row.get(1)?,
            parent_hash: row.get(2)?,
            timestamp: row.get(3)?,
            gas_used: row.get(4)?,
            gas_limit: row.get(5)?,
            confirmed: row.get(6)?,
        })
    }
}

#[cfg(test)]
pub mod test_util {
    use super::Block;
    use alloy::primitives::B256;

    pub fn test_block(number: u64) -> Block {
        Block {
            number: number.into(),
            hash: B256::with_last_byte(number as u8).into(),
            parent_hash: B256::with_last_byte(number.saturating_sub(1) as u8).into(),
            timestamp: (1_600_000_000 + number * 15).into(),
            gas_used: 100_000.into(),
            gas_limit: 12_000_000.into(),
            confirmed: false,
        }
    }
}
