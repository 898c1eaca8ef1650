use crate::primitives::{FixedBytes, U256Text, U64};

use alloy::primitives::TxHash;

use eyre::Result;
use rusqlite::{named_params, OptionalExtension, Transaction};

#[derive(Debug, Clone)]
pub struct EthereumTx {
    pub tx_hash: FixedBytes<32>,
    pub block_number: Option<U64>,
    pub from_address: Option<FixedBytes<20>>,
    pub to_address: Option<FixedBytes<20>>,
    pub value: U256Text,
    pub gas: U256Text,
    pub gas_price: U256Text,
    pub nonce: U64,
    pub data: Option<Vec<u8>>,
    // Receipt logs as a JSON array of {address, topics, data}
    pub logs: Option<serde_json::Value>,
    pub status: Option<i64>,
    pub gas_used: Option<U256Text>,
    pub transaction_index: Option<U64>,
}

impl EthereumTx {
    pub fn success(&self) -> Option<bool> {
        self.status.map(|status| status == 1)
    }

    pub fn insert(&self, tx: &Transaction) -> Result<()> {
        tx.prepare_cached(include_str!("./insert.sql"))?
            .execute(named_params! {
                ":tx_hash": self.tx_hash,
                ":block_number": self.block_number,
                ":from_address": self.from_address,
                ":to_address": self.to_address,
                ":value": self.value,
                ":gas": self.gas,
                ":gas_price": self.gas_price,
                ":nonce": self.nonce,
                ":data": self.data,
                ":logs": self.logs,
                ":status": self.status,
                ":gas_used": self.gas_used,
                ":transaction_index": self.transaction_index,
            })
            .map(|_| ())
            .map_err(Into::into)
    }

    pub fn query_by_hash(tx: &Transaction, tx_hash: TxHash) -> Result<Option<Self>> {
        tx.prepare_cached(include_str!("./query_by_hash.sql"))?
            .query_row(
                named_params! { ":tx_hash": FixedBytes::from(tx_hash) },
                |row| EthereumTx::try_from(row),
            )
            .optional()
            .map_err(Into::into)
    }
}

impl<'stmt> TryFrom<&rusqlite::Row<'stmt>> for EthereumTx {
    type Error = rusqlite::Error;

    fn try_from(row: &rusqlite::Row<'stmt>) -> rusqlite::Result<Self> {
        Ok(Self {
            tx_hash: row.get(0)?,
            block_number: row.get(1)?,
            from_address: row.get(2)?,
            to_address: row.get(3)?,
            value: row.get(4)?,
            gas: row.get(5)?,
            gas_price: row.get(6)?,
            nonce: row.get(7)?,
            data: row.get(8)?,
            logs: row.get(9)?,
            status: row.get(10)?,
            gas_used: row.get(11)?,
            transaction_index: row.get(12)?,
        })
    }
}

#[cfg(test)]
pub mod test_util {
    use super::EthereumTx;
    use alloy::primitives::{Address, B256, U256};

    pub fn test_tx(hash: B256, block_number: u64, transaction_index: u64) -> EthereumTx {
        EthereumTx {
            tx_hash: hash.into(),
            block_number: Some(block_number.into()),
            from_address: Some(Address::repeat_byte(0xEE).into()),
            to_address: Some(Address::repeat_byte(0xDD).into()),
            value: U256::ZERO.into(),
            gas: U256::from(500_000u64).into(),
            gas_price: U256::from(1_000_000_000u64).into(),
            nonce: 0.into(),
            data: None,
            logs: Some(serde_json::json!([])),
            status: Some(1),
            gas_used: Some(U256::from(100_000u64).into()),
            transaction_index: Some(transaction_index.into()),
        }
    }
}

#[cfg(test)]
mod tests {

    use super::{test_util::test_tx, EthereumTx};
    use crate::{connect as connect_db, models::blocks::test_util::test_block};

    use alloy::primitives::B256;
    use eyre::Result;

    #[test]
    pub fn test_insert_and_query() -> Result<()> {
        let pool = connect_db(&String::from(":memory:"))?;

        let mut conn = pool.get()?;
        let tx = conn.transaction()?;

        test_block(100).insert(&tx)?;

        let hash = B256::repeat_byte(0xAB);
        test_tx(hash, 100, 3).insert(&tx)?;
        // Re-inserting the same hash is a no-op
        test_tx(hash, 100, 3).insert(&tx)?;

        let stored = EthereumTx::query_by_hash(&tx, hash)?.unwrap();
        assert_eq!(stored.block_number, Some(100.into()));
        assert_eq!(stored.success(), Some(true));

        tx.rollback()?;

        Ok(())
    }

    #[test]
    pub fn test_deleting_block_cascades() -> Result<()> {
        let pool = connect_db(&String::from(":memory:"))?;

        let mut conn = pool.get()?;
        let tx = conn.transaction()?;

        test_block(100).insert(&tx)?;
        let hash = B256::repeat_byte(0xAB);
        test_tx(hash, 100, 0).insert(&tx)?;

        crate::models::blocks::Block::delete_from_number(&tx, 100)?;
        assert!(EthereumTx::query_by_hash(&tx, hash)?.is_none());

        tx.rollback()?;

        Ok(())
    }
}
