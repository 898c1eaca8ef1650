use crate::primitives::{FixedBytes, U256Text, U64};

use alloy::primitives::Address;

use eyre::Result;
use fallible_iterator::FallibleIterator;
use rusqlite::{named_params, Transaction};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
pub struct ModuleTransaction {
    pub internal_tx_id: i64,
    pub safe: FixedBytes<20>,
    pub module: FixedBytes<20>,
    pub to_address: FixedBytes<20>,
    pub value: U256Text,
    pub data: Option<Vec<u8>>,
    pub operation: i64,
    pub created: U64,
    /// Populated on reads that join the backing frame.
    pub ethereum_tx_hash: Option<FixedBytes<32>>,
}

impl ModuleTransaction {
    pub fn created_now() -> U64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0)
            .into()
    }

    pub fn insert(&self, tx: &Transaction) -> Result<()> {
        tx.prepare_cached(include_str!("./insert.sql"))?
            .execute(named_params! {
                ":internal_tx_id": self.internal_tx_id,
                ":safe": self.safe,
                ":module": self.module,
                ":to_address": self.to_address,
                ":value": self.value,
                ":data": self.data,
                ":operation": self.operation,
                ":created": self.created,
            })
            .map(|_| ())
            .map_err(Into::into)
    }

    pub fn query_by_safe(tx: &Transaction, safe: Address) -> Result<Vec<Self>> {
        tx.prepare_cached(include_str!("./query_by_safe.sql"))?
            .query(named_params! { ":safe": FixedBytes::from(safe) })?
            .map(|row| {
                Ok(Self {
                    internal_tx_id: row.get(0)?,
                    safe: row.get(1)?,
                    module: row.get(2)?,
                    to_address: row.get(3)?,
                    value: row.get(4)?,
                    data: row.get(5)?,
                    operation: row.get(6)?,
                    created: row.get(7)?,
                    ethereum_tx_hash: row.get(8)?,
                })
            })
            .collect()
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {

    use super::ModuleTransaction;
    use crate::{
        connect as connect_db,
        models::{
            blocks::test_util::test_block,
            ethereum_txs::test_util::test_tx,
            internal_txs::{test_util::test_internal_tx, CallType, InternalTx},
        },
        primitives::U256Text,
    };

    use alloy::primitives::{Address, B256, U256};
    use eyre::Result;

    #[test]
    pub fn test_insert_and_query_by_safe() -> Result<()> {
        let pool = connect_db(&String::from(":memory:"))?;

        let mut conn = pool.get()?;
        let tx = conn.transaction()?;

        test_block(100).insert(&tx)?;
        let hash = B256::repeat_byte(0x0C);
        test_tx(hash, 100, 0).insert(&tx)?;

        let safe = Address::repeat_byte(0x11);
        test_internal_tx(
            hash,
            "0",
            safe,
            Address::repeat_byte(0x99),
            Some(vec![0xAA]),
            Some(CallType::DelegateCall),
        )
        .insert(&tx)?;
        let id = InternalTx::query_id_by_unique(&tx, hash, "0")?.unwrap();

        let module_tx = ModuleTransaction {
            internal_tx_id: id,
            safe: safe.into(),
            module: Address::repeat_byte(0x55).into(),
            to_address: Address::repeat_byte(0x44).into(),
            value: U256Text(U256::from(1u64)),
            data: None,
            operation: 0,
            created: ModuleTransaction::created_now(),
            ethereum_tx_hash: None,
        };
        module_tx.insert(&tx)?;
        module_tx.insert(&tx)?;

        let stored = ModuleTransaction::query_by_safe(&tx, safe)?;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].module, Address::repeat_byte(0x55).into());
        assert_eq!(stored[0].ethereum_tx_hash, Some(hash.into()));

        tx.rollback()?;

        Ok(())
    }
}
