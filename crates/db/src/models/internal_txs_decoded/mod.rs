use crate::primitives::{FixedBytes, U64};

use eyre::Result;
use fallible_iterator::FallibleIterator;
use rusqlite::{named_params, Transaction};

#[derive(Debug, Clone)]
pub struct NewInternalTxDecoded {
    pub internal_tx_id: i64,
    pub function_name: String,
    pub arguments: serde_json::Value,
}

impl NewInternalTxDecoded {
    pub fn insert(&self, tx: &Transaction) -> Result<()> {
        tx.prepare_cached(include_str!("./insert.sql"))?
            .execute(named_params! {
                ":internal_tx_id": self.internal_tx_id,
                ":function_name": self.function_name,
                ":arguments": self.arguments,
            })
            .map(|_| ())
            .map_err(Into::into)
    }
}

/// One pending decoded delegate-call joined with the coordinates that define the
/// canonical processing order.
#[derive(Debug, Clone)]
pub struct PendingDecodedTx {
    pub internal_tx_id: i64,
    pub function_name: String,
    pub arguments: serde_json::Value,
    pub ethereum_tx_hash: FixedBytes<32>,
    pub trace_address: String,
    // `from` of the delegate-call frame, i.e. the Safe proxy
    pub safe: Option<FixedBytes<20>>,
    // `to` of the delegate-call frame, i.e. the master copy
    pub master_copy: Option<FixedBytes<20>>,
    pub block_number: Option<U64>,
    pub transaction_index: Option<U64>,
}

impl PendingDecodedTx {
    /// Unprocessed calls from known Safes, plus any `setup` so new Safes are picked
    /// up without prior registration. Ordered by
    /// (block, transaction index, trace address).
    pub fn query_pending(tx: &Transaction, limit: u64) -> Result<Vec<Self>> {
        tx.prepare_cached(include_str!("./query_pending.sql"))?
            .query(named_params! { ":limit": U64(limit) })?
            .map(|row| PendingDecodedTx::try_from(row))
            .collect()
            .map_err(Into::into)
    }

    pub fn set_processed(tx: &Transaction, internal_tx_id: i64) -> Result<()> {
        tx.prepare_cached(include_str!("./set_processed.sql"))?
            .execute(named_params! { ":internal_tx_id": internal_tx_id })
            .map(|_| ())
            .map_err(Into::into)
    }
}

impl<'stmt> TryFrom<&rusqlite::Row<'stmt>> for PendingDecodedTx {
    type Error = rusqlite::Error;

    fn try_from(row: &rusqlite::Row<'stmt>) -> rusqlite::Result<Self> {
        Ok(Self {
            internal_tx_id: row.get(0)?,
            function_name: row.get(1)?,
            arguments: row.get(2)?,
            ethereum_tx_hash: row.get(3)?,
            trace_address: row.get(4)?,
            safe: row.get(5)?,
            master_copy: row.get(6)?,
            block_number: row.get(7)?,
            transaction_index: row.get(8)?,
        })
    }
}

#[cfg(test)]
mod tests {

    use super::{NewInternalTxDecoded, PendingDecodedTx};
    use crate::{
        connect as connect_db,
        models::{
            blocks::test_util::test_block,
            ethereum_txs::test_util::test_tx,
            internal_txs::{test_util::test_internal_tx, CallType, InternalTx},
        },
    };

    use alloy::primitives::{Address, B256};
    use eyre::Result;

    #[test]
    pub fn test_pending_includes_setup_and_known_safes_only() -> Result<()> {
        let pool = connect_db(&String::from(":memory:"))?;

        let mut conn = pool.get()?;
        let tx = conn.transaction()?;

        test_block(100).insert(&tx)?;
        let hash = B256::repeat_byte(3);
        test_tx(hash, 100, 0).insert(&tx)?;

        let unknown_safe = Address::repeat_byte(0x11);
        let master_copy = Address::repeat_byte(0x99);

        // A setup from an unregistered Safe is pending
        test_internal_tx(
            hash,
            "0",
            unknown_safe,
            master_copy,
            Some(vec![0xAA]),
            Some(CallType::DelegateCall),
        )
        .insert(&tx)?;
        let setup_id = InternalTx::query_id_by_unique(&tx, hash, "0")?.unwrap();
        NewInternalTxDecoded {
            internal_tx_id: setup_id,
            function_name: "setup".to_string(),
            arguments: serde_json::json!({}),
        }
        .insert(&tx)?;

        // A non-setup call from an unregistered Safe is not
        test_internal_tx(
            hash,
            "1",
            unknown_safe,
            master_copy,
            Some(vec![0xBB]),
            Some(CallType::DelegateCall),
        )
        .insert(&tx)?;
        let other_id = InternalTx::query_id_by_unique(&tx, hash, "1")?.unwrap();
        NewInternalTxDecoded {
            internal_tx_id: other_id,
            function_name: "changeThreshold".to_string(),
            arguments: serde_json::json!({ "_threshold": "2" }),
        }
        .insert(&tx)?;

        let pending = PendingDecodedTx::query_pending(&tx, 100)?;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].function_name, "setup");

        PendingDecodedTx::set_processed(&tx, setup_id)?;
        assert!(PendingDecodedTx::query_pending(&tx, 100)?.is_empty());

        tx.rollback()?;

        Ok(())
    }

    #[test]
    pub fn test_pending_orders_by_block_then_index_then_trace() -> Result<()> {
        let pool = connect_db(&String::from(":memory:"))?;

        let mut conn = pool.get()?;
        let tx = conn.transaction()?;

        test_block(100).insert(&tx)?;
        test_block(101).insert(&tx)?;

        let safe = Address::repeat_byte(0x11);
        let master_copy = Address::repeat_byte(0x99);

        // (block, tx_index, trace_address) out of insertion order
        let coordinates = [
            (B256::repeat_byte(4), 101u64, 0u64, "0"),
            (B256::repeat_byte(5), 100, 1, "10"),
            (B256::repeat_byte(5), 100, 1, "2"),
            (B256::repeat_byte(6), 100, 0, ""),
        ];
        for (hash, block_number, transaction_index, trace_address) in coordinates {
            test_tx(hash, block_number, transaction_index).insert(&tx)?;
            test_internal_tx(
                hash,
                trace_address,
                safe,
                master_copy,
                Some(vec![0xAA]),
                Some(CallType::DelegateCall),
            )
            .insert(&tx)?;
            let id = InternalTx::query_id_by_unique(&tx, hash, trace_address)?.unwrap();
            NewInternalTxDecoded {
                internal_tx_id: id,
                function_name: "setup".to_string(),
                arguments: serde_json::json!({}),
            }
            .insert(&tx)?;
        }

        let pending = PendingDecodedTx::query_pending(&tx, 100)?;
        let order = pending
            .iter()
            .map(|row| {
                (
                    row.block_number.unwrap().0,
                    row.transaction_index.unwrap().0,
                    row.trace_address.clone(),
                )
            })
            .collect::<Vec<_>>();
        assert_eq!(
            order,
            vec![
                (100, 0, "".to_string()),
                (100, 1, "2".to_string()),
                (100, 1, "10".to_string()),
                (101, 0, "0".to_string()),
            ]
        );

        tx.rollback()?;

        Ok(())
    }
}
