use crate::primitives::{FixedBytes, U64};

use alloy::primitives::{Address, TxHash};

use eyre::Result;
use fallible_iterator::FallibleIterator;
use rusqlite::{named_params, OptionalExtension, Transaction};

fn addresses_to_json(addresses: &[Address]) -> serde_json::Value {
    serde_json::Value::Array(
        addresses
            .iter()
            .map(|address| serde_json::Value::String(address.to_checksum(None)))
            .collect(),
    )
}

fn addresses_from_json(value: &serde_json::Value) -> Vec<Address> {
    value
        .as_array()
        .map(|array| {
            array
                .iter()
                .filter_map(|entry| entry.as_str())
                .filter_map(|entry| entry.parse().ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Immutable snapshot of a Safe's configuration, appended whenever the processor
/// applies a mutating master-copy call. The latest row in canonical order is the
/// current state.
#[derive(Debug, Clone)]
pub struct SafeStatus {
    pub internal_tx_id: i64,
    pub address: FixedBytes<20>,
    pub owners: serde_json::Value,
    pub threshold: U64,
    pub nonce: U64,
    pub master_copy: FixedBytes<20>,
    pub fallback_handler: FixedBytes<20>,
    pub enabled_modules: serde_json::Value,
}

impl SafeStatus {
    pub fn new(
        internal_tx_id: i64,
        address: Address,
        owners: &[Address],
        threshold: u64,
        nonce: u64,
        master_copy: Address,
        fallback_handler: Address,
        enabled_modules: &[Address],
    ) -> Self {
        Self {
            internal_tx_id,
            address: address.into(),
            owners: addresses_to_json(owners),
            threshold: threshold.into(),
            nonce: nonce.into(),
            master_copy: master_copy.into(),
            fallback_handler: fallback_handler.into(),
            enabled_modules: addresses_to_json(enabled_modules),
        }
    }

    pub fn owners(&self) -> Vec<Address> {
        addresses_from_json(&self.owners)
    }

    pub fn enabled_modules(&self) -> Vec<Address> {
        addresses_from_json(&self.enabled_modules)
    }

    pub fn insert(&self, tx: &Transaction) -> Result<()> {
        tx.prepare_cached(include_str!("./insert.sql"))?
            .execute(named_params! {
                ":internal_tx_id": self.internal_tx_id,
                ":address": self.address,
                ":owners": self.owners,
                ":threshold": self.threshold,
                ":nonce": self.nonce,
                ":master_copy": self.master_copy,
                ":fallback_handler": self.fallback_handler,
                ":enabled_modules": self.enabled_modules,
            })
            .map(|_| ())
            .map_err(Into::into)
    }

    pub fn query_last_for_address(tx: &Transaction, address: Address) -> Result<Option<Self>> {
        tx.prepare_cached(include_str!("./query_last_for_address.sql"))?
            .query_row(
                named_params! { ":address": FixedBytes::from(address) },
                |row| SafeStatus::try_from(row),
            )
            .optional()
            .map_err(Into::into)
    }

    /// The current status of every Safe: rows come back grouped by address, newest
    /// first within the group, so the first row per address wins.
    pub fn query_last_for_every_address(tx: &Transaction) -> Result<Vec<Self>> {
        let rows: Vec<Self> = tx
            .prepare_cached(include_str!("./query_sorted_by_internal_tx.sql"))?
            .query([])?
            .map(|row| SafeStatus::try_from(row))
            .collect()?;

        let mut last_address: Option<FixedBytes<20>> = None;
        let mut result = Vec::new();
        for row in rows {
            if last_address.as_ref() != Some(&row.address) {
                last_address = Some(row.address.clone());
                result.push(row);
            }
        }
        Ok(result)
    }

    pub fn query_history_for_address(tx: &Transaction, address: Address) -> Result<Vec<Self>> {
        tx.prepare_cached(include_str!("./query_history_for_address.sql"))?
            .query(named_params! { ":address": FixedBytes::from(address) })?
            .map(|row| SafeStatus::try_from(row))
            .collect()
            .map_err(Into::into)
    }

    /// Threshold the Safe required at the point a given tx executed.
    pub fn query_threshold_for_ethereum_tx(
        tx: &Transaction,
        ethereum_tx_hash: TxHash,
        address: Address,
    ) -> Result<Option<u64>> {
        tx.prepare_cached(include_str!("./query_threshold_for_ethereum_tx.sql"))?
            .query_row(
                named_params! {
                    ":ethereum_tx_hash": FixedBytes::from(ethereum_tx_hash),
                    ":address": FixedBytes::from(address),
                },
                |row| row.get::<_, U64>(0),
            )
            .optional()
            .map(|threshold| threshold.map(Into::into))
            .map_err(Into::into)
    }

    /// Safes currently owned by `owner`.
    pub fn query_addresses_for_owner(tx: &Transaction, owner: Address) -> Result<Vec<Address>> {
        Ok(Self::query_last_for_every_address(tx)?
            .into_iter()
            .filter(|status| status.owners().contains(&owner))
            .map(|status| status.address.into())
            .collect())
    }
}

impl<'stmt> TryFrom<&rusqlite::Row<'stmt>> for SafeStatus {
    type Error = rusqlite::Error;

    fn try_from(row: &rusqlite::Row<'stmt>) -> rusqlite::Result<Self> {
        Ok(Self {
            internal_tx_id: row.get(0)?,
            address: row.get(1)?,
            owners: row.get(2)?,
            threshold: row.get(3)?,
            nonce: row.get(4)?,
            master_copy: row.get(5)?,
            fallback_handler: row.get(6)?,
            enabled_modules: row.get(7)?,
        })
    }
}

#[cfg(test)]
mod tests {

    use super::SafeStatus;
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

    fn insert_status_at(
        tx: &rusqlite::Transaction,
        hash: B256,
        block_number: u64,
        transaction_index: u64,
        trace_address: &str,
        safe: Address,
        nonce: u64,
    ) -> Result<()> {
        test_tx(hash, block_number, transaction_index).insert(tx)?;
        test_internal_tx(
            hash,
            trace_address,
            safe,
            Address::repeat_byte(0x99),
            Some(vec![0xAA]),
            Some(CallType::DelegateCall),
        )
        .insert(tx)?;
        let id = InternalTx::query_id_by_unique(tx, hash, trace_address)?.unwrap();
        SafeStatus::new(
            id,
            safe,
            &[Address::repeat_byte(0x01), Address::repeat_byte(0x02)],
            2,
            nonce,
            Address::repeat_byte(0x99),
            Address::ZERO,
            &[],
        )
        .insert(tx)?;
        Ok(())
    }

    #[test]
    pub fn test_last_for_address_uses_canonical_order() -> Result<()> {
        let pool = connect_db(&String::from(":memory:"))?;

        let mut conn = pool.get()?;
        let tx = conn.transaction()?;

        test_block(100).insert(&tx)?;
        test_block(101).insert(&tx)?;

        let safe = Address::repeat_byte(0x11);
        // Same block and tx, trace "2" < "10" by sequence order
        insert_status_at(&tx, B256::repeat_byte(1), 100, 0, "2", safe, 0)?;
        insert_status_at(&tx, B256::repeat_byte(1), 100, 0, "10", safe, 1)?;

        let last = SafeStatus::query_last_for_address(&tx, safe)?.unwrap();
        assert_eq!(last.nonce, 1.into());

        // A later block supersedes
        insert_status_at(&tx, B256::repeat_byte(2), 101, 0, "", safe, 2)?;
        let last = SafeStatus::query_last_for_address(&tx, safe)?.unwrap();
        assert_eq!(last.nonce, 2.into());

        tx.rollback()?;

        Ok(())
    }

    #[test]
    pub fn test_addresses_for_owner() -> Result<()> {
        let pool = connect_db(&String::from(":memory:"))?;

        let mut conn = pool.get()?;
        let tx = conn.transaction()?;

        test_block(100).insert(&tx)?;
        let safe_a = Address::repeat_byte(0x11);
        let safe_b = Address::repeat_byte(0x12);
        insert_status_at(&tx, B256::repeat_byte(1), 100, 0, "", safe_a, 0)?;
        insert_status_at(&tx, B256::repeat_byte(2), 100, 1, "", safe_b, 0)?;

        let owned = SafeStatus::query_addresses_for_owner(&tx, Address::repeat_byte(0x01))?;
        assert_eq!(owned.len(), 2);
        let owned = SafeStatus::query_addresses_for_owner(&tx, Address::repeat_byte(0x0F))?;
        assert!(owned.is_empty());

        tx.rollback()?;

        Ok(())
    }
}
