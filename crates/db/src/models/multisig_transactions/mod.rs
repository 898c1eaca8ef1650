use crate::primitives::{FixedBytes, U256Text, U64};

use alloy::primitives::{Address, B256};

use eyre::Result;
use fallible_iterator::FallibleIterator;
use rusqlite::{named_params, OptionalExtension, Transaction};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
pub struct MultisigTransaction {
    pub safe_tx_hash: FixedBytes<32>,
    pub safe: FixedBytes<20>,
    pub ethereum_tx_hash: Option<FixedBytes<32>>,
    pub to_address: Option<FixedBytes<20>>,
    pub value: U256Text,
    pub data: Option<Vec<u8>>,
    pub operation: i64,
    pub safe_tx_gas: U256Text,
    pub base_gas: U256Text,
    pub gas_price: U256Text,
    pub gas_token: Option<FixedBytes<20>>,
    pub refund_receiver: Option<FixedBytes<20>>,
    pub signatures: Option<Vec<u8>>,
    pub nonce: U64,
    pub failed: Option<bool>,
    pub origin: Option<String>,
    pub created: U64,
}

impl MultisigTransaction {
    pub fn executed(&self) -> bool {
        self.ethereum_tx_hash.is_some()
    }

    pub fn owners(&self) -> Option<Vec<Address>> {
        self.signatures.as_ref()?;
        // TODO Get owners from signatures. Not very trivial
        Some(Vec::new())
    }

    pub fn created_now() -> U64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0)
            .into()
    }

    /// Insert-or-link: a row proposed through the API earlier keeps its static
    /// fields and gains the executing tx, signatures and outcome.
    pub fn upsert_execution(&self, tx: &Transaction) -> Result<()> {
        tx.prepare_cached(include_str!("./upsert_execution.sql"))?
            .execute(named_params! {
                ":safe_tx_hash": self.safe_tx_hash,
                ":safe": self.safe,
                ":ethereum_tx_hash": self.ethereum_tx_hash,
                ":to_address": self.to_address,
                ":value": self.value,
                ":data": self.data,
                ":operation": self.operation,
                ":safe_tx_gas": self.safe_tx_gas,
                ":base_gas": self.base_gas,
                ":gas_price": self.gas_price,
                ":gas_token": self.gas_token,
                ":refund_receiver": self.refund_receiver,
                ":signatures": self.signatures,
                ":nonce": self.nonce,
                ":failed": self.failed,
                ":origin": self.origin,
                ":created": self.created,
            })
            .map(|_| ())
            .map_err(Into::into)
    }

    pub fn query_by_hash(tx: &Transaction, safe_tx_hash: B256) -> Result<Option<Self>> {
        tx.prepare_cached(include_str!("./query_by_hash.sql"))?
            .query_row(
                named_params! { ":safe_tx_hash": FixedBytes::from(safe_tx_hash) },
                |row| MultisigTransaction::try_from(row),
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn query_by_safe(tx: &Transaction, safe: Address) -> Result<Vec<Self>> {
        tx.prepare_cached(include_str!("./query_by_safe.sql"))?
            .query(named_params! { ":safe": FixedBytes::from(safe) })?
            .map(|row| MultisigTransaction::try_from(row))
            .collect()
            .map_err(Into::into)
    }
}

impl<'stmt> TryFrom<&rusqlite::Row<'stmt>> for MultisigTransaction {
    type Error = rusqlite::Error;

    fn try_from(row: &rusqlite::Row<'stmt>) -> rusqlite::Result<Self> {
        Ok(Self {
            safe_tx_hash: row.get(0)?,
            safe: row.get(1)?,
            ethereum_tx_hash: row.get(2)?,
            to_address: row.get(3)?,
            value: row.get(4)?,
            data: row.get(5)?,
            operation: row.get(6)?,
            safe_tx_gas: row.get(7)?,
            base_gas: row.get(8)?,
            gas_price: row.get(9)?,
            gas_token: row.get(10)?,
            refund_receiver: row.get(11)?,
            signatures: row.get(12)?,
            nonce: row.get(13)?,
            failed: row.get(14)?,
            origin: row.get(15)?,
            created: row.get(16)?,
        })
    }
}

#[cfg(test)]
mod tests {

    use super::MultisigTransaction;
    use crate::{
        connect as connect_db,
        models::{blocks::test_util::test_block, ethereum_txs::test_util::test_tx},
        primitives::U256Text,
    };

    use alloy::primitives::{Address, B256, U256};
    use eyre::Result;

    fn test_multisig_tx(
        safe_tx_hash: B256,
        safe: Address,
        ethereum_tx_hash: Option<B256>,
        nonce: u64,
    ) -> MultisigTransaction {
        MultisigTransaction {
            safe_tx_hash: safe_tx_hash.into(),
            safe: safe.into(),
            ethereum_tx_hash: ethereum_tx_hash.map(Into::into),
            to_address: Some(Address::repeat_byte(0x44).into()),
            value: U256::from(1u64).into(),
            data: None,
            operation: 0,
            safe_tx_gas: U256Text(U256::ZERO),
            base_gas: U256Text(U256::ZERO),
            gas_price: U256Text(U256::ZERO),
            gas_token: None,
            refund_receiver: None,
            signatures: None,
            nonce: nonce.into(),
            failed: Some(false),
            origin: None,
            created: MultisigTransaction::created_now(),
        }
    }

    #[test]
    pub fn test_upsert_links_execution() -> Result<()> {
        let pool = connect_db(&String::from(":memory:"))?;

        let mut conn = pool.get()?;
        let tx = conn.transaction()?;

        test_block(100).insert(&tx)?;
        let eth_tx_hash = B256::repeat_byte(0x0A);
        test_tx(eth_tx_hash, 100, 0).insert(&tx)?;

        let safe = Address::repeat_byte(0x11);
        let safe_tx_hash = B256::repeat_byte(0x77);

        // Proposed first (no execution tx) ...
        test_multisig_tx(safe_tx_hash, safe, None, 0).upsert_execution(&tx)?;
        // ... then linked at execution
        test_multisig_tx(safe_tx_hash, safe, Some(eth_tx_hash), 0).upsert_execution(&tx)?;

        let stored = MultisigTransaction::query_by_hash(&tx, safe_tx_hash)?.unwrap();
        assert!(stored.executed());
        assert_eq!(stored.ethereum_tx_hash, Some(eth_tx_hash.into()));

        tx.rollback()?;

        Ok(())
    }

    #[test]
    pub fn test_reorg_unlinks_but_keeps_proposal() -> Result<()> {
        let pool = connect_db(&String::from(":memory:"))?;

        let mut conn = pool.get()?;
        let tx = conn.transaction()?;

        test_block(100).insert(&tx)?;
        let eth_tx_hash = B256::repeat_byte(0x0A);
        test_tx(eth_tx_hash, 100, 0).insert(&tx)?;

        let safe = Address::repeat_byte(0x11);
        let safe_tx_hash = B256::repeat_byte(0x77);
        test_multisig_tx(safe_tx_hash, safe, Some(eth_tx_hash), 0).upsert_execution(&tx)?;

        crate::models::blocks::Block::delete_from_number(&tx, 100)?;

        let stored = MultisigTransaction::query_by_hash(&tx, safe_tx_hash)?.unwrap();
        assert!(!stored.executed());

        tx.rollback()?;

        Ok(())
    }
}
