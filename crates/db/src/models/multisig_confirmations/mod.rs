use crate::primitives::{FixedBytes, U64};

use alloy::primitives::B256;

use eyre::Result;
use fallible_iterator::FallibleIterator;
use rusqlite::{named_params, Transaction};
use std::time::{SystemTime, UNIX_EPOCH};

/// One owner's approval of a multisig tx, recovered from the execution signature
/// blob or submitted through the API before execution.
#[derive(Debug, Clone)]
pub struct MultisigConfirmation {
    pub ethereum_tx_hash: Option<FixedBytes<32>>,
    pub multisig_transaction_hash: FixedBytes<32>,
    pub owner: FixedBytes<20>,
    pub signature: Option<Vec<u8>>,
    pub signature_type: i64,
    pub created: U64,
}

impl MultisigConfirmation {
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
                ":ethereum_tx_hash": self.ethereum_tx_hash,
                ":multisig_transaction_hash": self.multisig_transaction_hash,
                ":owner": self.owner,
                ":signature": self.signature,
                ":signature_type": self.signature_type,
                ":created": self.created,
            })
            .map(|_| ())
            .map_err(Into::into)
    }

    pub fn query_by_transaction_hash(
        tx: &Transaction,
        multisig_transaction_hash: B256,
    ) -> Result<Vec<Self>> {
        tx.prepare_cached(include_str!("./query_by_transaction_hash.sql"))?
            .query(named_params! {
                ":multisig_transaction_hash": FixedBytes::from(multisig_transaction_hash)
            })?
            .map(|row| MultisigConfirmation::try_from(row))
            .collect()
            .map_err(Into::into)
    }
}

impl<'stmt> TryFrom<&rusqlite::Row<'stmt>> for MultisigConfirmation {
    type Error = rusqlite::Error;

    fn try_from(row: &rusqlite::Row<'stmt>) -> rusqlite::Result<Self> {
        Ok(Self {
            ethereum_tx_hash: row.get(0)?,
            multisig_transaction_hash: row.get(1)?,
            owner: row.get(2)?,
            signature: row.get(3)?,
            signature_type: row.get(4)?,
            created: row.get(5)?,
        })
    }
}

#[cfg(test)]
mod tests {

    use super::MultisigConfirmation;
    use crate::{
        connect as connect_db,
        models::{blocks::test_util::test_block, ethereum_txs::test_util::test_tx},
    };

    use alloy::primitives::{Address, B256};
    use eyre::Result;

    #[test]
    pub fn test_unique_on_hash_and_owner() -> Result<()> {
        let pool = connect_db(&String::from(":memory:"))?;

        let mut conn = pool.get()?;
        let tx = conn.transaction()?;

        test_block(100).insert(&tx)?;
        let eth_tx_hash = B256::repeat_byte(0x0B);
        test_tx(eth_tx_hash, 100, 0).insert(&tx)?;

        let safe_tx_hash = B256::repeat_byte(0x77);
        let owner = Address::repeat_byte(0x01);
        let confirmation = MultisigConfirmation {
            ethereum_tx_hash: Some(eth_tx_hash.into()),
            multisig_transaction_hash: safe_tx_hash.into(),
            owner: owner.into(),
            signature: Some(vec![1, 2, 3]),
            signature_type: 2,
            created: MultisigConfirmation::created_now(),
        };
        confirmation.insert(&tx)?;
        confirmation.insert(&tx)?;

        let confirmations = MultisigConfirmation::query_by_transaction_hash(&tx, safe_tx_hash)?;
        assert_eq!(confirmations.len(), 1);

        tx.rollback()?;

        Ok(())
    }
}
