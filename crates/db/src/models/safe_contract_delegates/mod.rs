use crate::primitives::FixedBytes;

use alloy::primitives::Address;

use eyre::Result;
use fallible_iterator::FallibleIterator;
use rusqlite::{named_params, Transaction};

/// Users allowed to propose/read txs on behalf of a Safe's owners.
#[derive(Debug, Clone)]
pub struct SafeContractDelegate {
    pub safe_address: FixedBytes<20>,
    pub delegate: FixedBytes<20>,
    pub delegator: FixedBytes<20>,
    pub label: String,
    pub read: bool,
    pub write: bool,
}

impl SafeContractDelegate {
    pub fn new(safe_address: Address, delegate: Address, delegator: Address, label: String) -> Self {
        Self {
            safe_address: safe_address.into(),
            delegate: delegate.into(),
            delegator: delegator.into(),
            label,
            read: true,
            write: true,
        }
    }

    pub fn upsert(&self, tx: &Transaction) -> Result<()> {
        tx.prepare_cached(include_str!("./insert.sql"))?
            .execute(named_params! {
                ":safe_address": self.safe_address,
                ":delegate": self.delegate,
                ":delegator": self.delegator,
                ":label": self.label,
                ":read": self.read,
                ":write": self.write,
            })
            .map(|_| ())
            .map_err(Into::into)
    }

    pub fn query_by_safe(tx: &Transaction, safe_address: Address) -> Result<Vec<Self>> {
        tx.prepare_cached(include_str!("./query_by_safe.sql"))?
            .query(named_params! { ":safe_address": FixedBytes::from(safe_address) })?
            .map(|row| SafeContractDelegate::try_from(row))
            .collect()
            .map_err(Into::into)
    }

    pub fn delete(tx: &Transaction, safe_address: Address, delegate: Address) -> Result<usize> {
        tx.prepare_cached(include_str!("./delete.sql"))?
            .execute(named_params! {
                ":safe_address": FixedBytes::from(safe_address),
                ":delegate": FixedBytes::from(delegate),
            })
            .map_err(Into::into)
    }
}

impl<'stmt> TryFrom<&rusqlite::Row<'stmt>> for SafeContractDelegate {
    type Error = rusqlite::Error;

    fn try_from(row: &rusqlite::Row<'stmt>) -> rusqlite::Result<Self> {
        Ok(Self {
            safe_address: row.get(0)?,
            delegate: row.get(1)?,
            delegator: row.get(2)?,
            label: row.get(3)?,
            read: row.get(4)?,
            write: row.get(5)?,
        })
    }
}
