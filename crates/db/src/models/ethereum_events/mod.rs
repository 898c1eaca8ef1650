use crate::primitives::FixedBytes;

use alloy::primitives::Address;

use eyre::Result;
use fallible_iterator::FallibleIterator;
use rusqlite::{named_params, Transaction};

#[derive(Debug, Clone)]
pub struct EthereumEvent {
    pub ethereum_tx_hash: FixedBytes<32>,
    pub log_index: i64,
    pub address: FixedBytes<20>,
    pub topic: FixedBytes<32>,
    pub topics: serde_json::Value,
    pub arguments: serde_json::Value,
}

impl EthereumEvent {
    pub fn is_erc20_transfer(&self) -> bool {
        self.arguments.get("value").is_some()
    }

    pub fn is_erc721_transfer(&self) -> bool {
        self.arguments.get("tokenId").is_some()
    }

    pub fn insert(&self, tx: &Transaction) -> Result<()> {
        tx.prepare_cached(include_str!("./insert.sql"))?
            .execute(named_params! {
                ":ethereum_tx_hash": self.ethereum_tx_hash,
                ":log_index": self.log_index,
                ":address": self.address,
                ":topic": self.topic,
                ":topics": self.topics,
                ":arguments": self.arguments,
            })
            .map(|_| ())
            .map_err(Into::into)
    }

    /// ERC-20 transfers touching `address`, for balance folding. The `to`/`from`
    /// arguments are stored as checksummed hex, so the parameter must be too.
    pub fn query_erc20_for_address(
        tx: &Transaction,
        transfer_topic: FixedBytes<32>,
        address: Address,
    ) -> Result<Vec<Self>> {
        tx.prepare_cached(include_str!("./query_erc20_for_address.sql"))?
            .query(named_params! {
                ":topic": transfer_topic,
                ":address": address.to_checksum(None),
            })?
            .map(|row| EthereumEvent::try_from(row))
            .collect()
            .map_err(Into::into)
    }
}

impl<'stmt> TryFrom<&rusqlite::Row<'stmt>> for EthereumEvent {
    type Error = rusqlite::Error;

    fn try_from(row: &rusqlite::Row<'stmt>) -> rusqlite::Result<Self> {
        Ok(Self {
            ethereum_tx_hash: row.get(0)?,
            log_index: row.get(1)?,
            address: row.get(2)?,
            topic: row.get(3)?,
            topics: row.get(4)?,
            arguments: row.get(5)?,
        })
    }
}
