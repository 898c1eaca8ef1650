use crate::primitives::{FixedBytes, U256Text, U64};

use alloy::primitives::{Address, B256};

use eyre::Result;
use fallible_iterator::FallibleIterator;
use rusqlite::{named_params, Transaction};

/// One row of the unified transfer history: ether internal txs and ERC-20/721
/// transfer events share a shape, token fields are None for ether.
#[derive(Debug, Clone)]
pub struct Transfer {
    pub block_number: U64,
    pub execution_date: U64,
    pub transaction_hash: FixedBytes<32>,
    pub from_address: Option<FixedBytes<20>>,
    pub to_address: Option<FixedBytes<20>>,
    pub value: Option<U256Text>,
    pub token_id: Option<U256Text>,
    pub token_address: Option<FixedBytes<20>>,
}

impl Transfer {
    pub fn query_ether_for_address(tx: &Transaction, address: Address) -> Result<Vec<Self>> {
        tx.prepare_cached(include_str!("./query_ether.sql"))?
            .query(named_params! { ":address": FixedBytes::from(address) })?
            .map(|row| {
                Ok(Self {
                    block_number: row.get(0)?,
                    execution_date: row.get(1)?,
                    transaction_hash: row.get(2)?,
                    from_address: row.get(3)?,
                    to_address: row.get(4)?,
                    value: row.get(5)?,
                    token_id: None,
                    token_address: None,
                })
            })
            .collect()
            .map_err(Into::into)
    }

    pub fn query_tokens_for_address(
        tx: &Transaction,
        transfer_topic: B256,
        address: Address,
    ) -> Result<Vec<Self>> {
        tx.prepare_cached(include_str!("./query_tokens.sql"))?
            .query(named_params! {
                ":topic": FixedBytes::from(transfer_topic),
                ":address": address.to_checksum(None),
            })?
            .map(|row| {
                let from: Option<String> = row.get(3)?;
                let to: Option<String> = row.get(4)?;
                Ok(Self {
                    block_number: row.get(0)?,
                    execution_date: row.get(1)?,
                    transaction_hash: row.get(2)?,
                    from_address: from
                        .and_then(|from| from.parse::<Address>().ok())
                        .map(Into::into),
                    to_address: to.and_then(|to| to.parse::<Address>().ok()).map(Into::into),
                    value: row.get(5)?,
                    token_id: row.get(6)?,
                    token_address: row.get(7)?,
                })
            })
            .collect()
            .map_err(Into::into)
    }

    /// Ether and token transfers merged, newest block first.
    pub fn query_for_address(
        tx: &Transaction,
        transfer_topic: B256,
        address: Address,
    ) -> Result<Vec<Self>> {
        let mut transfers = Self::query_ether_for_address(tx, address)?;
        transfers.extend(Self::query_tokens_for_address(tx, transfer_topic, address)?);
        transfers.sort_by(|a, b| b.block_number.cmp(&a.block_number));
        Ok(transfers)
    }
}
