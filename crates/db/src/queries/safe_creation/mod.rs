use crate::primitives::{FixedBytes, U64};

use alloy::primitives::Address;

use eyre::Result;
use rusqlite::{named_params, OptionalExtension, Transaction};

/// Where and by whom a Safe proxy was deployed, from its CREATE frame.
#[derive(Debug, Clone)]
pub struct SafeCreation {
    pub created_block_number: U64,
    pub created_timestamp: U64,
    pub transaction_hash: FixedBytes<32>,
    pub creator: Option<FixedBytes<20>>,
    pub factory_address: Option<FixedBytes<20>>,
}

impl SafeCreation {
    pub fn query_by_address(tx: &Transaction, address: Address) -> Result<Option<Self>> {
        tx.prepare_cached(include_str!("./query_by_address.sql"))?
            .query_row(
                named_params! { ":address": FixedBytes::from(address) },
                |row| {
                    Ok(Self {
                        created_block_number: row.get(0)?,
                        created_timestamp: row.get(1)?,
                        transaction_hash: row.get(2)?,
                        creator: row.get(3)?,
                        factory_address: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {

    use super::SafeCreation;
    use crate::{
        connect as connect_db,
        models::{
            blocks::test_util::test_block,
            ethereum_txs::test_util::test_tx,
            internal_txs::{test_util::test_internal_tx, TxType},
        },
        primitives::FixedBytes,
    };

    use alloy::primitives::{Address, B256};
    use eyre::Result;

    #[test]
    pub fn test_query_creation() -> Result<()> {
        let pool = connect_db(&String::from(":memory:"))?;

        let mut conn = pool.get()?;
        let tx = conn.transaction()?;

        test_block(100).insert(&tx)?;
        let hash = B256::repeat_byte(0x0D);
        test_tx(hash, 100, 0).insert(&tx)?;

        let factory = Address::repeat_byte(0x33);
        let safe = Address::repeat_byte(0x11);
        let mut create = test_internal_tx(hash, "0", factory, safe, None, None);
        create.tx_type = TxType::Create;
        create.to_address = None;
        create.contract_address = Some(FixedBytes::from(safe));
        create.insert(&tx)?;

        let creation = SafeCreation::query_by_address(&tx, safe)?.unwrap();
        assert_eq!(creation.created_block_number, 100.into());
        assert_eq!(creation.factory_address, Some(factory.into()));
        assert!(SafeCreation::query_by_address(&tx, Address::repeat_byte(0x12))?.is_none());

        tx.rollback()?;

        Ok(())
    }
}
