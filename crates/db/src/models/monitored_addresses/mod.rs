use crate::primitives::{FixedBytes, U64};

use alloy::primitives::{Address, BlockNumber};

use eyre::Result;
use fallible_iterator::FallibleIterator;
use rusqlite::{named_params, Transaction};

/// Contract classes tracked with a `tx_block_number` cursor. Safe contracts keep
/// their own table (and ERC-20 cursor) since they are registered with a creation tx.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitoredAddressKind {
    MasterCopy = 0,
    ProxyFactory = 1,
}

impl MonitoredAddressKind {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(MonitoredAddressKind::MasterCopy),
            1 => Some(MonitoredAddressKind::ProxyFactory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MonitoredAddress {
    pub address: FixedBytes<20>,
    pub kind: MonitoredAddressKind,
    pub initial_block_number: U64,
    pub tx_block_number: Option<U64>,
}

impl MonitoredAddress {
    pub fn new(
        address: Address,
        kind: MonitoredAddressKind,
        initial_block_number: BlockNumber,
    ) -> Self {
        Self {
            address: address.into(),
            kind,
            initial_block_number: initial_block_number.into(),
            // Scanning starts at the deployment block
            tx_block_number: Some(initial_block_number.into()),
        }
    }

    pub fn insert(&self, tx: &Transaction) -> Result<()> {
        tx.prepare_cached(include_str!("./insert.sql"))?
            .execute(named_params! {
                ":address": self.address,
                ":kind": self.kind as i64,
                ":initial_block_number": self.initial_block_number,
                ":tx_block_number": self.tx_block_number,
            })
            .map(|_| ())
            .map_err(Into::into)
    }

    /// Advances the cursor for `addresses` to `to_block_number`. Rows whose cursor
    /// has fallen below `from_block_number - 1` (a reorg rewound them) are left
    /// alone so the next scan restarts from the rewound position instead of
    /// leapfrogging it. Returns the number of rows updated.
    pub fn update_cursor(
        tx: &Transaction,
        kind: MonitoredAddressKind,
        addresses: &[Address],
        from_block_number: BlockNumber,
        to_block_number: BlockNumber,
    ) -> Result<usize> {
        let mut statement = tx.prepare_cached(include_str!("./update_cursor.sql"))?;
        let mut updated = 0;
        for address in addresses {
            updated += statement.execute(named_params! {
                ":kind": kind as i64,
                ":address": FixedBytes::from(*address),
                ":from_block_number": U64(from_block_number),
                ":to_block_number": U64(to_block_number),
            })?;
        }
        Ok(updated)
    }

    pub fn query_not_updated(
        tx: &Transaction,
        kind: MonitoredAddressKind,
        current_block_number: BlockNumber,
        confirmations: u64,
    ) -> Result<Vec<Self>> {
        tx.prepare_cached(include_str!("./query_not_updated.sql"))?
            .query(named_params! {
                ":kind": kind as i64,
                ":current_block_number": U64(current_block_number),
                ":confirmations": U64(confirmations),
            })?
            .map(|row| MonitoredAddress::try_from(row))
            .collect()
            .map_err(Into::into)
    }

    pub fn query_almost_updated(
        tx: &Transaction,
        kind: MonitoredAddressKind,
        current_block_number: BlockNumber,
        updated_blocks_behind: u64,
        confirmations: u64,
    ) -> Result<Vec<Self>> {
        tx.prepare_cached(include_str!("./query_almost_updated.sql"))?
            .query(named_params! {
                ":kind": kind as i64,
                ":current_block_number": U64(current_block_number),
                ":updated_blocks_behind": U64(updated_blocks_behind),
                ":confirmations": U64(confirmations),
            })?
            .map(|row| MonitoredAddress::try_from(row))
            .collect()
            .map_err(Into::into)
    }

    /// Reorg rollback: cursors above `block_number` drop to it, others keep.
    pub fn rewind_cursors(tx: &Transaction, block_number: BlockNumber) -> Result<usize> {
        tx.prepare_cached(include_str!("./rewind_cursor.sql"))?
            .execute(named_params! { ":block_number": U64(block_number) })
            .map_err(Into::into)
    }
}

impl<'stmt> TryFrom<&rusqlite::Row<'stmt>> for MonitoredAddress {
    type Error = rusqlite::Error;

    fn try_from(row: &rusqlite::Row<'stmt>) -> rusqlite::Result<Self> {
        Ok(Self {
            address: row.get(0)?,
            kind: MonitoredAddressKind::from_i64(row.get(1)?).ok_or(
                rusqlite::Error::IntegralValueOutOfRange(1, row.get(1)?),
            )?,
            initial_block_number: row.get(2)?,
            tx_block_number: row.get(3)?,
        })
    }
}

#[cfg(test)]
mod tests {

    use super::{MonitoredAddress, MonitoredAddressKind};
    use crate::connect as connect_db;

    use alloy::primitives::Address;
    use eyre::Result;

    #[test]
    pub fn test_update_cursor_guards_against_reorged_rows() -> Result<()> {
        let pool = connect_db(&String::from(":memory:"))?;

        let mut conn = pool.get()?;
        let tx = conn.transaction()?;

        let a = Address::repeat_byte(0x01);
        let b = Address::repeat_byte(0x02);
        MonitoredAddress::new(a, MonitoredAddressKind::MasterCopy, 100).insert(&tx)?;
        MonitoredAddress::new(b, MonitoredAddressKind::MasterCopy, 100).insert(&tx)?;

        // Simulate b having been rewound to 50 by a reorg
        MonitoredAddress::update_cursor(&tx, MonitoredAddressKind::MasterCopy, &[b], 1, 50)?;

        // A scan of [101, 200] may only advance rows whose cursor is >= 100
        let updated = MonitoredAddress::update_cursor(
            &tx,
            MonitoredAddressKind::MasterCopy,
            &[a, b],
            101,
            200,
        )?;
        assert_eq!(updated, 1);

        let rows =
            MonitoredAddress::query_not_updated(&tx, MonitoredAddressKind::MasterCopy, 1_000, 0)?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].address, b.into());
        assert_eq!(rows[0].tx_block_number, Some(50.into()));
        assert_eq!(rows[1].tx_block_number, Some(200.into()));

        tx.rollback()?;

        Ok(())
    }

    #[test]
    pub fn test_almost_updated_window() -> Result<()> {
        let pool = connect_db(&String::from(":memory:"))?;

        let mut conn = pool.get()?;
        let tx = conn.transaction()?;

        let lagging = Address::repeat_byte(0x01);
        let recent = Address::repeat_byte(0x02);
        let synced = Address::repeat_byte(0x03);
        MonitoredAddress::new(lagging, MonitoredAddressKind::ProxyFactory, 100).insert(&tx)?;
        MonitoredAddress::new(recent, MonitoredAddressKind::ProxyFactory, 980).insert(&tx)?;
        MonitoredAddress::new(synced, MonitoredAddressKind::ProxyFactory, 995).insert(&tx)?;

        // head = 1000, confirmations = 3, window = 50 blocks behind
        let almost = MonitoredAddress::query_almost_updated(
            &tx,
            MonitoredAddressKind::ProxyFactory,
            1_000,
            50,
            3,
        )?;
        assert_eq!(almost.len(), 1);
        assert_eq!(almost[0].address, recent.into());

        let not_updated = MonitoredAddress::query_not_updated(
            &tx,
            MonitoredAddressKind::ProxyFactory,
            1_000,
            3,
        )?;
        assert_eq!(not_updated.len(), 2);

        tx.rollback()?;

        Ok(())
    }

    #[test]
    pub fn test_rewind_never_raises_cursor() -> Result<()> {
        let pool = connect_db(&String::from(":memory:"))?;

        let mut conn = pool.get()?;
        let tx = conn.transaction()?;

        let a = Address::repeat_byte(0x01);
        let b = Address::repeat_byte(0x02);
        MonitoredAddress::new(a, MonitoredAddressKind::MasterCopy, 200).insert(&tx)?;
        MonitoredAddress::new(b, MonitoredAddressKind::MasterCopy, 50).insert(&tx)?;

        MonitoredAddress::rewind_cursors(&tx, 107)?;

        let rows =
            MonitoredAddress::query_not_updated(&tx, MonitoredAddressKind::MasterCopy, 1_000, 0)?;
        let cursors = rows
            .iter()
            .map(|row| row.tx_block_number.unwrap().0)
            .collect::<Vec<_>>();
        assert_eq!(cursors, vec![50, 107]);

        tx.rollback()?;

        Ok(())
    }
}
