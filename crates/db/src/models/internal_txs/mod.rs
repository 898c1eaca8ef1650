use crate::primitives::{FixedBytes, U256Text};

use alloy::{
    primitives::{Address, TxHash, U256},
    rpc::types::trace::parity::{
        Action, CallType as ParityCallType, LocalizedTransactionTrace, TraceOutput,
    },
};

use eyre::Result;
use fallible_iterator::FallibleIterator;
use rusqlite::{named_params, OptionalExtension, Transaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxType {
    Call = 0,
    Create = 1,
    SelfDestruct = 2,
}

impl TxType {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(TxType::Call),
            1 => Some(TxType::Create),
            2 => Some(TxType::SelfDestruct),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallType {
    Call = 0,
    DelegateCall = 1,
}

impl CallType {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(CallType::Call),
            1 => Some(CallType::DelegateCall),
            _ => None,
        }
    }

    fn parse(call_type: &ParityCallType) -> Option<Self> {
        match call_type {
            ParityCallType::Call => Some(CallType::Call),
            ParityCallType::DelegateCall => Some(CallType::DelegateCall),
            _ => None,
        }
    }
}

/// Comma-joined trace address, "" for the root frame.
pub fn trace_address_str(trace_address: &[usize]) -> String {
    trace_address
        .iter()
        .map(|component| component.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

pub fn parse_trace_address(trace_address: &str) -> Vec<u32> {
    if trace_address.is_empty() {
        return Vec::new();
    }
    trace_address
        .split(',')
        .filter_map(|component| component.parse().ok())
        .collect()
}

/// Big-endian u32 concatenation. Raw byte comparison of two keys is equivalent to
/// lexicographic comparison of the component sequences, which is the ordering the
/// processor sorts by. A string comparison would put "10" before "2".
pub fn trace_address_key(components: &[u32]) -> Vec<u8> {
    let mut key = Vec::with_capacity(components.len() * 4);
    for component in components {
        key.extend_from_slice(&component.to_be_bytes());
    }
    key
}

/// A frame is poisoned when any strict ancestor in the same transaction errored.
pub fn has_errored_ancestor(frames: &[NewInternalTx], trace_address: &str) -> bool {
    let child = parse_trace_address(trace_address);
    frames.iter().any(|frame| {
        if frame.error.is_none() {
            return false;
        }
        let ancestor = parse_trace_address(&frame.trace_address);
        ancestor.len() < child.len() && child[..ancestor.len()] == ancestor[..]
    })
}

#[derive(Debug, Clone)]
pub struct NewInternalTx {
    pub ethereum_tx_hash: FixedBytes<32>,
    pub trace_address: String,
    pub from_address: Option<FixedBytes<20>>,
    pub to_address: Option<FixedBytes<20>>,
    pub value: U256Text,
    pub gas: U256Text,
    pub data: Option<Vec<u8>>,
    pub gas_used: U256Text,
    pub contract_address: Option<FixedBytes<20>>,
    pub code: Option<Vec<u8>>,
    pub output: Option<Vec<u8>>,
    pub refund_address: Option<FixedBytes<20>>,
    pub tx_type: TxType,
    pub call_type: Option<CallType>,
    pub error: Option<String>,
}

impl NewInternalTx {
    /// Maps one parity trace frame. Reward frames are not internal transactions.
    pub fn from_trace(tx_hash: TxHash, trace: &LocalizedTransactionTrace) -> Option<Self> {
        let frame = &trace.trace;
        let (tx_type, call_type, from, to, value, gas, data, refund_address) = match &frame.action {
            Action::Call(call) => (
                TxType::Call,
                CallType::parse(&call.call_type),
                Some(call.from),
                Some(call.to),
                call.value,
                U256::from(call.gas),
                Some(call.input.to_vec()),
                None,
            ),
            Action::Create(create) => (
                TxType::Create,
                None,
                Some(create.from),
                None,
                create.value,
                U256::from(create.gas),
                Some(create.init.to_vec()),
                None,
            ),
            Action::Selfdestruct(selfdestruct) => (
                TxType::SelfDestruct,
                None,
                None,
                Some(selfdestruct.address),
                selfdestruct.balance,
                U256::ZERO,
                None,
                Some(selfdestruct.refund_address),
            ),
            // Reward frames are block-level, not internal transactions
            _ => return None,
        };

        let (gas_used, contract_address, code, output) = match &frame.result {
            Some(TraceOutput::Call(call)) => (
                U256::from(call.gas_used),
                None,
                None,
                Some(call.output.to_vec()),
            ),
            Some(TraceOutput::Create(create)) => (
                U256::from(create.gas_used),
                Some(create.address),
                Some(create.code.to_vec()),
                None,
            ),
            _ => (U256::ZERO, None, None, None),
        };

        Some(Self {
            ethereum_tx_hash: tx_hash.into(),
            trace_address: trace_address_str(&frame.trace_address),
            from_address: from.map(Into::into),
            to_address: to.map(Into::into),
            value: value.into(),
            gas: gas.into(),
            data,
            gas_used: gas_used.into(),
            contract_address: contract_address.map(Into::into),
            code,
            output,
            refund_address: refund_address.map(Into::into),
            tx_type,
            call_type,
            error: frame.error.clone(),
        })
    }

    pub fn is_delegate_call(&self) -> bool {
        self.call_type == Some(CallType::DelegateCall)
    }

    pub fn insert(&self, tx: &Transaction) -> Result<()> {
        let key = trace_address_key(&parse_trace_address(&self.trace_address));
        tx.prepare_cached(include_str!("./insert.sql"))?
            .execute(named_params! {
                ":ethereum_tx_hash": self.ethereum_tx_hash,
                ":trace_address": self.trace_address,
                ":trace_address_key": key,
                ":from_address": self.from_address,
                ":to_address": self.to_address,
                ":value": self.value,
                ":gas": self.gas,
                ":data": self.data,
                ":gas_used": self.gas_used,
                ":contract_address": self.contract_address,
                ":code": self.code,
                ":output": self.output,
                ":refund_address": self.refund_address,
                ":tx_type": self.tx_type as i64,
                ":call_type": self.call_type.map(|call_type| call_type as i64),
                ":error": self.error,
            })
            .map(|_| ())
            .map_err(Into::into)
    }
}

#[derive(Debug, Clone)]
pub struct InternalTx {
    pub id: i64,
    pub ethereum_tx_hash: FixedBytes<32>,
    pub trace_address: String,
    pub from_address: Option<FixedBytes<20>>,
    pub to_address: Option<FixedBytes<20>>,
    pub value: U256Text,
    pub gas: U256Text,
    pub data: Option<Vec<u8>>,
    pub gas_used: U256Text,
    pub contract_address: Option<FixedBytes<20>>,
    pub code: Option<Vec<u8>>,
    pub output: Option<Vec<u8>>,
    pub refund_address: Option<FixedBytes<20>>,
    pub tx_type: Option<TxType>,
    pub call_type: Option<CallType>,
    pub error: Option<String>,
}

impl InternalTx {
    pub fn is_delegate_call(&self) -> bool {
        self.call_type == Some(CallType::DelegateCall)
    }

    pub fn query_id_by_unique(
        tx: &Transaction,
        ethereum_tx_hash: TxHash,
        trace_address: &str,
    ) -> Result<Option<i64>> {
        tx.prepare_cached(include_str!("./query_id_by_unique.sql"))?
            .query_row(
                named_params! {
                    ":ethereum_tx_hash": FixedBytes::from(ethereum_tx_hash),
                    ":trace_address": trace_address,
                },
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    /// All frames of a transaction in call-tree order.
    pub fn query_by_ethereum_tx(tx: &Transaction, ethereum_tx_hash: TxHash) -> Result<Vec<Self>> {
        tx.prepare_cached(include_str!("./query_by_ethereum_tx.sql"))?
            .query(named_params! { ":ethereum_tx_hash": FixedBytes::from(ethereum_tx_hash) })?
            .map(|row| InternalTx::try_from(row))
            .collect()
            .map_err(Into::into)
    }

    /// The CREATE frame that deployed `contract_address`, if indexed.
    pub fn query_creation_by_contract_address(
        tx: &Transaction,
        contract_address: Address,
    ) -> Result<Option<Self>> {
        tx.prepare_cached(include_str!("./query_creation_by_contract_address.sql"))?
            .query_row(
                named_params! { ":contract_address": FixedBytes::from(contract_address) },
                |row| InternalTx::try_from(row),
            )
            .optional()
            .map_err(Into::into)
    }
}

impl<'stmt> TryFrom<&rusqlite::Row<'stmt>> for InternalTx {
    type Error = rusqlite::Error;

    fn try_from(row: &rusqlite::Row<'stmt>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            ethereum_tx_hash: row.get(1)?,
            trace_address: row.get(2)?,
            from_address: row.get(3)?,
            to_address: row.get(4)?,
            value: row.get(5)?,
            gas: row.get(6)?,
            data: row.get(7)?,
            gas_used: row.get(8)?,
            contract_address: row.get(9)?,
            code: row.get(10)?,
            output: row.get(11)?,
            refund_address: row.get(12)?,
            tx_type: TxType::from_i64(row.get(13)?),
            call_type: row
                .get::<_, Option<i64>>(14)?
                .and_then(CallType::from_i64),
            error: row.get(15)?,
        })
    }
}

#[cfg(test)]
pub mod test_util {
    use super::{CallType, NewInternalTx, TxType};
    use crate::primitives::FixedBytes;
    use alloy::primitives::{Address, B256, U256};

    pub fn test_internal_tx(
        ethereum_tx_hash: B256,
        trace_address: &str,
        from: Address,
        to: Address,
        data: Option<Vec<u8>>,
        call_type: Option<CallType>,
    ) -> NewInternalTx {
        NewInternalTx {
            ethereum_tx_hash: ethereum_tx_hash.into(),
            trace_address: trace_address.to_string(),
            from_address: Some(FixedBytes::from(from)),
            to_address: Some(FixedBytes::from(to)),
            value: U256::ZERO.into(),
            gas: U256::from(100_000u64).into(),
            data,
            gas_used: U256::from(50_000u64).into(),
            contract_address: None,
            code: None,
            output: None,
            refund_address: None,
            tx_type: TxType::Call,
            call_type,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {

    use super::{
        has_errored_ancestor, parse_trace_address, test_util::test_internal_tx, trace_address_key,
        InternalTx,
    };
    use crate::{
        connect as connect_db,
        models::{blocks::test_util::test_block, ethereum_txs::test_util::test_tx},
    };

    use alloy::primitives::{Address, B256};
    use eyre::Result;

    #[test]
    pub fn test_trace_address_key_orders_sequences() {
        // [2] < [10] under sequence ordering even though "10" < "2" as strings
        assert!(trace_address_key(&[2]) < trace_address_key(&[10]));
        // A prefix sorts before its extensions
        assert!(trace_address_key(&[0]) < trace_address_key(&[0, 0]));
        assert!(trace_address_key(&[0, 5]) < trace_address_key(&[1]));
        assert!(trace_address_key(&[]) < trace_address_key(&[0]));
    }

    #[test]
    pub fn test_parse_trace_address() {
        assert_eq!(parse_trace_address(""), Vec::<u32>::new());
        assert_eq!(parse_trace_address("0"), vec![0]);
        assert_eq!(parse_trace_address("1,0,12"), vec![1, 0, 12]);
    }

    #[test]
    pub fn test_has_errored_ancestor() {
        let hash = B256::repeat_byte(1);
        let a = Address::repeat_byte(0xAA);
        let mut root = test_internal_tx(hash, "", a, a, None, None);
        let child = test_internal_tx(hash, "0", a, a, None, None);
        let grandchild = test_internal_tx(hash, "0,1", a, a, None, None);

        let frames = vec![root.clone(), child.clone(), grandchild.clone()];
        assert!(!has_errored_ancestor(&frames, "0,1"));

        root.error = Some("Reverted".to_string());
        let frames = vec![root.clone(), child, grandchild];
        assert!(has_errored_ancestor(&frames, "0,1"));
        assert!(has_errored_ancestor(&frames, "0"));
        // A frame is not its own ancestor
        assert!(!has_errored_ancestor(&frames, ""));

        // Prefix is on components, not characters: "1" is not an ancestor of "12"
        let mut errored = test_internal_tx(hash, "1", a, a, None, None);
        errored.error = Some("Out of gas".to_string());
        assert!(!has_errored_ancestor(&[errored], "12"));
    }

    #[test]
    pub fn test_insert_dedupes_on_unique() -> Result<()> {
        let pool = connect_db(&String::from(":memory:"))?;

        let mut conn = pool.get()?;
        let tx = conn.transaction()?;

        test_block(100).insert(&tx)?;
        let hash = B256::repeat_byte(2);
        test_tx(hash, 100, 0).insert(&tx)?;

        let a = Address::repeat_byte(0xAA);
        let frame = test_internal_tx(hash, "0", a, a, None, None);
        frame.insert(&tx)?;
        frame.insert(&tx)?;

        let frames = InternalTx::query_by_ethereum_tx(&tx, hash)?;
        assert_eq!(frames.len(), 1);

        tx.rollback()?;

        Ok(())
    }

    #[test]
    pub fn test_query_by_ethereum_tx_is_in_call_tree_order() -> Result<()> {
        let pool = connect_db(&String::from(":memory:"))?;

        let mut conn = pool.get()?;
        let tx = conn.transaction()?;

        test_block(100).insert(&tx)?;
        let hash = B256::repeat_byte(2);
        test_tx(hash, 100, 0).insert(&tx)?;

        let a = Address::repeat_byte(0xAA);
        for trace_address in ["10", "2", "", "2,0"] {
            test_internal_tx(hash, trace_address, a, a, None, None).insert(&tx)?;
        }

        let frames = InternalTx::query_by_ethereum_tx(&tx, hash)?;
        assert_eq!(
            frames
                .iter()
                .map(|frame| frame.trace_address.as_str())
                .collect::<Vec<_>>(),
            vec!["", "2", "2,0", "10"]
        );

        tx.rollback()?;

        Ok(())
    }
}
