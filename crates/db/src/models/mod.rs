pub use blocks::Block;
pub use ethereum_events::EthereumEvent;
pub use ethereum_txs::EthereumTx;
pub use internal_txs::{
    has_errored_ancestor, parse_trace_address, trace_address_key, trace_address_str, CallType,
    InternalTx, NewInternalTx, TxType,
};
pub use internal_txs_decoded::{NewInternalTxDecoded, PendingDecodedTx};
pub use module_transactions::ModuleTransaction;
pub use monitored_addresses::{MonitoredAddress, MonitoredAddressKind};
pub use multisig_confirmations::MultisigConfirmation;
pub use multisig_transactions::MultisigTransaction;
pub use safe_contract_delegates::SafeContractDelegate;
pub use safe_contracts::SafeContract;
pub use safe_statuses::SafeStatus;

pub mod blocks;
pub mod ethereum_events;
pub mod ethereum_txs;
pub mod internal_txs;
pub mod internal_txs_decoded;
pub mod module_transactions;
pub mod monitored_addresses;
pub mod multisig_confirmations;
pub mod multisig_transactions;
pub mod safe_contract_delegates;
pub mod safe_contracts;
pub mod safe_statuses;
