pub use client::connect;
pub use models::{
    has_errored_ancestor, parse_trace_address, trace_address_key, trace_address_str,
    Block as BlockModel, CallType, EthereumEvent as EthereumEventModel,
    EthereumTx as EthereumTxModel, InternalTx as InternalTxModel,
    ModuleTransaction as ModuleTransactionModel, MonitoredAddress as MonitoredAddressModel,
    MonitoredAddressKind, MultisigConfirmation as MultisigConfirmationModel,
    MultisigTransaction as MultisigTransactionModel, NewInternalTx as NewInternalTxModel,
    NewInternalTxDecoded as NewInternalTxDecodedModel, PendingDecodedTx as PendingDecodedTxModel,
    SafeContract as SafeContractModel, SafeContractDelegate as SafeContractDelegateModel,
    SafeStatus as SafeStatusModel, TxType,
};
pub use queries::{SafeCreation as SafeCreationQuery, Transfer as TransferQuery};

mod client;
mod models;
pub mod primitives;
mod queries;
