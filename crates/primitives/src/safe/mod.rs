pub use abi::{
    GnosisSafe, GnosisSafeProxyFactory, Transfer, ERC20_721_TRANSFER_TOPIC,
    EXECUTION_FAILURE_TOPIC, EXECUTION_SUCCESS_TOPIC, PROXY_CREATION_TOPIC,
};
pub use delegate::{calculate_totp, delegate_hash, recover_delegate_signer, TOTP_PERIOD_SECS};
pub use safe_tx_hash::{calculate_safe_tx_hash, SafeTx};
pub use signatures::{parse_signatures, recover_address, SafeSignature, SafeSignatureType};
pub use tx_decoder::{decode_transaction, CannotDecode};

mod abi;
mod delegate;
mod safe_tx_hash;
mod signatures;
mod tx_decoder;
