pub use rpc_provider::{new_http_provider, EthereumRpcProvider, HttpRpcProvider, ProviderError};
pub use safe::{
    calculate_safe_tx_hash, calculate_totp, decode_transaction, delegate_hash, parse_signatures,
    recover_address, recover_delegate_signer, CannotDecode, GnosisSafe, GnosisSafeProxyFactory,
    SafeSignature, SafeSignatureType, SafeTx, Transfer, ERC20_721_TRANSFER_TOPIC,
    EXECUTION_FAILURE_TOPIC, EXECUTION_SUCCESS_TOPIC, PROXY_CREATION_TOPIC, TOTP_PERIOD_SECS,
};

mod rpc_provider;
mod safe;
