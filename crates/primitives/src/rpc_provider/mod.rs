pub use provider_error::ProviderError;
pub use rpc_provider::{new_http_provider, EthereumRpcProvider, HttpRpcProvider};

mod provider_error;
mod rpc_provider;
