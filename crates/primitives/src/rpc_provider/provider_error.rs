use alloy::transports::TransportError;

/// Split of RPC failures into the two classes the indexers care about: transient
/// transport problems that a retry can fix, and error responses from the node
/// that usually cannot (unsupported method, bad params).
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),
    #[error("rpc error code={code}: {message}")]
    Rpc { code: i64, message: String },
}

impl ProviderError {
    pub fn is_retriable(&self) -> bool {
        matches!(self, ProviderError::Network(_))
    }
}

impl From<TransportError> for ProviderError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::ErrorResp(payload) => ProviderError::Rpc {
                code: payload.code,
                message: payload.message.to_string(),
            },
            other => ProviderError::Network(other.to_string()),
        }
    }
}
