use super::abi::GnosisSafe;

use alloy::{
    hex,
    primitives::{Address, Bytes, U256},
    sol_types::SolCall,
};

use serde_json::{json, Value};

#[derive(Debug, thiserror::Error)]
pub enum CannotDecode {
    #[error("calldata shorter than a selector")]
    TooShort,
    #[error("unknown selector {0}")]
    UnknownSelector(String),
    #[error("malformed abi tail: {0}")]
    MalformedData(String),
}

fn address_value(address: &Address) -> Value {
    Value::String(address.to_checksum(None))
}

// Decimal strings so JSON consumers never round 256 bit values
fn uint_value(value: &U256) -> Value {
    Value::String(value.to_string())
}

fn bytes_value(bytes: &Bytes) -> Value {
    Value::String(hex::encode_prefixed(bytes))
}

/// Maps Safe master-copy calldata to `(function_name, named arguments)`. Pure:
/// no I/O, same input always yields the same output.
pub fn decode_transaction(data: &[u8]) -> Result<(String, Value), CannotDecode> {
    if data.len() < 4 {
        return Err(CannotDecode::TooShort);
    }
    let selector: [u8; 4] = data[..4].try_into().map_err(|_| CannotDecode::TooShort)?;

    let malformed = |error: alloy::sol_types::Error| CannotDecode::MalformedData(error.to_string());

    let (function_name, arguments) = match selector {
        s if s == GnosisSafe::setupCall::SELECTOR => {
            let call = GnosisSafe::setupCall::abi_decode(data).map_err(malformed)?;
            (
                "setup",
                json!({
                    "_owners": call._owners.iter().map(address_value).collect::<Vec<_>>(),
                    "_threshold": uint_value(&call._threshold),
                    "to": address_value(&call.to),
                    "data": bytes_value(&call.data),
                    "fallbackHandler": address_value(&call.fallbackHandler),
                    "paymentToken": address_value(&call.paymentToken),
                    "payment": uint_value(&call.payment),
                    "paymentReceiver": address_value(&call.paymentReceiver),
                }),
            )
        }
        s if s == GnosisSafe::addOwnerWithThresholdCall::SELECTOR => {
            let call = GnosisSafe::addOwnerWithThresholdCall::abi_decode(data).map_err(malformed)?;
            (
                "addOwnerWithThreshold",
                json!({
                    "owner": address_value(&call.owner),
                    "_threshold": uint_value(&call._threshold),
                }),
            )
        }
        s if s == GnosisSafe::removeOwnerCall::SELECTOR => {
            let call = GnosisSafe::removeOwnerCall::abi_decode(data).map_err(malformed)?;
            (
                "removeOwner",
                json!({
                    "prevOwner": address_value(&call.prevOwner),
                    "owner": address_value(&call.owner),
                    "_threshold": uint_value(&call._threshold),
                }),
            )
        }
        s if s == GnosisSafe::swapOwnerCall::SELECTOR => {
            let call = GnosisSafe::swapOwnerCall::abi_decode(data).map_err(malformed)?;
            (
                "swapOwner",
                json!({
                    "prevOwner": address_value(&call.prevOwner),
                    "oldOwner": address_value(&call.oldOwner),
                    "newOwner": address_value(&call.newOwner),
                }),
            )
        }
        s if s == GnosisSafe::changeThresholdCall::SELECTOR => {
            let call = GnosisSafe::changeThresholdCall::abi_decode(data).map_err(malformed)?;
            (
                "changeThreshold",
                json!({ "_threshold": uint_value(&call._threshold) }),
            )
        }
        s if s == GnosisSafe::changeMasterCopyCall::SELECTOR => {
            let call = GnosisSafe::changeMasterCopyCall::abi_decode(data).map_err(malformed)?;
            (
                "changeMasterCopy",
                json!({ "_masterCopy": address_value(&call._masterCopy) }),
            )
        }
        s if s == GnosisSafe::setFallbackHandlerCall::SELECTOR => {
            let call = GnosisSafe::setFallbackHandlerCall::abi_decode(data).map_err(malformed)?;
            (
                "setFallbackHandler",
                json!({ "handler": address_value(&call.handler) }),
            )
        }
        s if s == GnosisSafe::enableModuleCall::SELECTOR => {
            let call = GnosisSafe::enableModuleCall::abi_decode(data).map_err(malformed)?;
            ("enableModule", json!({ "module": address_value(&call.module) }))
        }
        s if s == GnosisSafe::disableModuleCall::SELECTOR => {
            let call = GnosisSafe::disableModuleCall::abi_decode(data).map_err(malformed)?;
            (
                "disableModule",
                json!({
                    "prevModule": address_value(&call.prevModule),
                    "module": address_value(&call.module),
                }),
            )
        }
        s if s == GnosisSafe::execTransactionCall::SELECTOR => {
            let call = GnosisSafe::execTransactionCall::abi_decode(data).map_err(malformed)?;
            (
                "execTransaction",
                json!({
                    "to": address_value(&call.to),
                    "value": uint_value(&call.value),
                    "data": bytes_value(&call.data),
                    "operation": call.operation,
                    "safeTxGas": uint_value(&call.safeTxGas),
                    "baseGas": uint_value(&call.baseGas),
                    "gasPrice": uint_value(&call.gasPrice),
                    "gasToken": address_value(&call.gasToken),
                    "refundReceiver": address_value(&call.refundReceiver),
                    "signatures": bytes_value(&call.signatures),
                }),
            )
        }
        s if s == GnosisSafe::execTransactionFromModuleCall::SELECTOR => {
            let call =
                GnosisSafe::execTransactionFromModuleCall::abi_decode(data).map_err(malformed)?;
            (
                "execTransactionFromModule",
                json!({
                    "to": address_value(&call.to),
                    "value": uint_value(&call.value),
                    "data": bytes_value(&call.data),
                    "operation": call.operation,
                }),
            )
        }
        s if s == GnosisSafe::approveHashCall::SELECTOR => {
            let call = GnosisSafe::approveHashCall::abi_decode(data).map_err(malformed)?;
            (
                "approveHash",
                json!({ "hashToApprove": format!("{}", call.hashToApprove) }),
            )
        }
        _ => {
            return Err(CannotDecode::UnknownSelector(hex::encode_prefixed(
                selector,
            )))
        }
    };

    Ok((function_name.to_string(), arguments))
}
