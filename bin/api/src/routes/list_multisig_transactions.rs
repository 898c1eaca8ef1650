use crate::primitives::{AppError, AppJson, AppState};

use alloy::primitives::{Address, B256};
use axum::extract::{Path, State};
use safescan_db::{MultisigConfirmationModel, MultisigTransactionModel, SafeStatusModel};
use serde::Serialize;

#[derive(Serialize)]
pub struct ConfirmationItem {
    owner: Address,
    signature: Option<String>,
    signature_type: i64,
}

impl From<MultisigConfirmationModel> for ConfirmationItem {
    fn from(confirmation: MultisigConfirmationModel) -> Self {
        Self {
            owner: confirmation.owner.into(),
            signature: confirmation
                .signature
                .map(|signature| alloy::hex::encode_prefixed(signature)),
            signature_type: confirmation.signature_type,
        }
    }
}

#[derive(Serialize)]
pub struct MultisigTransactionItem {
    safe_tx_hash: B256,
    safe: Address,
    to: Option<Address>,
    value: String,
    data: Option<String>,
    operation: i64,
    safe_tx_gas: String,
    base_gas: String,
    gas_price: String,
    gas_token: Option<Address>,
    refund_receiver: Option<Address>,
    nonce: u64,
    is_executed: bool,
    is_successful: Option<bool>,
    transaction_hash: Option<B256>,
    confirmations: Vec<ConfirmationItem>,
    confirmations_required: Option<u64>,
}

#[derive(Serialize)]
pub struct Response {
    pub count: usize,
    pub results: Vec<MultisigTransactionItem>,
}

pub async fn handler(
    Path(address): Path<Address>,
    State(app_state): State<AppState>,
) -> Result<AppJson<Response>, AppError> {
    let results = {
        let mut db_conn = app_state.db().get()?;
        let tx = db_conn.transaction()?;

        let multisig_txs = MultisigTransactionModel::query_by_safe(&tx, address)?;
        let mut results = Vec::with_capacity(multisig_txs.len());
        for multisig_tx in multisig_txs {
            let safe_tx_hash: B256 = multisig_tx.safe_tx_hash.clone().into();
            let confirmations =
                MultisigConfirmationModel::query_by_transaction_hash(&tx, safe_tx_hash)?
                    .into_iter()
                    .map(ConfirmationItem::from)
                    .collect();

            // Threshold the Safe had when the tx executed; current threshold for
            // proposals still in flight
            let confirmations_required = match multisig_tx.ethereum_tx_hash.clone() {
                Some(ethereum_tx_hash) => SafeStatusModel::query_threshold_for_ethereum_tx(
                    &tx,
                    ethereum_tx_hash.into(),
                    address,
                )?,
                None => SafeStatusModel::query_last_for_address(&tx, address)?
                    .map(|status| status.threshold.into()),
            };

            results.push(MultisigTransactionItem {
                safe_tx_hash,
                safe: multisig_tx.safe.clone().into(),
                to: multisig_tx.to_address.clone().map(Into::into),
                value: multisig_tx.value.0.to_string(),
                data: multisig_tx
                    .data
                    .as_ref()
                    .map(|data| alloy::hex::encode_prefixed(data)),
                operation: multisig_tx.operation,
                safe_tx_gas: multisig_tx.safe_tx_gas.0.to_string(),
                base_gas: multisig_tx.base_gas.0.to_string(),
                gas_price: multisig_tx.gas_price.0.to_string(),
                gas_token: multisig_tx.gas_token.clone().map(Into::into),
                refund_receiver: multisig_tx.refund_receiver.clone().map(Into::into),
                nonce: multisig_tx.nonce.into(),
                is_executed: multisig_tx.executed(),
                is_successful: multisig_tx.failed.map(|failed| !failed),
                transaction_hash: multisig_tx.ethereum_tx_hash.clone().map(Into::into),
                confirmations,
                confirmations_required,
            });
        }

        tx.rollback()?;
        results
    };

    Ok(AppJson(Response {
        count: results.len(),
        results,
    }))
}
