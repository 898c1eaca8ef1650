use crate::primitives::{AppError, AppJson, AppState};

use alloy::primitives::{Address, B256};
use axum::extract::{Path, State};
use safescan_db::TransferQuery;
use safescan_primitives::ERC20_721_TRANSFER_TOPIC;
use serde::Serialize;

#[derive(Serialize)]
pub struct TransferItem {
    #[serde(rename = "type")]
    transfer_type: &'static str,
    block_number: u64,
    execution_date: u64,
    transaction_hash: B256,
    from: Option<Address>,
    to: Option<Address>,
    value: Option<String>,
    token_id: Option<String>,
    token_address: Option<Address>,
}

impl From<TransferQuery> for TransferItem {
    fn from(transfer: TransferQuery) -> Self {
        let transfer_type = if transfer.token_address.is_none() {
            "ETHER_TRANSFER"
        } else if transfer.token_id.is_some() {
            "ERC721_TRANSFER"
        } else {
            "ERC20_TRANSFER"
        };
        Self {
            transfer_type,
            block_number: transfer.block_number.into(),
            execution_date: transfer.execution_date.into(),
            transaction_hash: transfer.transaction_hash.into(),
            from: transfer.from_address.map(Into::into),
            to: transfer.to_address.map(Into::into),
            value: transfer.value.map(|value| value.0.to_string()),
            token_id: transfer.token_id.map(|token_id| token_id.0.to_string()),
            token_address: transfer.token_address.map(Into::into),
        }
    }
}

#[derive(Serialize)]
pub struct Response {
    pub count: usize,
    pub results: Vec<TransferItem>,
}

pub async fn handler(
    Path(address): Path<Address>,
    State(app_state): State<AppState>,
) -> Result<AppJson<Response>, AppError> {
    let results = {
        let mut db_conn = app_state.db().get()?;
        let tx = db_conn.transaction()?;
        let results = TransferQuery::query_for_address(&tx, ERC20_721_TRANSFER_TOPIC, address)?
            .into_iter()
            .map(TransferItem::from)
            .collect::<Vec<_>>();
        tx.rollback()?;
        results
    };

    Ok(AppJson(Response {
        count: results.len(),
        results,
    }))
}
