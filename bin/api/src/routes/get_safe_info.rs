use crate::primitives::{AppError, AppJson, AppState};

use alloy::primitives::Address;
use axum::extract::{Path, State};
use safescan_db::SafeStatusModel;
use serde::Serialize;

#[derive(Serialize)]
pub struct Response {
    address: Address,
    nonce: u64,
    threshold: u64,
    owners: Vec<Address>,
    master_copy: Address,
    fallback_handler: Address,
    modules: Vec<Address>,
}

pub async fn handler(
    Path(address): Path<Address>,
    State(app_state): State<AppState>,
) -> Result<AppJson<Response>, AppError> {
    let status = {
        let mut db_conn = app_state.db().get()?;
        let tx = db_conn.transaction()?;
        let status = SafeStatusModel::query_last_for_address(&tx, address)?;
        tx.rollback()?;
        status
    }
    .ok_or(AppError::NotFound)?;

    Ok(AppJson(Response {
        address,
        nonce: status.nonce.into(),
        threshold: status.threshold.into(),
        owners: status.owners(),
        master_copy: status.master_copy.clone().into(),
        fallback_handler: status.fallback_handler.clone().into(),
        modules: status.enabled_modules(),
    }))
}
