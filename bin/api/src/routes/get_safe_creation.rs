use crate::primitives::{AppError, AppJson, AppState};

use alloy::primitives::{Address, B256};
use axum::extract::{Path, State};
use safescan_db::SafeCreationQuery;
use serde::Serialize;

#[derive(Serialize)]
pub struct Response {
    created_block_number: u64,
    created: u64,
    transaction_hash: B256,
    creator: Option<Address>,
    factory_address: Option<Address>,
}

pub async fn handler(
    Path(address): Path<Address>,
    State(app_state): State<AppState>,
) -> Result<AppJson<Response>, AppError> {
    let creation = {
        let mut db_conn = app_state.db().get()?;
        let tx = db_conn.transaction()?;
        let creation = SafeCreationQuery::query_by_address(&tx, address)?;
        tx.rollback()?;
        creation
    }
    .ok_or(AppError::NotFound)?;

    Ok(AppJson(Response {
        created_block_number: creation.created_block_number.into(),
        created: creation.created_timestamp.into(),
        transaction_hash: creation.transaction_hash.into(),
        creator: creation.creator.map(Into::into),
        factory_address: creation.factory_address.map(Into::into),
    }))
}
