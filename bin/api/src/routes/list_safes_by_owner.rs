use crate::primitives::{AppError, AppJson, AppState};

use alloy::primitives::Address;
use axum::extract::{Path, State};
use safescan_db::SafeStatusModel;
use serde::Serialize;

#[derive(Serialize)]
pub struct Response {
    safes: Vec<Address>,
}

pub async fn handler(
    Path(owner): Path<Address>,
    State(app_state): State<AppState>,
) -> Result<AppJson<Response>, AppError> {
    let safes = {
        let mut db_conn = app_state.db().get()?;
        let tx = db_conn.transaction()?;
        let safes = SafeStatusModel::query_addresses_for_owner(&tx, owner)?;
        tx.rollback()?;
        safes
    };

    Ok(AppJson(Response { safes }))
}
