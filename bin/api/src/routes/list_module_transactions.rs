use crate::primitives::{AppError, AppJson, AppState};

use alloy::primitives::{Address, B256};
use axum::extract::{Path, State};
use safescan_db::ModuleTransactionModel;
use serde::Serialize;

#[derive(Serialize)]
pub struct ModuleTransactionItem {
    safe: Address,
    module: Address,
    to: Address,
    value: String,
    data: Option<String>,
    operation: i64,
    transaction_hash: Option<B256>,
}

impl From<ModuleTransactionModel> for ModuleTransactionItem {
    fn from(module_tx: ModuleTransactionModel) -> Self {
        Self {
            safe: module_tx.safe.into(),
            module: module_tx.module.into(),
            to: module_tx.to_address.into(),
            value: module_tx.value.0.to_string(),
            data: module_tx
                .data
                .map(|data| alloy::hex::encode_prefixed(data)),
            operation: module_tx.operation,
            transaction_hash: module_tx.ethereum_tx_hash.map(Into::into),
        }
    }
}

#[derive(Serialize)]
pub struct Response {
    pub count: usize,
    pub results: Vec<ModuleTransactionItem>,
}

pub async fn handler(
    Path(address): Path<Address>,
    State(app_state): State<AppState>,
) -> Result<AppJson<Response>, AppError> {
    let results = {
        let mut db_conn = app_state.db().get()?;
        let tx = db_conn.transaction()?;
        let results = ModuleTransactionModel::query_by_safe(&tx, address)?
            .into_iter()
            .map(ModuleTransactionItem::from)
            .collect::<Vec<_>>();
        tx.rollback()?;
        results
    };

    Ok(AppJson(Response {
        count: results.len(),
        results,
    }))
}
