use super::{
    list_module_transactions::ModuleTransactionItem,
    list_multisig_transactions as multisig,
    list_transfers::TransferItem,
};
use crate::primitives::{AppError, AppJson, AppState};

use alloy::primitives::Address;
use axum::extract::{Path, State};
use serde::Serialize;

#[derive(Serialize)]
pub struct Response {
    multisig_transactions: Vec<multisig::MultisigTransactionItem>,
    module_transactions: Vec<ModuleTransactionItem>,
    transfers: Vec<TransferItem>,
}

/// Everything the service knows about a Safe in one call.
pub async fn handler(
    Path(address): Path<Address>,
    State(app_state): State<AppState>,
) -> Result<AppJson<Response>, AppError> {
    let multisig_transactions =
        multisig::handler(Path(address), State(app_state.clone())).await?.0;
    let module_transactions =
        super::list_module_transactions::handler(Path(address), State(app_state.clone()))
            .await?
            .0;
    let transfers = super::list_transfers::handler(Path(address), State(app_state)).await?.0;

    Ok(AppJson(Response {
        multisig_transactions: multisig_transactions.results,
        module_transactions: module_transactions.results,
        transfers: transfers.results,
    }))
}
