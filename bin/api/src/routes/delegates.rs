use crate::primitives::{AppError, AppJson, AppState};

use alloy::primitives::Address;
use axum::extract::{Json, Path, State};
use safescan_db::{SafeContractDelegateModel, SafeContractModel, SafeStatusModel};
use safescan_primitives::recover_delegate_signer;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Serialize)]
pub struct DelegateItem {
    safe: Address,
    delegate: Address,
    delegator: Address,
    label: String,
}

impl From<SafeContractDelegateModel> for DelegateItem {
    fn from(delegate: SafeContractDelegateModel) -> Self {
        Self {
            safe: delegate.safe_address.into(),
            delegate: delegate.delegate.into(),
            delegator: delegate.delegator.into(),
            label: delegate.label,
        }
    }
}

#[derive(Serialize)]
pub struct ListResponse {
    count: usize,
    results: Vec<DelegateItem>,
}

pub async fn list_handler(
    Path(address): Path<Address>,
    State(app_state): State<AppState>,
) -> Result<AppJson<ListResponse>, AppError> {
    let results = {
        let mut db_conn = app_state.db().get()?;
        let tx = db_conn.transaction()?;
        let results = SafeContractDelegateModel::query_by_safe(&tx, address)?
            .into_iter()
            .map(DelegateItem::from)
            .collect::<Vec<_>>();
        tx.rollback()?;
        results
    };

    Ok(AppJson(ListResponse {
        count: results.len(),
        results,
    }))
}

#[derive(Deserialize)]
pub struct CreateRequest {
    delegate: Address,
    label: String,
    // 65 byte signature of keccak(delegate ++ totp), hex encoded
    signature: String,
}

fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

/// Registers a delegate. The signature must come from a current owner of the
/// Safe and cover the TOTP-windowed delegate hash.
pub async fn create_handler(
    Path(address): Path<Address>,
    State(app_state): State<AppState>,
    Json(request): Json<CreateRequest>,
) -> Result<AppJson<DelegateItem>, AppError> {
    let signature = alloy::hex::decode(&request.signature)
        .map_err(|_| AppError::Invalid("signature is not hex".to_string()))?;
    let Some(signer) = recover_delegate_signer(request.delegate, &signature, unix_time()) else {
        return Err(AppError::Invalid("could not recover signer".to_string()));
    };

    let delegate_row = {
        let mut db_conn = app_state.db().get()?;
        let tx = db_conn.transaction()?;

        if SafeContractModel::query_by_address(&tx, address)?.is_none() {
            return Err(AppError::NotFound);
        }
        let owners = SafeStatusModel::query_last_for_address(&tx, address)?
            .map(|status| status.owners())
            .unwrap_or_default();
        if !owners.contains(&signer) {
            return Err(AppError::Invalid(format!(
                "signer {signer} is not an owner of {address}"
            )));
        }

        let delegate_row = SafeContractDelegateModel::new(
            address,
            request.delegate,
            signer,
            request.label.clone(),
        );
        delegate_row.upsert(&tx)?;
        tx.commit()?;
        delegate_row
    };

    Ok(AppJson(DelegateItem::from(delegate_row)))
}

#[derive(Deserialize)]
pub struct DeleteRequest {
    signature: String,
}

/// Removes a delegate. Accepts a signature from an owner or from the delegate
/// itself, over the same TOTP hash as creation.
pub async fn delete_handler(
    Path((address, delegate)): Path<(Address, Address)>,
    State(app_state): State<AppState>,
    Json(request): Json<DeleteRequest>,
) -> Result<AppJson<serde_json::Value>, AppError> {
    let signature = alloy::hex::decode(&request.signature)
        .map_err(|_| AppError::Invalid("signature is not hex".to_string()))?;
    let Some(signer) = recover_delegate_signer(delegate, &signature, unix_time()) else {
        return Err(AppError::Invalid("could not recover signer".to_string()));
    };

    {
        let mut db_conn = app_state.db().get()?;
        let tx = db_conn.transaction()?;

        let owners = SafeStatusModel::query_last_for_address(&tx, address)?
            .map(|status| status.owners())
            .unwrap_or_default();
        if signer != delegate && !owners.contains(&signer) {
            return Err(AppError::Invalid(format!(
                "signer {signer} may not remove this delegate"
            )));
        }

        if SafeContractDelegateModel::delete(&tx, address, delegate)? == 0 {
            return Err(AppError::NotFound);
        }
        tx.commit()?;
    }

    Ok(AppJson(serde_json::json!({ "deleted": true })))
}
