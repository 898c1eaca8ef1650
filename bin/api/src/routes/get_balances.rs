use crate::primitives::{AppError, AppJson, AppState};

use alloy::primitives::{Address, U256};
use axum::extract::{Path, State};
use safescan_db::EthereumEventModel;
use safescan_primitives::ERC20_721_TRANSFER_TOPIC;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Serialize)]
pub struct BalanceItem {
    // None is the ether balance
    token_address: Option<Address>,
    balance: String,
}

#[derive(Serialize)]
pub struct Response {
    balances: Vec<BalanceItem>,
}

/// Token balances folded from the indexed transfer history; ether from the node.
pub async fn handler(
    Path(address): Path<Address>,
    State(app_state): State<AppState>,
) -> Result<AppJson<Response>, AppError> {
    let events = {
        let mut db_conn = app_state.db().get()?;
        let tx = db_conn.transaction()?;
        let events = EthereumEventModel::query_erc20_for_address(
            &tx,
            ERC20_721_TRANSFER_TOPIC.into(),
            address,
        )?;
        tx.rollback()?;
        events
    };

    let checksummed = address.to_checksum(None);
    let mut token_balances: BTreeMap<Address, U256> = BTreeMap::new();
    for event in events {
        let Some(value) = event
            .arguments
            .get("value")
            .and_then(|value| value.as_str())
            .and_then(|value| value.parse::<U256>().ok())
        else {
            continue;
        };
        let token: Address = event.address.into();
        let balance = token_balances.entry(token).or_default();
        if event.arguments.get("to").and_then(|to| to.as_str()) == Some(checksummed.as_str()) {
            *balance = balance.saturating_add(value);
        }
        if event.arguments.get("from").and_then(|from| from.as_str()) == Some(checksummed.as_str())
        {
            *balance = balance.saturating_sub(value);
        }
    }

    let ether_balance = app_state
        .rpc()
        .get_balance(address)
        .await
        .map_err(|error| AppError::Internal(eyre::Report::new(error)))?;

    let mut balances = vec![BalanceItem {
        token_address: None,
        balance: ether_balance.to_string(),
    }];
    balances.extend(
        token_balances
            .into_iter()
            .filter(|(_, balance)| !balance.is_zero())
            .map(|(token_address, balance)| BalanceItem {
                token_address: Some(token_address),
                balance: balance.to_string(),
            }),
    );

    Ok(AppJson(Response { balances }))
}
