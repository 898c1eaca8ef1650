use crate::{
    config,
    primitives::{AppJson, AppState},
};

use axum::extract::State;
use serde::Serialize;

#[derive(Serialize)]
pub struct Response {
    name: &'static str,
    version: &'static str,
    settings: Settings,
}

#[derive(Serialize)]
pub struct Settings {
    ethereum_node_url: String,
}

pub async fn handler(State(_app_state): State<AppState>) -> AppJson<Response> {
    AppJson(Response {
        name: "Safescan Transaction Service",
        version: env!("CARGO_PKG_VERSION"),
        settings: Settings {
            ethereum_node_url: config::ETHEREUM_NODE_URL.to_string(),
        },
    })
}
