use alloy::primitives::{address, Address, BlockNumber};

use eyre::Context;
use lazy_static::lazy_static;
use std::{env, ffi::OsStr, sync::Once};
use tracing_subscriber::fmt::format::FmtSpan;

static DOTENV_INIT: Once = Once::new();

fn get_env_var<K: AsRef<OsStr>>(k: K) -> Result<String, env::VarError> {
    if cfg!(test) || cfg!(feature = "local") {
        DOTENV_INIT.call_once(|| {
            let manifest_dir =
                std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR env var not set");

            // Load the .env relative to the crate root
            let _ = dotenvy::from_path(format!("{manifest_dir}/.env"));
        });
    }

    env::var(k)
}

/// "address" or "address:deployment_block", comma separated.
fn parse_monitored(value: &str) -> Vec<(Address, BlockNumber)> {
    value
        .split(',')
        .filter(|entry| !entry.trim().is_empty())
        .filter_map(|entry| {
            let mut parts = entry.trim().splitn(2, ':');
            let address = parts.next()?.parse().ok()?;
            let block_number = parts
                .next()
                .and_then(|block_number| block_number.parse().ok())
                .unwrap_or(0);
            Some((address, block_number))
        })
        .collect()
}

lazy_static! {
    pub static ref RUST_LOG: String =
        get_env_var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    pub static ref LOG_DIR: String = get_env_var("LOG_DIR").unwrap_or_else(|_| "logs".to_string());
    pub static ref TRACING_SPAN_EVENTS: FmtSpan = if get_env_var("TRACING_SPAN_EVENTS")
        .unwrap_or_else(|_| "false".to_string())
        .parse()
        .unwrap_or(false)
    {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    pub static ref DB_PATH: String = get_env_var("DB_PATH")
        .wrap_err("Failed to read DB_PATH from env")
        .unwrap();
    pub static ref ETHEREUM_NODE_URL: url::Url = get_env_var("ETHEREUM_NODE_URL")
        .wrap_err("Failed to read ETHEREUM_NODE_URL from env")
        .and_then(|u| url::Url::parse(u.as_str()).wrap_err("Failed to parse ETHEREUM_NODE_URL"))
        .unwrap();
    // Tracing-capable node; falls back to the regular node when unset
    pub static ref ETHEREUM_TRACING_NODE_URL: url::Url = get_env_var("ETHEREUM_TRACING_NODE_URL")
        .map(|u| url::Url::parse(u.as_str()).expect("Failed to parse ETHEREUM_TRACING_NODE_URL"))
        .unwrap_or_else(|_| ETHEREUM_NODE_URL.clone());
    pub static ref ETH_INTERNAL_TXS_BLOCK_PROCESS_LIMIT: u64 =
        get_env_var("ETH_INTERNAL_TXS_BLOCK_PROCESS_LIMIT")
            .ok()
            .and_then(|limit| limit.parse().ok())
            .unwrap_or(10_000);
    pub static ref ETH_INTERNAL_NO_FILTER: bool = get_env_var("ETH_INTERNAL_NO_FILTER")
        .ok()
        .and_then(|no_filter| no_filter.parse().ok())
        .unwrap_or(false);
    pub static ref ETH_REORG_BLOCKS: u64 = get_env_var("ETH_REORG_BLOCKS")
        .ok()
        .and_then(|blocks| blocks.parse().ok())
        .unwrap_or(10);
    // Which stages this worker runs; empty means all of them. Lets operators
    // split indexers, processor and reorg handling into separate processes.
    pub static ref WORKER_TASKS: Vec<String> = get_env_var("WORKER_TASKS")
        .map(|tasks| {
            tasks
                .split(',')
                .map(|task| task.trim().to_string())
                .filter(|task| !task.is_empty())
                .collect()
        })
        .unwrap_or_default();
    pub static ref SAFE_MASTER_COPY_ADDRESSES: Vec<(Address, BlockNumber)> =
        get_env_var("SAFE_MASTER_COPY_ADDRESSES")
            .map(|addresses| parse_monitored(&addresses))
            .unwrap_or_else(|_| vec![
                // v1.1.1
                (address!("34CfAC646f301356fAa8B21e94227e3583Fe3F5F"), 9_084_503),
                // v1.0.0
                (address!("b6029EA3B2c51D09a50B53CA8012FeEB05bDa35A"), 7_457_553),
            ]);
    pub static ref PROXY_FACTORY_ADDRESSES: Vec<(Address, BlockNumber)> =
        get_env_var("PROXY_FACTORY_ADDRESSES")
            .map(|addresses| parse_monitored(&addresses))
            .unwrap_or_else(|_| vec![
                // v1.1.1
                (address!("76E2cFc1F5Fa8F6a5b3fC4c8F4788F0116861F9B"), 9_084_508),
                // v1.0.0
                (address!("12302fE9c02ff50939BaAaaf415fc226C078613C"), 7_450_116),
            ]);
}

#[cfg(test)]
mod tests {

    use super::parse_monitored;
    use alloy::primitives::address;

    #[test]
    fn test_parse_monitored() {
        let parsed = parse_monitored(
            "0x34CfAC646f301356fAa8B21e94227e3583Fe3F5F:9084503,\
             0xb6029EA3B2c51D09a50B53CA8012FeEB05bDa35A",
        );
        assert_eq!(
            parsed,
            vec![
                (
                    address!("34CfAC646f301356fAa8B21e94227e3583Fe3F5F"),
                    9_084_503
                ),
                (address!("b6029EA3B2c51D09a50B53CA8012FeEB05bDa35A"), 0),
            ]
        );
        assert!(parse_monitored("").is_empty());
    }
}
