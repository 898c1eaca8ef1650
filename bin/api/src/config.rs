use eyre::Context;
use lazy_static::lazy_static;
use std::{env, ffi::OsStr, sync::Once};

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

lazy_static! {
    pub static ref RUST_LOG: String =
        get_env_var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    pub static ref PORT: u16 = get_env_var("PORT")
        .ok()
        .and_then(|port| port.parse().ok())
        .unwrap_or(8000);
    pub static ref DB_PATH: String = get_env_var("DB_PATH")
        .wrap_err("Failed to read DB_PATH from env")
        .unwrap();
    pub static ref ETHEREUM_NODE_URL: url::Url = get_env_var("ETHEREUM_NODE_URL")
        .wrap_err("Failed to read ETHEREUM_NODE_URL from env")
        .and_then(|u| url::Url::parse(u.as_str()).wrap_err("Failed to parse ETHEREUM_NODE_URL"))
        .unwrap();
}
