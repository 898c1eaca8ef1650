mod config;
mod primitives;
mod routes;

use primitives::AppState;
use safescan_db::connect as connect_db;
use safescan_primitives::new_http_provider;

use axum::{
    extract::{MatchedPath, Request},
    http::{HeaderValue, Method},
    routing::{delete, get},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use eyre::Result;
use std::{str::FromStr, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_str(&config::RUST_LOG).unwrap_or_default())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db = connect_db(&config::DB_PATH)?;
    let rpc = Arc::new(new_http_provider(config::ETHEREUM_NODE_URL.clone()));

    let app = Router::new()
        .route("/about", get(routes::about::handler))
        .route("/safes/:address", get(routes::get_safe_info::handler))
        .route(
            "/safes/:address/creation",
            get(routes::get_safe_creation::handler),
        )
        .route(
            "/safes/:address/all-transactions",
            get(routes::list_all_transactions::handler),
        )
        .route(
            "/safes/:address/multisig-transactions",
            get(routes::list_multisig_transactions::handler),
        )
        .route(
            "/safes/:address/module-transactions",
            get(routes::list_module_transactions::handler),
        )
        .route(
            "/safes/:address/transfers",
            get(routes::list_transfers::handler),
        )
        .route(
            "/safes/:address/balances",
            get(routes::get_balances::handler),
        )
        .route(
            "/safes/:address/delegates",
            get(routes::delegates::list_handler).post(routes::delegates::create_handler),
        )
        .route(
            "/safes/:address/delegates/:delegate",
            delete(routes::delegates::delete_handler),
        )
        .route(
            "/owners/:address/safes",
            get(routes::list_safes_by_owner::handler),
        )
        .layer(
            // CORS layer
            CorsLayer::new()
                .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
                .allow_methods([Method::GET, Method::POST, Method::DELETE]),
        )
        .layer(
            // Tracing layer
            TraceLayer::new_for_http()
                // Create our own span for the request and include the matched path. The matched
                // path is useful for figuring out which handler the request was routed to.
                .make_span_with(|req: &Request| {
                    let method = req.method();
                    let uri = req.uri();

                    // axum automatically adds this extension.
                    let matched_path = req
                        .extensions()
                        .get::<MatchedPath>()
                        .map(|matched_path| matched_path.as_str());

                    tracing::debug_span!("request", %method, %uri, matched_path)
                })
                // By default `TraceLayer` will log 5xx responses but we're doing our specific
                // logging of errors so disable that
                .on_failure(()),
        )
        .with_state(AppState::new(db, rpc));

    let listener = tokio::net::TcpListener::bind(
        format!("[::]:{}", *config::PORT)
            .parse::<std::net::SocketAddr>()
            .expect("Failed to parse address"),
    )
    .await?;

    tracing::debug!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    tracing::debug!("done");

    Ok(())
}
