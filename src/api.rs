use axum::{
    extract::Query,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::feeds::FeedClient;
use crate::prices::PriceCache;
use crate::reconciler;
use crate::service;

pub struct AppState {
    pub cfg: Config,
    pub feeds: FeedClient,
    pub prices: PriceCache,
}

#[derive(Deserialize)]
pub struct ReportQuery {
    pub address: String,
}

#[derive(Deserialize)]
pub struct PriceQuery {
    pub symbol: String,
}

#[derive(Deserialize)]
pub struct PricesBody {
    pub symbols: Vec<String>,
}

pub async fn serve(cfg: Config, state: Arc<AppState>) -> eyre::Result<()> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(|| async { "Alpha stats API running" }))
        .route("/wallet/report", get({
            let state = Arc::clone(&state);
            move |q: Query<ReportQuery>| {
                let state = Arc::clone(&state);
                async move { wallet_report(state, q.0).await }
            }
        }))
        .route("/price", get({
            let state = Arc::clone(&state);
            move |q: Query<PriceQuery>| {
                let state = Arc::clone(&state);
                async move { price(state, q.0).await }
            }
        }))
        .route("/prices", post({
            let state = Arc::clone(&state);
            move |body: Json<PricesBody>| {
                let state = Arc::clone(&state);
                async move { prices(state, body.0).await }
            }
        }))
        .route("/cache/stats", get({
            let state = Arc::clone(&state);
            move || {
                let state = Arc::clone(&state);
                async move { Json(state.prices.stats()) }
            }
        }))
        .route("/cache/clear", post({
            let state = Arc::clone(&state);
            move || {
                let state = Arc::clone(&state);
                async move {
                    state.prices.clear();
                    Json(json!({ "cleared": true }))
                }
            }
        }))
        .layer(cors);

    let addr = SocketAddr::from(([127, 0, 0, 1], cfg.port));
    info!("API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

// ---------- handlers ----------

async fn wallet_report(state: Arc<AppState>, q: ReportQuery) -> Response {
    let Some(wallet) = reconciler::parse_address(&q.address) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid wallet address" })),
        )
            .into_response();
    };

    match service::wallet_report(
        &state.feeds,
        &state.prices,
        &wallet,
        state.cfg.target_contract.as_ref(),
        state.cfg.max_transactions,
    )
    .await
    {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            // feed failures are visible to the caller, unlike price failures
            error!("Wallet report for {} failed: {:?}", q.address, e);
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": format!("failed to fetch transaction feeds: {e}") })),
            )
                .into_response()
        }
    }
}

async fn price(state: Arc<AppState>, q: PriceQuery) -> Response {
    let symbol = q.symbol.to_uppercase();
    let price = state.prices.fetch_price(&symbol).await;
    Json(json!({ "symbol": symbol, "price": price })).into_response()
}

async fn prices(state: Arc<AppState>, body: PricesBody) -> Response {
    let prices = state.prices.fetch_prices(&body.symbols).await;
    Json(json!({ "prices": prices })).into_response()
}
