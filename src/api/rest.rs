// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// Thin query layer over the market registry. The engine itself is
// format-agnostic; this module owns the JSON shape: candle timestamps as
// epoch seconds, `closeTime` omitted when a candle is not yet closed.
//
// CORS is configured permissively for development; tighten `allowed_origins`
// in production.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::market::{Candle, Granularity, MarketRegistry, QueryError};

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(registry: Arc<MarketRegistry>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/granularities", get(granularities))
        .route("/api/v1/symbols", get(symbols))
        .route("/api/v1/stocks/:stock/candles", get(candles))
        .layer(cors)
        .with_state(registry)
}

// =============================================================================
// Response shapes
// =============================================================================

/// One candle on the wire. Times are epoch seconds; an absent `closeTime`
/// marks the candle as not yet closed.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JsonCandle {
    pub open_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_time: Option<i64>,
    pub min_price: Decimal,
    pub max_price: Decimal,
    pub open_price: Decimal,
    pub close_price: Decimal,
}

impl From<&Candle> for JsonCandle {
    fn from(candle: &Candle) -> Self {
        Self {
            open_time: candle.open_time.timestamp(),
            close_time: candle.close_time.map(|t| t.timestamp()),
            min_price: candle.min_price,
            max_price: candle.max_price,
            open_price: candle.open_price,
            close_price: candle.close_price,
        }
    }
}

/// Candle series response for one (symbol, granularity) pair.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonCandles {
    pub stock_name: String,
    pub candle_size: u32,
    pub candle_chrono_unit: String,
    pub candles: Vec<JsonCandle>,
}

impl JsonCandles {
    fn new(stock_name: &str, granularity: Granularity, candles: &[Candle]) -> Self {
        Self {
            stock_name: stock_name.to_string(),
            candle_size: granularity.size,
            candle_chrono_unit: granularity.unit.to_string(),
            candles: candles.iter().map(JsonCandle::from).collect(),
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn health(State(registry): State<Arc<MarketRegistry>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "server_time": chrono::Utc::now().timestamp_millis(),
        "known_symbols": registry.known_symbols().len(),
    }))
}

async fn granularities(State(registry): State<Arc<MarketRegistry>>) -> impl IntoResponse {
    Json(registry.granularities().to_vec())
}

async fn symbols(State(registry): State<Arc<MarketRegistry>>) -> impl IntoResponse {
    let mut symbols = registry.known_symbols();
    symbols.sort();
    Json(symbols)
}

#[derive(Deserialize)]
struct CandleQuery {
    unit: String,
    size: u32,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn bad_request(message: String) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
}

/// `GET /api/v1/stocks/:stock/candles?unit=SECOND&size=10`
///
/// 404 only for a granularity outside the configured set; a symbol with no
/// trades yet returns an empty series.
async fn candles(
    Path(stock): Path<String>,
    Query(query): Query<CandleQuery>,
    State(registry): State<Arc<MarketRegistry>>,
) -> Result<Json<JsonCandles>, ApiError> {
    let unit = query
        .unit
        .parse()
        .map_err(|e: anyhow::Error| bad_request(format!("{e:#}")))?;
    let granularity =
        Granularity::new(query.size, unit).map_err(|e| bad_request(format!("{e:#}")))?;

    match registry.query(&stock, granularity) {
        Ok(candles) => Ok(Json(JsonCandles::new(&stock, granularity, &candles))),
        Err(QueryError::UnknownGranularity(g)) => Err((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": format!("granularity {g} is not configured"),
            })),
        )),
        Err(QueryError::Internal(e)) => {
            warn!(stock = %stock, error = %e, "candle query failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "internal error" })),
            ))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::TimeUnit;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    #[test]
    fn candle_serializes_with_epoch_seconds() {
        let g = Granularity::new(10, TimeUnit::Second).unwrap();
        let open = Utc.with_ymd_and_hms(2022, 12, 12, 12, 12, 10).unwrap();
        let close = Utc.with_ymd_and_hms(2022, 12, 12, 12, 12, 13).unwrap();
        let candle = Candle {
            granularity: g,
            open_time: open,
            close_time: Some(close),
            min_price: dec!(1),
            max_price: dec!(2),
            open_price: dec!(1),
            close_price: dec!(2),
        };

        let json = serde_json::to_value(JsonCandle::from(&candle)).unwrap();
        assert_eq!(json["openTime"], open.timestamp());
        assert_eq!(json["closeTime"], close.timestamp());
        assert_eq!(json["minPrice"], "1");
        assert_eq!(json["maxPrice"], "2");
    }

    #[test]
    fn absent_close_time_is_omitted() {
        let g = Granularity::new(10, TimeUnit::Second).unwrap();
        let candle = Candle {
            granularity: g,
            open_time: Utc.with_ymd_and_hms(2022, 12, 12, 12, 12, 10).unwrap(),
            close_time: None,
            min_price: dec!(1),
            max_price: dec!(1),
            open_price: dec!(1),
            close_price: dec!(1),
        };

        let json = serde_json::to_value(JsonCandle::from(&candle)).unwrap();
        assert!(json.get("closeTime").is_none());
    }

    #[test]
    fn series_response_carries_the_granularity() {
        let g = Granularity::new(5, TimeUnit::Minute).unwrap();
        let response = JsonCandles::new("APPL", g, &[]);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["stockName"], "APPL");
        assert_eq!(json["candleSize"], 5);
        assert_eq!(json["candleChronoUnit"], "MINUTE");
        assert!(json["candles"].as_array().unwrap().is_empty());
    }
}
