use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::analytics::cohort::compute_change_rates;
use crate::clock::Clock;
use crate::config::Config;
use crate::store::StatsStore;
use crate::window::cache::{cache_control_for, redirect_cache_control};
use crate::window::filter::{normalize, Normalized};
use crate::window::DateWindow;

#[derive(Clone)]
struct ApiState {
    db_path: PathBuf,
    clock: Arc<dyn Clock>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(error: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
}

pub async fn run_server(config: Config, bind: SocketAddr, clock: Arc<dyn Clock>) -> Result<()> {
    let state = ApiState {
        db_path: config.resolved_db_path(),
        clock,
    };
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = router(state).layer(cors);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("stats API listening on http://{bind}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/retrieval-success-rate", get(retrieval_success_rate))
        .route("/participants/daily", get(participants_daily))
        .route("/participants/monthly", get(participants_monthly))
        .route("/participants/change-rates", get(participants_change_rates))
        .route("/transfers/daily", get(transfers_daily))
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn retrieval_success_rate(
    State(state): State<ApiState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Response, ApiError> {
    windowed(&state, "/retrieval-success-rate", &params, |store, window| {
        store.daily_retrieval_stats(&window)
    })
}

async fn participants_daily(
    State(state): State<ApiState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Response, ApiError> {
    windowed(&state, "/participants/daily", &params, |store, window| {
        store.daily_participants(&window)
    })
}

async fn participants_monthly(
    State(state): State<ApiState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Response, ApiError> {
    windowed(&state, "/participants/monthly", &params, |store, window| {
        store.monthly_participants(&window)
    })
}

async fn participants_change_rates(
    State(state): State<ApiState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Response, ApiError> {
    windowed(
        &state,
        "/participants/change-rates",
        &params,
        |store, window| {
            // One extra month on the left edge serves as the baseline.
            let cohorts = store.monthly_cohorts(&window.widen_month_left())?;
            Ok(compute_change_rates(&cohorts))
        },
    )
}

async fn transfers_daily(
    State(state): State<ApiState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Response, ApiError> {
    windowed(&state, "/transfers/daily", &params, |store, window| {
        store.daily_rewards(&window)
    })
}

/// Shared read-endpoint control flow: normalize the window, short-circuit
/// redirects and malformed dates, otherwise open a request-scoped store,
/// fetch, and attach the cache directive.
fn windowed<T, F>(
    state: &ApiState,
    path: &'static str,
    params: &BTreeMap<String, String>,
    fetch: F,
) -> Result<Response, ApiError>
where
    T: Serialize,
    F: FnOnce(&StatsStore, DateWindow) -> Result<T>,
{
    let now = state.clock.now();
    let normalized =
        normalize(path, params, now.date_naive()).map_err(|e| ApiError::bad_request(e.to_string()))?;
    match normalized {
        Normalized::Redirect {
            permanent,
            location,
            max_age_secs,
        } => {
            let status = if permanent {
                StatusCode::MOVED_PERMANENTLY
            } else {
                StatusCode::FOUND
            };
            Response::builder()
                .status(status)
                .header(header::LOCATION, location)
                .header(header::CACHE_CONTROL, redirect_cache_control(max_age_secs))
                .body(Body::empty())
                .map_err(ApiError::internal)
        }
        Normalized::Canonical(window) => {
            let store = StatsStore::open(&state.db_path).map_err(ApiError::internal)?;
            let rows = fetch(&store, window).map_err(ApiError::internal)?;
            let directive = cache_control_for(&window, now);
            Ok((
                StatusCode::OK,
                [(header::CACHE_CONTROL, directive)],
                Json(rows),
            )
                .into_response())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::sync::Arc;

    use axum::http::{header, StatusCode};

    use super::{windowed, ApiState};
    use crate::clock::fixed;

    fn state() -> ApiState {
        ApiState {
            db_path: PathBuf::from(":memory:"),
            clock: Arc::new(fixed("2024-05-15T12:00:00Z")),
        }
    }

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaulted_window_redirects_with_the_short_ttl() {
        let response = windowed(
            &state(),
            "/transfers/daily",
            &params(&[("from", "2024-05-01")]),
            |store, window| store.daily_rewards(&window),
        )
        .expect("request failed");

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response
                .headers()
                .get(header::LOCATION)
                .expect("missing location"),
            "/transfers/daily?from=2024-05-01&to=2024-05-15"
        );
        assert_eq!(
            response
                .headers()
                .get(header::CACHE_CONTROL)
                .expect("missing cache-control"),
            "public, max-age=600"
        );
    }

    #[test]
    fn timestamp_window_redirects_permanently() {
        let response = windowed(
            &state(),
            "/transfers/daily",
            &params(&[
                ("from", "2024-04-01T00:00:00.000Z"),
                ("to", "2024-04-30T00:00:00.000Z"),
            ]),
            |store, window| store.daily_rewards(&window),
        )
        .expect("request failed");

        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            response
                .headers()
                .get(header::CACHE_CONTROL)
                .expect("missing cache-control"),
            "public, max-age=86400"
        );
    }

    #[test]
    fn historical_window_serves_with_the_immutable_directive() {
        let response = windowed(
            &state(),
            "/transfers/daily",
            &params(&[("from", "2024-04-01"), ("to", "2024-04-30")]),
            |store, window| store.daily_rewards(&window),
        )
        .expect("request failed");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::CACHE_CONTROL)
                .expect("missing cache-control"),
            "public, max-age=31536000, immutable"
        );
    }

    #[test]
    fn malformed_date_is_a_bad_request_naming_the_field() {
        let error = windowed(
            &state(),
            "/transfers/daily",
            &params(&[("from", "2024-13-40"), ("to", "2024-04-30")]),
            |store, window| store.daily_rewards(&window),
        )
        .expect_err("expected bad request");

        assert_eq!(error.status, StatusCode::BAD_REQUEST);
        assert!(error.message.contains("from"));
    }
}
