pub mod dashboard;
pub mod health;
pub mod landing;
mod rate_limit;

use axum::{
    response::Redirect,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use rate_limit::FallbackIpKeyExtractor;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::callbacks::{ChartPanel, DependencySpec, InputValue, UpdateRequest, UpdateResponse};
use crate::chart::ChartSpec;
use crate::common::AppState;
use crate::layout::PageSpec;

/// Interaction payloads are a handful of ids and two dates.
const BODY_LIMIT_BYTES: usize = 64 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::healthz,
        dashboard::get_layout,
        dashboard::get_dependencies,
        dashboard::update_component,
    ),
    components(
        schemas(
            PageSpec,
            DependencySpec,
            InputValue,
            UpdateRequest,
            UpdateResponse,
            ChartPanel,
            ChartSpec,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "dashboard", description = "Layout and chart interactions"),
    ),
    info(
        title = "Sensor Dash",
        description = "Black carbon sensor readings dashboard",
        version = "0.1.0"
    )
)]
struct ApiDoc;

/// Governor refills one token per period; convert a per-second rate into
/// that period. A rate of zero is treated as one request per second.
fn replenish_millis(per_second: u64) -> u64 {
    (1000 / per_second.max(1)).max(1)
}

pub fn build_router(state: AppState) -> Router {
    let config = &state.config;

    let update_route = Router::new().route(
        "/dash/_dash-update-component",
        post(dashboard::update_component),
    );

    let update_route = if config.disable_rate_limiting {
        tracing::warn!("Rate limiting DISABLED");
        update_route
    } else {
        let limiter = GovernorConfigBuilder::default()
            .key_extractor(FallbackIpKeyExtractor)
            .per_millisecond(replenish_millis(config.rate_limit_per_second))
            .burst_size(config.rate_limit_burst)
            .finish();

        match limiter {
            Some(limiter) => {
                tracing::info!(
                    per_second = config.rate_limit_per_second,
                    burst = config.rate_limit_burst,
                    "Rate limiting configured"
                );
                update_route.layer(GovernorLayer {
                    config: Arc::new(limiter),
                })
            }
            None => {
                tracing::warn!(
                    per_second = config.rate_limit_per_second,
                    burst = config.rate_limit_burst,
                    "Invalid rate limit settings, rate limiting DISABLED"
                );
                update_route
            }
        }
    };

    let dash_routes = Router::new()
        .route("/dash", get(|| async { Redirect::permanent("/dash/") }))
        .route("/dash/", get(dashboard::dashboard_page))
        .route("/dash/_dash-layout", get(dashboard::get_layout))
        .route("/dash/_dash-dependencies", get(dashboard::get_dependencies))
        .merge(update_route)
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES));

    // Health check routes (NO rate limiting)
    let health_routes = Router::new().route("/healthz", get(health::healthz));

    // OpenAPI documentation
    let docs_routes = Router::new().merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    Router::new()
        .route("/", get(landing::landing))
        .merge(dash_routes)
        .merge(health_routes)
        .merge(docs_routes)
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_converts_to_refill_period() {
        assert_eq!(replenish_millis(5), 200);
        assert_eq!(replenish_millis(1), 1000);
        assert_eq!(replenish_millis(0), 1000);
        assert_eq!(replenish_millis(5000), 1);
    }
}
