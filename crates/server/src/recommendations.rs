use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use curator_core::domain::product::{Product, ProductId};
use curator_core::domain::user::UserId;
use curator_core::recommendations::InvalidationReport;
use curator_core::{
    ApplicationError, CacheStats, InterfaceError, MutationEvent, RecommendationEngine,
    RecommendationError,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

pub const USER_HEADER: &str = "x-user-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct RecommendationState {
    engine: Arc<RecommendationEngine>,
}

pub fn router(engine: Arc<RecommendationEngine>) -> Router {
    Router::new()
        .route("/api/recommendations/personalized", get(personalized))
        .route("/api/recommendations/collaborative", get(collaborative))
        .route("/api/recommendations/content-based", get(content_based))
        .route("/api/recommendations/similar/{product_id}", get(similar))
        .route("/api/recommendations/popular", get(popular))
        .route("/api/recommendations/trending", get(trending))
        .route("/api/recommendations/track-view", post(track_view))
        .route("/api/recommendations/track-click", post(track_click))
        .route("/api/recommendations/events", post(apply_event))
        .route("/api/recommendations/cache/stats", get(cache_stats))
        .route("/api/recommendations/cache", delete(clear_cache))
        .with_state(RecommendationState { engine })
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackRequest {
    pub product_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackResponse {
    pub message: &'static str,
    pub interaction_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub correlation_id: String,
}

#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl ApiError {
    fn bad_request(message: impl Into<String>, correlation_id: &str) -> Self {
        Self(InterfaceError::BadRequest {
            message: message.into(),
            correlation_id: correlation_id.to_owned(),
        })
    }

    fn status(&self) -> StatusCode {
        match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Store details stay in the logs.
        let error = match &self.0 {
            InterfaceError::BadRequest { message, .. } | InterfaceError::NotFound { message, .. } => {
                message.clone()
            }
            other => other.user_message().to_owned(),
        };
        let body = ErrorBody { error, correlation_id: self.0.correlation_id().to_owned() };
        (self.status(), Json(body)).into_response()
    }
}

/// Per-request bookkeeping: correlation id and timing for the completion log.
struct RequestContext {
    route: &'static str,
    correlation_id: String,
    started: Instant,
}

impl RequestContext {
    fn begin(route: &'static str, headers: &HeaderMap) -> Self {
        let correlation_id = headers
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.trim().is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self { route, correlation_id, started: Instant::now() }
    }

    fn user(&self, headers: &HeaderMap) -> Result<UserId, ApiError> {
        let raw = headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| self.reject(format!("missing `{USER_HEADER}` header")))?;
        UserId::parse(raw).map_err(|error| self.reject(error.to_string()))
    }

    fn product(&self, raw: &str) -> Result<ProductId, ApiError> {
        ProductId::parse(raw).map_err(|error| self.reject(error.to_string()))
    }

    fn reject(&self, message: String) -> ApiError {
        let error = ApiError::bad_request(message, &self.correlation_id);
        self.log_failure(&error);
        error
    }

    fn finish<T>(self, result: Result<T, RecommendationError>) -> Result<T, ApiError> {
        match result {
            Ok(value) => {
                info!(
                    event_name = "http.recommendations.completed",
                    route = self.route,
                    correlation_id = %self.correlation_id,
                    duration_ms = self.elapsed_ms(),
                    "recommendation request completed"
                );
                Ok(value)
            }
            Err(error) => {
                let error = ApiError(ApplicationError::from(error).into_interface(&self.correlation_id));
                self.log_failure(&error);
                Err(error)
            }
        }
    }

    fn log_failure(&self, error: &ApiError) {
        warn!(
            event_name = "http.recommendations.failed",
            route = self.route,
            correlation_id = %self.correlation_id,
            duration_ms = self.elapsed_ms(),
            status = error.status().as_u16(),
            error = %error.0,
            "recommendation request failed"
        );
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn personalized(
    State(state): State<RecommendationState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Product>>, ApiError> {
    let ctx = RequestContext::begin("personalized", &headers);
    let user_id = ctx.user(&headers)?;
    ctx.finish(state.engine.get_personalized(&user_id).await).map(Json)
}

async fn collaborative(
    State(state): State<RecommendationState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Product>>, ApiError> {
    let ctx = RequestContext::begin("collaborative", &headers);
    let user_id = ctx.user(&headers)?;
    ctx.finish(state.engine.get_collaborative(&user_id).await).map(Json)
}

async fn content_based(
    State(state): State<RecommendationState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Product>>, ApiError> {
    let ctx = RequestContext::begin("content_based", &headers);
    let user_id = ctx.user(&headers)?;
    ctx.finish(state.engine.get_content_based(&user_id).await).map(Json)
}

async fn similar(
    State(state): State<RecommendationState>,
    Path(product_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<Product>>, ApiError> {
    let ctx = RequestContext::begin("similar", &headers);
    let product_id = ctx.product(&product_id)?;
    ctx.finish(state.engine.get_similar(&product_id).await).map(Json)
}

async fn popular(
    State(state): State<RecommendationState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Product>>, ApiError> {
    let ctx = RequestContext::begin("popular", &headers);
    ctx.finish(state.engine.get_popular().await).map(Json)
}

async fn trending(
    State(state): State<RecommendationState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Product>>, ApiError> {
    let ctx = RequestContext::begin("trending", &headers);
    ctx.finish(state.engine.get_trending().await).map(Json)
}

async fn track_view(
    State(state): State<RecommendationState>,
    headers: HeaderMap,
    payload: Result<Json<TrackRequest>, JsonRejection>,
) -> Result<Json<TrackResponse>, ApiError> {
    let ctx = RequestContext::begin("track_view", &headers);
    let user_id = ctx.user(&headers)?;
    let Json(request) = payload.map_err(|rejection| ctx.reject(rejection.body_text()))?;
    let product_id = ctx.product(&request.product_id)?;

    let interaction = ctx.finish(state.engine.track_view(&user_id, &product_id).await)?;
    Ok(Json(TrackResponse {
        message: "View tracked successfully",
        interaction_id: interaction.id.0,
    }))
}

async fn track_click(
    State(state): State<RecommendationState>,
    headers: HeaderMap,
    payload: Result<Json<TrackRequest>, JsonRejection>,
) -> Result<Json<TrackResponse>, ApiError> {
    let ctx = RequestContext::begin("track_click", &headers);
    let user_id = ctx.user(&headers)?;
    let Json(request) = payload.map_err(|rejection| ctx.reject(rejection.body_text()))?;
    let product_id = ctx.product(&request.product_id)?;

    let interaction = ctx.finish(state.engine.track_click(&user_id, &product_id).await)?;
    Ok(Json(TrackResponse {
        message: "Click tracked successfully",
        interaction_id: interaction.id.0,
    }))
}

/// Mutation notifications from the storefront's write side.
async fn apply_event(
    State(state): State<RecommendationState>,
    headers: HeaderMap,
    payload: Result<Json<MutationEvent>, JsonRejection>,
) -> Result<Json<InvalidationReport>, ApiError> {
    let ctx = RequestContext::begin("events", &headers);
    let Json(event) = payload.map_err(|rejection| ctx.reject(rejection.body_text()))?;

    let report = state.engine.invalidator().apply(&event);
    ctx.finish(Ok(report)).map(Json)
}

async fn cache_stats(State(state): State<RecommendationState>) -> Json<CacheStats> {
    Json(state.engine.cache().stats())
}

async fn clear_cache(State(state): State<RecommendationState>, headers: HeaderMap) -> StatusCode {
    let ctx = RequestContext::begin("cache_clear", &headers);
    state.engine.cache().clear();
    info!(
        event_name = "cache.cleared",
        correlation_id = %ctx.correlation_id,
        "recommendation cache cleared on request"
    );
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        response::IntoResponse,
        Router,
    };
    use curator_core::domain::product::{Product, ProductId};
    use curator_core::recommendations::ProductStore;
    use curator_core::{
        ApplicationError, DataSources, EngineSettings, RecommendationCache, RecommendationEngine,
        RecommendationError, TtlPolicy,
    };
    use curator_db::InMemoryStorefront;
    use rust_decimal::Decimal;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::{router, ApiError, ErrorBody, REQUEST_ID_HEADER, USER_HEADER};

    async fn storefront() -> Arc<InMemoryStorefront> {
        let store = Arc::new(InMemoryStorefront::default());
        store
            .upsert_product(
                Product::new("p-1", "Crew Tee", "tops", Decimal::new(2400, 2))
                    .with_tags(["cotton"])
                    .with_view_count(3),
            )
            .await;
        store
            .upsert_product(
                Product::new("p-2", "Oxford Shirt", "tops", Decimal::new(5800, 2)).with_view_count(9),
            )
            .await;
        store
            .upsert_product(Product::new("p-3", "Trail Runner", "shoes", Decimal::new(11000, 2)))
            .await;
        store
    }

    fn app(store: Arc<InMemoryStorefront>) -> (Router, Arc<RecommendationEngine>) {
        let engine = Arc::new(RecommendationEngine::new(
            DataSources::from_store(store),
            Arc::new(RecommendationCache::new(100, TtlPolicy::default())),
            EngineSettings::default(),
        ));
        (router(engine.clone()), engine)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).expect("request")
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header(USER_HEADER, "u-1")
            .body(Body::from(body.to_owned()))
            .expect("request")
    }

    async fn json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn ids(body: &Value) -> Vec<&str> {
        body.as_array()
            .expect("array body")
            .iter()
            .map(|product| product["id"].as_str().expect("id"))
            .collect()
    }

    #[tokio::test]
    async fn popular_without_orders_ranks_by_views() {
        let (router, _) = app(storefront().await);

        let response = router.oneshot(get("/api/recommendations/popular")).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(ids(&json(response).await), ["p-2", "p-1", "p-3"]);
    }

    #[tokio::test]
    async fn similar_for_unknown_product_is_404_with_correlation_id() {
        let (router, _) = app(storefront().await);
        let request = Request::builder()
            .uri("/api/recommendations/similar/p-404")
            .header(REQUEST_ID_HEADER, "req-77")
            .body(Body::empty())
            .expect("request");

        let response = router.oneshot(request).await.expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: ErrorBody = serde_json::from_value(json(response).await).expect("error body");
        assert_eq!(body.correlation_id, "req-77");
        assert!(body.error.contains("p-404"));
    }

    #[tokio::test]
    async fn personalized_requires_user_header() {
        let (router, _) = app(storefront().await);

        let response =
            router.oneshot(get("/api/recommendations/personalized")).await.expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json(response).await["error"].as_str().expect("error").contains(USER_HEADER));
    }

    #[tokio::test]
    async fn track_view_bumps_counter_and_refreshes_view_ranked_popular() {
        let store = storefront().await;
        let (router, engine) = app(store.clone());
        engine.get_popular().await.expect("popular");
        assert_eq!(engine.cache().stats().entries, 1);

        let response = router
            .oneshot(post_json("/api/recommendations/track-view", r#"{"productId":"p-3"}"#))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["message"], "View tracked successfully");
        let product = store.find_by_id(&ProductId("p-3".to_owned())).await.expect("query");
        assert_eq!(product.map(|product| product.view_count), Some(1));
        assert_eq!(engine.cache().stats().entries, 0);
    }

    #[tokio::test]
    async fn track_click_leaves_view_counter_alone() {
        let store = storefront().await;
        let (router, _) = app(store.clone());

        let response = router
            .oneshot(post_json("/api/recommendations/track-click", r#"{"productId":"p-1"}"#))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let product = store.find_by_id(&ProductId("p-1".to_owned())).await.expect("query");
        assert_eq!(product.map(|product| product.view_count), Some(3));
        assert_eq!(store.interactions().await.len(), 1);
    }

    #[tokio::test]
    async fn track_view_validates_body_and_product() {
        let store = storefront().await;
        let (router, _) = app(store.clone());

        let missing_field = router
            .clone()
            .oneshot(post_json("/api/recommendations/track-view", r#"{"product":"p-1"}"#))
            .await
            .expect("response");
        let blank_id = router
            .clone()
            .oneshot(post_json("/api/recommendations/track-view", r#"{"productId":"  "}"#))
            .await
            .expect("response");
        let unknown = router
            .oneshot(post_json("/api/recommendations/track-view", r#"{"productId":"p-9"}"#))
            .await
            .expect("response");

        assert_eq!(missing_field.status(), StatusCode::BAD_REQUEST);
        assert_eq!(blank_id.status(), StatusCode::BAD_REQUEST);
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
        assert!(store.interactions().await.is_empty());
    }

    #[tokio::test]
    async fn product_events_evict_similar_lists() {
        let (router, engine) = app(storefront().await);
        engine.get_similar(&ProductId("p-1".to_owned())).await.expect("similar");

        let response = router
            .oneshot(post_json(
                "/api/recommendations/events",
                r#"{"type":"product_updated","product_id":"p-1"}"#,
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let report = json(response).await;
        assert_eq!(report["event"], "product_updated");
        assert_eq!(report["invalidated"][0], "similar:p-1");
        assert_eq!(engine.cache().stats().entries, 0);
    }

    #[tokio::test]
    async fn cache_can_be_inspected_and_cleared() {
        let (router, engine) = app(storefront().await);
        engine.get_trending().await.expect("trending");

        let stats = router
            .clone()
            .oneshot(get("/api/recommendations/cache/stats"))
            .await
            .expect("response");
        assert_eq!(json(stats).await["entries"], 1);

        let cleared = router
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/recommendations/cache")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(cleared.status(), StatusCode::NO_CONTENT);
        assert_eq!(engine.cache().stats().entries, 0);
    }

    #[tokio::test]
    async fn computation_failures_hide_store_details() {
        let error = ApiError(
            ApplicationError::from(RecommendationError::ComputationFailure(
                "store unavailable: disk I/O error".to_owned(),
            ))
            .into_interface("req-5"),
        );

        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json(response).await;
        assert_eq!(body["correlation_id"], "req-5");
        assert!(!body["error"].as_str().expect("error").contains("disk"));
    }
}
