use crate::services::states::FileCoreState;
use axum::Router;
use axum::http::{HeaderName, Request};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::request_id::{
    MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use tracing::info_span;

mod files;
mod ws;

pub async fn router(state: Arc<FileCoreState>) -> Router {
    let trace_header = HeaderName::from_static("x-hananokioku");
    Router::new()
        .nest(
            "/api/v1",
            Router::new()
                .nest("/files", files::router())
                .nest("/file-upload", ws::router()),
        )
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(
                    trace_header.clone(),
                    MakeRequestUuid,
                ))
                .layer(
                    TraceLayer::new_for_http().make_span_with(|req: &Request<_>| {
                        let rid = req
                            .extensions()
                            .get::<RequestId>()
                            .and_then(|r| r.header_value().to_str().ok())
                            .expect("Cannot get request id");
                        info_span!(
                            "http.request",
                            request_id = %rid,
                            method = %req.method(),
                            uri = %req.uri(),
                            version = ?req.version(),
                        )
                    }),
                )
                .layer(PropagateRequestIdLayer::new(trace_header))
                .concurrency_limit(state.config.common.concurrency_limit),
        )
        .with_state(state)
}
