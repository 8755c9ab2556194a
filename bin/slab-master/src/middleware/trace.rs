//! Request tracing + logging middleware (mirrors the teacher's
//! `middleware/trace.rs`): assigns/propagates an `X-Trace-Id`, wraps the
//! handler call in a tracing span, and fires-and-forgets a request-log
//! write on arrival and completion so a slow store never blocks the
//! response.

use crate::state::AppState;
use crate::db::{RequestRecord, RequestStore};
use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Request, Response};
use chrono::Utc;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub static X_TRACE_ID: HeaderName = HeaderName::from_static("x-trace-id");

#[derive(Clone)]
pub struct TraceLayer {
    state: Arc<AppState>,
}

impl TraceLayer {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

impl<S> Layer<S> for TraceLayer {
    type Service = TraceMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TraceMiddleware { inner, state: self.state.clone() }
    }
}

#[derive(Clone)]
pub struct TraceMiddleware<S> {
    inner: S,
    state: Arc<AppState>,
}

impl<S> Service<Request<Body>> for TraceMiddleware<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let trace_id = req
            .headers()
            .get(&X_TRACE_ID)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
            .unwrap_or_else(Uuid::new_v4);
        req.headers_mut().insert(X_TRACE_ID.clone(), HeaderValue::from_str(&trace_id.to_string()).unwrap());

        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        let state = self.state.clone();
        let start = Instant::now();

        let store = state.store.clone();
        tokio::spawn(async move {
            let record = RequestRecord {
                id: trace_id,
                method: method.clone(),
                path: path.clone(),
                status: None,
                latency_ms: None,
                created_at: Utc::now(),
            };
            if let Err(e) = store.insert(record).await {
                warn!(%trace_id, error = %e, "failed to record incoming request");
            }
        });

        let span = info_span!("http_request", %trace_id, method = %req.method(), path = %req.uri().path());
        info!(parent: &span, "\u{2192} request");

        let mut inner = self.inner.clone();
        let store = self.state.store.clone();
        let fut = async move {
            let mut response = inner.call(req).await?;
            let latency_ms = start.elapsed().as_millis() as i64;
            let status = response.status().as_u16() as i64;
            info!(%trace_id, status, latency_ms, "\u{2190} response");

            // Echo the trace ID back in the response headers.
            response
                .headers_mut()
                .insert(X_TRACE_ID.clone(), HeaderValue::from_str(&trace_id.to_string()).unwrap());

            tokio::spawn(async move {
                if let Err(e) = store.update_response(trace_id, status, latency_ms).await {
                    warn!(%trace_id, error = %e, "failed to record response status");
                }
            });

            Ok(response)
        }
        .instrument(span);

        Box::pin(fut)
    }
}
