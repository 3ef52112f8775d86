//! Request context and middleware for the diagnosis REST API
//!
//! Every request gets a unique id that handlers use for log correlation and
//! as the response transaction id.

use axum::{
  extract::Request,
  http::{header::USER_AGENT, Method, Uri},
  middleware::Next,
  response::Response,
};
use std::time::Instant;
use uuid::Uuid;

/// Request metadata injected into every request
#[derive(Debug, Clone)]
pub struct RequestContext {
  /// Unique ID for this request
  pub request_id: Uuid,
  /// HTTP method
  pub method: Method,
  /// Request URI
  pub uri: Uri,
}

impl RequestContext {
  pub fn new(method: Method, uri: Uri) -> Self {
    Self { request_id: Uuid::new_v4(), method, uri }
  }

  /// Log request start
  pub fn log_request_start(&self, user_agent: &str) {
    tracing::info!(
      request_id = %self.request_id,
      method = %self.method,
      path = self.uri.path(),
      user_agent,
      "Request started"
    );
  }

  /// Log request completion with status
  pub fn log_request_complete(&self, status_code: u16, duration_ms: f64) {
    if status_code >= 500 {
      tracing::error!(
        request_id = %self.request_id,
        method = %self.method,
        path = self.uri.path(),
        status = status_code,
        duration_ms,
        "Request failed"
      );
    } else {
      tracing::info!(
        request_id = %self.request_id,
        method = %self.method,
        path = self.uri.path(),
        status = status_code,
        duration_ms,
        "Request completed"
      );
    }
  }
}

/// Middleware to inject RequestContext into all requests
pub async fn request_context_middleware(mut request: Request, next: Next) -> Response {
  let context = RequestContext::new(request.method().clone(), request.uri().clone());
  let user_agent = request
    .headers()
    .get(USER_AGENT)
    .and_then(|value| value.to_str().ok())
    .unwrap_or("unknown")
    .to_string();

  let start_time = Instant::now();
  context.log_request_start(&user_agent);

  request.extensions_mut().insert(context.clone());
  let response = next.run(request).await;

  let duration_ms = start_time.elapsed().as_secs_f64() * 1000.0;
  context.log_request_complete(response.status().as_u16(), duration_ms);

  response
}
