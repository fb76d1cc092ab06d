//! The fakes3 HTTP service implementing hyper's `Service` trait.
//!
//! [`S3HttpService`] runs every request through the same pipeline:
//!
//! 1. Health check interception (`GET /_health`, `GET /health`)
//! 2. CORS preflight (`OPTIONS`)
//! 3. Routing via [`router::resolve`](crate::router::resolve)
//! 4. Dispatch to the [`S3Handler`] with the request body still streaming
//! 5. Error formatting and common response headers (`Server`, `Date`,
//!    `x-amz-request-id`, `x-amz-id-2`)

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::header::{self, HeaderValue};
use hyper::service::Service;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::body::{ResponseBody, request_body};
use crate::dispatch::{S3Handler, dispatch_operation};
use crate::error::S3Error;
use crate::response::{add_object_cors_headers, error_to_response, http_date, response};
use crate::router;

/// Value of the `Server` header on every response.
pub const SERVER_NAME: &str = "AmazonS3";

/// The fakes3 HTTP service.
///
/// Generic over the request body so that it can serve hyper connections
/// (`Incoming`) and be driven in-process with buffered bodies.
pub struct S3HttpService<H: S3Handler> {
    handler: Arc<H>,
}

impl<H: S3Handler> S3HttpService<H> {
    /// Create a service around `handler`.
    #[must_use]
    pub fn new(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }
}

impl<H: S3Handler> Clone for S3HttpService<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<H: S3Handler> fmt::Debug for S3HttpService<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3HttpService").finish_non_exhaustive()
    }
}

impl<H, B> Service<http::Request<B>> for S3HttpService<H>
where
    H: S3Handler,
    B: http_body::Body + Send + 'static,
    B::Data: Send,
    B::Error: fmt::Display,
{
    type Response = http::Response<ResponseBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<B>) -> Self::Future {
        let handler = Arc::clone(&self.handler);

        Box::pin(async move {
            let request_id = Uuid::new_v4().to_string();
            let response = process_request(req, handler.as_ref(), &request_id).await;
            Ok(add_common_headers(response, &request_id))
        })
    }
}

async fn process_request<H, B>(
    req: http::Request<B>,
    handler: &H,
    request_id: &str,
) -> http::Response<ResponseBody>
where
    H: S3Handler,
    B: http_body::Body + Send + 'static,
    B::Error: fmt::Display,
{
    let method = req.method().clone();
    let uri = req.uri().clone();
    debug!(%method, %uri, request_id, "processing S3 request");

    if is_health_check(&method, uri.path()) {
        return health_check_response();
    }

    if method == http::Method::OPTIONS {
        return cors_preflight_response();
    }

    let ctx = match router::resolve(&req) {
        Ok(ctx) => ctx,
        Err(err) => {
            warn!(%method, %uri, error = %err, request_id, "failed to route S3 request");
            return error_to_response(&err, request_id);
        }
    };

    info!(
        operation = %ctx.operation,
        bucket = %ctx.bucket,
        key = %ctx.key,
        request_id,
        "routed S3 request"
    );

    let (parts, incoming) = req.into_parts();
    let operation = ctx.operation;
    match dispatch_operation(handler, parts, request_body(incoming), ctx).await {
        Ok(response) => response,
        Err(err) => {
            if err.status_code.is_server_error() {
                error!(%operation, error = %err, request_id, "S3 operation failed");
            } else {
                debug!(%operation, error = %err, request_id, "S3 operation returned error");
            }
            error_to_response(&err, request_id)
        }
    }
}

fn is_health_check(method: &http::Method, path: &str) -> bool {
    *method == http::Method::GET && (path == "/_health" || path == "/health")
}

fn health_check_response() -> http::Response<ResponseBody> {
    let mut resp = response(
        http::StatusCode::OK,
        ResponseBody::from_string(r#"{"status":"running","service":"fakes3"}"#),
    );
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    resp
}

fn cors_preflight_response() -> http::Response<ResponseBody> {
    let mut resp = response(http::StatusCode::OK, ResponseBody::empty());
    let headers = resp.headers_mut();
    add_object_cors_headers(headers);
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("86400"),
    );
    resp
}

/// Add the headers every response carries.
fn add_common_headers(
    mut response: http::Response<ResponseBody>,
    request_id: &str,
) -> http::Response<ResponseBody> {
    let headers = response.headers_mut();

    if let Ok(hv) = HeaderValue::from_str(request_id) {
        headers.insert("x-amz-request-id", hv);
    }
    if let Ok(hv) = HeaderValue::from_str(&Uuid::new_v4().to_string()) {
        headers.insert("x-amz-id-2", hv);
    }
    headers.insert(header::SERVER, HeaderValue::from_static(SERVER_NAME));
    if let Ok(hv) = HeaderValue::from_str(&http_date(chrono::Utc::now())) {
        headers.insert(header::DATE, hv);
    }

    response
}
