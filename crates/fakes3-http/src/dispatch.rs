//! The boundary between the HTTP layer and the storage-backed handler.

use std::future::Future;
use std::pin::Pin;

use crate::body::{RequestBody, ResponseBody};
use crate::error::S3Error;
use crate::router::RoutingContext;

/// Boxed future returned by [`S3Handler::handle_operation`].
pub type HandlerFuture =
    Pin<Box<dyn Future<Output = Result<http::Response<ResponseBody>, S3Error>> + Send>>;

/// Business logic behind the routed operations.
///
/// The service calls this after routing; the body is handed over unread.
/// Implementors return a complete response; common headers are added by the
/// service.
pub trait S3Handler: Send + Sync + 'static {
    /// Handle one routed request.
    fn handle_operation(
        &self,
        parts: http::request::Parts,
        body: RequestBody,
        ctx: RoutingContext,
    ) -> HandlerFuture;
}

/// Dispatch a routed request to the handler.
pub async fn dispatch_operation<H: S3Handler>(
    handler: &H,
    parts: http::request::Parts,
    body: RequestBody,
    ctx: RoutingContext,
) -> Result<http::Response<ResponseBody>, S3Error> {
    tracing::debug!(
        operation = %ctx.operation,
        bucket = %ctx.bucket,
        key = %ctx.key,
        upload_id = ?ctx.upload_id,
        "dispatching S3 operation"
    );
    handler.handle_operation(parts, body, ctx).await
}

/// A handler that rejects every operation with `NotImplemented`.
///
/// Useful for exercising routing and the service pipeline in isolation.
#[derive(Debug, Clone, Default)]
pub struct NotImplementedHandler;

impl S3Handler for NotImplementedHandler {
    fn handle_operation(
        &self,
        _parts: http::request::Parts,
        _body: RequestBody,
        ctx: RoutingContext,
    ) -> HandlerFuture {
        Box::pin(async move { Err(S3Error::not_implemented(ctx.operation.as_str())) })
    }
}
