//! HTTP layer for fakes3: routing, XML envelopes, and the hyper service.
//!
//! - **Routing** ([`router`]): maps method, path and query to an
//!   [`S3Operation`](router::S3Operation) with a validated bucket and key.
//! - **Dispatch** ([`dispatch`]): hands routed requests to the business logic
//!   through the [`S3Handler`](dispatch::S3Handler) trait.
//! - **Responses** ([`response`], [`xml`]): XML result and error documents,
//!   CORS headers, object locations.
//! - **Service** ([`service`]): [`S3HttpService`](service::S3HttpService), the
//!   hyper `Service` tying the pieces together.
//! - **Body** ([`body`]): [`ResponseBody`](body::ResponseBody), buffered,
//!   file-streaming or empty, and [`RequestBody`](body::RequestBody), the
//!   unbuffered inbound body.
//!
//! # Architecture
//!
//! ```text
//! HTTP Request
//!   -> S3HttpService (hyper Service)
//!     -> Health check / CORS preflight interception
//!     -> router::resolve (operation + bucket/key validation)
//!     -> dispatch_operation (S3Handler trait, body still streaming)
//!     -> Common response headers (x-amz-request-id, Server, Date)
//!   <- HTTP Response
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use fakes3_http::dispatch::NotImplementedHandler;
//! use fakes3_http::service::S3HttpService;
//!
//! let service = S3HttpService::new(NotImplementedHandler);
//! // Use `service` with a hyper server.
//! ```

// S3Error carries a boxed source and several strings; it is returned by value
// on every handler path.
#![allow(clippy::result_large_err)]

pub mod body;
pub mod dispatch;
pub mod error;
pub mod response;
pub mod router;
pub mod service;
pub mod xml;

pub use body::{RequestBody, ResponseBody};
pub use dispatch::{HandlerFuture, NotImplementedHandler, S3Handler};
pub use error::{S3Error, S3ErrorCode};
pub use router::{RoutingContext, S3Operation};
pub use service::S3HttpService;
