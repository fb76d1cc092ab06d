//! Request routing: path-style bucket/key resolution and operation
//! identification.
//!
//! Requests are addressed as `/{bucket}/{key...}`. The operation is chosen from
//! the HTTP method and the presence of the `uploads`, `uploadId` and
//! `partNumber` query parameters:
//!
//! | Method | Query | Operation |
//! |--------|-------|-----------|
//! | GET | any | `GetObject` |
//! | PUT | none | `PutObject` |
//! | PUT | `partNumber` and `uploadId` | `UploadPart` |
//! | POST | `uploads` | `CreateMultipartUpload` |
//! | POST | `uploadId` | `CompleteMultipartUpload` |
//! | DELETE | none | `DeleteObject` |
//! | DELETE | `uploadId` | `AbortMultipartUpload` |
//!
//! Bucket and key are validated so that joining them onto the data directory
//! can never leave the bucket's subtree. Keys may carry empty segments
//! (`folder/`, `a//b`); storage collapses them the way a path join does.
//! Percent-encoded bytes must decode to UTF-8.

use std::fmt;
use std::num::NonZeroU32;

use http::Method;
use percent_encoding::percent_decode_str;

use crate::error::{S3Error, S3ErrorCode};

/// Operations served by fakes3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S3Operation {
    /// Read an object.
    GetObject,
    /// Store an object in one request.
    PutObject,
    /// Remove an object.
    DeleteObject,
    /// Start a multipart upload.
    CreateMultipartUpload,
    /// Store one numbered part of a multipart upload.
    UploadPart,
    /// Assemble the parts of a multipart upload into an object.
    CompleteMultipartUpload,
    /// Discard the parts of a multipart upload.
    AbortMultipartUpload,
}

impl S3Operation {
    /// Returns the operation name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetObject => "GetObject",
            Self::PutObject => "PutObject",
            Self::DeleteObject => "DeleteObject",
            Self::CreateMultipartUpload => "CreateMultipartUpload",
            Self::UploadPart => "UploadPart",
            Self::CompleteMultipartUpload => "CompleteMultipartUpload",
            Self::AbortMultipartUpload => "AbortMultipartUpload",
        }
    }
}

impl fmt::Display for S3Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result of routing a request.
#[derive(Debug, Clone)]
pub struct RoutingContext {
    /// The identified operation.
    pub operation: S3Operation,
    /// Decoded bucket name.
    pub bucket: String,
    /// Decoded object key; may contain `/`.
    pub key: String,
    /// Upload id for the multipart operations that take one.
    pub upload_id: Option<String>,
    /// Part number for `UploadPart`.
    pub part_number: Option<NonZeroU32>,
}

impl RoutingContext {
    /// The upload id, or an `InvalidArgument` error if the route carried none.
    pub fn require_upload_id(&self) -> Result<&str, S3Error> {
        self.upload_id
            .as_deref()
            .ok_or_else(|| S3Error::invalid_argument("uploadId is required"))
    }

    /// The part number, or an `InvalidArgument` error if the route carried none.
    pub fn require_part_number(&self) -> Result<NonZeroU32, S3Error> {
        self.part_number
            .ok_or_else(|| S3Error::invalid_argument("partNumber is required"))
    }
}

/// Resolve a request to a [`RoutingContext`].
///
/// # Errors
///
/// - `InvalidArgument` when the bucket or key is missing or unsafe, or when a
///   multipart parameter is empty or malformed.
/// - `NotFound` when the method and query name no operation.
/// - `MethodNotAllowed` for methods other than GET, PUT, POST and DELETE.
pub fn resolve<B>(req: &http::Request<B>) -> Result<RoutingContext, S3Error> {
    let method = req.method();
    let uri = req.uri();
    let query = parse_query_params(uri.query().unwrap_or(""))?;
    let (operation, upload_id, part_number) = identify_operation(method, uri.path(), &query)?;
    let (bucket, key) = parse_path(uri.path())?;

    Ok(RoutingContext {
        operation,
        bucket,
        key,
        upload_id,
        part_number,
    })
}

type Identified = (S3Operation, Option<String>, Option<NonZeroU32>);

fn identify_operation(
    method: &Method,
    path: &str,
    query: &[(String, String)],
) -> Result<Identified, S3Error> {
    let upload_id = query_value(query, "uploadId");
    let part_number = query_value(query, "partNumber");

    match *method {
        Method::GET => Ok((S3Operation::GetObject, None, None)),
        Method::PUT => match (part_number, upload_id) {
            (Some(part), Some(id)) => Ok((
                S3Operation::UploadPart,
                Some(non_empty_upload_id(id)?),
                Some(parse_part_number(part)?),
            )),
            _ if query.is_empty() => Ok((S3Operation::PutObject, None, None)),
            _ => Err(S3Error::unknown_operation(method, path)),
        },
        Method::POST => {
            if query_has_key(query, "uploads") {
                Ok((S3Operation::CreateMultipartUpload, None, None))
            } else if let Some(id) = upload_id {
                Ok((
                    S3Operation::CompleteMultipartUpload,
                    Some(non_empty_upload_id(id)?),
                    None,
                ))
            } else {
                Err(S3Error::unknown_operation(method, path))
            }
        }
        Method::DELETE => match upload_id {
            Some(id) => Ok((
                S3Operation::AbortMultipartUpload,
                Some(non_empty_upload_id(id)?),
                None,
            )),
            None if query.is_empty() => Ok((S3Operation::DeleteObject, None, None)),
            None => Err(S3Error::unknown_operation(method, path)),
        },
        _ => Err(S3Error::new(S3ErrorCode::MethodNotAllowed).with_resource(path)),
    }
}

/// Split `/{bucket}/{key...}` and validate both halves.
fn parse_path(path: &str) -> Result<(String, String), S3Error> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let Some((raw_bucket, raw_key)) = trimmed.split_once('/') else {
        return Err(S3Error::invalid_argument("bucket and key are required").with_resource(path));
    };

    let bucket = decode_uri_component(raw_bucket)?;
    if bucket.is_empty() || !is_safe_segment(&bucket) || bucket.contains('/') {
        return Err(S3Error::invalid_argument("invalid bucket name").with_resource(path));
    }

    let key = decode_uri_component(raw_key)?;
    let mut segments = key.split('/').filter(|segment| !segment.is_empty());
    if !segments.clone().all(is_safe_segment) || segments.next().is_none() {
        return Err(S3Error::invalid_argument("invalid object key").with_resource(path));
    }

    Ok((bucket, key))
}

/// A path segment that cannot step outside its parent directory.
fn is_safe_segment(segment: &str) -> bool {
    segment != "." && segment != ".." && !segment.contains('\0')
}

fn non_empty_upload_id(id: &str) -> Result<String, S3Error> {
    if id.is_empty() || !is_safe_segment(id) || id.contains('/') {
        return Err(S3Error::invalid_argument("invalid uploadId").with_resource(id));
    }
    Ok(id.to_owned())
}

/// Parse a part number. Zero and non-numeric values are rejected; there is
/// no upper bound beyond `u32`.
fn parse_part_number(value: &str) -> Result<NonZeroU32, S3Error> {
    value
        .parse::<NonZeroU32>()
        .map_err(|_| S3Error::invalid_argument("invalid partNumber").with_resource(value))
}

/// Decode a percent-encoded URI component. Bytes that do not form UTF-8 are
/// rejected rather than replaced, so distinct encodings stay distinct.
fn decode_uri_component(s: &str) -> Result<String, S3Error> {
    percent_decode_str(s)
        .decode_utf8()
        .map(std::borrow::Cow::into_owned)
        .map_err(|_| {
            S3Error::invalid_argument("percent-encoding is not valid UTF-8").with_resource(s)
        })
}

/// Parse a query string into key-value pairs.
fn parse_query_params(query: &str) -> Result<Vec<(String, String)>, S3Error> {
    query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => Ok((decode_uri_component(k)?, decode_uri_component(v)?)),
            None => Ok((decode_uri_component(pair)?, String::new())),
        })
        .collect()
}

fn query_has_key(params: &[(String, String)], key: &str) -> bool {
    params.iter().any(|(k, _)| k == key)
}

fn query_value<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}
