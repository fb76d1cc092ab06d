//! Response construction helpers shared by the service and handlers.

use http::header::{self, HeaderMap, HeaderValue};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::body::ResponseBody;
use crate::error::S3Error;
use crate::xml::error_to_xml;

/// Headers a browser client may read from an object response.
pub const CORS_EXPOSE_HEADERS: &str =
    "ETag, Accept-Ranges, Content-Range, Content-Encoding, Content-Length";

/// Characters escaped in one segment of an object location. Unreserved
/// characters and the sub-delimiters allowed in a path segment stay literal.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b':')
    .remove(b'=')
    .remove(b'@');

/// Build a response with the given status and body.
#[must_use]
pub fn response(status: http::StatusCode, body: ResponseBody) -> http::Response<ResponseBody> {
    let mut resp = http::Response::new(body);
    *resp.status_mut() = status;
    resp
}

/// Build a 200 response carrying an XML document.
#[must_use]
pub fn xml_response(xml: Vec<u8>) -> http::Response<ResponseBody> {
    let mut resp = response(http::StatusCode::OK, ResponseBody::from_bytes(xml));
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/xml"),
    );
    resp
}

/// Build a bodiless response.
#[must_use]
pub fn empty_response(status: http::StatusCode) -> http::Response<ResponseBody> {
    response(status, ResponseBody::empty())
}

/// Convert an [`S3Error`] into an XML error response.
#[must_use]
pub fn error_to_response(err: &S3Error, request_id: &str) -> http::Response<ResponseBody> {
    let xml = error_to_xml(
        err.code.as_str(),
        &err.message,
        err.resource.as_deref(),
        request_id,
    );
    let mut resp = response(err.status_code, ResponseBody::from_bytes(xml));
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/xml"),
    );
    resp
}

/// Add the permissive CORS headers sent with object reads.
pub fn add_object_cors_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static(CORS_EXPOSE_HEADERS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
}

/// Set the `ETag` header. Values that are not valid header text are skipped.
pub fn set_etag(headers: &mut HeaderMap, etag: &str) {
    if let Ok(hv) = HeaderValue::from_str(etag) {
        headers.insert(header::ETAG, hv);
    }
}

/// Absolute URL of `(bucket, key)` as advertised to clients.
///
/// `advertised_addr` wins when set; otherwise the address is `http://` plus
/// the request's `Host`. Each `/`-separated segment of bucket and key is
/// percent-escaped.
#[must_use]
pub fn object_location(
    advertised_addr: &str,
    host: Option<&str>,
    bucket: &str,
    key: &str,
) -> String {
    let base = if advertised_addr.is_empty() {
        format!("http://{}", host.unwrap_or_default())
    } else {
        advertised_addr.trim_end_matches('/').to_owned()
    };
    format!("{base}/{}/{}", escape_path(bucket), escape_path(key))
}

/// Format a timestamp as an RFC 7231 HTTP date.
#[must_use]
pub fn http_date(ts: chrono::DateTime<chrono::Utc>) -> String {
    ts.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn escape_path(path: &str) -> String {
    path.split('/')
        .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}
