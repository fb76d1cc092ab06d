//! [`S3Handler`] implementation backed by the filesystem stores.
//!
//! Each routed operation maps onto one [`FakeS3`] store call:
//!
//! | Operation | Store call |
//! |-----------|------------|
//! | `GetObject` | [`ObjectStore::get_object_path`](fakes3_core::ObjectStore::get_object_path) |
//! | `PutObject` | [`ObjectStore::put_object`](fakes3_core::ObjectStore::put_object) |
//! | `DeleteObject` | [`ObjectStore::delete_object`](fakes3_core::ObjectStore::delete_object) |
//! | `CreateMultipartUpload` | none, a fresh upload id is minted |
//! | `UploadPart` | [`PartStore::store_part`](fakes3_core::PartStore::store_part) |
//! | `CompleteMultipartUpload` | [`ObjectStore::merge_parts`](fakes3_core::ObjectStore::merge_parts) |
//! | `AbortMultipartUpload` | [`PartStore::abort_upload`](fakes3_core::PartStore::abort_upload) |

use std::io;

use fakes3_core::FakeS3;
use fakes3_http::body::{RequestBody, ResponseBody};
use fakes3_http::dispatch::{HandlerFuture, S3Handler};
use fakes3_http::error::S3Error;
use fakes3_http::response::{
    add_object_cors_headers, empty_response, http_date, object_location, response, set_etag,
    xml_response,
};
use fakes3_http::router::{RoutingContext, S3Operation};
use fakes3_http::xml::{CompleteMultipartUploadResult, InitiateMultipartUploadResult};
use futures::TryStreamExt;
use http::header::{self, HeaderValue};
use http_body_util::BodyExt;
use md5::{Digest, Md5};
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tracing::{debug, info};
use uuid::Uuid;

/// Handler serving S3 operations from a [`FakeS3`] provider.
#[derive(Debug, Clone)]
pub struct FakeS3Handler(pub FakeS3);

impl S3Handler for FakeS3Handler {
    fn handle_operation(
        &self,
        parts: http::request::Parts,
        body: RequestBody,
        ctx: RoutingContext,
    ) -> HandlerFuture {
        let provider = self.0.clone();
        Box::pin(async move {
            match ctx.operation {
                S3Operation::GetObject => get_object(&provider, &ctx).await,
                S3Operation::PutObject => put_object(&provider, &ctx, body).await,
                S3Operation::DeleteObject => delete_object(&provider, &ctx).await,
                S3Operation::CreateMultipartUpload => create_multipart_upload(&ctx),
                S3Operation::UploadPart => upload_part(&provider, &ctx, body).await,
                S3Operation::CompleteMultipartUpload => {
                    complete_multipart_upload(&provider, &parts, &ctx).await
                }
                S3Operation::AbortMultipartUpload => abort_multipart_upload(&provider, &ctx).await,
            }
        })
    }
}

type HandlerResult = Result<http::Response<ResponseBody>, S3Error>;

// ---------------------------------------------------------------------------
// Objects
// ---------------------------------------------------------------------------

async fn get_object(provider: &FakeS3, ctx: &RoutingContext) -> HandlerResult {
    let missing = || S3Error::no_such_key(&ctx.bucket, &ctx.key);

    let path = provider
        .objects()
        .get_object_path(&ctx.bucket, &ctx.key)
        .await
        .ok_or_else(missing)?;

    // The object may be deleted between the lookup and the open.
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(missing()),
        Err(e) => return Err(S3Error::internal_error("cannot open object").with_source(e)),
    };
    let metadata = file
        .metadata()
        .await
        .map_err(|e| S3Error::internal_error("cannot stat object").with_source(e))?;

    let len = metadata.len();
    let mut resp = response(http::StatusCode::OK, ResponseBody::from_file(file, len));
    let headers = resp.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    if let Ok(modified) = metadata.modified() {
        if let Ok(hv) = HeaderValue::from_str(&http_date(modified.into())) {
            headers.insert(header::LAST_MODIFIED, hv);
        }
    }
    add_object_cors_headers(headers);

    debug!(bucket = %ctx.bucket, key = %ctx.key, size = len, "serving object");
    Ok(resp)
}

async fn put_object(provider: &FakeS3, ctx: &RoutingContext, body: RequestBody) -> HandlerResult {
    let mut hasher = Md5::new();
    let size = provider
        .objects()
        .put_object(&ctx.bucket, &ctx.key, &mut hashing_reader(body, &mut hasher))
        .await?;
    debug!(bucket = %ctx.bucket, key = %ctx.key, size, "stored object");

    let mut resp = empty_response(http::StatusCode::OK);
    set_etag(resp.headers_mut(), &quoted_hex(&hasher.finalize()));
    Ok(resp)
}

async fn delete_object(provider: &FakeS3, ctx: &RoutingContext) -> HandlerResult {
    provider
        .objects()
        .delete_object(&ctx.bucket, &ctx.key)
        .await?;
    Ok(empty_response(http::StatusCode::NO_CONTENT))
}

// ---------------------------------------------------------------------------
// Multipart uploads
// ---------------------------------------------------------------------------

fn create_multipart_upload(ctx: &RoutingContext) -> HandlerResult {
    let upload_id = Uuid::new_v4().to_string();
    info!(bucket = %ctx.bucket, key = %ctx.key, %upload_id, "initiated multipart upload");

    let xml = InitiateMultipartUploadResult {
        bucket: ctx.bucket.clone(),
        key: ctx.key.clone(),
        upload_id,
    }
    .to_xml()
    .map_err(|e| S3Error::internal_error("cannot serialize response").with_source(e))?;
    Ok(xml_response(xml))
}

async fn upload_part(provider: &FakeS3, ctx: &RoutingContext, body: RequestBody) -> HandlerResult {
    let upload_id = ctx.require_upload_id()?;
    let part_number = ctx.require_part_number()?;

    let mut hasher = Md5::new();
    provider
        .parts()
        .store_part(upload_id, part_number, &mut hashing_reader(body, &mut hasher))
        .await?;

    let mut resp = empty_response(http::StatusCode::OK);
    set_etag(resp.headers_mut(), &quoted_hex(&hasher.finalize()));
    Ok(resp)
}

async fn complete_multipart_upload(
    provider: &FakeS3,
    parts: &http::request::Parts,
    ctx: &RoutingContext,
) -> HandlerResult {
    let upload_id = ctx.require_upload_id()?;

    let report = provider
        .objects()
        .merge_parts(&ctx.bucket, &ctx.key, upload_id, provider.parts())
        .await?;
    info!(
        bucket = %ctx.bucket,
        key = %ctx.key,
        upload_id,
        parts = report.part_numbers.len(),
        size = report.size,
        "completed multipart upload"
    );

    let host = parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| parts.uri.authority().map(http::uri::Authority::as_str));
    let e_tag = random_etag();
    let xml = CompleteMultipartUploadResult {
        location: object_location(
            &provider.config().advertised_addr,
            host,
            &ctx.bucket,
            &ctx.key,
        ),
        bucket: ctx.bucket.clone(),
        key: ctx.key.clone(),
        e_tag: e_tag.clone(),
    }
    .to_xml()
    .map_err(|e| S3Error::internal_error("cannot serialize response").with_source(e))?;

    let mut resp = xml_response(xml);
    set_etag(resp.headers_mut(), &e_tag);
    Ok(resp)
}

async fn abort_multipart_upload(provider: &FakeS3, ctx: &RoutingContext) -> HandlerResult {
    let upload_id = ctx.require_upload_id()?;
    let existed = provider.parts().abort_upload(upload_id).await?;
    debug!(upload_id, existed, "aborted multipart upload");
    Ok(empty_response(http::StatusCode::NO_CONTENT))
}

// ---------------------------------------------------------------------------
// ETags
// ---------------------------------------------------------------------------

/// Adapt a request body into an `AsyncRead`, feeding every chunk to
/// `hasher` on its way to the store.
fn hashing_reader(body: RequestBody, hasher: &mut Md5) -> impl AsyncRead + Unpin + Send + '_ {
    let chunks = body
        .into_data_stream()
        .inspect_ok(move |chunk| hasher.update(chunk));
    StreamReader::new(chunks)
}

/// Quoted hex form of a digest, as carried in `ETag`.
fn quoted_hex(digest: &[u8]) -> String {
    format!("\"{}\"", hex::encode(digest))
}

/// ETag for an assembled multipart object. The parts are not re-read, so the
/// tag is a fresh random value rather than a digest of the content.
fn random_etag() -> String {
    quoted_hex(&Md5::digest(Uuid::new_v4().as_bytes()))
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use bytes::Bytes;
    use fakes3_core::config::FakeS3Config;
    use fakes3_http::service::S3HttpService;
    use futures::Stream;
    use http_body_util::{Full, StreamBody};
    use hyper::body::Frame;
    use hyper::service::Service;

    use super::*;

    struct Harness {
        _root: tempfile::TempDir,
        data_dir: std::path::PathBuf,
        service: S3HttpService<FakeS3Handler>,
    }

    async fn harness_with(advertised_addr: &str) -> Harness {
        let root = tempfile::tempdir().expect("tempdir");
        let data_dir = root.path().join("data");
        let config = FakeS3Config::builder()
            .data_dir(data_dir.clone())
            .advertised_addr(advertised_addr.to_owned())
            .build();
        let provider = FakeS3::new(config);
        provider.init().await.expect("init data dir");
        Harness {
            _root: root,
            data_dir,
            service: S3HttpService::new(FakeS3Handler(provider)),
        }
    }

    async fn harness() -> Harness {
        harness_with("").await
    }

    impl Harness {
        async fn send(
            &self,
            method: http::Method,
            uri: &str,
            body: impl Into<Bytes>,
        ) -> http::Response<ResponseBody> {
            self.send_body(method, uri, Full::new(body.into())).await
        }

        async fn send_body<B>(
            &self,
            method: http::Method,
            uri: &str,
            body: B,
        ) -> http::Response<ResponseBody>
        where
            B: hyper::body::Body + Send + 'static,
            B::Data: Send,
            B::Error: std::fmt::Display,
        {
            let req = http::Request::builder()
                .method(method)
                .uri(uri)
                .header(header::HOST, "localhost:8000")
                .body(body)
                .expect("valid request");
            let result: Result<_, Infallible> = self.service.call(req).await;
            match result {
                Ok(resp) => resp,
                Err(never) => match never {},
            }
        }
    }

    fn header_str<'a>(resp: &'a http::Response<ResponseBody>, name: &str) -> Option<&'a str> {
        resp.headers().get(name).and_then(|v| v.to_str().ok())
    }

    async fn body_bytes(resp: http::Response<ResponseBody>) -> Bytes {
        resp.into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes()
    }

    async fn body_string(resp: http::Response<ResponseBody>) -> String {
        String::from_utf8(body_bytes(resp).await.to_vec()).expect("utf-8 body")
    }

    fn extract_tag(xml: &str, tag: &str) -> String {
        let open = format!("<{tag}>");
        let close = format!("</{tag}>");
        let start = xml.find(&open).expect("open tag") + open.len();
        let end = xml[start..].find(&close).expect("close tag") + start;
        xml[start..end].to_owned()
    }

    #[tokio::test]
    async fn test_should_put_get_and_delete_object() {
        let h = harness().await;

        let resp = h
            .send(http::Method::PUT, "/bucket/dir/hello.txt", "hello world")
            .await;
        assert_eq!(resp.status(), http::StatusCode::OK);
        assert_eq!(
            header_str(&resp, "etag"),
            Some("\"5eb63bbbe01eeed093cb22bb8f5acdc3\"")
        );

        let resp = h.send(http::Method::GET, "/bucket/dir/hello.txt", "").await;
        assert_eq!(resp.status(), http::StatusCode::OK);
        assert_eq!(
            header_str(&resp, "content-type"),
            Some("application/octet-stream")
        );
        assert_eq!(header_str(&resp, "content-length"), Some("11"));
        assert_eq!(header_str(&resp, "access-control-allow-origin"), Some("*"));
        assert!(header_str(&resp, "last-modified").is_some());
        assert_eq!(body_bytes(resp).await.as_ref(), b"hello world");

        let resp = h.send(http::Method::DELETE, "/bucket/dir/hello.txt", "").await;
        assert_eq!(resp.status(), http::StatusCode::NO_CONTENT);

        let resp = h.send(http::Method::GET, "/bucket/dir/hello.txt", "").await;
        assert_eq!(resp.status(), http::StatusCode::NOT_FOUND);
        assert!(body_string(resp).await.contains("<Code>NoSuchKey</Code>"));
    }

    #[tokio::test]
    async fn test_should_delete_missing_object() {
        let h = harness().await;
        let resp = h.send(http::Method::DELETE, "/bucket/missing", "").await;
        assert_eq!(resp.status(), http::StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_should_not_serve_directory_as_object() {
        let h = harness().await;
        h.send(http::Method::PUT, "/bucket/dir/file", "x").await;

        let resp = h.send(http::Method::GET, "/bucket/dir", "").await;
        assert_eq!(resp.status(), http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_should_run_multipart_upload() {
        let h = harness().await;

        let resp = h.send(http::Method::POST, "/b/big/file.bin?uploads", "").await;
        assert_eq!(resp.status(), http::StatusCode::OK);
        assert_eq!(header_str(&resp, "content-type"), Some("application/xml"));
        let xml = body_string(resp).await;
        assert!(xml.contains("xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\""));
        assert_eq!(extract_tag(&xml, "Bucket"), "b");
        assert_eq!(extract_tag(&xml, "Key"), "big/file.bin");
        let upload_id = extract_tag(&xml, "UploadId");

        // Upload out of order.
        for (number, payload) in [(2, "BBBB"), (10, "CCCC"), (1, "AAAA")] {
            let uri = format!("/b/big/file.bin?partNumber={number}&uploadId={upload_id}");
            let resp = h.send(http::Method::PUT, &uri, payload).await;
            assert_eq!(resp.status(), http::StatusCode::OK, "part {number}");
            assert!(header_str(&resp, "etag").is_some());
        }

        let uri = format!("/b/big/file.bin?uploadId={upload_id}");
        let resp = h.send(http::Method::POST, &uri, "<CompleteMultipartUpload/>").await;
        assert_eq!(resp.status(), http::StatusCode::OK);
        let etag = header_str(&resp, "etag").expect("etag").to_owned();
        let xml = body_string(resp).await;
        assert_eq!(
            extract_tag(&xml, "Location"),
            "http://localhost:8000/b/big/file.bin"
        );
        assert_eq!(extract_tag(&xml, "Key"), "big/file.bin");
        assert!(xml.contains(etag.trim_matches('"')));

        let resp = h.send(http::Method::GET, "/b/big/file.bin", "").await;
        assert_eq!(body_bytes(resp).await.as_ref(), b"AAAABBBBCCCC");

        assert!(!h.data_dir.join("parts").join(&upload_id).exists());

        // The upload id is spent.
        let resp = h.send(http::Method::POST, &uri, "").await;
        assert_eq!(resp.status(), http::StatusCode::NOT_FOUND);
        assert!(body_string(resp).await.contains("<Code>NoSuchUpload</Code>"));
    }

    #[tokio::test]
    async fn test_should_use_advertised_address_in_location() {
        let h = harness_with("https://files.example.com").await;
        h.send(http::Method::PUT, "/b/k?partNumber=1&uploadId=u1", "x")
            .await;

        let resp = h.send(http::Method::POST, "/b/a%20b?uploadId=u1", "").await;
        // Different key, same upload: the parts are keyed by upload id only.
        assert_eq!(resp.status(), http::StatusCode::OK);
        let xml = body_string(resp).await;
        assert_eq!(
            extract_tag(&xml, "Location"),
            "https://files.example.com/b/a%20b"
        );
    }

    #[tokio::test]
    async fn test_should_abort_multipart_upload() {
        let h = harness().await;
        h.send(http::Method::PUT, "/b/k?partNumber=1&uploadId=u1", "x")
            .await;
        assert!(h.data_dir.join("parts/u1").exists());

        let resp = h.send(http::Method::DELETE, "/b/k?uploadId=u1", "").await;
        assert_eq!(resp.status(), http::StatusCode::NO_CONTENT);
        assert!(!h.data_dir.join("parts/u1").exists());

        let resp = h.send(http::Method::DELETE, "/b/k?uploadId=u1", "").await;
        assert_eq!(resp.status(), http::StatusCode::NO_CONTENT);

        let resp = h.send(http::Method::POST, "/b/k?uploadId=u1", "").await;
        assert_eq!(resp.status(), http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_should_report_corrupt_upload_as_internal_error() {
        let h = harness().await;
        h.send(http::Method::PUT, "/b/k?partNumber=1&uploadId=u1", "x")
            .await;
        tokio::fs::write(h.data_dir.join("parts/u1/stray"), b"?")
            .await
            .expect("write stray entry");

        let resp = h.send(http::Method::POST, "/b/k?uploadId=u1", "").await;
        assert_eq!(resp.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_string(resp).await.contains("<Code>InternalError</Code>"));

        let resp = h.send(http::Method::GET, "/b/k", "").await;
        assert_eq!(resp.status(), http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_should_reject_path_traversal() {
        let h = harness().await;
        let resp = h
            .send(http::Method::PUT, "/b/..%2F..%2Fescape", "nope")
            .await;
        assert_eq!(resp.status(), http::StatusCode::BAD_REQUEST);
        assert!(!h.data_dir.join("escape").exists());
    }

    /// A request body delivered as separate frames.
    fn chunked(
        chunks: Vec<io::Result<&'static str>>,
    ) -> StreamBody<impl Stream<Item = io::Result<Frame<Bytes>>> + Send + 'static> {
        StreamBody::new(futures::stream::iter(chunks.into_iter().map(|chunk| {
            chunk.map(|data| Frame::data(Bytes::from_static(data.as_bytes())))
        })))
    }

    #[tokio::test]
    async fn test_should_stream_chunked_uploads_to_disk() {
        let h = harness().await;

        let body = chunked(vec![Ok("hello"), Ok(" "), Ok("world")]);
        let resp = h.send_body(http::Method::PUT, "/b/streamed", body).await;
        assert_eq!(resp.status(), http::StatusCode::OK);
        assert_eq!(
            header_str(&resp, "etag"),
            Some("\"5eb63bbbe01eeed093cb22bb8f5acdc3\"")
        );

        let resp = h.send(http::Method::POST, "/b/mp?uploads", "").await;
        let upload_id = extract_tag(&body_string(resp).await, "UploadId");
        let body = chunked(vec![Ok("AA"), Ok("AA")]);
        let uri = format!("/b/mp?partNumber=1&uploadId={upload_id}");
        let resp = h.send_body(http::Method::PUT, &uri, body).await;
        assert_eq!(resp.status(), http::StatusCode::OK);
        assert_eq!(
            header_str(&resp, "etag"),
            Some(quoted_hex(&Md5::digest(b"AAAA")).as_str())
        );

        let resp = h.send(http::Method::GET, "/b/streamed", "").await;
        assert_eq!(body_bytes(resp).await.as_ref(), b"hello world");
    }

    #[tokio::test]
    async fn test_should_discard_upload_when_body_fails_mid_stream() {
        let h = harness().await;
        h.send(http::Method::PUT, "/b/obj", "previous").await;

        let body = chunked(vec![
            Ok("partial"),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer went away")),
        ]);
        let resp = h.send_body(http::Method::PUT, "/b/obj", body).await;
        assert_eq!(resp.status(), http::StatusCode::INTERNAL_SERVER_ERROR);

        let resp = h.send(http::Method::GET, "/b/obj", "").await;
        assert_eq!(body_bytes(resp).await.as_ref(), b"previous");
        let mut scratch = std::fs::read_dir(h.data_dir.join("tmp")).expect("scratch dir");
        assert!(scratch.next().is_none(), "staging file left behind");
    }

    #[tokio::test]
    async fn test_should_keep_distinct_encoded_keys_apart() {
        let h = harness().await;

        for uri in ["/b/%FF", "/b/%FE"] {
            let resp = h.send(http::Method::PUT, uri, "bytes").await;
            assert_eq!(resp.status(), http::StatusCode::BAD_REQUEST, "{uri}");
        }
        assert!(!h.data_dir.join("objects").join("b").exists());

        h.send(http::Method::PUT, "/b/caf%C3%A9", "accented").await;
        h.send(http::Method::PUT, "/b/cafe", "plain").await;
        let resp = h.send(http::Method::GET, "/b/caf%C3%A9", "").await;
        assert_eq!(body_bytes(resp).await.as_ref(), b"accented");
    }

    #[tokio::test]
    async fn test_should_store_keys_with_empty_segments() {
        let h = harness().await;

        let resp = h.send(http::Method::PUT, "/b/folder/", "").await;
        assert_eq!(resp.status(), http::StatusCode::OK);
        assert!(h.data_dir.join("objects/b/folder").is_file());

        let resp = h.send(http::Method::PUT, "/b/a//b", "nested").await;
        assert_eq!(resp.status(), http::StatusCode::OK);
        let resp = h.send(http::Method::GET, "/b/a/b", "").await;
        assert_eq!(body_bytes(resp).await.as_ref(), b"nested");

        let resp = h.send(http::Method::DELETE, "/b/a//b", "").await;
        assert_eq!(resp.status(), http::StatusCode::NO_CONTENT);
        assert!(!h.data_dir.join("objects/b/a/b").exists());
    }

    #[test]
    fn test_should_quote_hex_digest() {
        assert_eq!(
            quoted_hex(&Md5::digest(b"")),
            "\"d41d8cd98f00b204e9800998ecf8427e\""
        );
    }

    #[test]
    fn test_should_generate_distinct_random_etags() {
        let a = random_etag();
        let b = random_etag();
        assert_ne!(a, b);
        assert_eq!(a.len(), 34);
        assert!(a.starts_with('"') && a.ends_with('"'));
    }
}
