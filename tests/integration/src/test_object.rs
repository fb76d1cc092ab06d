//! Object read/write/delete integration tests.

#[cfg(test)]
mod tests {
    use aws_sdk_s3::primitives::ByteStream;

    use crate::{get_object_bytes, s3_client, test_bucket_name};

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_put_and_get_object() {
        let client = s3_client();
        let bucket = test_bucket_name("putget");

        let body = b"hello, fakes3!";
        let put = client
            .put_object()
            .bucket(&bucket)
            .key("greeting.txt")
            .body(ByteStream::from_static(body))
            .send()
            .await
            .expect("put_object");
        assert!(put.e_tag().is_some(), "put should return an etag");

        let resp = client
            .get_object()
            .bucket(&bucket)
            .key("greeting.txt")
            .send()
            .await
            .expect("get_object");
        assert_eq!(resp.content_length(), Some(14));
        assert_eq!(resp.content_type(), Some("application/octet-stream"));

        let data = resp
            .body
            .collect()
            .await
            .expect("collect body")
            .into_bytes();
        assert_eq!(data.as_ref(), body);
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_store_nested_keys() {
        let client = s3_client();
        let bucket = test_bucket_name("nested");

        client
            .put_object()
            .bucket(&bucket)
            .key("a/b/c/deep file.txt")
            .body(ByteStream::from_static(b"deep"))
            .send()
            .await
            .expect("put nested object");

        let data = get_object_bytes(&client, &bucket, "a/b/c/deep file.txt").await;
        assert_eq!(data.as_ref(), b"deep");
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_replace_existing_object() {
        let client = s3_client();
        let bucket = test_bucket_name("replace");

        for content in [&b"first version"[..], &b"v2"[..]] {
            client
                .put_object()
                .bucket(&bucket)
                .key("doc")
                .body(ByteStream::from(content.to_vec()))
                .send()
                .await
                .expect("put_object");
        }

        let data = get_object_bytes(&client, &bucket, "doc").await;
        assert_eq!(data.as_ref(), b"v2");
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_delete_object() {
        let client = s3_client();
        let bucket = test_bucket_name("delete");

        client
            .put_object()
            .bucket(&bucket)
            .key("gone")
            .body(ByteStream::from_static(b"x"))
            .send()
            .await
            .expect("put_object");

        client
            .delete_object()
            .bucket(&bucket)
            .key("gone")
            .send()
            .await
            .expect("delete_object");

        let err = client
            .get_object()
            .bucket(&bucket)
            .key("gone")
            .send()
            .await
            .expect_err("object should be gone");
        assert!(err.into_service_error().is_no_such_key());

        // Deleting again is still a success.
        client
            .delete_object()
            .bucket(&bucket)
            .key("gone")
            .send()
            .await
            .expect("repeat delete_object");
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_return_no_such_key_for_missing_object() {
        let client = s3_client();
        let bucket = test_bucket_name("missing");

        let err = client
            .get_object()
            .bucket(&bucket)
            .key("never-written")
            .send()
            .await
            .expect_err("missing object");
        assert!(err.into_service_error().is_no_such_key());
    }
}
