//! Multipart upload integration tests.

#[cfg(test)]
mod tests {
    use aws_sdk_s3::error::ProvideErrorMetadata;
    use aws_sdk_s3::primitives::ByteStream;
    use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};

    use crate::{get_object_bytes, s3_client, test_bucket_name};

    async fn upload_part(
        client: &aws_sdk_s3::Client,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Vec<u8>,
    ) -> String {
        client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await
            .unwrap_or_else(|e| panic!("upload part {part_number}: {e}"))
            .e_tag()
            .unwrap_or_default()
            .to_owned()
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_complete_multipart_upload() {
        let client = s3_client();
        let bucket = test_bucket_name("mpu");
        let key = "multipart.bin";

        let create = client
            .create_multipart_upload()
            .bucket(&bucket)
            .key(key)
            .send()
            .await
            .expect("create_multipart_upload");
        let upload_id = create.upload_id().expect("upload_id").to_owned();
        assert_eq!(create.bucket(), Some(bucket.as_str()));
        assert_eq!(create.key(), Some(key));

        // Parts arrive out of order; the object is assembled by part number.
        let etag2 = upload_part(&client, &bucket, key, &upload_id, 2, vec![0xBB; 1024]).await;
        let etag1 = upload_part(&client, &bucket, key, &upload_id, 1, vec![0xAA; 1024]).await;

        let completed = CompletedMultipartUpload::builder()
            .parts(CompletedPart::builder().part_number(1).e_tag(etag1).build())
            .parts(CompletedPart::builder().part_number(2).e_tag(etag2).build())
            .build();

        let complete = client
            .complete_multipart_upload()
            .bucket(&bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .expect("complete_multipart_upload");

        assert!(complete.e_tag().is_some(), "completed upload should have etag");
        assert!(
            complete
                .location()
                .is_some_and(|loc| loc.ends_with(&format!("/{bucket}/{key}"))),
            "location should point at the object"
        );

        let data = get_object_bytes(&client, &bucket, key).await;
        let mut expected = vec![0xAAu8; 1024];
        expected.extend(vec![0xBBu8; 1024]);
        assert_eq!(data.as_ref(), expected.as_slice());
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_abort_multipart_upload() {
        let client = s3_client();
        let bucket = test_bucket_name("abort");
        let key = "aborted.bin";

        let create = client
            .create_multipart_upload()
            .bucket(&bucket)
            .key(key)
            .send()
            .await
            .expect("create_multipart_upload");
        let upload_id = create.upload_id().expect("upload_id").to_owned();

        upload_part(&client, &bucket, key, &upload_id, 1, b"discard me".to_vec()).await;

        client
            .abort_multipart_upload()
            .bucket(&bucket)
            .key(key)
            .upload_id(&upload_id)
            .send()
            .await
            .expect("abort_multipart_upload");

        let err = client
            .complete_multipart_upload()
            .bucket(&bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(CompletedMultipartUpload::builder().build())
            .send()
            .await
            .expect_err("aborted upload cannot complete");
        assert_eq!(
            err.into_service_error().meta().code(),
            Some("NoSuchUpload")
        );

        let err = client
            .get_object()
            .bucket(&bucket)
            .key(key)
            .send()
            .await
            .expect_err("no object after abort");
        assert!(err.into_service_error().is_no_such_key());
    }
}
