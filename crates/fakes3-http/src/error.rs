//! S3 error codes and the error type returned by request handlers.
//!
//! Every failure that reaches the client is an [`S3Error`]; the service turns
//! it into a flat `<Error>` XML document with the matching status code.

use std::fmt;

use fakes3_core::StorageError;

/// S3 error codes produced by fakes3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum S3ErrorCode {
    /// The server failed while handling the request.
    InternalError,
    /// A path component or query parameter is missing or malformed.
    InvalidArgument,
    /// The HTTP method is not supported on this resource.
    MethodNotAllowed,
    /// The object does not exist.
    NoSuchKey,
    /// The multipart upload does not exist or was already completed.
    NoSuchUpload,
    /// The method and query combination names no operation.
    NotFound,
    /// The operation is routed but has no handler.
    NotImplemented,
}

impl S3ErrorCode {
    /// Returns the error code as it appears in the `<Code>` element.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InternalError => "InternalError",
            Self::InvalidArgument => "InvalidArgument",
            Self::MethodNotAllowed => "MethodNotAllowed",
            Self::NoSuchKey => "NoSuchKey",
            Self::NoSuchUpload => "NoSuchUpload",
            Self::NotFound => "NotFound",
            Self::NotImplemented => "NotImplemented",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> http::StatusCode {
        match self {
            Self::InternalError => http::StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidArgument => http::StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed => http::StatusCode::METHOD_NOT_ALLOWED,
            Self::NoSuchKey | Self::NoSuchUpload | Self::NotFound => http::StatusCode::NOT_FOUND,
            Self::NotImplemented => http::StatusCode::NOT_IMPLEMENTED,
        }
    }

    /// Returns the default message for this error.
    #[must_use]
    pub fn default_message(&self) -> &'static str {
        match self {
            Self::InternalError => "We encountered an internal error. Please try again.",
            Self::InvalidArgument => "Invalid Argument",
            Self::MethodNotAllowed => "The specified method is not allowed against this resource.",
            Self::NoSuchKey => "The specified key does not exist.",
            Self::NoSuchUpload => {
                "The specified multipart upload does not exist. The upload ID may be invalid, \
                 or the upload may have been aborted or completed."
            }
            Self::NotFound => "The requested operation is not supported.",
            Self::NotImplemented => "The requested functionality is not implemented.",
        }
    }
}

impl fmt::Display for S3ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An S3 error response.
#[derive(Debug, thiserror::Error)]
#[error("S3Error({code}): {message}")]
pub struct S3Error {
    /// The error code.
    pub code: S3ErrorCode,
    /// A human-readable error message.
    pub message: String,
    /// The resource that caused the error.
    pub resource: Option<String>,
    /// The HTTP status code.
    pub status_code: http::StatusCode,
    /// The underlying source error, if any.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl S3Error {
    /// Create an error with the code's default message.
    #[must_use]
    pub fn new(code: S3ErrorCode) -> Self {
        Self::with_message(code, code.default_message())
    }

    /// Create an error with a custom message.
    #[must_use]
    pub fn with_message(code: S3ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status_code: code.status_code(),
            message: message.into(),
            code,
            resource: None,
            source: None,
        }
    }

    /// Set the resource that caused this error.
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Set the source error.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Create a NoSuchKey error for `/{bucket}/{key}`.
    #[must_use]
    pub fn no_such_key(bucket: &str, key: &str) -> Self {
        Self::new(S3ErrorCode::NoSuchKey).with_resource(format!("/{bucket}/{key}"))
    }

    /// Create a NoSuchUpload error.
    #[must_use]
    pub fn no_such_upload(upload_id: impl Into<String>) -> Self {
        Self::new(S3ErrorCode::NoSuchUpload).with_resource(upload_id)
    }

    /// Create an InvalidArgument error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::with_message(S3ErrorCode::InvalidArgument, message)
    }

    /// Create an InternalError error.
    #[must_use]
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::with_message(S3ErrorCode::InternalError, message)
    }

    /// Create a NotImplemented error for `operation`.
    #[must_use]
    pub fn not_implemented(operation: &str) -> Self {
        Self::with_message(
            S3ErrorCode::NotImplemented,
            format!("{operation} is not implemented"),
        )
    }

    /// Create a NotFound error for a method and query that name no operation.
    #[must_use]
    pub fn unknown_operation(method: &http::Method, path: &str) -> Self {
        Self::new(S3ErrorCode::NotFound).with_resource(format!("{method} {path}"))
    }
}

impl From<StorageError> for S3Error {
    fn from(err: StorageError) -> Self {
        match &err {
            StorageError::UploadNotFound { upload_id, .. } => {
                Self::no_such_upload(upload_id.clone()).with_source(err)
            }
            StorageError::Write { .. }
            | StorageError::Read { .. }
            | StorageError::CorruptUpload { .. } => {
                Self::internal_error(err.to_string()).with_source(err)
            }
        }
    }
}
