//! XML documents returned by the multipart operations and by failed requests.
//!
//! Result documents carry the S3 namespace on their root element; error
//! documents are a flat `<Error>` element with no wrapper and no namespace.

use std::io;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesText, Event};

/// The S3 XML namespace.
pub const S3_NAMESPACE: &str = "http://s3.amazonaws.com/doc/2006-03-01/";

/// Body of a `CreateMultipartUpload` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiateMultipartUploadResult {
    /// Bucket the upload targets.
    pub bucket: String,
    /// Key the upload targets.
    pub key: String,
    /// Identifier for the new upload.
    pub upload_id: String,
}

/// Body of a `CompleteMultipartUpload` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteMultipartUploadResult {
    /// Absolute URL of the assembled object.
    pub location: String,
    /// Bucket holding the object.
    pub bucket: String,
    /// Key of the object.
    pub key: String,
    /// Quoted entity tag of the object.
    pub e_tag: String,
}

impl InitiateMultipartUploadResult {
    /// Serialize as an XML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer fails.
    pub fn to_xml(&self) -> io::Result<Vec<u8>> {
        write_document("InitiateMultipartUploadResult", |w| {
            write_text_element(w, "Bucket", &self.bucket)?;
            write_text_element(w, "Key", &self.key)?;
            write_text_element(w, "UploadId", &self.upload_id)
        })
    }
}

impl CompleteMultipartUploadResult {
    /// Serialize as an XML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer fails.
    pub fn to_xml(&self) -> io::Result<Vec<u8>> {
        write_document("CompleteMultipartUploadResult", |w| {
            write_text_element(w, "Location", &self.location)?;
            write_text_element(w, "Bucket", &self.bucket)?;
            write_text_element(w, "Key", &self.key)?;
            write_text_element(w, "ETag", &self.e_tag)
        })
    }
}

/// Format an error as a flat `<Error>` document.
///
/// ```xml
/// <?xml version="1.0" encoding="UTF-8"?>
/// <Error>
///   <Code>NoSuchKey</Code>
///   <Message>The specified key does not exist.</Message>
///   <Resource>/bucket/key</Resource>
///   <RequestId>4442587FB7D0A2F9</RequestId>
/// </Error>
/// ```
pub fn error_to_xml(
    code: &str,
    message: &str,
    resource: Option<&str>,
    request_id: &str,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);
    if let Err(e) = write_error_xml(&mut buf, code, message, resource, request_id) {
        tracing::error!(error = %e, "failed to serialize S3 error XML");
        buf.clear();
    }
    buf
}

fn write_error_xml(
    buf: &mut Vec<u8>,
    code: &str,
    message: &str,
    resource: Option<&str>,
    request_id: &str,
) -> io::Result<()> {
    let mut writer = Writer::new(buf);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.create_element("Error").write_inner_content(|w| {
        write_text_element(w, "Code", code)?;
        write_text_element(w, "Message", message)?;
        if let Some(res) = resource {
            write_text_element(w, "Resource", res)?;
        }
        write_text_element(w, "RequestId", request_id)
    })?;
    Ok(())
}

/// Write a namespaced root element with the children produced by `content`.
fn write_document<F>(root: &str, content: F) -> io::Result<Vec<u8>>
where
    F: FnOnce(&mut Writer<&mut Vec<u8>>) -> io::Result<()>,
{
    let mut buf = Vec::with_capacity(256);
    let mut writer = Writer::new(&mut buf);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer
        .create_element(root)
        .with_attribute(("xmlns", S3_NAMESPACE))
        .write_inner_content(content)?;
    Ok(buf)
}

fn write_text_element<W: io::Write>(
    writer: &mut Writer<W>,
    tag: &str,
    text: &str,
) -> io::Result<()> {
    writer
        .create_element(tag)
        .write_text_content(BytesText::new(text))?;
    Ok(())
}
