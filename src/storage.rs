//! Object-storage reader: opens a streaming read of `(bucket, object)`
//! and returns a byte stream. Errors distinguish permission denial
//! from transport failures.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::error::StorageError;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

#[async_trait]
pub trait StorageReader: Send + Sync {
    /// Opens a streaming read of `object` in `bucket`, optionally
    /// pinned to `generation`.
    async fn open(
        &self,
        bucket: &str,
        object: &str,
        generation: Option<i64>,
    ) -> Result<ByteStream, StorageError>;
}

/// [`StorageReader`] backed by the GCS JSON API's `alt=media` download
/// endpoint.
pub struct GcsStorageReader {
    client: reqwest::Client,
}

impl GcsStorageReader {
    pub fn new(client: reqwest::Client) -> Self {
        GcsStorageReader { client }
    }
}

#[async_trait]
impl StorageReader for GcsStorageReader {
    async fn open(
        &self,
        bucket: &str,
        object: &str,
        generation: Option<i64>,
    ) -> Result<ByteStream, StorageError> {
        let encoded_object = urlencode_object(object);
        let mut url = format!(
            "https://storage.googleapis.com/storage/v1/b/{bucket}/o/{encoded_object}?alt=media"
        );
        if let Some(generation) = generation {
            url.push_str(&format!("&generation={generation}"));
        }

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| transport_error(bucket, object, &err.to_string()))?;

        let status = response.status();
        if status.as_u16() == 403 || status.as_u16() == 401 {
            let principal = response
                .headers()
                .get("x-goog-authenticated-user-email")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("the configured service account")
                .to_string();
            return Err(StorageError::PermissionDenied {
                bucket: bucket.to_string(),
                object: object.to_string(),
                principal,
            });
        }
        if !status.is_success() {
            return Err(transport_error(
                bucket,
                object,
                &format!("unexpected status {status}"),
            ));
        }

        let bucket = bucket.to_string();
        let object = object.to_string();
        let stream = response.bytes_stream().map(move |chunk| {
            chunk.map_err(|err| transport_error(&bucket, &object, &err.to_string()))
        });

        Ok(Box::pin(stream))
    }
}

fn transport_error(bucket: &str, object: &str, message: &str) -> StorageError {
    StorageError::Transport {
        bucket: bucket.to_string(),
        object: object.to_string(),
        message: message.to_string(),
    }
}

fn urlencode_object(object: &str) -> String {
    // The JSON API requires the object path to be percent-encoded as a
    // single path segment (slashes included).
    let mut out = String::with_capacity(object.len());
    for byte in object.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
