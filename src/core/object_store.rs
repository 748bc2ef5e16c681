//! Object storage collaborator used for firmware images

use crate::core::error::Result;
use async_trait::async_trait;

/// Bucket holding live firmware images
pub const FIRMWARE_BUCKET: &str = "firmware";

/// Bucket receiving images of deleted firmware
pub const TRASH_BUCKET: &str = "trash";

/// Blob storage addressed by bucket and key
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Store `bytes` under `bucket/key` and return a URL for the object
    async fn upload(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<String>;

    /// Move `key` from `source` to `destination`
    ///
    /// Must be idempotent: when the object is already in `destination` and
    /// absent from `source`, the call succeeds.
    async fn relocate(&self, source: &str, key: &str, destination: &str) -> Result<()>;
}

/// Object key of a firmware image: `<model name>/<firmware name>`
pub fn firmware_key(model_name: &str, firmware_name: &str) -> String {
    format!("{}/{}", model_name, firmware_name)
}

/// Key of the object a URL returned by [`ObjectStore::upload`] points at
///
/// `None` when the URL does not name `bucket`.
pub fn key_in_url<'a>(url: &'a str, bucket: &str) -> Option<&'a str> {
    let marker = format!("/{}/", bucket);
    let start = url.find(&marker)? + marker.len();
    let key = &url[start..];
    (!key.is_empty()).then_some(key)
}
