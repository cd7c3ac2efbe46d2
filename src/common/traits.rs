//! Seams between pipeline stages

use crate::error::Result;
use crate::image::ImageReference;
use async_trait::async_trait;

/// Something that can hand out the compressed bytes of a layer blob
#[async_trait]
pub trait BlobSource: Send + Sync {
    async fn fetch_blob(&self, reference: &ImageReference, digest: &str) -> Result<Vec<u8>>;
}
