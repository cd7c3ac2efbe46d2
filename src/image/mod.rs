//! Image metadata: references, manifests and digests

pub mod digest;
pub mod manifest;
pub mod reference;

pub use digest::{DigestUtils, Verification};
pub use manifest::{LayerDescriptor, Manifest, DOCKER_MANIFEST_V2};
pub use reference::ImageReference;
