//! Identification source clients
//!
//! Each client implements [`SourceClient`](crate::types::SourceClient) and is
//! registered with the [`SourceFanout`](crate::ensemble::SourceFanout) at
//! startup. Parsing is kept in pure functions so response handling is
//! testable without a network.

pub mod plantclef;
pub mod plantnet;

pub use plantclef::PlantClefClient;
pub use plantnet::PlantNetClient;

/// MIME type of an uploaded image, sniffed from its magic bytes
pub(crate) fn image_mime(image: &[u8]) -> &'static str {
    infer::get(image)
        .map(|kind| kind.mime_type())
        .filter(|mime| mime.starts_with("image/"))
        .unwrap_or("image/jpeg")
}
