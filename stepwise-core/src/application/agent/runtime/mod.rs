pub mod codec;
pub mod manifest;

pub use codec::{CallRequest, Decoded, ProtocolError, RequestSettings};
pub use manifest::{ManifestRenderer, TextManifest};
