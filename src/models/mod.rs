pub mod digest;
pub mod layout;
pub mod manifest;
pub mod spec;

pub use digest::Digest;
pub use layout::StoreLayout;
pub use manifest::{Manifest, ManifestConfig, ManifestLayer};
pub use spec::ModelSpecifier;
