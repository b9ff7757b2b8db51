pub mod archive;
pub mod config;
pub mod error;
pub mod models;

pub use archive::{export_models, import_models, Exporter, Importer};
pub use error::{OllamaSaveError, Result};
pub use models::{ModelSpecifier, StoreLayout};
