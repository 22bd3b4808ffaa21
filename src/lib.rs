//! Lightweight MongoDB object-document mapper
//!
//! It binds Rust types to collections and works on documents with support for:
//! - Dotted path access into nested documents
//! - Minimal `$set`/`$unset` updates computed from local changes
//! - Index creation from config
//! - Document and list diffing, pivoting and merging helpers
//! - Pretty printing and a colored log formatter
//!

pub mod attr;
pub mod auxiliary;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod pretty;
pub mod repository;
pub mod schema;

pub use attr::{AttrDictionary, FieldPath};
pub use config::{IndexSpec, ModelConfig};
pub use error::{Error, Result};
pub use model::{Model, SaveResult};
pub use repository::Repository;
pub use schema::Schema;

pub use mongodb::bson;
