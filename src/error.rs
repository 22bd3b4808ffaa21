//! Error and result types shared by every module of the crate.

use mongodb::bson::{self, Document};
use thiserror::Error;

/// Everything that can go wrong while mapping documents to MongoDB.
#[derive(Error, Debug)]
pub enum Error {
    /// Error returned by the MongoDB driver.
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),
    /// Conversion between Rust values, BSON and JSON failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// A key (or dotted path) is missing from a document.
    #[error("Key not found: {0}")]
    KeyNotFound(String),
    /// A path could not be parsed.
    #[error("Invalid path: {0:?}")]
    InvalidPath(String),
    /// A value exists at `path` but has the wrong BSON type.
    #[error("Expected {expected} at {path}")]
    UnexpectedType { path: String, expected: &'static str },
    /// An update expression uses unsupported keys or operators.
    #[error("{message} (update: {update})")]
    Update { update: Document, message: String },
    /// No document in a list matched the conditions.
    #[error("No document matches {0}")]
    NoMatch(Document),
    /// More than one document in a list matched the conditions.
    #[error("Multiple documents match {0}")]
    MultipleMatches(Document),
    /// The model has no `_id`, so it was never inserted.
    #[error("Object has no _id, insert or save it first")]
    MissingId,
    /// Invalid model configuration.
    #[error("Configuration error: {0}")]
    Config(String),
    /// The logger could not be installed.
    #[error("Logger error: {0}")]
    Logger(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<bson::ser::Error> for Error {
    fn from(err: bson::ser::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<bson::de::Error> for Error {
    fn from(err: bson::de::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<log::SetLoggerError> for Error {
    fn from(err: log::SetLoggerError) -> Self {
        Error::Logger(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
