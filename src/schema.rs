use crate::config::ModelConfig;
use mongodb::bson::Document;

/// Binds a Rust type to a MongoDB collection.
///
/// ```ignore
/// struct Dummy;
///
/// impl Schema for Dummy {
///     const NAME: &'static str = "Dummy";
///
///     fn config() -> ModelConfig {
///         ModelConfig {
///             database: Some("minimongo_testing".to_string()),
///             collection: Some("dummies".to_string()),
///             ..Default::default()
///         }
///     }
/// }
/// ```
pub trait Schema: Send + Sync + 'static {
    /// Schema name, used as log target and default collection name.
    const NAME: &'static str;

    fn config() -> ModelConfig {
        ModelConfig::default()
    }

    /// Applied to every document loaded from the collection.
    fn cast(data: Document) -> Document {
        data
    }

    /// Called after every successful write.
    fn finish(operation: &str, old: &Document, new: &Document) {
        log::debug!(
            target: Self::NAME,
            "{} operation completed: {:?} => {:?}",
            operation,
            old,
            new
        );
    }
}
