use crate::auxiliary::underscore;
use crate::error::{Error, Result};
use mongodb::bson::doc;
use mongodb::options::IndexOptions;
use mongodb::IndexModel;
use serde::{Deserialize, Serialize};

/// Database used when a config leaves `database` unset.
pub const DEFAULT_DATABASE: &str = "models";

/// Connection and collection settings for one schema.
///
/// Every field has a default, so a partial JSON config is merged over
/// [`ModelConfig::default`] when deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub collection: Option<String>,
    /// Complete connection string, takes precedence over host/port/credentials.
    pub host_uri: Option<String>,
    pub indexes: Vec<IndexSpec>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            host: "127.0.0.1".to_string(),
            port: 27017,
            username: None,
            password: None,
            database: None,
            collection: None,
            host_uri: None,
            indexes: vec![],
        }
    }
}

impl ModelConfig {
    /// Parses a (possibly partial) JSON config.
    pub fn from_json_str(json: &str) -> Result<ModelConfig> {
        Ok(serde_json::from_str(json)?)
    }

    /// Fills in the database and collection names for a schema called `name`.
    pub fn resolve(mut self, name: &str) -> Result<ModelConfig> {
        if name.is_empty() {
            return Err(Error::Config("schema name is empty".to_string()));
        }
        if self.database.as_deref().map_or(true, str::is_empty) {
            self.database = Some(DEFAULT_DATABASE.to_string());
        }
        if self.collection.as_deref().map_or(true, str::is_empty) {
            self.collection = Some(underscore(name));
        }
        Ok(self)
    }

    pub fn database_name(&self) -> &str {
        self.database.as_deref().unwrap_or(DEFAULT_DATABASE)
    }

    pub fn collection_name(&self) -> Option<&str> {
        self.collection.as_deref()
    }
}

/// One index on a single key of the collection.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSpec {
    pub key: String,
    pub asc: bool,
    pub desc: bool,
    pub unique: bool,
    pub sphere2d: bool,
    /// Default language of a text index.
    pub text: Option<String>,
    pub name: Option<String>,
}

impl IndexSpec {
    pub fn asc(key: &str) -> IndexSpec {
        IndexSpec {
            key: key.to_string(),
            asc: true,
            ..Default::default()
        }
    }

    pub fn desc(key: &str) -> IndexSpec {
        IndexSpec {
            key: key.to_string(),
            desc: true,
            ..Default::default()
        }
    }

    pub fn text(key: &str, language: &str) -> IndexSpec {
        IndexSpec {
            key: key.to_string(),
            text: Some(language.to_string()),
            ..Default::default()
        }
    }

    pub fn sphere2d(key: &str) -> IndexSpec {
        IndexSpec {
            key: key.to_string(),
            sphere2d: true,
            ..Default::default()
        }
    }

    pub fn unique(mut self) -> IndexSpec {
        self.unique = true;
        self
    }

    pub fn named(mut self, name: &str) -> IndexSpec {
        self.name = Some(name.to_string());
        self
    }

    /// Name MongoDB gives the index when none is set explicitly.
    pub fn index_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        let suffix = if self.text.is_some() {
            "text".to_string()
        } else if self.sphere2d {
            "2dsphere".to_string()
        } else if self.desc {
            "-1".to_string()
        } else {
            "1".to_string()
        };
        format!("{}_{}", self.key, suffix)
    }

    pub fn to_index_model(&self) -> IndexModel {
        let key = self.key.clone();
        if let Some(lang) = &self.text {
            let opts = IndexOptions::builder()
                .unique(self.unique)
                .name(self.name.clone())
                .default_language(lang.to_string())
                .build();
            IndexModel::builder()
                .keys(doc! { key: "text" })
                .options(opts)
                .build()
        } else if self.sphere2d {
            let opts = IndexOptions::builder()
                .unique(self.unique)
                .name(self.name.clone())
                .build();
            IndexModel::builder()
                .keys(doc! { key: "2dsphere" })
                .options(opts)
                .build()
        } else {
            let sort = if self.desc { -1 } else { 1 };
            let opts = IndexOptions::builder()
                .unique(self.unique)
                .name(self.name.clone())
                .build();
            IndexModel::builder()
                .keys(doc! { key: sort })
                .options(opts)
                .build()
        }
    }
}
