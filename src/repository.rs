use crate::attr::AttrDictionary;
use crate::auxiliary::get_uri;
use crate::config::ModelConfig;
use crate::error::Result;
use crate::model::Model;
use crate::schema::Schema;
use futures_util::StreamExt;
use log::{debug, error, info};
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::FindOptions;
use mongodb::{Client, Collection, Database, IndexModel};
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Connection, database and collection bound to a [`Schema`].
///
/// Cloning is cheap and shares the underlying connection pool.
pub struct Repository<S: Schema> {
    client: Client,
    database: Database,
    collection: Collection<Document>,
    config: Arc<ModelConfig>,
    _schema: PhantomData<fn() -> S>,
}

impl<S: Schema> Clone for Repository<S> {
    fn clone(&self) -> Self {
        Repository {
            client: self.client.clone(),
            database: self.database.clone(),
            collection: self.collection.clone(),
            config: self.config.clone(),
            _schema: PhantomData,
        }
    }
}

impl<S: Schema> fmt::Debug for Repository<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("schema", &S::NAME)
            .field("database", &self.database.name())
            .field("collection", &self.collection.name())
            .finish()
    }
}

/// The connection string with credentials masked, for logs.
fn redacted_uri(config: &ModelConfig) -> String {
    let uri = get_uri(config);
    match (uri.split_once("://"), uri.rsplit_once('@')) {
        (Some((scheme, _)), Some((_, host))) => format!("{scheme}://***@{host}"),
        _ => uri,
    }
}

impl<S: Schema> Repository<S> {
    /// Opens a new client from the schema config and binds the collection.
    pub async fn connect() -> Result<Repository<S>> {
        let config = S::config().resolve(S::NAME)?;
        let uri = get_uri(&config);
        let client = match Client::with_uri_str(&uri).await {
            Ok(client) => {
                info!(target: S::NAME, "Connection to {} succeeded", redacted_uri(&config));
                client
            }
            Err(e) => {
                error!(
                    target: S::NAME,
                    "Error establishing connection to {}: {}",
                    redacted_uri(&config),
                    e
                );
                return Err(e.into());
            }
        };
        Repository::bind(client, config).await
    }

    /// Binds the collection on an existing client, ignoring the config's
    /// connection settings.
    pub async fn with_client(client: &Client) -> Result<Repository<S>> {
        let config = S::config().resolve(S::NAME)?;
        Repository::bind(client.clone(), config).await
    }

    async fn bind(client: Client, config: ModelConfig) -> Result<Repository<S>> {
        let database = client.database(config.database_name());
        let name = config.collection_name().unwrap_or(S::NAME);
        let collection = database.collection::<Document>(name);
        let repository = Repository {
            client,
            database,
            collection,
            config: Arc::new(config),
            _schema: PhantomData,
        };
        if !repository.config.indexes.is_empty() {
            repository.register_indexes().await?;
        }
        Ok(repository)
    }

    pub fn name(&self) -> &'static str {
        S::NAME
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn connection(&self) -> &Client {
        &self.client
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Gets a handle to the MongoDB collection
    pub fn collection(&self) -> &Collection<Document> {
        &self.collection
    }

    /// Same collection, typed for direct driver use.
    pub fn typed_collection<T: Send + Sync>(&self) -> Collection<T> {
        self.database.collection::<T>(self.collection.name())
    }

    /// Creates the configured indexes that do not exist yet.
    pub async fn register_indexes(&self) -> Result<()> {
        let mut existing = vec![];
        if let Ok(cursor) = self.collection.list_indexes().await {
            cursor
                .for_each(|index| {
                    match index {
                        Ok(index_model) => {
                            if let Some(name) = index_model.options.and_then(|o| o.name) {
                                existing.push(name);
                            }
                        }
                        Err(error) => {
                            error!(target: S::NAME, "Can't unpack index model {error}");
                        }
                    }
                    futures::future::ready(())
                })
                .await;
        }

        let missing = self
            .config
            .indexes
            .iter()
            .filter(|spec| !existing.contains(&spec.index_name()))
            .map(|spec| spec.to_index_model())
            .collect::<Vec<IndexModel>>();
        if missing.is_empty() {
            return Ok(());
        }
        match self.collection.create_indexes(missing).await {
            Ok(res) => {
                info!(target: S::NAME, "Indexes {:?} created", res.index_names);
                Ok(())
            }
            Err(error) => {
                error!(target: S::NAME, "Can't create indexes : {:?}", error);
                Err(error.into())
            }
        }
    }

    /// Wraps `data` in a model without touching MongoDB.
    pub fn new_model(&self, data: impl Into<AttrDictionary>) -> Model<S> {
        Model::new(self.clone(), data.into())
    }

    /// Inserts one object and returns it as a model carrying its `_id`.
    pub async fn insert<T: Serialize>(&self, obj: &T) -> Result<Model<S>> {
        let mut data = AttrDictionary::from_serialize(obj)?;
        let res = self.collection.insert_one(data.as_document()).await?;
        data.insert("_id", res.inserted_id.clone());
        S::finish("insert", &Document::new(), data.as_document());

        let model = Model::new(self.clone(), data);
        debug!(target: S::NAME, "{} inserted.", model);
        info!(target: S::NAME, "{{'_id': {}}} inserted.", res.inserted_id);
        Ok(model)
    }

    /// Inserts many objects, returned in input order with their `_id`s.
    pub async fn insert_many<I>(&self, objs: I) -> Result<Vec<Model<S>>>
    where
        I: IntoIterator,
        I::Item: Serialize,
    {
        let mut docs = objs
            .into_iter()
            .map(|obj| AttrDictionary::from_serialize(&obj))
            .collect::<Result<Vec<_>>>()?;
        if docs.is_empty() {
            return Ok(vec![]);
        }

        let res = self
            .collection
            .insert_many(docs.iter().map(AttrDictionary::as_document))
            .await?;
        for (i, id) in res.inserted_ids {
            if let Some(data) = docs.get_mut(i) {
                data.insert("_id", id);
            }
        }

        let models = docs
            .into_iter()
            .map(|data| {
                S::finish("insert", &Document::new(), data.as_document());
                let model = Model::new(self.clone(), data);
                debug!(target: S::NAME, "{} inserted.", model);
                model
            })
            .collect::<Vec<_>>();
        info!(target: S::NAME, "{} objects inserted.", models.len());
        Ok(models)
    }

    /// Finds one document matching `filter`.
    pub async fn find(&self, filter: Document) -> Result<Option<Model<S>>> {
        match self.collection.find_one(filter.clone()).await? {
            Some(data) => {
                let model = Model::new(self.clone(), S::cast(data).into());
                debug!(target: S::NAME, "{} returned.", model);
                info!(
                    target: S::NAME,
                    "Query {} succeeded, {{'_id': {}}} returned.",
                    filter,
                    model.id().cloned().unwrap_or(Bson::Null)
                );
                Ok(Some(model))
            }
            None => {
                info!(target: S::NAME, "Query {} failed, object not found.", filter);
                Ok(None)
            }
        }
    }

    /// Finds every document matching `filter`.
    pub async fn find_many(&self, filter: Document) -> Result<Vec<Model<S>>> {
        self.find_many_with(filter, None).await
    }

    /// Respects skip/limit/sort/projection from `options`.
    pub async fn find_many_with(
        &self,
        filter: Document,
        options: impl Into<Option<FindOptions>>,
    ) -> Result<Vec<Model<S>>> {
        let mut cursor = self
            .collection
            .find(filter.clone())
            .with_options(options)
            .await?;
        let mut r = vec![];
        while let Some(d) = cursor.next().await {
            r.push(Model::new(self.clone(), S::cast(d?).into()));
        }
        info!(target: S::NAME, "Query {} succeeded, {} returned.", filter, r.len());
        Ok(r)
    }

    /// Raw stored copy of the document with this `_id`.
    pub(crate) async fn find_document(&self, id: &Bson) -> Result<Option<Document>> {
        Ok(self.collection.find_one(doc! {"_id": id.clone()}).await?)
    }
}
