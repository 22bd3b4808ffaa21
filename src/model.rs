use crate::attr::{AttrDictionary, FieldPath};
use crate::auxiliary::get_update;
use crate::error::{Error, Result};
use crate::repository::Repository;
use crate::schema::Schema;
use log::{debug, info};
use mongodb::bson::{doc, Bson, Document};
use mongodb::results::{DeleteResult, UpdateResult};
use serde::de::DeserializeOwned;
use std::fmt;
use std::ops::{Deref, DerefMut};

/// Update operators accepted by [`Model::update`].
pub const UPDATE_OPERATORS: [&str; 3] = ["$set", "$unset", "$push"];

/// What [`Model::save`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveResult {
    /// The document was inserted, with this `_id`.
    Inserted(Bson),
    Updated {
        matched_count: u64,
        modified_count: u64,
    },
    /// The stored copy already matched.
    Unchanged,
}

/// A document bound to the collection of its [`Schema`].
///
/// Derefs to [`AttrDictionary`], so nested values are read and written
/// with dotted paths. Nothing reaches MongoDB until [`Model::save`],
/// [`Model::update`] or [`Model::delete`] is called.
pub struct Model<S: Schema> {
    data: AttrDictionary,
    repository: Repository<S>,
}

impl<S: Schema> Deref for Model<S> {
    type Target = AttrDictionary;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl<S: Schema> DerefMut for Model<S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data
    }
}

impl<S: Schema> Clone for Model<S> {
    fn clone(&self) -> Self {
        Model {
            data: self.data.clone(),
            repository: self.repository.clone(),
        }
    }
}

impl<S: Schema> PartialEq for Model<S> {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl<S: Schema> fmt::Display for Model<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", S::NAME, self.data)
    }
}

impl<S: Schema> fmt::Debug for Model<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("schema", &S::NAME)
            .field("data", &self.data)
            .finish()
    }
}

impl<S: Schema> Model<S> {
    pub(crate) fn new(repository: Repository<S>, data: AttrDictionary) -> Model<S> {
        let model = Model { data, repository };
        debug!(target: S::NAME, "{} initialized.", model);
        model
    }

    pub fn id(&self) -> Option<&Bson> {
        self.data.as_document().get("_id")
    }

    pub fn repository(&self) -> &Repository<S> {
        &self.repository
    }

    pub fn attr(&self) -> &AttrDictionary {
        &self.data
    }

    pub fn into_attr(self) -> AttrDictionary {
        self.data
    }

    pub fn into_document(self) -> Document {
        self.data.into_document()
    }

    /// Deserializes the document into a typed value.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        self.data.parse()
    }

    /// Inserts the document, or sends the minimal update against the stored
    /// copy when it already has an `_id`.
    ///
    /// The stored copy goes through [`Schema::cast`] first, so fields the
    /// schema hides on load are left alone in the collection.
    pub async fn save(&mut self) -> Result<SaveResult> {
        let collection = self.repository.collection();
        let result = match self.id().cloned() {
            None => {
                let res = collection.insert_one(self.data.as_document()).await?;
                self.data.insert("_id", res.inserted_id.clone());
                S::finish("save", &Document::new(), self.data.as_document());
                SaveResult::Inserted(res.inserted_id)
            }
            Some(id) => match self.repository.find_document(&id).await?.map(S::cast) {
                Some(stored) => {
                    let update = get_update(&stored, self.data.as_document());
                    if update.is_empty() {
                        SaveResult::Unchanged
                    } else {
                        let res = collection
                            .update_one(doc! {"_id": id.clone()}, update.clone())
                            .await?;
                        S::finish("save", &stored, &update);
                        SaveResult::Updated {
                            matched_count: res.matched_count,
                            modified_count: res.modified_count,
                        }
                    }
                }
                None => {
                    // stored copy is gone, put it back under the same _id
                    collection.insert_one(self.data.as_document()).await?;
                    S::finish("save", &Document::new(), self.data.as_document());
                    SaveResult::Inserted(id)
                }
            },
        };

        info!(
            target: S::NAME,
            "{{'_id': {}}} saved.",
            self.id().cloned().unwrap_or(Bson::Null)
        );
        Ok(result)
    }

    /// Applies `$set`, `$unset` and `$push` operators to the local copy and
    /// then to the stored one.
    ///
    /// Keys of each operator are dotted paths. Any other top-level key is an
    /// [`Error::Update`] and leaves both copies untouched. The local copy only
    /// changes once MongoDB accepted the update.
    pub async fn update(&mut self, update: Document) -> Result<UpdateResult> {
        validate_update(&update)?;
        let id = self.id().cloned().ok_or(Error::MissingId)?;
        let mut staged = self.data.clone();
        apply_update(&mut staged, &update)?;

        let res = self
            .repository
            .collection()
            .update_one(doc! {"_id": id.clone()}, update.clone())
            .await?;
        self.data = staged;
        S::finish("update", &doc! {"_id": id.clone()}, &update);
        info!(
            target: S::NAME,
            "Update {} succeeded {{'_id': {}}} updated.",
            update,
            id
        );
        Ok(res)
    }

    /// Removes the stored copy. The local copy stays, without its `_id`.
    pub async fn delete(&mut self) -> Result<DeleteResult> {
        let id = self.id().cloned().ok_or(Error::MissingId)?;
        let res = self
            .repository
            .collection()
            .delete_one(doc! {"_id": id.clone()})
            .await?;
        self.data.remove("_id")?;
        S::finish("delete", &doc! {"_id": id.clone()}, &Document::new());
        info!(target: S::NAME, "Object {{'_id': {}}} deleted.", id);
        Ok(res)
    }
}

/// Checks that `update` only uses [`UPDATE_OPERATORS`], each mapping to a
/// document.
pub fn validate_update(update: &Document) -> Result<()> {
    for (key, value) in update {
        if !UPDATE_OPERATORS.contains(&key.as_str()) {
            return Err(Error::Update {
                update: update.clone(),
                message: format!(
                    "Update only works with {} operators.",
                    UPDATE_OPERATORS.join(" and ")
                ),
            });
        }
        if !matches!(value, Bson::Document(_)) {
            return Err(Error::Update {
                update: update.clone(),
                message: format!("Operator {key} expects a document."),
            });
        }
    }
    Ok(())
}

/// Applies an update expression to a local document the way MongoDB would.
///
/// Numeric path segments index into arrays, padding with nulls past the end.
/// `$unset` of a missing path is a no-op and of an array element nulls it.
/// `$push` onto a missing path creates a one-element array. A path through a
/// scalar is an [`Error::UnexpectedType`]. On error `data` is left unchanged.
pub fn apply_update(data: &mut AttrDictionary, update: &Document) -> Result<()> {
    validate_update(update)?;
    let mut staged = data.clone();

    if let Ok(set) = update.get_document("$set") {
        for (key, value) in set {
            set_field(&mut staged, key, value.clone())?;
        }
    }

    if let Ok(unset) = update.get_document("$unset") {
        for (key, _) in unset {
            let path = FieldPath::parse(key)?;
            unset_in_document(&mut staged, path.segments());
        }
    }

    if let Ok(push) = update.get_document("$push") {
        for (key, value) in push {
            let pushed = match staged.get(key.as_str()) {
                Some(Bson::Array(items)) => {
                    let mut items = items.clone();
                    items.push(value.clone());
                    items
                }
                None => vec![value.clone()],
                Some(_) => {
                    return Err(Error::UnexpectedType {
                        path: key.clone(),
                        expected: "array",
                    })
                }
            };
            set_field(&mut staged, key, pushed.into())?;
        }
    }

    *data = staged;
    Ok(())
}

fn set_field(data: &mut Document, key: &str, value: Bson) -> Result<()> {
    let path = FieldPath::parse(key)?;
    set_in_document(data, path.segments(), key, value)
}

fn set_in_document(data: &mut Document, keys: &[String], path: &str, value: Bson) -> Result<()> {
    let Some((key, rest)) = keys.split_first() else {
        return Err(Error::InvalidPath(path.to_string()));
    };
    if rest.is_empty() {
        data.insert(key.as_str(), value);
        return Ok(());
    }
    if !data.contains_key(key) {
        data.insert(key.as_str(), Document::new());
    }
    match data.get_mut(key) {
        Some(child) => set_in_value(child, rest, path, value),
        None => Err(Error::KeyNotFound(path.to_string())),
    }
}

fn set_in_value(target: &mut Bson, keys: &[String], path: &str, value: Bson) -> Result<()> {
    match target {
        Bson::Document(data) => set_in_document(data, keys, path, value),
        Bson::Array(items) => {
            let Some((key, rest)) = keys.split_first() else {
                return Err(Error::InvalidPath(path.to_string()));
            };
            let index = key.parse::<usize>().map_err(|_| Error::UnexpectedType {
                path: path.to_string(),
                expected: "document",
            })?;
            let padded = index >= items.len();
            if padded {
                items.resize(index + 1, Bson::Null);
            }
            match items.get_mut(index) {
                Some(slot) if rest.is_empty() => {
                    *slot = value;
                    Ok(())
                }
                Some(slot) => {
                    if padded {
                        *slot = Bson::Document(Document::new());
                    }
                    set_in_value(slot, rest, path, value)
                }
                None => Err(Error::KeyNotFound(path.to_string())),
            }
        }
        _ => Err(Error::UnexpectedType {
            path: path.to_string(),
            expected: "document",
        }),
    }
}

fn unset_in_document(data: &mut Document, keys: &[String]) {
    let Some((key, rest)) = keys.split_first() else {
        return;
    };
    if rest.is_empty() {
        data.remove(key);
    } else if let Some(child) = data.get_mut(key) {
        unset_in_value(child, rest);
    }
}

fn unset_in_value(target: &mut Bson, keys: &[String]) {
    match target {
        Bson::Document(data) => unset_in_document(data, keys),
        Bson::Array(items) => {
            let Some((key, rest)) = keys.split_first() else {
                return;
            };
            let Some(slot) = key.parse::<usize>().ok().and_then(|i| items.get_mut(i)) else {
                return;
            };
            if rest.is_empty() {
                *slot = Bson::Null;
            } else {
                unset_in_value(slot, rest);
            }
        }
        _ => {}
    }
}
