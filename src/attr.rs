//! Path-accessible documents.
//!
//! [`AttrDictionary`] owns a BSON [`Document`] and reads or writes nested
//! values through dotted [`FieldPath`]s such as `"c.x"` or `"d.0.x"`.

use crate::auxiliary::{delitem_nested, getitem_nested, setitem_nested};
use crate::error::{Error, Result};
use mongodb::bson::{self, Bson, Document};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;

/// A validated dotted path into a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    pub fn parse(path: &str) -> Result<FieldPath> {
        FieldPath::from_keys(&path.split('.').collect::<Vec<_>>())
    }

    pub fn from_keys<K: AsRef<str>>(keys: &[K]) -> Result<FieldPath> {
        let segments: Vec<String> = keys.iter().map(|k| k.as_ref().to_string()).collect();
        if segments.is_empty() || segments.iter().any(String::is_empty) {
            return Err(Error::InvalidPath(segments.join(".")));
        }
        Ok(FieldPath { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn parent(&self) -> Option<FieldPath> {
        if self.segments.len() > 1 {
            Some(FieldPath {
                segments: self.segments[..self.segments.len() - 1].to_vec(),
            })
        } else {
            None
        }
    }

    pub fn last(&self) -> &str {
        // never empty once parsed
        self.segments.last().map(String::as_str).unwrap_or_default()
    }
}

impl FromStr for FieldPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<FieldPath> {
        FieldPath::parse(s)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

/// Anything usable as a path: a `&str` is parsed, a [`FieldPath`] is used as is.
pub trait IntoFieldPath {
    fn into_field_path(self) -> Result<FieldPath>;
}

impl IntoFieldPath for &str {
    fn into_field_path(self) -> Result<FieldPath> {
        FieldPath::parse(self)
    }
}

impl IntoFieldPath for FieldPath {
    fn into_field_path(self) -> Result<FieldPath> {
        Ok(self)
    }
}

impl IntoFieldPath for &FieldPath {
    fn into_field_path(self) -> Result<FieldPath> {
        Ok(self.clone())
    }
}

/// A document with nested path access.
///
/// Plain key access goes through [`Deref`] to the inner [`Document`].
/// Equality ignores key order.
#[derive(Debug, Default, Clone, PartialEq, Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct AttrDictionary(Document);

impl AttrDictionary {
    pub fn new() -> AttrDictionary {
        AttrDictionary(Document::new())
    }

    /// Builds a dictionary from any value serializing to a BSON document.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<AttrDictionary> {
        Ok(AttrDictionary(bson::to_document(value)?))
    }

    pub fn get(&self, path: impl IntoFieldPath) -> Option<&Bson> {
        let path = path.into_field_path().ok()?;
        getitem_nested(&self.0, path.segments()).ok()
    }

    /// Like [`AttrDictionary::get`] but reports why the lookup failed.
    pub fn try_get(&self, path: impl IntoFieldPath) -> Result<&Bson> {
        let path = path.into_field_path()?;
        getitem_nested(&self.0, path.segments())
    }

    pub fn get_as<T: DeserializeOwned>(&self, path: impl IntoFieldPath) -> Result<T> {
        let value = self.try_get(path)?;
        Ok(bson::from_bson(value.clone())?)
    }

    pub fn get_document(&self, path: impl IntoFieldPath) -> Option<&Document> {
        self.get(path).and_then(Bson::as_document)
    }

    pub fn contains(&self, path: impl IntoFieldPath) -> bool {
        self.get(path).is_some()
    }

    pub fn set(&mut self, path: impl IntoFieldPath, value: impl Into<Bson>) -> Result<()> {
        let path = path.into_field_path()?;
        setitem_nested(&mut self.0, path.segments(), value.into())
    }

    pub fn remove(&mut self, path: impl IntoFieldPath) -> Result<Bson> {
        let path = path.into_field_path()?;
        delitem_nested(&mut self.0, path.segments())
    }

    /// Deserializes the whole document.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(bson::from_document(self.0.clone())?)
    }

    pub fn as_document(&self) -> &Document {
        &self.0
    }

    pub fn into_document(self) -> Document {
        self.0
    }
}

impl Deref for AttrDictionary {
    type Target = Document;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for AttrDictionary {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Document> for AttrDictionary {
    fn from(doc: Document) -> Self {
        AttrDictionary(doc)
    }
}

impl From<AttrDictionary> for Document {
    fn from(dict: AttrDictionary) -> Self {
        dict.0
    }
}

impl From<AttrDictionary> for Bson {
    fn from(dict: AttrDictionary) -> Self {
        Bson::Document(dict.0)
    }
}

impl fmt::Display for AttrDictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;
    use serde::Deserialize;

    fn dictionary() -> AttrDictionary {
        AttrDictionary::from(doc! {
            "a": 0,
            "b": "string",
            "c": {"x": 1},
            "d": [{"x": 1}],
        })
    }

    #[test]
    fn init() {
        let mut dictionary = dictionary();
        assert!(dictionary.get_document("c").is_some());
        assert_eq!(dictionary.get_i32("a").unwrap(), 0);
        dictionary.insert("e", 1);
        assert_eq!(dictionary.get("e"), Some(&Bson::Int32(1)));
    }

    #[test]
    fn nested_paths() {
        let mut dictionary = dictionary();
        assert_eq!(dictionary.get_as::<i32>("c.x").unwrap(), 1);
        assert_eq!(dictionary.get_as::<i32>("d.0.x").unwrap(), 1);
        assert_eq!(dictionary.get_as::<String>("b").unwrap(), "string");

        dictionary.set("c.y", 3).unwrap();
        assert_eq!(dictionary.get_as::<i32>("c.y").unwrap(), 3);

        dictionary
            .set("e", doc! {"x": {"i": 1}, "y": [{"i": 1}]})
            .unwrap();
        assert_eq!(dictionary.get_as::<i32>("e.x.i").unwrap(), 1);
        assert_eq!(dictionary.get_as::<i32>("e.y.0.i").unwrap(), 1);

        assert_eq!(dictionary.remove("c.x").unwrap(), Bson::Int32(1));
        assert!(!dictionary.contains("c.x"));
        assert!(matches!(dictionary.remove("c.x"), Err(Error::KeyNotFound(_))));
    }

    #[test]
    fn invalid_paths() {
        let dictionary = dictionary();
        assert!(matches!(FieldPath::parse("c..x"), Err(Error::InvalidPath(_))));
        assert!(matches!(FieldPath::parse(""), Err(Error::InvalidPath(_))));
        assert!(dictionary.get("a.").is_none());
        assert!(matches!(dictionary.try_get("z"), Err(Error::KeyNotFound(_))));
    }

    #[test]
    fn field_path_parts() {
        let path: FieldPath = "a.b.c".parse().unwrap();
        assert_eq!(path.last(), "c");
        assert_eq!(path.parent().unwrap().to_string(), "a.b");
        assert!(FieldPath::parse("a").unwrap().parent().is_none());
    }

    #[test]
    fn parse_into_struct() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Inner {
            x: i32,
        }
        #[derive(Debug, Deserialize, PartialEq)]
        struct Outer {
            a: i32,
            c: Inner,
        }
        let outer: Outer = dictionary().parse().unwrap();
        assert_eq!(outer, Outer { a: 0, c: Inner { x: 1 } });
    }

    #[test]
    fn equality_ignores_order() {
        let a = AttrDictionary::from(doc! {"a": 1, "b": 2});
        let b = AttrDictionary::from(doc! {"b": 2, "a": 1});
        assert_eq!(a, b);
    }
}
