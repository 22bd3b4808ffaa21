//! Helper functions over BSON documents and lists of documents.
//!
//! Nested helpers take a list of keys to expand (`["c", "x"]` reaches
//! `{"c": {"x": ..}}`). Reads also accept numeric keys to step into arrays.

use crate::config::ModelConfig;
use crate::error::{Error, Result};
use heck::ToSnakeCase;
use mongodb::bson::{doc, Bson, Document};
use std::cmp::Ordering;
use urlencoding::encode;

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// Merges documents sequentially into a new document, later keys win.
pub fn merge<'a>(docs: impl IntoIterator<Item = &'a Document>) -> Document {
    let mut merged = Document::new();
    for d in docs {
        for (key, value) in d {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Keeps only `keys` when `keep` is set, otherwise drops them.
pub fn subset<K: AsRef<str>>(d: &Document, keys: &[K], keep: bool) -> Document {
    d.iter()
        .filter(|(key, _)| keys.iter().any(|k| k.as_ref() == key.as_str()) == keep)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn join_keys<K: AsRef<str>>(keys: &[K]) -> String {
    keys.iter()
        .map(|k| k.as_ref())
        .collect::<Vec<_>>()
        .join(".")
}

fn child<'a>(value: &'a Bson, key: &str) -> Option<&'a Bson> {
    match value {
        Bson::Document(d) => d.get(key),
        Bson::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Gets a value in a nested document given the keys to expand.
pub fn getitem_nested<'a, K: AsRef<str>>(d: &'a Document, keys: &[K]) -> Result<&'a Bson> {
    let (first, rest) = keys
        .split_first()
        .ok_or_else(|| Error::InvalidPath(String::new()))?;
    let mut current = d
        .get(first.as_ref())
        .ok_or_else(|| Error::KeyNotFound(first.as_ref().to_string()))?;
    for (depth, key) in rest.iter().enumerate() {
        current = child(current, key.as_ref())
            .ok_or_else(|| Error::KeyNotFound(join_keys(&keys[..depth + 2])))?;
    }
    Ok(current)
}

/// Gets several (dotted) paths at once, `None` where a path is missing.
pub fn getitems<'a, K: AsRef<str>>(d: &'a Document, paths: &[K]) -> Vec<Option<&'a Bson>> {
    paths
        .iter()
        .map(|path| {
            let keys: Vec<&str> = path.as_ref().split('.').collect();
            getitem_nested(d, &keys).ok()
        })
        .collect()
}

/// Checks a nested document given the keys to expand.
pub fn hasitem_nested<K: AsRef<str>>(d: &Document, keys: &[K]) -> bool {
    getitem_nested(d, keys).is_ok()
}

/// Sets a value in a nested document given the keys to expand.
///
/// Intermediate keys that are missing or hold a non-document value are
/// replaced by empty documents.
pub fn setitem_nested<K: AsRef<str>>(d: &mut Document, keys: &[K], value: Bson) -> Result<()> {
    let (last, parents) = keys
        .split_last()
        .ok_or_else(|| Error::InvalidPath(String::new()))?;
    let mut current = d;
    for (depth, key) in parents.iter().enumerate() {
        let key = key.as_ref();
        if !matches!(current.get(key), Some(Bson::Document(_))) {
            current.insert(key, Document::new());
        }
        current = current
            .get_document_mut(key)
            .map_err(|_| Error::KeyNotFound(join_keys(&keys[..depth + 1])))?;
    }
    current.insert(last.as_ref(), value);
    Ok(())
}

/// Deletes and returns a value in a nested document given the keys to expand.
pub fn delitem_nested<K: AsRef<str>>(d: &mut Document, keys: &[K]) -> Result<Bson> {
    let (last, parents) = keys
        .split_last()
        .ok_or_else(|| Error::InvalidPath(String::new()))?;
    let mut current = d;
    for (depth, key) in parents.iter().enumerate() {
        current = current
            .get_document_mut(key.as_ref())
            .map_err(|_| Error::KeyNotFound(join_keys(&keys[..depth + 1])))?;
    }
    current
        .remove(last.as_ref())
        .ok_or_else(|| Error::KeyNotFound(join_keys(keys)))
}

/// Finds the only document in `array` matching every `{dotted.key: value}`
/// pair of `conditions`.
pub fn get_dict_from_array<'a>(
    array: &'a [Document],
    conditions: &Document,
) -> Result<&'a Document> {
    let mut found = array.iter().filter(|item| {
        conditions.iter().all(|(key, value)| {
            let keys: Vec<&str> = key.split('.').collect();
            getitem_nested(item, &keys).is_ok_and(|v| v == value)
        })
    });
    match (found.next(), found.next()) {
        (Some(item), None) => Ok(item),
        (Some(_), Some(_)) => Err(Error::MultipleMatches(conditions.clone())),
        (None, _) => Err(Error::NoMatch(conditions.clone())),
    }
}

/// String form of a pivot value, used as a document key.
pub fn pivot_string(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        Bson::ObjectId(id) => id.to_hex(),
        other => other.to_string(),
    }
}

/// Converts a list of documents to a document keyed by each item's pivot value.
pub fn pivot_list_to_dict(array: &[Document], pivot_key: &str) -> Result<Document> {
    let keys: Vec<&str> = pivot_key.split('.').collect();
    let mut pivoted = Document::new();
    for item in array {
        let pivot = getitem_nested(item, &keys)?;
        pivoted.insert(pivot_string(pivot), item.clone());
    }
    Ok(pivoted)
}

/// Converts a pivoted document back into a list, writing each key under
/// `pivot_key` unless the item already carries it.
pub fn pivot_dict_to_list(d: &Document, pivot_key: &str) -> Result<Vec<Document>> {
    let keys: Vec<&str> = pivot_key.split('.').collect();
    d.iter()
        .map(|(key, value)| {
            let mut item = match value {
                Bson::Document(item) => item.clone(),
                _ => {
                    return Err(Error::UnexpectedType {
                        path: key.clone(),
                        expected: "document",
                    })
                }
            };
            if !hasitem_nested(&item, &keys) {
                setitem_nested(&mut item, &keys, Bson::String(key.clone()))?;
            }
            Ok(item)
        })
        .collect()
}

fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::Null | Bson::Undefined | Bson::MinKey => 0,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => 1,
        Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::MaxKey => 13,
        _ => 12,
    }
}

/// 2^63, the first double past `i64::MAX`.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// Exact comparison of an integer with a double. NaN sorts below every number.
fn compare_int_double(i: i64, d: f64) -> Ordering {
    if d.is_nan() {
        return Ordering::Greater;
    }
    if d >= I64_BOUND {
        return Ordering::Less;
    }
    if d < -I64_BOUND {
        return Ordering::Greater;
    }
    let whole = d.trunc();
    match i.cmp(&(whole as i64)) {
        Ordering::Equal => 0.0_f64.partial_cmp(&d.fract()).unwrap_or(Ordering::Equal),
        ordering => ordering,
    }
}

fn compare_doubles(x: f64, y: f64) -> Ordering {
    match (x.is_nan(), y.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        // -0.0 and 0.0 stay equal, like the integer 0 they both match
        (false, false) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
    }
}

fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(i) => Some(i64::from(*i)),
        Bson::Int64(i) => Some(*i),
        _ => None,
    }
}

fn compare_numbers(a: &Bson, b: &Bson) -> Ordering {
    match (a, b, as_i64(a), as_i64(b)) {
        (_, _, Some(x), Some(y)) => x.cmp(&y),
        (_, Bson::Double(y), Some(x), None) => compare_int_double(x, *y),
        (Bson::Double(x), _, None, Some(y)) => compare_int_double(y, *x).reverse(),
        (Bson::Double(x), Bson::Double(y), None, None) => compare_doubles(*x, *y),
        _ => Ordering::Equal,
    }
}

fn as_text(value: &Bson) -> Option<&str> {
    match value {
        Bson::String(s) | Bson::Symbol(s) => Some(s),
        _ => None,
    }
}

/// Total order over BSON values: type rank first, then value.
///
/// Integers and doubles compare by exact numeric value, NaN first. Decimals
/// rank after them and compare by their encoded bytes.
pub fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
        (Bson::Decimal128(x), Bson::Decimal128(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::Array(x), Bson::Array(y)) => x
            .iter()
            .zip(y.iter())
            .map(|(i, j)| compare_bson(i, j))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ if type_rank(a) == 1 => compare_numbers(a, b),
        _ => match (as_text(a), as_text(b)) {
            (Some(x), Some(y)) => x.cmp(y),
            _ => a.to_string().cmp(&b.to_string()),
        },
    }
}

/// Stable sort of documents by the tuple of their (dotted) pivot values.
/// Documents missing a pivot sort first.
pub fn sort_dict_list_by_pivots<K: AsRef<str>>(array: &mut [Document], pivots: &[K]) {
    let paths: Vec<Vec<&str>> = pivots
        .iter()
        .map(|p| p.as_ref().split('.').collect())
        .collect();
    array.sort_by(|a, b| {
        for path in &paths {
            let ordering = match (getitem_nested(a, path).ok(), getitem_nested(b, path).ok()) {
                (Some(x), Some(y)) => compare_bson(x, y),
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

/// Items only present in the old list, and items only present in the new one.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ListDiff {
    pub deleted: Vec<Bson>,
    pub created: Vec<Bson>,
}

impl ListDiff {
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.created.is_empty()
    }
}

/// Order-insensitive difference of two lists, each side returned sorted.
pub fn sort_list_diff(a: &[Bson], b: &[Bson]) -> ListDiff {
    let mut remaining: Vec<Option<&Bson>> = b.iter().map(Some).collect();
    let mut deleted = vec![];
    for item in a {
        match remaining.iter_mut().find(|r| r.is_some_and(|v| v == item)) {
            Some(slot) => *slot = None,
            None => deleted.push(item.clone()),
        }
    }
    let mut created: Vec<Bson> = remaining.into_iter().flatten().cloned().collect();
    deleted.sort_by(compare_bson);
    created.sort_by(compare_bson);
    ListDiff { deleted, created }
}

/// Pivots both lists on `pivot_key` and diffs the resulting documents.
pub fn dict_list_diff(
    a: &[Document],
    b: &[Document],
    pivot_key: &str,
    options: &DiffOptions,
) -> Result<Document> {
    let a = pivot_list_to_dict(a, pivot_key)?;
    let b = pivot_list_to_dict(b, pivot_key)?;
    Ok(deep_diff_with(&a, &b, options))
}

// ---------------------------------------------------------------------------
// Diffing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Deleted,
    Updated,
    Created,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Deleted => "deleted",
            ChangeKind::Updated => "updated",
            ChangeKind::Created => "created",
        }
    }
}

/// Controls which changes a diff reports.
///
/// A deleted or updated key is reported when `keep` differs from "the key is
/// not in `grab`": with `keep` off, `grab` is an ignore list, with `keep` on
/// it is an allow list. Created keys are not filtered by `grab`.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffOptions {
    pub grab: Vec<String>,
    pub kinds: Vec<ChangeKind>,
    pub keep: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        DiffOptions {
            grab: vec![],
            kinds: vec![ChangeKind::Deleted, ChangeKind::Updated, ChangeKind::Created],
            keep: false,
        }
    }
}

impl DiffOptions {
    /// Options used to compute MongoDB updates: `_id` is never touched.
    pub fn for_update() -> DiffOptions {
        DiffOptions::default().grab(&["_id"])
    }

    pub fn grab<K: AsRef<str>>(mut self, keys: &[K]) -> DiffOptions {
        self.grab = keys.iter().map(|k| k.as_ref().to_string()).collect();
        self
    }

    pub fn kinds(mut self, kinds: &[ChangeKind]) -> DiffOptions {
        self.kinds = kinds.to_vec();
        self
    }

    pub fn keep(mut self, keep: bool) -> DiffOptions {
        self.keep = keep;
        self
    }

    fn reports(&self, kind: ChangeKind) -> bool {
        self.kinds.contains(&kind)
    }

    fn selects(&self, key: &str) -> bool {
        self.keep ^ !self.grab.iter().any(|g| g == key)
    }
}

/// Recursive summary of the differences between `a` and `b`, with default
/// options.
///
/// ```text
/// a = {a: 0, b: 1, c: {d: 2, e: 3, x: 4}, x: "0"}
/// b = {a: 1, b: 1, c: {d: 1, e: 3, y: 4}, y: "1"}
///
/// deleted: {c: {x: 4}, x: "0"}
/// updated: {a: {old: 0, new: 1}, c: {d: {old: 2, new: 1}}}
/// created: {c: {y: 4}, y: "1"}
/// ```
pub fn deep_diff(a: &Document, b: &Document) -> Document {
    deep_diff_with(a, b, &DiffOptions::default())
}

pub fn deep_diff_with(a: &Document, b: &Document, options: &DiffOptions) -> Document {
    let mut summary = Document::new();
    let mut keys = vec![];
    diff_into(&mut summary, a, b, &mut keys, options);
    summary
}

fn record(summary: &mut Document, kind: ChangeKind, keys: &[String], key: &str, value: Bson) {
    let mut path = Vec::with_capacity(keys.len() + 2);
    path.push(kind.as_str());
    path.extend(keys.iter().map(String::as_str));
    path.push(key);
    // path is never empty, so this cannot fail
    let _ = setitem_nested(summary, &path, value);
}

fn diff_into(
    summary: &mut Document,
    a: &Document,
    b: &Document,
    keys: &mut Vec<String>,
    options: &DiffOptions,
) {
    if options.reports(ChangeKind::Deleted) {
        for (key, value) in a {
            if !b.contains_key(key) && options.selects(key) {
                record(summary, ChangeKind::Deleted, keys, key, value.clone());
            }
        }
    }

    for (key, old) in a {
        let Some(new) = b.get(key) else { continue };
        match (old, new) {
            (Bson::Document(old), Bson::Document(new)) => {
                keys.push(key.clone());
                diff_into(summary, old, new, keys, options);
                keys.pop();
            }
            _ => {
                if options.reports(ChangeKind::Updated) && options.selects(key) && old != new {
                    let change = doc! {"old": old.clone(), "new": new.clone()};
                    record(summary, ChangeKind::Updated, keys, key, change.into());
                }
            }
        }
    }

    if options.reports(ChangeKind::Created) {
        for (key, value) in b {
            if !a.contains_key(key) {
                record(summary, ChangeKind::Created, keys, key, value.clone());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// MongoDB
// ---------------------------------------------------------------------------

/// Builds the connection string for a config, percent-encoding credentials.
pub fn get_uri(config: &ModelConfig) -> String {
    if let Some(uri) = &config.host_uri {
        return uri.clone();
    }
    let mut uri = "mongodb://".to_string();
    match (config.username.as_deref(), config.password.as_deref()) {
        (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
            uri.push_str(&format!("{}:{}@", encode(user), encode(pass)));
        }
        _ => {}
    }
    uri.push_str(&format!("{}:{}", config.host, config.port));
    uri
}

/// Computes the minimal `$set`/`$unset` update turning `old` into `new`,
/// never touching `_id`.
///
/// ```text
/// old = {a: 0, b: 1, c: {d: 2, e: 3, x: 4}, x: "0"}
/// new = {a: 1, b: 1, c: {d: 1, e: 3, y: 4}, y: "1"}
///
/// {$set: {a: 1, c.d: 1, c.y: 4, y: "1"}, $unset: {c.x: "", x: ""}}
/// ```
pub fn get_update(old: &Document, new: &Document) -> Document {
    get_update_with(old, new, &DiffOptions::for_update())
}

pub fn get_update_with(old: &Document, new: &Document, options: &DiffOptions) -> Document {
    let mut set = Document::new();
    let mut unset = Document::new();
    update_into(&mut set, &mut unset, old, new, "", options);

    let mut update = Document::new();
    if !set.is_empty() {
        update.insert("$set", set);
    }
    if !unset.is_empty() {
        update.insert("$unset", unset);
    }
    update
}

fn update_into(
    set: &mut Document,
    unset: &mut Document,
    old: &Document,
    new: &Document,
    root: &str,
    options: &DiffOptions,
) {
    let rooted = |key: &str| {
        if root.is_empty() {
            key.to_string()
        } else {
            format!("{root}.{key}")
        }
    };

    if options.reports(ChangeKind::Deleted) {
        for (key, _) in old {
            if !new.contains_key(key) && options.selects(key) {
                unset.insert(rooted(key), "");
            }
        }
    }

    for (key, old_value) in old {
        let Some(new_value) = new.get(key) else { continue };
        match (old_value, new_value) {
            (Bson::Document(o), Bson::Document(n)) => {
                update_into(set, unset, o, n, &rooted(key), options);
            }
            _ => {
                if options.reports(ChangeKind::Updated)
                    && options.selects(key)
                    && old_value != new_value
                {
                    set.insert(rooted(key), new_value.clone());
                }
            }
        }
    }

    if options.reports(ChangeKind::Created) {
        for (key, value) in new {
            if !old.contains_key(key) {
                set.insert(rooted(key), value.clone());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Other
// ---------------------------------------------------------------------------

/// Arrays and documents are iterable; strings only when `ignore_str` is off.
pub fn is_iterable(value: &Bson, ignore_str: bool) -> bool {
    match value {
        Bson::Array(_) | Bson::Document(_) => true,
        Bson::String(_) => !ignore_str,
        _ => false,
    }
}

/// `DummyModel` -> `dummy_model`.
pub fn underscore(name: &str) -> String {
    name.to_snake_case()
}
