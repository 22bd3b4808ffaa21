//! These tests need a running MongoDB. Point `MINIMONGO_TEST_URI` at it
//! (for example `mongodb://localhost:27017`); without it every test returns
//! early.

use minimongo::bson::{doc, Bson, Document};
use minimongo::{Error, IndexSpec, ModelConfig, Repository, SaveResult, Schema};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

const URI_VAR: &str = "MINIMONGO_TEST_URI";

macro_rules! schema {
    ($name:ident, $collection:expr) => {
        schema!($name, $collection, vec![]);
    };
    ($name:ident, $collection:expr, $indexes:expr) => {
        struct $name;

        impl Schema for $name {
            const NAME: &'static str = stringify!($name);

            fn config() -> ModelConfig {
                ModelConfig {
                    host_uri: std::env::var(URI_VAR).ok(),
                    database: Some("minimongo_testing".to_string()),
                    collection: Some($collection.to_string()),
                    indexes: $indexes,
                    ..Default::default()
                }
            }
        }
    };
}

async fn get_repository<S: Schema>() -> Option<Repository<S>> {
    if std::env::var(URI_VAR).is_err() {
        eprintln!("{URI_VAR} not set, skipping");
        return None;
    }
    minimongo::logging::init();
    let repository = Repository::<S>::connect()
        .await
        .expect("failed to connect");
    repository.collection().drop().await.unwrap();
    Some(repository)
}

fn dummy_doc() -> minimongo::bson::Document {
    doc! {
        "a": 0,
        "b": 1,
        "c": {"d": 2, "e": 3},
        "f": [0],
    }
}

schema!(InitDummy, "init_dummies");

#[tokio::test]
async fn test_init() {
    let Some(repository) = get_repository::<InitDummy>().await else {
        return;
    };
    assert_eq!(repository.database().name(), "minimongo_testing");
    assert_eq!(repository.collection().name(), "init_dummies");
    let ping = repository
        .database()
        .run_command(doc! {"ping": 1})
        .await
        .unwrap();
    assert_eq!(ping.get("ok").and_then(Bson::as_f64), Some(1.0));

    let dummy = repository.new_model(dummy_doc());
    assert_eq!(dummy.get_as::<i32>("b").unwrap(), 1);
    assert_eq!(dummy.get_as::<i32>("c.e").unwrap(), 3);
    assert!(dummy.id().is_none());
}

schema!(InsertManyDummy, "insert_many_dummies");

#[tokio::test]
async fn test_insert_many() {
    let Some(repository) = get_repository::<InsertManyDummy>().await else {
        return;
    };
    let dummies = repository
        .insert_many(vec![doc! {"a": 0}, doc! {"a": 1}])
        .await
        .unwrap();
    assert!(dummies.iter().all(|d| d.id().is_some()));

    let mut dummy = repository.find(doc! {"a": 0}).await.unwrap().unwrap();
    assert_eq!(dummy, dummies[0]);
    dummy.delete().await.unwrap();
    let mut dummy = repository.find(doc! {"a": 1}).await.unwrap().unwrap();
    assert_eq!(dummy, dummies[1]);
    dummy.delete().await.unwrap();
    assert!(repository.find_many(doc! {}).await.unwrap().is_empty());

    let empty: Vec<minimongo::bson::Document> = vec![];
    assert!(repository.insert_many(empty).await.unwrap().is_empty());
}

schema!(InsertDummy, "insert_dummies");

#[tokio::test]
async fn test_insert() {
    let Some(repository) = get_repository::<InsertDummy>().await else {
        return;
    };
    let dummy = repository.insert(&doc! {"a": 0}).await.unwrap();
    let mut found = repository.find(doc! {"a": 0}).await.unwrap().unwrap();
    assert_eq!(found, dummy);
    found.delete().await.unwrap();
    assert!(repository.find(doc! {"a": 0}).await.unwrap().is_none());
}

schema!(SaveDummy, "save_dummies");

#[tokio::test]
async fn test_save_and_find() {
    let Some(repository) = get_repository::<SaveDummy>().await else {
        return;
    };
    let mut dummy = repository.new_model(dummy_doc());
    let res = dummy.save().await.unwrap();
    assert_eq!(SaveResult::Inserted(dummy.id().unwrap().clone()), res);

    let found = repository.find(doc! {"a": 0}).await.unwrap().unwrap();
    assert_eq!(found, dummy);

    dummy.set("b", 4).unwrap();
    dummy.set("c.e", 5).unwrap();
    dummy.remove("f").unwrap();
    assert_ne!(repository.find(doc! {"a": 0}).await.unwrap().unwrap(), dummy);
    let res = dummy.save().await.unwrap();
    assert_eq!(
        res,
        SaveResult::Updated {
            matched_count: 1,
            modified_count: 1
        }
    );
    assert_eq!(repository.find(doc! {"a": 0}).await.unwrap().unwrap(), dummy);

    assert_eq!(dummy.save().await.unwrap(), SaveResult::Unchanged);
}

schema!(UpdateDummy, "update_dummies");

#[tokio::test]
async fn test_update() {
    let Some(repository) = get_repository::<UpdateDummy>().await else {
        return;
    };
    let mut dummy = repository.new_model(dummy_doc());
    assert!(matches!(
        dummy.update(doc! {"$set": {"b": 4}}).await,
        Err(Error::MissingId)
    ));
    dummy.save().await.unwrap();

    dummy.update(doc! {"$set": {"b": 4, "c.e": 5}}).await.unwrap();
    assert_eq!(dummy.get_as::<i32>("b").unwrap(), 4);
    assert_eq!(dummy.get_as::<i32>("c.e").unwrap(), 5);
    assert_eq!(repository.find(doc! {"a": 0}).await.unwrap().unwrap(), dummy);

    dummy.update(doc! {"$unset": {"b": "", "c.e": ""}}).await.unwrap();
    assert!(!dummy.contains("b"));
    assert!(!dummy.contains("c.e"));
    assert_eq!(repository.find(doc! {"a": 0}).await.unwrap().unwrap(), dummy);

    dummy.update(doc! {"$push": {"f": 1}}).await.unwrap();
    assert_eq!(dummy.get_as::<i32>("f.1").unwrap(), 1);
    assert_eq!(repository.find(doc! {"a": 0}).await.unwrap().unwrap(), dummy);

    let err = dummy.update(doc! {"$set": {"b": 6}, "f": 7}).await;
    assert!(matches!(err, Err(Error::Update { .. })));
    assert!(!dummy.contains("b"));
}

schema!(RejectedDummy, "rejected_dummies");

#[tokio::test]
async fn test_rejected_update_keeps_local_copy() {
    let Some(repository) = get_repository::<RejectedDummy>().await else {
        return;
    };
    let mut dummy = repository.new_model(dummy_doc());
    dummy.save().await.unwrap();

    // both operators on one path, MongoDB refuses the conflict
    let err = dummy.update(doc! {"$set": {"b": 9}, "$unset": {"b": ""}}).await;
    assert!(matches!(err, Err(Error::Mongo(_))));
    assert_eq!(dummy.get_as::<i32>("b").unwrap(), 1);
    assert_eq!(repository.find(doc! {"a": 0}).await.unwrap().unwrap(), dummy);

    let err = dummy.update(doc! {"$set": {"a.b": 1}}).await;
    assert!(matches!(err, Err(Error::UnexpectedType { .. })));
    assert_eq!(dummy.get_as::<i32>("a").unwrap(), 0);
}

schema!(ArrayDummy, "array_dummies");

#[tokio::test]
async fn test_update_array_elements() {
    let Some(repository) = get_repository::<ArrayDummy>().await else {
        return;
    };
    let mut dummy = repository.new_model(doc! {"a": 0, "d": [{"x": 1}], "f": [0, 1]});
    dummy.save().await.unwrap();

    dummy.update(doc! {"$set": {"d.0.x": 5, "f.1": 9}}).await.unwrap();
    let found = repository.find(doc! {"a": 0}).await.unwrap().unwrap();
    assert_eq!(found, dummy);
    assert_eq!(found.get_as::<Vec<i32>>("f").unwrap(), vec![0, 9]);
    assert_eq!(dummy.save().await.unwrap(), SaveResult::Unchanged);
}

schema!(DeleteDummy, "delete_dummies");

#[tokio::test]
async fn test_delete() {
    let Some(repository) = get_repository::<DeleteDummy>().await else {
        return;
    };
    let mut dummy = repository.new_model(dummy_doc());
    assert!(matches!(dummy.delete().await, Err(Error::MissingId)));
    dummy.save().await.unwrap();

    let res = dummy.delete().await.unwrap();
    assert_eq!(res.deleted_count, 1);
    assert!(dummy.id().is_none());
    assert!(repository.find(doc! {"a": 0}).await.unwrap().is_none());

    // a deleted model saves back as a new document
    assert!(matches!(
        dummy.save().await.unwrap(),
        SaveResult::Inserted(_)
    ));
    assert!(repository.find(doc! {"a": 0}).await.unwrap().is_some());
}

schema!(ReinsertDummy, "reinsert_dummies");

#[tokio::test]
async fn test_save_reinserts_missing_stored_copy() {
    let Some(repository) = get_repository::<ReinsertDummy>().await else {
        return;
    };
    let mut dummy = repository.new_model(dummy_doc());
    dummy.save().await.unwrap();
    let id = dummy.id().cloned().unwrap();

    repository
        .collection()
        .delete_one(doc! {"_id": id.clone()})
        .await
        .unwrap();
    dummy.set("b", 4).unwrap();
    assert_eq!(dummy.save().await.unwrap(), SaveResult::Inserted(id.clone()));

    let found = repository.find(doc! {"_id": id}).await.unwrap().unwrap();
    assert_eq!(found, dummy);
    assert_eq!(found.get_as::<i32>("b").unwrap(), 4);
}

static HOOK_CALLS: Mutex<Vec<String>> = Mutex::new(vec![]);

struct HiddenDummy;

impl Schema for HiddenDummy {
    const NAME: &'static str = "HiddenDummy";

    fn config() -> ModelConfig {
        ModelConfig {
            host_uri: std::env::var(URI_VAR).ok(),
            database: Some("minimongo_testing".to_string()),
            collection: Some("hidden_dummies".to_string()),
            ..Default::default()
        }
    }

    fn cast(mut data: Document) -> Document {
        data.remove("secret");
        data
    }

    fn finish(operation: &str, _old: &Document, _new: &Document) {
        HOOK_CALLS.lock().unwrap().push(operation.to_string());
    }
}

#[tokio::test]
async fn test_schema_hooks() {
    let Some(repository) = get_repository::<HiddenDummy>().await else {
        return;
    };
    let inserted = repository
        .insert(&doc! {"a": 0, "secret": "s3cret"})
        .await
        .unwrap();
    let id = inserted.id().cloned().unwrap();

    let mut dummy = repository.find(doc! {"a": 0}).await.unwrap().unwrap();
    assert!(!dummy.contains("secret"));
    dummy.set("b", 1).unwrap();
    assert!(matches!(
        dummy.save().await.unwrap(),
        SaveResult::Updated { .. }
    ));
    dummy.update(doc! {"$set": {"c": 2}}).await.unwrap();

    // hidden on load, kept in the collection
    let stored = repository
        .collection()
        .find_one(doc! {"_id": id})
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.get_str("secret").unwrap(), "s3cret");
    assert_eq!(stored.get_i32("b").unwrap(), 1);
    assert_eq!(stored.get_i32("c").unwrap(), 2);

    dummy.delete().await.unwrap();
    assert_eq!(
        *HOOK_CALLS.lock().unwrap(),
        vec!["insert", "save", "update", "delete"]
    );
}

schema!(SharedClientDummy, "shared_client_dummies");

#[tokio::test]
async fn test_with_client() {
    let Ok(uri) = std::env::var(URI_VAR) else {
        return;
    };
    let client = mongodb::Client::with_uri_str(&uri).await.unwrap();
    let repository = Repository::<SharedClientDummy>::with_client(&client)
        .await
        .unwrap();
    repository.collection().drop().await.unwrap();
    assert_eq!(repository.database().name(), "minimongo_testing");
    assert_eq!(repository.collection().name(), "shared_client_dummies");

    repository.insert(&doc! {"a": 0}).await.unwrap();
    let typed = repository.typed_collection::<Document>();
    assert_eq!(typed.count_documents(doc! {}).await.unwrap(), 1);
}

schema!(FindManyDummy, "find_many_dummies");

#[tokio::test]
async fn test_find_many() {
    let Some(repository) = get_repository::<FindManyDummy>().await else {
        return;
    };
    repository
        .insert_many(vec![doc! {"a": 0}, doc! {"a": 1}])
        .await
        .unwrap();
    let dummies = repository.find_many(doc! {}).await.unwrap();
    assert_eq!(dummies.len(), 2);
    assert_eq!(
        dummies[0],
        repository.find(doc! {"a": 0}).await.unwrap().unwrap()
    );
    assert_eq!(
        dummies[1],
        repository.find(doc! {"a": 1}).await.unwrap().unwrap()
    );

    let options = minimongo::bson::doc! {"a": -1};
    let sorted = repository
        .find_many_with(
            doc! {},
            mongodb::options::FindOptions::builder()
                .sort(options)
                .limit(1)
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(sorted.len(), 1);
    assert_eq!(sorted[0].get_as::<i32>("a").unwrap(), 1);
}

schema!(
    IndexedDummy,
    "indexed_dummies",
    vec![IndexSpec::asc("a").unique(), IndexSpec::desc("b")]
);

#[tokio::test]
async fn test_indexes() {
    let Some(repository) = get_repository::<IndexedDummy>().await else {
        return;
    };
    // the collection was dropped after connecting, register again
    repository.register_indexes().await.unwrap();
    let names = repository.collection().list_index_names().await.unwrap();
    assert!(names.contains(&"a_1".to_string()));
    assert!(names.contains(&"b_-1".to_string()));
    // already present, nothing to create
    repository.register_indexes().await.unwrap();

    repository.insert(&doc! {"a": 1}).await.unwrap();
    assert!(repository.insert(&doc! {"a": 1}).await.is_err());
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct User {
    name: String,
    age: u8,
    tags: Vec<String>,
}

schema!(UserSchema, "users");

#[tokio::test]
async fn test_typed_round_trip() {
    let Some(repository) = get_repository::<UserSchema>().await else {
        return;
    };
    let user = User {
        name: "smko".to_string(),
        age: 3,
        tags: vec!["a".to_string()],
    };
    repository.insert(&user).await.unwrap();

    let found = repository
        .find(doc! {"name": "smko"})
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.parse::<User>().unwrap(), user);
    assert_eq!(found.to_string().split('(').next(), Some("UserSchema"));
}
