//! Helpers over a schema-less document collection.

use log::debug;
use serde_json::Map;
use sled::{Db, Tree};

use crate::Result;

/// A schema-less document.
pub type Document = Map<String, serde_json::Value>;

/// Identifier assigned to an inserted document.
pub type DocumentId = u64;

/// Field the assigned id is written to.
pub const ID_FIELD: &str = "_id";

/// A collection of documents.
pub trait Collection {
    /// Returns every document in the collection.
    fn find(&self) -> Result<Vec<Document>>;

    /// Inserts a document and returns its new id.
    fn insert_one(&self, doc: Document) -> Result<DocumentId>;
}

/// A collection kept in its own `sled` tree.
///
/// Ids come from `Db::generate_id` and are stored big-endian, so `find`
/// returns documents in insertion order.
#[derive(Clone)]
pub struct SledCollection {
    db: Db,
    tree: Tree,
}

impl SledCollection {
    /// Opens the collection `name` in `db`, creating it if needed.
    pub fn open(db: &Db, name: &str) -> Result<Self> {
        Ok(SledCollection {
            db: db.clone(),
            tree: db.open_tree(name)?,
        })
    }
}

impl Collection for SledCollection {
    fn find(&self) -> Result<Vec<Document>> {
        self.tree
            .iter()
            .values()
            .map(|res| -> Result<Document> { Ok(serde_json::from_slice(&res?)?) })
            .collect()
    }

    fn insert_one(&self, mut doc: Document) -> Result<DocumentId> {
        let id = self.db.generate_id()?;
        doc.insert(ID_FIELD.to_owned(), serde_json::Value::from(id));
        self.tree.insert(id.to_be_bytes(), serde_json::to_vec(&doc)?)?;
        self.tree.flush()?;
        debug!("Inserted document {}", id);
        Ok(id)
    }
}

/// Lists all documents in `collection`. An empty collection gives an empty vec.
pub fn list_all<C: Collection>(collection: &C) -> Result<Vec<Document>> {
    collection.find()
}

/// Inserts a document made of `fields` and returns its id.
pub fn insert_document<C: Collection>(collection: &C, fields: Document) -> Result<DocumentId> {
    collection.insert_one(fields)
}
