//! store::memory
//!
//! In-memory document store for deterministic use and testing.
//!
//! # Design
//!
//! `MemoryStore` implements the full [`DocumentStore`] contract behind a
//! single mutex: every committed mutation is one critical section, so
//! per-document atomicity holds trivially and watcher notification is
//! ordered with the commit that caused it. It also supports fault
//! injection for exercising transient-error paths.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use trialpost::store::{DocumentStore, Filter, MemoryStore, OrderBy};
//!
//! # tokio_test::block_on(async {
//! let store = MemoryStore::new();
//!
//! let id = store.create("pets", json!({"name": "Bella"})).await.unwrap();
//! let doc = store.get("pets", &id).await.unwrap();
//! assert_eq!(doc.fields["name"], "Bella");
//!
//! let all = store
//!     .query("pets", Filter::new(), OrderBy::asc("name"))
//!     .await
//!     .unwrap();
//! assert_eq!(all.len(), 1);
//! # });
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::traits::{
    CancelHandle, Document, DocumentStore, Filter, OrderBy, StoreError, Subscription, UpdateFn,
};

/// In-memory document store.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping; clones share
/// state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    /// Stored fields per collection, keyed by document id. The id is not
    /// stored inside the fields; reads inject it.
    collections: HashMap<String, BTreeMap<String, Value>>,
    /// Active change subscriptions.
    watchers: Vec<Watcher>,
    next_watcher_id: u64,
    /// Remaining operations that should fail with `Unavailable`.
    fail_remaining: u32,
    /// When set, only this operation consumes injected faults.
    fail_op: Option<OpKind>,
}

/// Store operation kinds, for scoping injected faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Create,
    Get,
    Query,
    Update,
    Upsert,
    Subscribe,
}

struct Watcher {
    id: u64,
    collection: String,
    filter: Filter,
    order: OrderBy,
    tx: mpsc::UnboundedSender<Vec<Document>>,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.id)
            .field("collection", &self.collection)
            .finish()
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` operations fail with `StoreError::Unavailable`.
    ///
    /// # Example
    ///
    /// ```
    /// use serde_json::json;
    /// use trialpost::store::{DocumentStore, MemoryStore, StoreError};
    ///
    /// # tokio_test::block_on(async {
    /// let store = MemoryStore::new();
    /// store.inject_unavailable(1);
    ///
    /// let err = store.create("pets", json!({})).await.unwrap_err();
    /// assert!(matches!(err, StoreError::Unavailable(_)));
    ///
    /// // The fault is consumed; the next call succeeds.
    /// store.create("pets", json!({})).await.unwrap();
    /// # });
    /// ```
    pub fn inject_unavailable(&self, count: u32) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_remaining = count;
        inner.fail_op = None;
    }

    /// Like [`MemoryStore::inject_unavailable`], but only `op` consumes
    /// the injected faults; other operations pass through.
    pub fn inject_unavailable_on(&self, op: OpKind, count: u32) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_remaining = count;
        inner.fail_op = Some(op);
    }

    /// Number of documents in a collection (for test verification).
    pub fn collection_len(&self, collection: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.collections.get(collection).map_or(0, BTreeMap::len)
    }
}

fn timestamp_now() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
}

fn with_id(id: &str, fields: &Value) -> Value {
    let mut copy = fields.clone();
    if let Value::Object(map) = &mut copy {
        map.insert("id".to_string(), Value::String(id.to_string()));
    }
    copy
}

/// Normalize a committed body: the id never lives inside stored fields,
/// `created_at` is preserved from the prior version (or stamped fresh),
/// and `updated_at` is stamped on every commit.
fn stamp(fields: &mut Value, created_at: Option<Value>) {
    if let Value::Object(map) = fields {
        map.remove("id");
        let created = created_at.unwrap_or_else(timestamp_now);
        map.insert("created_at".to_string(), created);
        map.insert("updated_at".to_string(), timestamp_now());
    }
}

fn snapshot(
    collections: &HashMap<String, BTreeMap<String, Value>>,
    collection: &str,
    filter: &Filter,
    order: &OrderBy,
) -> Vec<Document> {
    let mut docs: Vec<Document> = collections
        .get(collection)
        .into_iter()
        .flatten()
        .map(|(id, fields)| Document {
            id: id.clone(),
            fields: with_id(id, fields),
        })
        .filter(|doc| filter.matches(&doc.fields))
        .collect();
    docs.sort_by(|a, b| order.compare(&a.fields, &b.fields));
    docs
}

/// Re-deliver a fresh snapshot to every watcher of `collection`.
/// Watchers whose receiver is gone are dropped.
fn notify(inner: &mut MemoryInner, collection: &str) {
    let MemoryInner {
        collections,
        watchers,
        ..
    } = inner;
    watchers.retain(|watcher| {
        if watcher.collection != collection {
            return true;
        }
        let docs = snapshot(collections, collection, &watcher.filter, &watcher.order);
        watcher.tx.send(docs).is_ok()
    });
}

impl MemoryInner {
    fn take_fault(&mut self, op: OpKind) -> Result<(), StoreError> {
        if self.fail_remaining > 0 && self.fail_op.map_or(true, |scoped| scoped == op) {
            self.fail_remaining -= 1;
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }

    fn read(&self, collection: &str, id: &str) -> Result<Document, StoreError> {
        self.collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document {
                id: id.to_string(),
                fields: with_id(id, fields),
            })
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create(&self, collection: &str, fields: Value) -> Result<String, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.take_fault(OpKind::Create)?;

        let id = Uuid::new_v4().to_string();
        let mut body = fields;
        stamp(&mut body, None);
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), body);
        notify(&mut inner, collection);
        Ok(id)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Document, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.take_fault(OpKind::Get)?;
        inner.read(collection, id)
    }

    async fn query(
        &self,
        collection: &str,
        filter: Filter,
        order: OrderBy,
    ) -> Result<Vec<Document>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.take_fault(OpKind::Query)?;
        Ok(snapshot(&inner.collections, collection, &filter, &order))
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        mut apply: UpdateFn,
    ) -> Result<Document, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.take_fault(OpKind::Update)?;

        let current = inner.read(collection, id)?;
        let created_at = current.fields.get("created_at").cloned();

        // Mutate a copy; the stored document only changes on Ok.
        let mut working = current.fields;
        apply(&mut working)?;
        stamp(&mut working, created_at);

        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), working);
        let committed = inner.read(collection, id)?;
        notify(&mut inner, collection);
        Ok(committed)
    }

    async fn upsert(
        &self,
        collection: &str,
        id: &str,
        init: Value,
        mut apply: UpdateFn,
    ) -> Result<Document, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.take_fault(OpKind::Upsert)?;

        let existing = inner
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned();

        let body = match existing {
            Some(fields) => {
                let created_at = fields.get("created_at").cloned();
                let mut working = with_id(id, &fields);
                apply(&mut working)?;
                stamp(&mut working, created_at);
                working
            }
            None => {
                let mut body = init;
                stamp(&mut body, None);
                body
            }
        };

        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), body);
        let committed = inner.read(collection, id)?;
        notify(&mut inner, collection);
        Ok(committed)
    }

    async fn subscribe(
        &self,
        collection: &str,
        filter: Filter,
        order: OrderBy,
    ) -> Result<Subscription, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.take_fault(OpKind::Subscribe)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let initial = snapshot(&inner.collections, collection, &filter, &order);
        // Initial delivery cannot fail: we still hold the receiver.
        let _ = tx.send(initial);

        let watcher_id = inner.next_watcher_id;
        inner.next_watcher_id += 1;
        inner.watchers.push(Watcher {
            id: watcher_id,
            collection: collection.to_string(),
            filter,
            order,
            tx,
        });

        let shared = Arc::clone(&self.inner);
        let handle = CancelHandle::new(move || {
            if let Ok(mut inner) = shared.lock() {
                inner.watchers.retain(|w| w.id != watcher_id);
            }
        });
        Ok(Subscription::new(rx, handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn create_and_get_round_trip() {
        let store = MemoryStore::new();
        let id = store
            .create("trials", json!({"name": "Spring trial"}))
            .await
            .unwrap();

        let doc = store.get("trials", &id).await.unwrap();
        assert_eq!(doc.id, id);
        assert_eq!(doc.fields["id"], json!(id));
        assert_eq!(doc.fields["name"], json!("Spring trial"));
        assert!(doc.fields.get("created_at").is_some());
        assert!(doc.fields.get("updated_at").is_some());
    }

    #[tokio::test]
    async fn get_unknown_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get("trials", "missing").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn query_filters_and_orders() {
        let store = MemoryStore::new();
        store
            .create("scores", json!({"trial_id": "t1", "post_number": 2}))
            .await
            .unwrap();
        store
            .create("scores", json!({"trial_id": "t1", "post_number": 1}))
            .await
            .unwrap();
        store
            .create("scores", json!({"trial_id": "t2", "post_number": 1}))
            .await
            .unwrap();

        let docs = store
            .query(
                "scores",
                Filter::new().field_eq("trial_id", "t1"),
                OrderBy::asc("post_number"),
            )
            .await
            .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].fields["post_number"], json!(1));
        assert_eq!(docs[1].fields["post_number"], json!(2));
    }

    #[tokio::test]
    async fn aborted_update_leaves_document_untouched() {
        let store = MemoryStore::new();
        let id = store.create("trials", json!({"n": 1})).await.unwrap();

        let err = store
            .update(
                "trials",
                &id,
                Box::new(|fields| {
                    fields["n"] = json!(99);
                    Err(StoreError::Aborted)
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Aborted));

        let doc = store.get("trials", &id).await.unwrap();
        assert_eq!(doc.fields["n"], json!(1));
    }

    #[tokio::test]
    async fn update_commits_and_preserves_created_at() {
        let store = MemoryStore::new();
        let id = store.create("trials", json!({"n": 1})).await.unwrap();
        let before = store.get("trials", &id).await.unwrap();

        store
            .update(
                "trials",
                &id,
                Box::new(|fields| {
                    fields["n"] = json!(2);
                    Ok(())
                }),
            )
            .await
            .unwrap();

        let after = store.get("trials", &id).await.unwrap();
        assert_eq!(after.fields["n"], json!(2));
        assert_eq!(after.fields["created_at"], before.fields["created_at"]);
    }

    #[tokio::test]
    async fn upsert_inserts_then_amends_one_document() {
        let store = MemoryStore::new();

        store
            .upsert(
                "scores",
                "t1.p1.p1",
                json!({"value": 15}),
                Box::new(|_| Ok(())),
            )
            .await
            .unwrap();
        let first = store.get("scores", "t1.p1.p1").await.unwrap();

        store
            .upsert(
                "scores",
                "t1.p1.p1",
                json!({"value": 0}),
                Box::new(|fields| {
                    fields["value"] = json!(17);
                    Ok(())
                }),
            )
            .await
            .unwrap();

        assert_eq!(store.collection_len("scores"), 1);
        let second = store.get("scores", "t1.p1.p1").await.unwrap();
        assert_eq!(second.fields["value"], json!(17));
        assert_eq!(second.fields["created_at"], first.fields["created_at"]);
    }

    #[tokio::test]
    async fn subscribe_delivers_initial_and_commit_snapshots() {
        let store = MemoryStore::new();
        store
            .create("scores", json!({"trial_id": "t1", "value": 5}))
            .await
            .unwrap();

        let mut sub = store
            .subscribe(
                "scores",
                Filter::new().field_eq("trial_id", "t1"),
                OrderBy::asc("value"),
            )
            .await
            .unwrap();

        let initial = sub.recv().await.unwrap();
        assert_eq!(initial.len(), 1);

        store
            .create("scores", json!({"trial_id": "t1", "value": 9}))
            .await
            .unwrap();
        let next = sub.recv().await.unwrap();
        assert_eq!(next.len(), 2);

        // A commit in an unrelated collection does not wake this watcher.
        store.create("trials", json!({})).await.unwrap();

        sub.cancel();
        store
            .create("scores", json!({"trial_id": "t1", "value": 1}))
            .await
            .unwrap();
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let store = MemoryStore::new();
        let sub = store
            .subscribe("scores", Filter::new(), OrderBy::asc("value"))
            .await
            .unwrap();

        let handle = sub.cancel_handle();
        handle.cancel();
        handle.cancel();
        sub.cancel();
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn injected_faults_are_consumed_in_order() {
        let store = MemoryStore::new();
        store.inject_unavailable(2);

        assert!(store.create("trials", json!({})).await.is_err());
        assert!(store.get("trials", "x").await.is_err());
        // Third operation succeeds (and reports NotFound, not Unavailable).
        let err = store.get("trials", "x").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
