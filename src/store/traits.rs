//! store::traits
//!
//! Document store trait and supporting types.
//!
//! # Design
//!
//! The `DocumentStore` trait is async because store operations involve
//! I/O against a shared remote backend. Documents are schemaless JSON;
//! typed records deserialize at the service boundary via
//! [`Document::to_type`].
//!
//! # Atomicity
//!
//! `update` and `upsert` are read-modify-write operations executed
//! atomically per document: the caller's closure sees the current fields,
//! mutates them, and either the whole mutation commits or (on abort or
//! failure) the document is left untouched. A plain read followed by an
//! unconditional write is exactly what this contract exists to rule out -
//! two judges' assignment writes would otherwise clobber each other.
//!
//! # Timestamps
//!
//! `created_at` and `updated_at` are assigned by the store on commit.
//! Reads return fields with the document `id` injected, so records can
//! deserialize their identifier along with their data.

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::core::retry::Transient;

/// Errors from store operations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// No document with the given id exists in the collection.
    #[error("not found: {collection}/{id}")]
    NotFound {
        /// Collection that was searched.
        collection: String,
        /// Document id that was requested.
        id: String,
    },

    /// An update closure refused the mutation; the document is untouched.
    ///
    /// The domain reason travels out of band (the caller captured it
    /// before returning this), so the variant carries no payload.
    #[error("update aborted")]
    Aborted,

    /// A document could not be serialized or deserialized.
    #[error("serialization failed: {0}")]
    Serialize(String),

    /// The store could not be reached. Safe to retry for idempotent writes.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// A document read back from the store.
///
/// `fields` always contains the document `id` and the server-assigned
/// `created_at`/`updated_at` alongside the stored data.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Store-assigned (or natural-key) identifier.
    pub id: String,
    /// The document body.
    pub fields: Value,
}

impl Document {
    /// Deserialize the document into a typed record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Serialize` if the fields do not match the
    /// target shape.
    pub fn to_type<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(self.fields.clone()).map_err(|e| StoreError::Serialize(e.to_string()))
    }
}

/// Equality filter over document fields.
///
/// # Example
///
/// ```
/// use trialpost::store::Filter;
///
/// let filter = Filter::new().field_eq("trial_id", "t1").field_eq("status", "pending");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter(Vec<(String, Value)>);

impl Filter {
    /// An empty filter matching every document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field` to equal `value`.
    pub fn field_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.push((field.into(), value.into()));
        self
    }

    /// Whether a document body satisfies every clause.
    pub fn matches(&self, fields: &Value) -> bool {
        self.0
            .iter()
            .all(|(field, expected)| fields.get(field) == Some(expected))
    }

    /// Whether the filter has no clauses.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Sort direction for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Single-field ordering for query and subscription results.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    /// Field to sort by.
    pub field: String,
    /// Sort direction.
    pub direction: Direction,
}

impl OrderBy {
    /// Ascending order on `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Ascending,
        }
    }

    /// Descending order on `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Descending,
        }
    }

    /// Compare two document bodies under this ordering.
    pub fn compare(&self, a: &Value, b: &Value) -> std::cmp::Ordering {
        let ord = cmp_json(a.get(&self.field), b.get(&self.field));
        match self.direction {
            Direction::Ascending => ord,
            Direction::Descending => ord.reverse(),
        }
    }
}

/// Total order over optional JSON values: missing/null first, then
/// booleans, numbers, strings; everything else compares equal.
fn cmp_json(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(Value::Array(_)) | Some(Value::Object(_)) => 4,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Atomic mutation applied to a document's fields.
///
/// Returning an error aborts the update and leaves the document
/// untouched; `StoreError::Aborted` is the conventional refusal.
pub type UpdateFn = Box<dyn FnMut(&mut Value) -> Result<(), StoreError> + Send>;

/// Idempotent cancellation handle for a subscription.
///
/// The first `cancel` runs the registered teardown; every later call is
/// a no-op. Handles are cheap to clone and share.
#[derive(Clone)]
pub struct CancelHandle {
    inner: Arc<CancelInner>,
}

struct CancelInner {
    cancelled: AtomicBool,
    teardown: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl CancelHandle {
    /// Create a handle that runs `teardown` on first cancel.
    pub fn new(teardown: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner: Arc::new(CancelInner {
                cancelled: AtomicBool::new(false),
                teardown: Mutex::new(Some(Box::new(teardown))),
            }),
        }
    }

    /// Stop further deliveries. Safe to call multiple times.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, AtomicOrdering::SeqCst) {
            return;
        }
        if let Ok(mut slot) = self.inner.teardown.lock() {
            if let Some(teardown) = slot.take() {
                teardown();
            }
        }
    }

    /// Whether `cancel` has been called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(AtomicOrdering::SeqCst)
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// A change subscription.
///
/// Delivers the full matching snapshot immediately, then a fresh full
/// snapshot after every commit touching the collection. Delivery is
/// at-least-once and may repeat an unchanged snapshot; consumers treat
/// each delivery as a replacement of their local view.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Vec<Document>>,
    handle: CancelHandle,
}

impl Subscription {
    /// Assemble a subscription from its channel and cancel handle.
    pub fn new(rx: mpsc::UnboundedReceiver<Vec<Document>>, handle: CancelHandle) -> Self {
        Self { rx, handle }
    }

    /// Wait for the next snapshot. Returns `None` once cancelled and
    /// drained.
    pub async fn recv(&mut self) -> Option<Vec<Document>> {
        self.rx.recv().await
    }

    /// A clonable handle that cancels this subscription.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.handle.clone()
    }

    /// Cancel in place.
    pub fn cancel(&self) {
        self.handle.cancel();
    }
}

/// A document database offering per-document atomic read-modify-write
/// and change subscription.
///
/// Implementations must guarantee that concurrent `update`/`upsert`
/// calls against the same document serialize, and that an aborted or
/// failed mutation leaves the document in its prior state.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a document with a server-assigned id. Returns the id.
    async fn create(&self, collection: &str, fields: Value) -> Result<String, StoreError>;

    /// Fetch a document by id.
    async fn get(&self, collection: &str, id: &str) -> Result<Document, StoreError>;

    /// Fetch all documents matching `filter`, sorted by `order`.
    async fn query(
        &self,
        collection: &str,
        filter: Filter,
        order: OrderBy,
    ) -> Result<Vec<Document>, StoreError>;

    /// Atomically mutate an existing document. Returns the committed
    /// document.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        apply: UpdateFn,
    ) -> Result<Document, StoreError>;

    /// Atomic create-or-amend keyed on a caller-chosen id.
    ///
    /// If no document exists, `init` is inserted as-is; otherwise `apply`
    /// mutates the existing fields. Both paths are one atomic step, which
    /// is what makes natural-key upserts race-safe.
    async fn upsert(
        &self,
        collection: &str,
        id: &str,
        init: Value,
        apply: UpdateFn,
    ) -> Result<Document, StoreError>;

    /// Subscribe to the documents matching `filter`, sorted by `order`.
    async fn subscribe(
        &self,
        collection: &str,
        filter: Filter,
        order: OrderBy,
    ) -> Result<Subscription, StoreError>;
}
