//! Document store abstraction and the in-memory reference implementation.

pub mod memory;
pub mod traits;

pub use memory::{MemoryStore, OpKind};
pub use traits::{
    CancelHandle, Direction, Document, DocumentStore, Filter, OrderBy, StoreError, Subscription,
    UpdateFn,
};
