// ── Durable state ──

mod bag_store;
mod lock;

pub use bag_store::DataBagStore;
pub(crate) use bag_store::write_atomic;
pub use lock::FileLock;

/// Exclusive hold on one resource type's bag.
pub type BagLock = FileLock;
