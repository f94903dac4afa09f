//! svat-file - Filesystem-backed credential slot.

mod store;

pub use store::FileStore;
