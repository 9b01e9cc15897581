//! Template gallery for coderun.
//!
//! An ordered list of snippet templates, the snapshots users make of them,
//! and the editor state that tracks which template is current.

mod error;
mod gallery;
mod store;
mod template;
mod workbench;

pub use error::{GalleryError, Result, StoreError};
pub use gallery::{Gallery, Snapshot};
pub use store::{FileStore, MemoryStore, SnapshotStore, snapshot_key};
pub use template::{Locale, Template, builtin_templates};
pub use workbench::{EditSubscription, Workbench};
