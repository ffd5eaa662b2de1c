//! Injection seam for an external sync collaborator ("Injected
//! collaborators").
//!
//! This core never talks to a remote endpoint itself; it only exposes
//! [`SyncStatus`](crate::entity::SyncStatus) fields for a collaborator
//! outside this crate to read and mutate.

use crate::entity::{BaseEntity, SyncStatus};
use crate::error::Error;

/// A remote synchronization collaborator, implemented outside this
/// core and handed to application code that wires it to a
/// [`crate::repository::Repository`] via its own means (not through
/// this trait directly, `Repository` has no dependency on sync).
///
/// Kept here only so [`crate::entity::BaseEntity`]'s sync fields have a
/// documented consumer; this core never calls these methods itself.
pub trait RemoteSyncService<T: BaseEntity>: Send + Sync {
    /// Push a locally-modified entity, returning its updated sync status.
    fn push(&self, entity: &T) -> Result<SyncStatus, Error>;

    /// Pull remote changes, returning entities to merge locally.
    fn pull(&self) -> Result<Vec<T>, Error>;
}
