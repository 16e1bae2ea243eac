//! Storage seam for appointments and share links.
//!
//! The engine only talks to [`AppointmentStore`]. Bookings go through a
//! [`StoreTransaction`]: reads inside it are fresh, writes are staged, and
//! `commit` applies all of them or none. Losing a race is reported as
//! [`CommitError::Conflict`], never as an I/O failure.

mod wal_store;

pub use wal_store::WalStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::model::{Appointment, ShareLink, Span};

#[derive(Debug)]
pub enum StoreError {
    DuplicateLink(Uuid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::DuplicateLink(id) => write!(f, "share link already exists: {id}"),
            StoreError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            StoreError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

#[derive(Debug)]
pub enum CommitError {
    /// A concurrent write invalidated this transaction. Nothing was written.
    Conflict(&'static str),
    Store(StoreError),
}

impl std::fmt::Display for CommitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommitError::Conflict(why) => write!(f, "write conflict: {why}"),
            CommitError::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CommitError {}

impl From<StoreError> for CommitError {
    fn from(e: StoreError) -> Self {
        CommitError::Store(e)
    }
}

#[async_trait]
pub trait AppointmentStore: Send + Sync + 'static {
    /// Appointments of `owner_id` whose start lies in `range`, ordered by start.
    async fn query_appointments(
        &self,
        owner_id: &str,
        range: Span,
    ) -> Result<Vec<Appointment>, StoreError>;

    /// `None` when the link does not exist or belongs to another owner.
    async fn find_share_link(
        &self,
        id: Uuid,
        owner_id: &str,
    ) -> Result<Option<ShareLink>, StoreError>;

    /// Resolve a link from its token alone. `None` when no such link exists.
    async fn find_share_link_by_token(&self, id: Uuid) -> Result<Option<ShareLink>, StoreError>;

    async fn insert_share_link(&self, link: ShareLink) -> Result<(), StoreError>;

    /// Start a transaction scoped to one owner's calendar.
    async fn begin(&self, owner_id: &str) -> Result<Box<dyn StoreTransaction>, StoreError>;
}

/// Dropping a transaction without committing discards every staged write.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn query_appointments(&mut self, range: Span) -> Result<Vec<Appointment>, StoreError>;

    async fn find_share_link(&mut self, id: Uuid) -> Result<Option<ShareLink>, StoreError>;

    fn insert_appointment(&mut self, appointment: Appointment);

    fn mark_link_used(&mut self, id: Uuid);

    async fn commit(self: Box<Self>) -> Result<(), CommitError>;
}
