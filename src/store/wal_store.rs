use std::collections::{HashMap, HashSet};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::{debug, info};
use ulid::Ulid;
use uuid::Uuid;

use crate::limits::MAX_OWNER_ID_LEN;
use crate::model::*;
use crate::observability;
use crate::wal::Wal;

use super::{AppointmentStore, CommitError, StoreError, StoreTransaction};

pub type SharedOwnerState = Arc<RwLock<OwnerState>>;

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Owns the WAL. Appends that queue up while a flush is pending are written
/// together and share one fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_non_append(&mut wal, cmd);
            continue;
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        respond_batch(batch, &result);

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let append_result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so half-written bytes don't leak into the next batch.
    let flush_result = wal.flush_sync();
    append_result.and(flush_result)
}

fn respond_batch(batch: Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file(events.len() as u64));
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the caller"),
    }
}

/// Apply an event to one owner's state (caller holds the write lock).
fn apply_to_owner(os: &mut OwnerState, event: &Event) {
    match event {
        Event::LinkCreated { link } => {
            os.links.insert(link.id, link.clone());
        }
        Event::BookingCommitted {
            appointments,
            used_links,
            ..
        } => {
            for appointment in appointments {
                os.insert_appointment(appointment.clone());
            }
            for id in used_links {
                if let Some(link) = os.links.get_mut(id) {
                    link.is_used = true;
                }
            }
        }
    }
}

struct StoreInner {
    owners: DashMap<String, SharedOwnerState>,
    /// Link token → owner, so tokens stay globally unique.
    link_owner: DashMap<Uuid, String>,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Mutations hold this shared; compaction holds it exclusively so its snapshot is complete.
    gate: RwLock<()>,
}

impl StoreInner {
    fn existing_owner(&self, owner_id: &str) -> Option<SharedOwnerState> {
        self.owners.get(owner_id).map(|e| e.value().clone())
    }

    fn owner(&self, owner_id: &str) -> SharedOwnerState {
        if let Some(state) = self.existing_owner(owner_id) {
            return state;
        }
        self.owners
            .entry(owner_id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(OwnerState::new(owner_id.to_string()))))
            .value()
            .clone()
    }

    async fn wal_append(&self, event: &Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::WalError(e.to_string()))
    }
}

/// In-memory appointment store made durable by an append-only WAL.
///
/// Each owner's calendar sits behind its own `RwLock`. Transactions are
/// optimistic: reads remember what they saw and `commit` re-checks that under
/// the owner's write lock before writing a single WAL record for all staged
/// writes. Cloning is cheap and shares state.
#[derive(Clone)]
pub struct WalStore {
    inner: Arc<StoreInner>,
}

impl WalStore {
    /// Replay the WAL at `wal_path` and start its writer task. Needs a Tokio runtime.
    pub fn open(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path, events.len() as u64)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let mut states: HashMap<String, OwnerState> = HashMap::new();
        let link_owner = DashMap::new();
        for event in &events {
            if let Event::LinkCreated { link } = event {
                link_owner.insert(link.id, link.owner_id.clone());
            }
            let owner_id = event.owner_id();
            let state = states
                .entry(owner_id.to_string())
                .or_insert_with(|| OwnerState::new(owner_id.to_string()));
            apply_to_owner(state, event);
        }
        info!(
            records = events.len(),
            owners = states.len(),
            path = %wal_path.display(),
            "store opened"
        );

        let owners = states
            .into_iter()
            .map(|(id, state)| (id, Arc::new(RwLock::new(state))))
            .collect();

        Ok(Self {
            inner: Arc::new(StoreInner {
                owners,
                link_owner,
                wal_tx,
                gate: RwLock::new(()),
            }),
        })
    }

    /// Rewrite the WAL with just the records needed to rebuild current state.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let _gate = self.inner.gate.write().await;

        let states: Vec<SharedOwnerState> =
            self.inner.owners.iter().map(|e| e.value().clone()).collect();
        let mut events = Vec::new();
        for state in states {
            let guard = state.read().await;
            let mut links: Vec<&ShareLink> = guard.links.values().collect();
            links.sort_by_key(|l| l.created_utc);
            events.extend(links.into_iter().map(|link| Event::LinkCreated { link: link.clone() }));
            if !guard.appointments.is_empty() {
                events.push(Event::BookingCommitted {
                    owner_id: guard.owner_id.clone(),
                    appointments: guard.appointments.clone(),
                    used_links: Vec::new(),
                });
            }
        }

        let records = events.len();
        let (tx, rx) = oneshot::channel();
        self.inner
            .wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::WalError(e.to_string()))?;
        info!(records, "WAL compacted");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .inner
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

fn validate_owner_id(owner_id: &str) -> Result<(), StoreError> {
    if owner_id.is_empty() || owner_id.len() > MAX_OWNER_ID_LEN {
        return Err(StoreError::LimitExceeded("owner id must be 1..=450 bytes"));
    }
    Ok(())
}

#[async_trait]
impl AppointmentStore for WalStore {
    async fn query_appointments(
        &self,
        owner_id: &str,
        range: Span,
    ) -> Result<Vec<Appointment>, StoreError> {
        let Some(state) = self.inner.existing_owner(owner_id) else {
            return Ok(Vec::new());
        };
        let guard = state.read().await;
        Ok(guard.starting_within(&range).cloned().collect())
    }

    async fn find_share_link(
        &self,
        id: Uuid,
        owner_id: &str,
    ) -> Result<Option<ShareLink>, StoreError> {
        let Some(state) = self.inner.existing_owner(owner_id) else {
            return Ok(None);
        };
        let guard = state.read().await;
        Ok(guard.links.get(&id).cloned())
    }

    async fn find_share_link_by_token(&self, id: Uuid) -> Result<Option<ShareLink>, StoreError> {
        let Some(owner_id) = self.inner.link_owner.get(&id).map(|e| e.value().clone()) else {
            return Ok(None);
        };
        self.find_share_link(id, &owner_id).await
    }

    async fn insert_share_link(&self, link: ShareLink) -> Result<(), StoreError> {
        validate_owner_id(&link.owner_id)?;
        let inner = self.inner.clone();
        // Detached so a dropped caller can't leave the WAL ahead of memory.
        tokio::spawn(async move {
            let _gate = inner.gate.read().await;
            match inner.link_owner.entry(link.id) {
                Entry::Occupied(_) => return Err(StoreError::DuplicateLink(link.id)),
                Entry::Vacant(slot) => {
                    slot.insert(link.owner_id.clone());
                }
            }
            let state = inner.owner(&link.owner_id);
            let mut guard = state.write().await;
            let id = link.id;
            let event = Event::LinkCreated { link };
            if let Err(e) = inner.wal_append(&event).await {
                inner.link_owner.remove(&id);
                return Err(e);
            }
            apply_to_owner(&mut guard, &event);
            Ok(())
        })
        .await
        .map_err(|e| StoreError::WalError(format!("link insert task failed: {e}")))?
    }

    async fn begin(&self, owner_id: &str) -> Result<Box<dyn StoreTransaction>, StoreError> {
        validate_owner_id(owner_id)?;
        Ok(Box::new(WalTransaction {
            store: self.clone(),
            owner_id: owner_id.to_string(),
            state: self.inner.owner(owner_id),
            range_reads: Vec::new(),
            link_reads: Vec::new(),
            inserts: Vec::new(),
            used_links: Vec::new(),
        }))
    }
}

struct WalTransaction {
    store: WalStore,
    owner_id: String,
    state: SharedOwnerState,
    /// Each range read with the appointment ids it returned.
    range_reads: Vec<(Span, Vec<Ulid>)>,
    /// Each link read with the used flag it returned (`None` = absent).
    link_reads: Vec<(Uuid, Option<bool>)>,
    inserts: Vec<Appointment>,
    used_links: Vec<Uuid>,
}

impl WalTransaction {
    /// Serializability check plus the (owner, start) and single-use constraints.
    fn validate(&self, os: &OwnerState) -> Result<(), CommitError> {
        for (range, seen) in &self.range_reads {
            if !os.starting_within(range).map(|a| a.id).eq(seen.iter().copied()) {
                return Err(CommitError::Conflict("appointments changed since read"));
            }
        }
        for (id, seen) in &self.link_reads {
            if os.links.get(id).map(|l| l.is_used) != *seen {
                return Err(CommitError::Conflict("share link changed since read"));
            }
        }

        let mut starts = HashSet::new();
        for appointment in &self.inserts {
            if appointment.owner_id != self.owner_id {
                return Err(CommitError::Store(StoreError::LimitExceeded(
                    "appointment owner differs from transaction owner",
                )));
            }
            if os.has_start(appointment.start_utc) || !starts.insert(appointment.start_utc) {
                return Err(CommitError::Conflict("duplicate (owner, start)"));
            }
        }
        for id in &self.used_links {
            match os.links.get(id) {
                None => return Err(CommitError::Conflict("share link not found")),
                Some(link) if link.is_used => {
                    return Err(CommitError::Conflict("share link already used"));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    async fn apply(self) -> Result<(), CommitError> {
        let inner = self.store.inner.clone();
        let state = self.state.clone();
        let _gate = inner.gate.read().await;
        let mut guard = state.write().await;

        if let Err(e) = self.validate(&guard) {
            debug!(owner = %self.owner_id, "commit rejected: {e}");
            return Err(e);
        }

        let event = Event::BookingCommitted {
            owner_id: self.owner_id,
            appointments: self.inserts,
            used_links: self.used_links,
        };
        inner.wal_append(&event).await?;
        apply_to_owner(&mut guard, &event);
        Ok(())
    }
}

#[async_trait]
impl StoreTransaction for WalTransaction {
    async fn query_appointments(&mut self, range: Span) -> Result<Vec<Appointment>, StoreError> {
        let guard = self.state.read().await;
        let hits: Vec<Appointment> = guard.starting_within(&range).cloned().collect();
        self.range_reads
            .push((range, hits.iter().map(|a| a.id).collect()));
        Ok(hits)
    }

    async fn find_share_link(&mut self, id: Uuid) -> Result<Option<ShareLink>, StoreError> {
        let guard = self.state.read().await;
        let link = guard.links.get(&id).cloned();
        self.link_reads.push((id, link.as_ref().map(|l| l.is_used)));
        Ok(link)
    }

    fn insert_appointment(&mut self, appointment: Appointment) {
        self.inserts.push(appointment);
    }

    fn mark_link_used(&mut self, id: Uuid) {
        self.used_links.push(id);
    }

    async fn commit(self: Box<Self>) -> Result<(), CommitError> {
        if self.inserts.is_empty() && self.used_links.is_empty() {
            return Ok(());
        }
        // Detached: once commit starts it runs to completion even if the caller goes away.
        let tx = *self;
        tokio::spawn(tx.apply())
            .await
            .map_err(|e| StoreError::WalError(format!("commit task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};

    const OWNER: &str = "owner@example.com";

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("meetslot_test_store");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, d, h, m, 0).unwrap()
    }

    fn day(d: u32) -> Span {
        Span::new(at(d, 0, 0), at(d + 1, 0, 0))
    }

    fn appointment(link: &ShareLink, start: DateTime<Utc>) -> Appointment {
        Appointment {
            id: Ulid::new(),
            owner_id: link.owner_id.clone(),
            start_utc: start,
            end_utc: start + TimeDelta::minutes(30),
            share_link_id: link.id,
            guest_first_name: "Eva".into(),
            guest_last_name: "Dvořáková".into(),
            created_utc: at(1, 0, 0),
        }
    }

    async fn new_link(store: &WalStore) -> ShareLink {
        let link = ShareLink::new(OWNER.into(), at(1, 0, 0));
        store.insert_share_link(link.clone()).await.unwrap();
        link
    }

    async fn book(store: &WalStore, link: &ShareLink, start: DateTime<Utc>) -> Result<(), CommitError> {
        let mut tx = store.begin(OWNER).await.unwrap();
        tx.insert_appointment(appointment(link, start));
        tx.mark_link_used(link.id);
        tx.commit().await
    }

    #[tokio::test]
    async fn link_lookup_is_scoped_to_owner() {
        let store = WalStore::open(test_wal_path("link_scope.wal")).unwrap();
        let link = new_link(&store).await;

        let found = store.find_share_link(link.id, OWNER).await.unwrap();
        assert_eq!(found, Some(link.clone()));
        assert!(store.find_share_link(link.id, "other@example.com").await.unwrap().is_none());
        assert!(store.find_share_link(Uuid::new_v4(), OWNER).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn link_resolves_from_token_alone() {
        let path = test_wal_path("link_by_token.wal");
        let link = {
            let store = WalStore::open(path.clone()).unwrap();
            let link = new_link(&store).await;
            let found = store.find_share_link_by_token(link.id).await.unwrap();
            assert_eq!(found.map(|l| l.owner_id), Some(OWNER.to_string()));
            assert!(store.find_share_link_by_token(Uuid::new_v4()).await.unwrap().is_none());
            link
        };

        // The token index is rebuilt on replay.
        let store = WalStore::open(path).unwrap();
        assert_eq!(store.find_share_link_by_token(link.id).await.unwrap(), Some(link));
    }

    #[tokio::test]
    async fn duplicate_link_token_rejected() {
        let store = WalStore::open(test_wal_path("dup_link.wal")).unwrap();
        let link = new_link(&store).await;
        let mut stolen = link.clone();
        stolen.owner_id = "other@example.com".into();
        let result = store.insert_share_link(stolen).await;
        assert!(matches!(result, Err(StoreError::DuplicateLink(id)) if id == link.id));
    }

    #[tokio::test]
    async fn empty_owner_rejected() {
        let store = WalStore::open(test_wal_path("empty_owner.wal")).unwrap();
        let result = store.insert_share_link(ShareLink::new(String::new(), at(1, 0, 0))).await;
        assert!(matches!(result, Err(StoreError::LimitExceeded(_))));
        assert!(store.begin("").await.is_err());
    }

    #[tokio::test]
    async fn commit_applies_insert_and_link_together() {
        let store = WalStore::open(test_wal_path("commit_both.wal")).unwrap();
        let link = new_link(&store).await;

        book(&store, &link, at(4, 9, 0)).await.unwrap();

        let day_appointments = store.query_appointments(OWNER, day(4)).await.unwrap();
        assert_eq!(day_appointments.len(), 1);
        assert_eq!(day_appointments[0].share_link_id, link.id);
        assert!(store.find_share_link(link.id, OWNER).await.unwrap().unwrap().is_used);
    }

    #[tokio::test]
    async fn query_is_ordered_and_bounded_by_start() {
        let store = WalStore::open(test_wal_path("query_order.wal")).unwrap();
        for start in [at(4, 13, 0), at(4, 9, 0), at(5, 9, 0), at(4, 11, 0)] {
            let link = new_link(&store).await;
            book(&store, &link, start).await.unwrap();
        }

        let starts: Vec<_> = store
            .query_appointments(OWNER, day(4))
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.start_utc)
            .collect();
        assert_eq!(starts, vec![at(4, 9, 0), at(4, 11, 0), at(4, 13, 0)]);
        assert!(store.query_appointments("nobody@example.com", day(4)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dropped_transaction_writes_nothing() {
        let store = WalStore::open(test_wal_path("rollback.wal")).unwrap();
        let link = new_link(&store).await;
        {
            let mut tx = store.begin(OWNER).await.unwrap();
            tx.insert_appointment(appointment(&link, at(4, 9, 0)));
            tx.mark_link_used(link.id);
        }
        assert!(store.query_appointments(OWNER, day(4)).await.unwrap().is_empty());
        assert!(!store.find_share_link(link.id, OWNER).await.unwrap().unwrap().is_used);
    }

    #[tokio::test]
    async fn stale_read_set_conflicts() {
        let store = WalStore::open(test_wal_path("stale_read.wal")).unwrap();
        let link_a = new_link(&store).await;
        let link_b = new_link(&store).await;

        let mut tx_a = store.begin(OWNER).await.unwrap();
        let mut tx_b = store.begin(OWNER).await.unwrap();
        assert!(tx_a.query_appointments(day(4)).await.unwrap().is_empty());
        assert!(tx_b.query_appointments(day(4)).await.unwrap().is_empty());

        tx_a.insert_appointment(appointment(&link_a, at(4, 9, 0)));
        tx_a.mark_link_used(link_a.id);
        tx_b.insert_appointment(appointment(&link_b, at(4, 9, 15)));
        tx_b.mark_link_used(link_b.id);

        tx_a.commit().await.unwrap();
        let result = tx_b.commit().await;
        assert!(matches!(result, Err(CommitError::Conflict(_))));
        assert_eq!(store.query_appointments(OWNER, day(4)).await.unwrap().len(), 1);
        assert!(!store.find_share_link(link_b.id, OWNER).await.unwrap().unwrap().is_used);
    }

    #[tokio::test]
    async fn disjoint_days_commit_independently() {
        let store = WalStore::open(test_wal_path("disjoint.wal")).unwrap();
        let link_a = new_link(&store).await;
        let link_b = new_link(&store).await;

        let mut tx_a = store.begin(OWNER).await.unwrap();
        let mut tx_b = store.begin(OWNER).await.unwrap();
        tx_a.query_appointments(day(4)).await.unwrap();
        tx_b.query_appointments(day(5)).await.unwrap();
        tx_a.insert_appointment(appointment(&link_a, at(4, 9, 0)));
        tx_a.mark_link_used(link_a.id);
        tx_b.insert_appointment(appointment(&link_b, at(5, 9, 0)));
        tx_b.mark_link_used(link_b.id);

        tx_a.commit().await.unwrap();
        tx_b.commit().await.unwrap();
    }

    #[tokio::test]
    async fn unique_owner_start_is_enforced_without_reads() {
        let store = WalStore::open(test_wal_path("unique_start.wal")).unwrap();
        let link_a = new_link(&store).await;
        let link_b = new_link(&store).await;

        book(&store, &link_a, at(4, 9, 0)).await.unwrap();
        let result = book(&store, &link_b, at(4, 9, 0)).await;
        assert!(matches!(result, Err(CommitError::Conflict("duplicate (owner, start)"))));
    }

    #[tokio::test]
    async fn link_cannot_be_consumed_twice() {
        let store = WalStore::open(test_wal_path("link_twice.wal")).unwrap();
        let link = new_link(&store).await;

        book(&store, &link, at(4, 9, 0)).await.unwrap();
        let result = book(&store, &link, at(5, 9, 0)).await;
        assert!(matches!(result, Err(CommitError::Conflict("share link already used"))));
    }

    #[tokio::test]
    async fn link_read_then_consumed_elsewhere_conflicts() {
        let store = WalStore::open(test_wal_path("link_read.wal")).unwrap();
        let link = new_link(&store).await;

        let mut tx = store.begin(OWNER).await.unwrap();
        assert!(!tx.find_share_link(link.id).await.unwrap().unwrap().is_used);
        book(&store, &link, at(4, 9, 0)).await.unwrap();

        tx.insert_appointment(appointment(&link, at(6, 9, 0)));
        let result = tx.commit().await;
        assert!(matches!(result, Err(CommitError::Conflict("share link changed since read"))));
    }

    #[tokio::test]
    async fn empty_commit_is_noop() {
        let store = WalStore::open(test_wal_path("empty_commit.wal")).unwrap();
        let tx = store.begin(OWNER).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.wal_appends_since_compact().await, 0);
    }

    #[tokio::test]
    async fn replay_restores_links_and_appointments() {
        let path = test_wal_path("replay.wal");
        let (used, fresh) = {
            let store = WalStore::open(path.clone()).unwrap();
            let used = new_link(&store).await;
            let fresh = new_link(&store).await;
            book(&store, &used, at(4, 9, 0)).await.unwrap();
            (used, fresh)
        };

        let store = WalStore::open(path).unwrap();
        assert!(store.find_share_link(used.id, OWNER).await.unwrap().unwrap().is_used);
        assert!(!store.find_share_link(fresh.id, OWNER).await.unwrap().unwrap().is_used);
        assert_eq!(store.query_appointments(OWNER, day(4)).await.unwrap().len(), 1);
        assert_eq!(store.wal_appends_since_compact().await, 3);

        // Token index is rebuilt too.
        let result = store.insert_share_link(fresh.clone()).await;
        assert!(matches!(result, Err(StoreError::DuplicateLink(_))));
    }

    #[tokio::test]
    async fn compact_preserves_state_across_restart() {
        let path = test_wal_path("compact.wal");
        let (used, fresh) = {
            let store = WalStore::open(path.clone()).unwrap();
            let mut used = Vec::new();
            for h in [9, 11, 13] {
                let link = new_link(&store).await;
                book(&store, &link, at(4, h, 0)).await.unwrap();
                used.push(link);
            }
            let fresh = new_link(&store).await;
            assert_eq!(store.wal_appends_since_compact().await, 7);

            store.compact().await.unwrap();
            // 4 links + one booking record for the owner
            assert_eq!(store.wal_appends_since_compact().await, 5);
            (used, fresh)
        };

        let store = WalStore::open(path).unwrap();
        assert_eq!(store.query_appointments(OWNER, day(4)).await.unwrap().len(), 3);
        for link in &used {
            assert!(store.find_share_link(link.id, OWNER).await.unwrap().unwrap().is_used);
        }
        assert!(!store.find_share_link(fresh.id, OWNER).await.unwrap().unwrap().is_used);
    }
}
