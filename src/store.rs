//! Durable, transactional keeper of booking records.
//!
//! `WalStore` keeps one ledger per room behind a `tokio::sync::RwLock` and
//! persists every mutation through a group-commit WAL writer task before it
//! becomes visible. The room write lock is held across the overlap re-check,
//! the WAL append, and the in-memory apply, so check-then-insert is a single
//! atomic unit: an insert that would overlap a committed ACTIVE booking is
//! rejected here no matter what the caller concluded from an earlier read.
//!
//! The append + apply pair runs on its own spawned task that owns the room
//! write guard. A caller that times out or is cancelled drops only its own
//! future; the commit still finishes (or fails) as a unit, so the WAL never
//! records an event the ledger didn't apply.

use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::conflict;
use crate::limits::MAX_BOOKINGS_PER_ROOM;
use crate::model::{Booking, BookingState, Event, Span};
use crate::observability;
use crate::wal::Wal;

#[derive(Debug)]
pub enum StoreError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// The exclusion constraint fired at commit time: the write would
    /// overlap the named ACTIVE booking.
    Overlap(Ulid),
    /// Compare-and-set lost a race: the record is no longer in the state
    /// the caller observed.
    StaleState {
        id: Ulid,
        expected: BookingState,
        actual: BookingState,
    },
    LimitExceeded(&'static str),
    /// Transient: WAL writer down or I/O failure. Eligible for retry.
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "booking not found: {id}"),
            StoreError::AlreadyExists(id) => write!(f, "booking already exists: {id}"),
            StoreError::Overlap(id) => write!(f, "overlaps active booking: {id}"),
            StoreError::StaleState { id, expected, actual } => write!(
                f,
                "stale state for {id}: expected {expected:?}, found {actual:?}"
            ),
            StoreError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            StoreError::Unavailable(e) => write!(f, "store unavailable: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// The store interface the lifecycle manager is written against.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// ACTIVE bookings for `room_id` overlapping `range`. The read feeding
    /// the conflict resolver.
    async fn find_active(&self, room_id: Ulid, range: Span) -> Result<Vec<Booking>, StoreError>;

    /// Insert a new booking. An ACTIVE insert is checked against the
    /// per-room exclusion constraint under the same lock as the write.
    async fn insert(&self, booking: Booking) -> Result<Booking, StoreError>;

    /// Compare-and-set state transition keyed on the previously observed
    /// state. A transition into ACTIVE re-checks the exclusion constraint.
    async fn update_state(
        &self,
        id: Ulid,
        expected: BookingState,
        new: BookingState,
    ) -> Result<Booking, StoreError>;

    async fn get(&self, id: Ulid) -> Result<Booking, StoreError>;

    /// Listing read — not serialized against writers.
    async fn list(
        &self,
        room_id: Option<Ulid>,
        range: Span,
        include_cancelled: bool,
    ) -> Result<Vec<Booking>, StoreError>;
}

// ── Per-room ledger ──────────────────────────────────────

type SharedLedger = Arc<RwLock<RoomLedger>>;

/// All bookings ever made on one room, sorted by `span.start`.
/// Cancelled records stay forever — cancellation is a transition, not a delete.
struct RoomLedger {
    bookings: Vec<Booking>,
}

impl RoomLedger {
    fn new() -> Self {
        Self {
            bookings: Vec::new(),
        }
    }

    /// Insert maintaining sort order by span.start.
    fn insert_sorted(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    fn position(&self, id: Ulid) -> Option<usize> {
        self.bookings.iter().position(|b| b.id == id)
    }

    /// Bookings whose span overlaps the query window, any state.
    /// Binary search skips everything starting at or after `query.end`.
    fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        let right_bound = self.bookings.partition_point(|b| b.span.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span.end > query.start)
    }
}

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
    Shutdown {
        response: oneshot::Sender<()>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                let mut deferred = None;
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE)
                    .record(batch.len() as f64);
                let flush_start = std::time::Instant::now();
                let result = flush_batch(&mut wal, &mut batch);
                metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
                    .record(flush_start.elapsed().as_secs_f64());
                respond_batch(&mut batch, &result);

                if let Some(cmd) = deferred
                    && !handle_non_append(&mut wal, cmd) {
                        return;
                    }
            }
            other => {
                if !handle_non_append(&mut wal, other) {
                    return;
                }
            }
        }
    }
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

/// Returns false when the writer should stop.
fn handle_non_append(wal: &mut Wal, cmd: WalCommand) -> bool {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
            true
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
            true
        }
        WalCommand::Shutdown { response } => {
            let _ = response.send(());
            false
        }
        WalCommand::Append { .. } => true,
    }
}

// ── The store ────────────────────────────────────────────

pub struct WalStore {
    ledgers: DashMap<Ulid, SharedLedger>,
    /// Reverse lookup: booking id → room id. Shared with commit tasks.
    booking_rooms: Arc<DashMap<Ulid, Ulid>>,
    wal_tx: mpsc::Sender<WalCommand>,
}

/// Write one event through the background group-commit writer.
async fn wal_append(tx: &mpsc::Sender<WalCommand>, event: &Event) -> Result<(), StoreError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    tx.send(WalCommand::Append {
        event: event.clone(),
        response: reply_tx,
    })
    .await
    .map_err(|_| StoreError::Unavailable("WAL writer shut down".into()))?;
    reply_rx
        .await
        .map_err(|_| StoreError::Unavailable("WAL writer dropped response".into()))?
        .map_err(|e| StoreError::Unavailable(e.to_string()))
}

impl WalStore {
    /// Open the store: replay the WAL at `path` and start the group-commit
    /// writer. Must run inside a tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let events = Wal::replay(path)?;
        let wal = Wal::open(path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = Self {
            ledgers: DashMap::new(),
            booking_rooms: Arc::new(DashMap::new()),
            wal_tx,
        };

        // Replay — we're the sole owner of these Arcs, so try_write always
        // succeeds instantly (no contention). Never use blocking_write here
        // because open() may run inside an async context.
        for event in &events {
            match event {
                Event::BookingCreated { booking } => {
                    let ledger = store.ledger(booking.room_id);
                    let mut guard = ledger.try_write().expect("replay: uncontended write");
                    store.booking_rooms.insert(booking.id, booking.room_id);
                    guard.insert_sorted(booking.clone());
                }
                Event::StateChanged {
                    id,
                    room_id,
                    to,
                    version,
                    ..
                } => {
                    if let Some(entry) = store.ledgers.get(room_id) {
                        let ledger = entry.value().clone();
                        let mut guard = ledger.try_write().expect("replay: uncontended write");
                        if let Some(pos) = guard.position(*id) {
                            guard.bookings[pos].state = *to;
                            guard.bookings[pos].version = *version;
                        }
                    }
                }
            }
        }

        Ok(store)
    }

    /// Stop the WAL writer after draining queued work. Subsequent mutations
    /// fail with `Unavailable`.
    pub async fn close(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::Shutdown { response: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    fn ledger(&self, room_id: Ulid) -> SharedLedger {
        self.ledgers
            .entry(room_id)
            .or_insert_with(|| Arc::new(RwLock::new(RoomLedger::new())))
            .value()
            .clone()
    }

    /// Rewrite the WAL with one `BookingCreated` per booking at its current
    /// state, collapsing state-change churn.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let mut events = Vec::new();
        let ledger_arcs: Vec<SharedLedger> =
            self.ledgers.iter().map(|e| e.value().clone()).collect();
        for ledger in ledger_arcs {
            let guard = ledger.read().await;
            for booking in &guard.bookings {
                events.push(Event::BookingCreated {
                    booking: booking.clone(),
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::Unavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Unavailable("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
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

#[async_trait]
impl ReservationStore for WalStore {
    async fn find_active(&self, room_id: Ulid, range: Span) -> Result<Vec<Booking>, StoreError> {
        let ledger = match self.ledgers.get(&room_id) {
            Some(entry) => entry.value().clone(),
            None => return Ok(Vec::new()),
        };
        let guard = ledger.read().await;
        Ok(guard
            .overlapping(&range)
            .filter(|b| b.state == BookingState::Active)
            .cloned()
            .collect())
    }

    async fn insert(&self, booking: Booking) -> Result<Booking, StoreError> {
        let ledger = self.ledger(booking.room_id);
        let mut guard = ledger.write_owned().await;

        if self.booking_rooms.contains_key(&booking.id) {
            return Err(StoreError::AlreadyExists(booking.id));
        }
        if guard.bookings.len() >= MAX_BOOKINGS_PER_ROOM {
            return Err(StoreError::LimitExceeded("too many bookings on room"));
        }
        if booking.state == BookingState::Active
            && let Some(hit) = conflict::find_conflict(&guard.bookings, &booking.span, None)
        {
            return Err(StoreError::Overlap(hit.id));
        }

        // Commit on a task of its own, guard and all: a caller dropped by a
        // timeout or cancel cannot abort between the append and the apply.
        // The lock is held across the append, so commit order equals
        // visibility order.
        let wal_tx = self.wal_tx.clone();
        let rooms = Arc::clone(&self.booking_rooms);
        let commit = tokio::spawn(async move {
            // The id is reserved through the shared index, not a room lock,
            // so the duplicate check is race-free across rooms.
            match rooms.entry(booking.id) {
                Entry::Occupied(_) => return Err(StoreError::AlreadyExists(booking.id)),
                Entry::Vacant(slot) => {
                    slot.insert(booking.room_id);
                }
            }
            let event = Event::BookingCreated {
                booking: booking.clone(),
            };
            if let Err(e) = wal_append(&wal_tx, &event).await {
                rooms.remove(&booking.id);
                return Err(e);
            }
            guard.insert_sorted(booking.clone());
            Ok(booking)
        });
        commit
            .await
            .map_err(|_| StoreError::Unavailable("commit task aborted".into()))?
    }

    async fn update_state(
        &self,
        id: Ulid,
        expected: BookingState,
        new: BookingState,
    ) -> Result<Booking, StoreError> {
        let room_id = self
            .booking_rooms
            .get(&id)
            .map(|e| *e.value())
            .ok_or(StoreError::NotFound(id))?;
        let ledger = self.ledger(room_id);
        let mut guard = ledger.write_owned().await;

        let pos = guard.position(id).ok_or(StoreError::NotFound(id))?;
        let current = &guard.bookings[pos];
        if current.state != expected {
            return Err(StoreError::StaleState {
                id,
                expected,
                actual: current.state,
            });
        }
        if new == BookingState::Active
            && let Some(hit) = conflict::find_conflict(&guard.bookings, &current.span, Some(id))
        {
            return Err(StoreError::Overlap(hit.id));
        }
        let version = current.version + 1;

        // Same commit-task discipline as insert: append and apply together.
        let wal_tx = self.wal_tx.clone();
        let commit = tokio::spawn(async move {
            wal_append(
                &wal_tx,
                &Event::StateChanged {
                    id,
                    room_id,
                    from: expected,
                    to: new,
                    version,
                },
            )
            .await?;
            guard.bookings[pos].state = new;
            guard.bookings[pos].version = version;
            Ok(guard.bookings[pos].clone())
        });
        commit
            .await
            .map_err(|_| StoreError::Unavailable("commit task aborted".into()))?
    }

    async fn get(&self, id: Ulid) -> Result<Booking, StoreError> {
        let room_id = self
            .booking_rooms
            .get(&id)
            .map(|e| *e.value())
            .ok_or(StoreError::NotFound(id))?;
        let ledger = self.ledger(room_id);
        let guard = ledger.read().await;
        let pos = guard.position(id).ok_or(StoreError::NotFound(id))?;
        Ok(guard.bookings[pos].clone())
    }

    async fn list(
        &self,
        room_id: Option<Ulid>,
        range: Span,
        include_cancelled: bool,
    ) -> Result<Vec<Booking>, StoreError> {
        let ledger_arcs: Vec<SharedLedger> = match room_id {
            Some(rid) => match self.ledgers.get(&rid) {
                Some(entry) => vec![entry.value().clone()],
                None => return Ok(Vec::new()),
            },
            None => self.ledgers.iter().map(|e| e.value().clone()).collect(),
        };

        let mut result = Vec::new();
        for ledger in ledger_arcs {
            let guard = ledger.read().await;
            result.extend(
                guard
                    .overlapping(&range)
                    .filter(|b| include_cancelled || b.state != BookingState::Cancelled)
                    .cloned(),
            );
        }
        result.sort_by_key(|b| (b.span.start, b.id));
        Ok(result)
    }
}
