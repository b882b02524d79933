// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Local registry of trailing stops, reconciled against remote snapshots.
//!
//! Every mutation is a single `&mut self` call, so holding the registry
//! behind one `RwLock` makes each start, stop and poll atomic for readers.
//!
//! Stale snapshots are filtered with poll tickets. A ticket is taken before
//! each status request; entries remember the newest ticket issued when they
//! were created, and stopped keys remember the newest ticket issued when
//! they were removed. A snapshot never touches an entry or a stopped key
//! whose ticket is at least as new as its own, and a snapshot older than
//! one already applied is dropped whole.

use crate::error::TrailError;
use crate::position::PositionKey;
use crate::pricing::StopPrices;
use crate::rpc::{LogEntry, OrderId, RemoteTrailStatus, StatusSnapshot, TrailFields};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::{debug, info, warn};

/// Snapshots a live key may be missing from before it is marked failed.
pub const GRACE_MISSED_POLLS: u32 = 1;

/// Smallest log buffer we keep.
pub const MIN_LOG_CAPACITY: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailStatus {
    /// Registered, not yet confirmed by a snapshot.
    Starting,
    Active,
    Stopped,
    Failed,
}

impl TrailStatus {
    pub fn is_live(self) -> bool {
        matches!(self, TrailStatus::Starting | TrailStatus::Active)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_live()
    }
}

/// One trailing stop as the client currently believes it to be.
#[derive(Debug, Clone, PartialEq)]
pub struct TrailRegistration {
    pub key: PositionKey,
    pub order_id: Option<OrderId>,
    pub trail_points: Decimal,
    pub trigger_price: Decimal,
    pub limit_price: Decimal,
    pub current_price: Option<Decimal>,
    pub pnl: Option<Decimal>,
    pub update_count: u64,
    pub status: TrailStatus,
    missed_polls: u32,
    created_at_ticket: u64,
}

impl TrailRegistration {
    fn starting(
        key: PositionKey,
        order_id: OrderId,
        trail_points: Decimal,
        prices: StopPrices,
        ticket: u64,
    ) -> Self {
        Self {
            key,
            order_id: Some(order_id),
            trail_points,
            trigger_price: prices.trigger,
            limit_price: prices.limit,
            current_price: None,
            pnl: None,
            update_count: 0,
            status: TrailStatus::Starting,
            missed_polls: 0,
            created_at_ticket: ticket,
        }
    }

    fn adopted(key: PositionKey, fields: TrailFields, ticket: u64) -> Self {
        let mut entry = Self {
            key,
            order_id: None,
            trail_points: Decimal::ZERO,
            trigger_price: Decimal::ZERO,
            limit_price: Decimal::ZERO,
            current_price: None,
            pnl: None,
            update_count: 0,
            status: TrailStatus::Starting,
            missed_polls: 0,
            created_at_ticket: ticket,
        };
        entry.overwrite(fields);
        entry
    }

    /// Take the remote's fields wholesale.
    fn overwrite(&mut self, fields: TrailFields) {
        if let Some(order_id) = fields.order_id {
            self.order_id = Some(order_id);
        }
        self.trail_points = fields.trail_points;
        self.trigger_price = fields.trigger_price;
        self.limit_price = fields.limit_price;
        self.current_price = fields.current_price;
        self.pnl = fields.pnl;
        self.update_count = fields.update_count;
        self.missed_polls = 0;
        self.status = match fields.status {
            Some(RemoteTrailStatus::Stopped) => TrailStatus::Stopped,
            Some(RemoteTrailStatus::Failed) => TrailStatus::Failed,
            // Present in a snapshot means the remote is running it.
            _ => TrailStatus::Active,
        };
    }

    pub fn missed_polls(&self) -> u32 {
        self.missed_polls
    }
}

/// Most-recent-first buffer of remote log lines.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_LOG_CAPACITY);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Take the entries of an oldest-first remote log that are newer than
    /// anything already buffered. Returns how many were added.
    pub fn absorb(&mut self, remote: &[LogEntry]) -> usize {
        let fresh = match self.entries.front() {
            Some(newest) => match remote.iter().rposition(|e| e == newest) {
                Some(idx) => &remote[idx + 1..],
                None => remote,
            },
            None => remote,
        };

        for entry in fresh {
            self.entries.push_front(entry.clone());
        }
        self.entries.truncate(self.capacity);
        fresh.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Ticket taken before a status request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PollTicket(u64);

/// What a reconciliation pass changed.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReconcileReport {
    pub activated: Vec<PositionKey>,
    pub adopted: Vec<PositionKey>,
    pub failed: Vec<PositionKey>,
    pub stale_skipped: usize,
    pub new_logs: usize,
}

/// Consistent copy of the registry for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryView {
    pub trails: Vec<TrailRegistration>,
    pub logs: Vec<LogEntry>,
    pub ticker_connected: bool,
}

impl RegistryView {
    pub fn get(&self, key: &PositionKey) -> Option<&TrailRegistration> {
        self.trails.iter().find(|t| &t.key == key)
    }

    pub fn contains(&self, key: &PositionKey) -> bool {
        self.get(key).is_some()
    }

    pub fn live_count(&self) -> usize {
        self.trails.iter().filter(|t| t.status.is_live()).count()
    }
}

#[derive(Debug)]
pub struct TrailRegistry {
    entries: BTreeMap<PositionKey, TrailRegistration>,
    /// Keys with a start in flight, flagged once a stop lands meanwhile.
    pending: HashMap<PositionKey, bool>,
    /// Keys removed by an explicit stop, with the newest ticket at that time.
    stopped: HashMap<PositionKey, u64>,
    last_ticket: u64,
    last_applied: u64,
    logs: LogBuffer,
    ticker_connected: bool,
    polling: bool,
}

impl TrailRegistry {
    pub fn new(log_capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            pending: HashMap::new(),
            stopped: HashMap::new(),
            last_ticket: 0,
            last_applied: 0,
            logs: LogBuffer::new(log_capacity),
            ticker_connected: false,
            polling: false,
        }
    }

    /// Claim a key for a start. Fails if it is live or already claimed.
    pub fn reserve(&mut self, key: &PositionKey) -> Result<(), TrailError> {
        let live = self.entries.get(key).is_some_and(|e| e.status.is_live());
        if live || self.pending.contains_key(key) {
            return Err(TrailError::AlreadyTrailing(key.clone()));
        }
        self.pending.insert(key.clone(), false);
        Ok(())
    }

    /// Drop a claim after a failed start.
    pub fn release(&mut self, key: &PositionKey) {
        self.pending.remove(key);
    }

    /// Record a freshly registered trail. Replaces any terminal entry.
    ///
    /// Returns `false` and records nothing if the key was stopped while its
    /// start was in flight.
    pub fn insert_starting(
        &mut self,
        key: PositionKey,
        order_id: OrderId,
        trail_points: Decimal,
        prices: StopPrices,
    ) -> bool {
        if self.pending.remove(&key) == Some(true) {
            info!("{} was stopped while starting, not tracking it", key);
            return false;
        }
        self.stopped.remove(&key);
        let entry = TrailRegistration::starting(
            key.clone(),
            order_id,
            trail_points,
            prices,
            self.last_ticket,
        );
        self.entries.insert(key, entry);
        true
    }

    /// Authoritative local delete after a confirmed stop. The returned entry
    /// carries the `Stopped` status.
    pub fn remove(&mut self, key: &PositionKey) -> Option<TrailRegistration> {
        self.stopped.insert(key.clone(), self.last_ticket);
        if let Some(stopped_meanwhile) = self.pending.get_mut(key) {
            *stopped_meanwhile = true;
        }
        self.entries.remove(key).map(|mut entry| {
            entry.status = TrailStatus::Stopped;
            entry
        })
    }

    pub fn begin_poll(&mut self) -> PollTicket {
        self.last_ticket += 1;
        PollTicket(self.last_ticket)
    }

    /// Merge a snapshot fetched under `ticket`.
    pub fn apply(&mut self, ticket: PollTicket, snapshot: StatusSnapshot) -> ReconcileReport {
        let PollTicket(ticket) = ticket;
        let mut report = ReconcileReport::default();

        if ticket < self.last_applied {
            debug!(
                "Dropping snapshot {} older than applied snapshot {}",
                ticket, self.last_applied
            );
            report.stale_skipped = snapshot.trails.len();
            return report;
        }
        self.last_applied = ticket;

        for key in self.entries.keys().cloned().collect::<Vec<_>>() {
            if snapshot.trails.contains_key(&key) {
                continue;
            }
            let Some(entry) = self.entries.get_mut(&key) else {
                continue;
            };
            if !entry.status.is_live() || ticket <= entry.created_at_ticket {
                continue;
            }
            entry.missed_polls += 1;
            if entry.missed_polls > GRACE_MISSED_POLLS {
                warn!(
                    "⚠️ {} missing from {} status snapshots, marking failed",
                    key, entry.missed_polls
                );
                entry.status = TrailStatus::Failed;
                report.failed.push(key);
            } else {
                debug!("{} missing from status snapshot (grace)", key);
            }
        }

        for (key, fields) in snapshot.trails {
            match self.entries.get_mut(&key) {
                Some(entry) => {
                    if ticket <= entry.created_at_ticket {
                        report.stale_skipped += 1;
                        continue;
                    }
                    if entry.status.is_terminal() {
                        continue;
                    }
                    let was_starting = entry.status == TrailStatus::Starting;
                    entry.overwrite(fields);
                    if was_starting && entry.status == TrailStatus::Active {
                        info!("✅ Trail active for {}", key);
                        report.activated.push(key);
                    }
                }
                None => {
                    if self.stopped.get(&key).is_some_and(|&at| ticket <= at) {
                        report.stale_skipped += 1;
                        continue;
                    }
                    let entry = TrailRegistration::adopted(key.clone(), fields, ticket);
                    if entry.status.is_live() {
                        info!("Adopting remote trail for {}", key);
                        self.entries.insert(key.clone(), entry);
                        report.adopted.push(key);
                    }
                }
            }
        }

        // Older snapshots are dropped above, so stops before this one are settled.
        self.stopped.retain(|_, at| *at >= ticket);

        report.new_logs = self.logs.absorb(&snapshot.logs);
        self.ticker_connected = snapshot.ticker_connected;
        report
    }

    pub fn get(&self, key: &PositionKey) -> Option<&TrailRegistration> {
        self.entries.get(key)
    }

    pub fn live_count(&self) -> usize {
        self.entries.values().filter(|e| e.status.is_live()).count()
    }

    pub fn logs(&self) -> &LogBuffer {
        &self.logs
    }

    pub fn ticker_connected(&self) -> bool {
        self.ticker_connected
    }

    pub fn is_polling(&self) -> bool {
        self.polling
    }

    pub fn set_polling(&mut self, polling: bool) {
        self.polling = polling;
    }

    pub fn view(&self) -> RegistryView {
        RegistryView {
            trails: self.entries.values().cloned().collect(),
            logs: self.logs.iter().cloned().collect(),
            ticker_connected: self.ticker_connected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn key(raw: &str) -> PositionKey {
        raw.parse().unwrap()
    }

    fn prices() -> StopPrices {
        StopPrices {
            trigger: dec!(98),
            limit: dec!(93.1),
        }
    }

    fn start(registry: &mut TrailRegistry, raw: &str) {
        registry.reserve(&key(raw)).unwrap();
        assert!(registry.insert_starting(key(raw), OrderId::from("1"), dec!(2), prices()));
    }

    fn snapshot_with(raws: &[&str]) -> StatusSnapshot {
        let mut snapshot = StatusSnapshot::default();
        for raw in raws {
            snapshot.trails.insert(
                key(raw),
                TrailFields {
                    order_id: Some(OrderId::from("1")),
                    trail_points: dec!(2),
                    trigger_price: dec!(99),
                    limit_price: dec!(94.05),
                    current_price: Some(dec!(101)),
                    pnl: Some(dec!(10)),
                    update_count: 3,
                    status: Some(RemoteTrailStatus::Active),
                },
            );
        }
        snapshot
    }

    #[test]
    fn first_snapshot_activates_and_overwrites() {
        let mut registry = TrailRegistry::new(20);
        start(&mut registry, "NSE:INFY");

        let ticket = registry.begin_poll();
        let report = registry.apply(ticket, snapshot_with(&["NSE:INFY"]));

        assert_eq!(report.activated, vec![key("NSE:INFY")]);
        let entry = registry.get(&key("NSE:INFY")).unwrap();
        assert_eq!(entry.status, TrailStatus::Active);
        assert_eq!(entry.trigger_price, dec!(99));
        assert_eq!(entry.update_count, 3);
    }

    #[test]
    fn starting_key_fails_after_two_missed_snapshots() {
        let mut registry = TrailRegistry::new(20);
        start(&mut registry, "NSE:INFY");

        let t1 = registry.begin_poll();
        registry.apply(t1, StatusSnapshot::default());
        assert_eq!(registry.get(&key("NSE:INFY")).unwrap().status, TrailStatus::Starting);

        let t2 = registry.begin_poll();
        let report = registry.apply(t2, StatusSnapshot::default());
        assert_eq!(report.failed, vec![key("NSE:INFY")]);
        assert_eq!(registry.get(&key("NSE:INFY")).unwrap().status, TrailStatus::Failed);
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn reappearing_resets_the_grace_counter() {
        let mut registry = TrailRegistry::new(20);
        start(&mut registry, "NSE:INFY");

        let t = registry.begin_poll();
        registry.apply(t, StatusSnapshot::default());
        let t = registry.begin_poll();
        registry.apply(t, snapshot_with(&["NSE:INFY"]));
        let t = registry.begin_poll();
        registry.apply(t, StatusSnapshot::default());

        let entry = registry.get(&key("NSE:INFY")).unwrap();
        assert_eq!(entry.status, TrailStatus::Active);
        assert_eq!(entry.missed_polls(), 1);
    }

    #[test]
    fn poll_issued_before_start_does_not_count_as_a_miss() {
        let mut registry = TrailRegistry::new(20);
        let in_flight = registry.begin_poll();
        start(&mut registry, "NSE:INFY");

        registry.apply(in_flight, StatusSnapshot::default());
        assert_eq!(registry.get(&key("NSE:INFY")).unwrap().missed_polls(), 0);
    }

    #[test]
    fn stale_poll_cannot_resurrect_a_stopped_key() {
        let mut registry = TrailRegistry::new(20);
        start(&mut registry, "NSE:INFY");

        let in_flight = registry.begin_poll();
        let removed = registry.remove(&key("NSE:INFY")).unwrap();
        assert_eq!(removed.status, TrailStatus::Stopped);

        let report = registry.apply(in_flight, snapshot_with(&["NSE:INFY"]));
        assert_eq!(report.stale_skipped, 1);
        assert!(registry.get(&key("NSE:INFY")).is_none());

        // A poll issued after the stop is authoritative again.
        let fresh = registry.begin_poll();
        let report = registry.apply(fresh, snapshot_with(&["NSE:INFY"]));
        assert_eq!(report.adopted, vec![key("NSE:INFY")]);
    }

    #[test]
    fn live_keys_cannot_be_reserved_twice() {
        let mut registry = TrailRegistry::new(20);
        registry.reserve(&key("NSE:INFY")).unwrap();
        assert_eq!(
            registry.reserve(&key("NSE:INFY")),
            Err(TrailError::AlreadyTrailing(key("NSE:INFY")))
        );

        registry.insert_starting(key("NSE:INFY"), OrderId::from("1"), dec!(2), prices());
        assert!(registry.reserve(&key("NSE:INFY")).is_err());
    }

    #[test]
    fn terminal_entries_are_replaced_by_a_fresh_start() {
        let mut registry = TrailRegistry::new(20);
        start(&mut registry, "NSE:INFY");
        for _ in 0..2 {
            let t = registry.begin_poll();
            registry.apply(t, StatusSnapshot::default());
        }

        // Failed is terminal: a later snapshot does not revive it.
        let t = registry.begin_poll();
        registry.apply(t, snapshot_with(&["NSE:INFY"]));
        assert_eq!(registry.get(&key("NSE:INFY")).unwrap().status, TrailStatus::Failed);

        start(&mut registry, "NSE:INFY");
        let entry = registry.get(&key("NSE:INFY")).unwrap();
        assert_eq!(entry.status, TrailStatus::Starting);
        assert_eq!(entry.update_count, 0);
    }

    #[test]
    fn stale_poll_landing_after_a_newer_one_cannot_resurrect_a_stop() {
        let mut registry = TrailRegistry::new(20);
        start(&mut registry, "NSE:INFY");

        let older = registry.begin_poll();
        registry.remove(&key("NSE:INFY"));
        let newer = registry.begin_poll();

        registry.apply(newer, StatusSnapshot::default());
        let report = registry.apply(older, snapshot_with(&["NSE:INFY"]));

        assert!(report.adopted.is_empty());
        assert_eq!(report.stale_skipped, 1);
        assert!(registry.get(&key("NSE:INFY")).is_none());
    }

    #[test]
    fn older_snapshot_does_not_overwrite_newer_fields() {
        let mut registry = TrailRegistry::new(20);
        start(&mut registry, "NSE:INFY");

        let older = registry.begin_poll();
        let newer = registry.begin_poll();
        let mut fresh = snapshot_with(&["NSE:INFY"]);
        if let Some(fields) = fresh.trails.get_mut(&key("NSE:INFY")) {
            fields.update_count = 9;
        }
        registry.apply(newer, fresh);
        registry.apply(older, StatusSnapshot::default());

        let entry = registry.get(&key("NSE:INFY")).unwrap();
        assert_eq!(entry.update_count, 9);
        assert_eq!(entry.missed_polls(), 0);
    }

    #[test]
    fn stop_during_pending_start_wins() {
        let mut registry = TrailRegistry::new(20);
        registry.reserve(&key("NSE:INFY")).unwrap();
        assert!(registry.remove(&key("NSE:INFY")).is_none());

        let inserted =
            registry.insert_starting(key("NSE:INFY"), OrderId::from("1"), dec!(2), prices());
        assert!(!inserted);
        assert!(registry.get(&key("NSE:INFY")).is_none());

        // The tombstone still guards against a poll issued before the stop.
        let t = registry.begin_poll();
        registry.remove(&key("NSE:INFY"));
        registry.apply(t, snapshot_with(&["NSE:INFY"]));
        assert!(registry.get(&key("NSE:INFY")).is_none());

        // A later start is tracked normally.
        start(&mut registry, "NSE:INFY");
        assert_eq!(registry.get(&key("NSE:INFY")).unwrap().status, TrailStatus::Starting);
    }

    #[test]
    fn log_buffer_keeps_newest_first_and_skips_seen() {
        let mut logs = LogBuffer::new(5);
        assert_eq!(logs.capacity(), MIN_LOG_CAPACITY);

        let first: Vec<LogEntry> = (0..3).map(|i| LogEntry::new(format!("t{i}"), "m")).collect();
        assert_eq!(logs.absorb(&first), 3);

        let second: Vec<LogEntry> = (1..5).map(|i| LogEntry::new(format!("t{i}"), "m")).collect();
        assert_eq!(logs.absorb(&second), 2);

        let times: Vec<&str> = logs.iter().map(|e| e.time.as_str()).collect();
        assert_eq!(times, ["t4", "t3", "t2", "t1", "t0"]);
    }

    #[test]
    fn log_buffer_is_bounded() {
        let mut logs = LogBuffer::new(20);
        let many: Vec<LogEntry> = (0..50).map(|i| LogEntry::new(format!("t{i}"), "m")).collect();
        logs.absorb(&many);
        assert_eq!(logs.len(), 20);
        assert_eq!(logs.iter().next().unwrap().time, "t49");
    }
}
