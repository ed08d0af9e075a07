//! Event notifier: append-only, hash-chained log of committed operations.
//!
//! Each record's digest covers the previous record's digest, so editing,
//! dropping or reordering any record breaks every digest after it. The log
//! can be replayed and checked with [`EventNotifier::verify_chain`].
//!
//! Appending and delivering are separate steps. The vault appends while it
//! still holds the market, so sequence order is commit order, and delivers
//! to subscribed [`EventSink`]s once every lock is released. Deliveries from
//! different threads may therefore reach a sink out of sequence order.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use argus_types::{EventId, EventRecord, MarketId, VaultEvent, constants};
use chrono::Utc;
use sha2::{Digest, Sha256};

/// Receives every record as it is appended.
pub trait EventSink: Send + Sync {
    fn on_event(&self, record: &EventRecord);
}

#[derive(Debug, Default)]
struct EventLog {
    records: Vec<EventRecord>,
    head: [u8; 32],
}

/// Append-only event log with subscribers.
#[derive(Default)]
pub struct EventNotifier {
    log: Mutex<EventLog>,
    sinks: RwLock<Vec<Arc<dyn EventSink>>>,
}

fn hash_event(hasher: &mut Sha256, event: &VaultEvent) {
    hasher.update(event.kind().to_string().as_bytes());
    match event {
        VaultEvent::MarketCreated {
            creator,
            market_id,
            reserve_ratio,
            metadata_uri,
            initial_collateral,
            initial_base,
            initial_shares,
        } => {
            hasher.update(creator.as_bytes());
            hasher.update(market_id.0.to_le_bytes());
            hasher.update(reserve_ratio.ppm().to_le_bytes());
            hasher.update((metadata_uri.len() as u64).to_le_bytes());
            hasher.update(metadata_uri.as_bytes());
            hasher.update(initial_collateral.to_le_bytes());
            hasher.update(initial_base.to_le_bytes());
            hasher.update(initial_shares.to_le_bytes());
        }
        VaultEvent::SharesIssued {
            caller,
            market_id,
            shares_issued,
            collateral_in,
            base_in,
            fee,
        } => {
            hasher.update(caller.as_bytes());
            hasher.update(market_id.0.to_le_bytes());
            hasher.update(shares_issued.to_le_bytes());
            hasher.update(collateral_in.to_le_bytes());
            hasher.update(base_in.to_le_bytes());
            hasher.update(fee.to_le_bytes());
        }
        VaultEvent::SharesRedeemed {
            caller,
            market_id,
            shares_burned,
            base_returned,
            collateral_returned,
        } => {
            hasher.update(caller.as_bytes());
            hasher.update(market_id.0.to_le_bytes());
            hasher.update(shares_burned.to_le_bytes());
            hasher.update(base_returned.to_le_bytes());
            hasher.update(collateral_returned.to_le_bytes());
        }
        VaultEvent::MarketPaused { market_id, by } | VaultEvent::MarketUnpaused { market_id, by } => {
            hasher.update(market_id.0.to_le_bytes());
            hasher.update(by.as_bytes());
        }
        VaultEvent::IssuanceFeeChanged { old_ppm, new_ppm } => {
            hasher.update(old_ppm.to_le_bytes());
            hasher.update(new_ppm.to_le_bytes());
        }
        VaultEvent::OwnerFeeWithdrawn { to, amount } => {
            hasher.update(to.as_bytes());
            hasher.update(amount.to_le_bytes());
        }
    }
}

/// Digest of the record at `sequence` carrying `event` after `prev_digest`.
#[must_use]
pub fn compute_event_digest(prev_digest: &[u8; 32], sequence: u64, event: &VaultEvent) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(constants::EVENT_DIGEST_DOMAIN);
    hasher.update(prev_digest);
    hasher.update(sequence.to_le_bytes());
    hash_event(&mut hasher, event);

    let result = hasher.finalize();
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&result);
    digest
}

/// Check that `records` form an unbroken chain from the genesis digest.
#[must_use]
pub fn verify_records(records: &[EventRecord]) -> bool {
    let mut prev = [0u8; 32];
    for (position, record) in records.iter().enumerate() {
        if record.sequence != position as u64 || record.prev_digest != prev {
            return false;
        }
        if compute_event_digest(&prev, record.sequence, &record.event) != record.digest {
            return false;
        }
        prev = record.digest;
    }
    true
}

impl EventNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self) -> MutexGuard<'_, EventLog> {
        // Appends are a single push after the digest is computed; a panic
        // cannot leave a half-written record behind.
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a sink for every future record.
    pub fn subscribe(&self, sink: Arc<dyn EventSink>) {
        self.sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sink);
    }

    /// Append `event` to the log without notifying anyone.
    pub fn append(&self, event: VaultEvent) -> EventRecord {
        let record = {
            let mut log = self.log();
            let sequence = log.records.len() as u64;
            let prev_digest = log.head;
            let digest = compute_event_digest(&prev_digest, sequence, &event);
            let record = EventRecord {
                id: EventId::new(),
                sequence,
                event,
                emitted_at: Utc::now(),
                prev_digest,
                digest,
            };
            log.head = digest;
            log.records.push(record.clone());
            record
        };
        tracing::debug!(
            sequence = record.sequence,
            kind = %record.kind(),
            digest = %record.digest_hex(),
            "event appended"
        );
        record
    }

    /// Hand an appended record to every sink.
    pub fn deliver(&self, record: &EventRecord) {
        let sinks = self
            .sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for sink in sinks {
            sink.on_event(record);
        }
    }

    /// Every record so far, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<EventRecord> {
        self.log().records.clone()
    }

    /// Records concerning `market`.
    #[must_use]
    pub fn records_for(&self, market: MarketId) -> Vec<EventRecord> {
        self.log()
            .records
            .iter()
            .filter(|r| r.event.market_id() == Some(market))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.log().records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Digest of the newest record, all zeros when empty.
    #[must_use]
    pub fn head_digest(&self) -> [u8; 32] {
        self.log().head
    }

    /// Recompute every digest and confirm the chain is intact.
    #[must_use]
    pub fn verify_chain(&self) -> bool {
        let log = self.log();
        verify_records(&log.records) && log.records.last().map_or([0u8; 32], |r| r.digest) == log.head
    }
}

#[cfg(test)]
mod tests {
    use argus_types::{Address, EventKind};

    use super::*;

    fn fee_changed(new_ppm: u32) -> VaultEvent {
        VaultEvent::IssuanceFeeChanged {
            old_ppm: 0,
            new_ppm,
        }
    }

    struct Collect(Mutex<Vec<u64>>);

    impl EventSink for Collect {
        fn on_event(&self, record: &EventRecord) {
            self.0.lock().unwrap().push(record.sequence);
        }
    }

    #[test]
    fn empty_chain_is_valid() {
        let notifier = EventNotifier::new();
        assert!(notifier.is_empty());
        assert!(notifier.verify_chain());
        assert_eq!(notifier.head_digest(), [0u8; 32]);
    }

    #[test]
    fn records_link_to_their_predecessor() {
        let notifier = EventNotifier::new();
        let first = notifier.append(fee_changed(1));
        let second = notifier.append(fee_changed(2));
        assert_eq!(first.sequence, 0);
        assert_eq!(first.prev_digest, [0u8; 32]);
        assert_eq!(second.sequence, 1);
        assert_eq!(second.prev_digest, first.digest);
        assert_eq!(notifier.head_digest(), second.digest);
        assert!(notifier.verify_chain());
    }

    #[test]
    fn tampering_breaks_the_chain() {
        let notifier = EventNotifier::new();
        notifier.append(fee_changed(1));
        notifier.append(fee_changed(2));
        notifier.append(fee_changed(3));
        let mut records = notifier.records();
        assert!(verify_records(&records));

        records[1].event = fee_changed(99);
        assert!(!verify_records(&records));

        let mut dropped = notifier.records();
        dropped.remove(1);
        assert!(!verify_records(&dropped));

        let mut swapped = notifier.records();
        swapped.swap(0, 1);
        assert!(!verify_records(&swapped));
    }

    #[test]
    fn digest_depends_on_every_field() {
        let a = VaultEvent::OwnerFeeWithdrawn {
            to: Address::from_label("a"),
            amount: 5,
        };
        let b = VaultEvent::OwnerFeeWithdrawn {
            to: Address::from_label("a"),
            amount: 6,
        };
        let prev = [0u8; 32];
        assert_ne!(compute_event_digest(&prev, 0, &a), compute_event_digest(&prev, 0, &b));
        assert_ne!(compute_event_digest(&prev, 0, &a), compute_event_digest(&prev, 1, &a));
        assert_eq!(compute_event_digest(&prev, 0, &a), compute_event_digest(&prev, 0, &a));
    }

    #[test]
    fn sinks_see_delivered_records() {
        let notifier = EventNotifier::new();
        let sink = Arc::new(Collect(Mutex::new(Vec::new())));
        notifier.subscribe(sink.clone());
        let records: Vec<_> = (0..4).map(|ppm| notifier.append(fee_changed(ppm))).collect();
        assert!(sink.0.lock().unwrap().is_empty(), "append alone notifies nobody");
        for record in &records {
            notifier.deliver(record);
        }
        assert_eq!(*sink.0.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn filter_by_market() {
        let notifier = EventNotifier::new();
        let by = Address::from_label("owner");
        notifier.append(VaultEvent::MarketPaused {
            market_id: MarketId(1),
            by,
        });
        notifier.append(fee_changed(10));
        notifier.append(VaultEvent::MarketUnpaused {
            market_id: MarketId(2),
            by,
        });
        let only = notifier.records_for(MarketId(2));
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].kind(), EventKind::MarketUnpaused);
    }
}
