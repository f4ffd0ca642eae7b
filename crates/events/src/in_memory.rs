//! In-memory audit recorder for tests/dev.

use std::collections::VecDeque;
use std::sync::{Mutex, mpsc};

use crate::audit::{AuditAction, AuditEvent};
use crate::recorder::{AuditError, AuditRecorder, Subscription};

/// Events kept by [`InMemoryAuditRecorder::new`].
pub const DEFAULT_AUDIT_CAPACITY: usize = 10_000;

/// In-memory append-only audit log.
///
/// - No IO / no async
/// - Best-effort fan-out to subscribers
/// - Bounded: once `capacity` events are held, the oldest is evicted
///   (subscribers still see every event)
#[derive(Debug)]
pub struct InMemoryAuditRecorder {
    capacity: usize,
    log: Mutex<VecDeque<AuditEvent>>,
    subscribers: Mutex<Vec<mpsc::Sender<AuditEvent>>>,
}

impl Default for InMemoryAuditRecorder {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_AUDIT_CAPACITY)
    }
}

impl InMemoryAuditRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A zero capacity is treated as one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            log: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of the retained events, oldest first.
    pub fn all(&self) -> Vec<AuditEvent> {
        self.log
            .lock()
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Count among the retained events.
    pub fn count(&self, action: AuditAction) -> usize {
        self.log
            .lock()
            .map(|l| l.iter().filter(|e| e.action() == action).count())
            .unwrap_or(0)
    }
}

impl AuditRecorder for InMemoryAuditRecorder {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        {
            let mut subs = self.subscribers.lock().map_err(|_| AuditError::Poisoned)?;
            // Drop any dead subscribers while publishing.
            subs.retain(|tx| tx.send(event.clone()).is_ok());
        }

        let mut log = self.log.lock().map_err(|_| AuditError::Poisoned)?;
        if log.len() == self.capacity {
            log.pop_front();
        }
        log.push_back(event);
        Ok(())
    }

    fn recent(&self, action: AuditAction, limit: usize) -> Vec<AuditEvent> {
        let Ok(log) = self.log.lock() else {
            return Vec::new();
        };
        log.iter()
            .rev()
            .filter(|e| e.action() == action)
            .take(limit)
            .cloned()
            .collect()
    }

    fn subscribe(&self) -> Subscription<AuditEvent> {
        let (tx, rx) = mpsc::channel();

        // If the lock is poisoned, we still return a subscription;
        // it just won't receive messages until the process restarts.
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }

        Subscription::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::Actor;

    fn event(action: AuditAction) -> AuditEvent {
        AuditEvent::new(Actor::System, action, "campaigns")
    }

    #[test]
    fn subscribers_receive_recorded_events() {
        let recorder = InMemoryAuditRecorder::new();
        let sub = recorder.subscribe();

        recorder.record(event(AuditAction::CampaignCreated)).unwrap();
        recorder.record(event(AuditAction::CampaignStarted)).unwrap();

        let got = sub.drain();
        assert_eq!(got.len(), 2);
        assert_eq!(got[1].action(), AuditAction::CampaignStarted);
    }

    #[test]
    fn recent_is_newest_first_and_filtered() {
        let recorder = InMemoryAuditRecorder::new();
        for _ in 0..3 {
            recorder.record(event(AuditAction::CallbackReceived)).unwrap();
        }
        recorder.record(event(AuditAction::CallbackSkipped)).unwrap();

        let recent = recorder.recent(AuditAction::CallbackReceived, 2);
        assert_eq!(recent.len(), 2);
        assert!(recent.iter().all(|e| e.action() == AuditAction::CallbackReceived));
        assert!(recent[0].occurred_at() >= recent[1].occurred_at());
        assert_eq!(recorder.count(AuditAction::CallbackSkipped), 1);
    }

    #[test]
    fn log_keeps_only_the_newest_events() {
        let recorder = InMemoryAuditRecorder::with_capacity(3);
        let sub = recorder.subscribe();
        recorder.record(event(AuditAction::CampaignCreated)).unwrap();
        for _ in 0..4 {
            recorder.record(event(AuditAction::CallbackReceived)).unwrap();
        }

        let kept = recorder.all();
        assert_eq!(kept.len(), 3);
        assert!(kept.iter().all(|e| e.action() == AuditAction::CallbackReceived));
        assert_eq!(recorder.count(AuditAction::CampaignCreated), 0);
        assert_eq!(recorder.recent(AuditAction::CallbackReceived, 10).len(), 3);
        assert_eq!(sub.drain().len(), 5);
    }

    #[test]
    fn zero_capacity_still_keeps_the_latest_event() {
        let recorder = InMemoryAuditRecorder::with_capacity(0);
        recorder.record(event(AuditAction::CampaignCreated)).unwrap();
        recorder.record(event(AuditAction::CampaignStarted)).unwrap();
        let kept = recorder.all();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].action(), AuditAction::CampaignStarted);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let recorder = InMemoryAuditRecorder::new();
        drop(recorder.subscribe());
        recorder.record(event(AuditAction::CampaignPaused)).unwrap();
        assert_eq!(recorder.subscribers.lock().unwrap().len(), 0);
    }
}
