// src/utils/notify.rs

use std::collections::HashSet;
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::broadcast;

/// Events the engine emits for an external notification/delivery system.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    ContestStarted {
        contest_id: i64,
    },
    SubmissionRecorded {
        contest_id: i64,
        participation_id: i64,
        auto_submitted: bool,
    },
    ResultsAvailable {
        contest_id: i64,
    },
}

/// Fire-and-forget event fan-out.
///
/// Sends never fail the calling operation: a missing or slow subscriber must
/// not roll back engine state.
pub struct Notifier {
    tx: broadcast::Sender<EngineEvent>,
    started: Mutex<HashSet<i64>>,
    results: Mutex<HashSet<i64>>,
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            tx,
            started: Mutex::new(HashSet::new()),
            results: Mutex::new(HashSet::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Emitted at most once per contest per process, the first time the
    /// engine observes the contest in its active window.
    pub fn contest_started(&self, contest_id: i64) {
        if self.started.lock().unwrap().insert(contest_id) {
            self.emit(EngineEvent::ContestStarted { contest_id });
        }
    }

    pub fn submission_recorded(&self, contest_id: i64, participation_id: i64, auto: bool) {
        self.emit(EngineEvent::SubmissionRecorded {
            contest_id,
            participation_id,
            auto_submitted: auto,
        });
    }

    /// Emitted at most once per contest per process, after the close-time
    /// sweep has made the contest's aggregates well-defined.
    pub fn results_available(&self, contest_id: i64) {
        if self.results.lock().unwrap().insert(contest_id) {
            self.emit(EngineEvent::ResultsAvailable { contest_id });
        }
    }

    fn emit(&self, event: EngineEvent) {
        // send() errors only when there are no receivers; that is fine.
        let _ = self.tx.send(event);
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
