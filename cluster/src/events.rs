use serde::Serialize;
use std::collections::VecDeque;
use watchdog_common::Term;

/// How many records the diagnostic event log retains.
pub const EVENT_CAPACITY: usize = 64;

/// One diagnostic record. Timestamps are wall-clock, pre-formatted for the
/// JSON report.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EventRecord {
    pub timestamp: String,
    pub name: String,
    pub term: Term,
}

/// Bounded, append-only log of notable election events. Diagnostics only;
/// nothing in the state machine reads it back.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    records: VecDeque<EventRecord>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: impl Into<String>, term: Term) {
        if self.records.len() == EVENT_CAPACITY {
            self.records.pop_front();
        }

        self.records.push_back(EventRecord {
            timestamp: chrono::Local::now().format("%H:%M:%S%.3f").to_string(),
            name: name.into(),
            term,
        });
    }

    pub fn records(&self) -> impl Iterator<Item = &EventRecord> {
        self.records.iter()
    }

    pub fn to_vec(&self) -> Vec<EventRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_append_in_order() {
        let mut log = EventLog::new();
        log.record("first", 1);
        log.record("second", 2);

        let names: Vec<_> = log.records().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(log.records().last().unwrap().term, 2);
    }

    #[test]
    fn test_log_is_bounded() {
        let mut log = EventLog::new();
        for i in 0..(EVENT_CAPACITY + 10) {
            log.record(format!("event {i}"), 0);
        }

        assert_eq!(log.len(), EVENT_CAPACITY);
        // The oldest records are the ones dropped.
        assert_eq!(log.records().next().unwrap().name, "event 10");
    }
}
