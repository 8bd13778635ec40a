//! Health record: the individual's log of coded clinical events
//!
//! Entries are only ever added; closing a condition sets its stop time in
//! place. Entries stay ordered by (start, seq) even when several module runs
//! write into the same tick, and at most one entry per primary code may be
//! open at a time.

use ahash::AHashMap;
use serde::Serialize;
use thiserror::Error;

use crate::core::types::{Code, Timestamp};

/// Violations of the record's data invariants
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("condition {code} is already active since {since}")]
    AlreadyActive { code: String, since: Timestamp },

    #[error("cannot record an event without codes")]
    NoCodes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EntryKind {
    Condition,
    Encounter,
    Symptom,
    Death,
}

/// One coded event in the record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    /// Insertion sequence number, unique within the record
    pub seq: u64,
    pub kind: EntryKind,
    pub codes: Vec<Code>,
    pub start: Timestamp,
    pub stop: Option<Timestamp>,
    /// Encounter class, or the cause of a symptom
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Symptom severity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Entry {
    pub fn primary_code(&self) -> Option<&str> {
        self.codes.first().map(|c| c.code.as_str())
    }

    pub fn is_open(&self) -> bool {
        self.stop.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthRecord {
    entries: Vec<Entry>,
    /// Primary code -> seq of its open condition
    #[serde(skip)]
    present: AHashMap<String, u64>,
    #[serde(skip)]
    next_seq: u64,
}

impl HealthRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn conditions(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter().filter(|e| e.kind == EntryKind::Condition)
    }

    /// Open a condition. Fails if its primary code is already open.
    pub fn open_condition(&mut self, codes: &[Code], time: Timestamp) -> Result<u64, RecordError> {
        let primary = codes.first().ok_or(RecordError::NoCodes)?.code.clone();
        if let Some(existing) = self.active(&primary) {
            return Err(RecordError::AlreadyActive {
                code: primary,
                since: existing.start,
            });
        }
        let seq = self.push(EntryKind::Condition, codes.to_vec(), time, None, None, None);
        self.present.insert(primary, seq);
        Ok(seq)
    }

    /// Close the open condition for `code`, if any. Returns whether one was closed.
    ///
    /// A stop earlier than the start (possible when two module runs share a
    /// tick) is clamped to the start.
    pub fn close_condition(&mut self, code: &str, time: Timestamp) -> bool {
        let Some(seq) = self.present.remove(code) else {
            return false;
        };
        match self.entries.iter_mut().rev().find(|e| e.seq == seq) {
            Some(entry) => {
                entry.stop = Some(time.max(entry.start));
                true
            }
            None => false,
        }
    }

    /// The open condition for `code`, if any
    pub fn active(&self, code: &str) -> Option<&Entry> {
        let seq = *self.present.get(code)?;
        self.entries.iter().rev().find(|e| e.seq == seq)
    }

    pub fn is_active(&self, code: &str) -> bool {
        self.present.contains_key(code)
    }

    pub fn active_codes(&self) -> impl Iterator<Item = &str> {
        self.present.keys().map(String::as_str)
    }

    /// Encounters are point events: they start and stop at `time`
    pub fn record_encounter(&mut self, class: &str, codes: &[Code], time: Timestamp) -> u64 {
        self.push(
            EntryKind::Encounter,
            codes.to_vec(),
            time,
            Some(time),
            Some(class.to_string()),
            None,
        )
    }

    pub fn record_symptom(&mut self, symptom: &str, cause: &str, value: f64, time: Timestamp) -> u64 {
        let code = Code::new("SYMPTOM", symptom, symptom);
        self.push(
            EntryKind::Symptom,
            vec![code],
            time,
            Some(time),
            Some(cause.to_string()),
            Some(value),
        )
    }

    /// Record death with optional cause codes. Open conditions stay open.
    pub fn record_death(&mut self, codes: &[Code], time: Timestamp) -> u64 {
        self.push(EntryKind::Death, codes.to_vec(), time, Some(time), None, None)
    }

    fn push(
        &mut self,
        kind: EntryKind,
        codes: Vec<Code>,
        start: Timestamp,
        stop: Option<Timestamp>,
        detail: Option<String>,
        value: Option<f64>,
    ) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        let entry = Entry {
            seq,
            kind,
            codes,
            start,
            stop,
            detail,
            value,
        };
        // Same-time entries keep insertion order
        let pos = self.entries.partition_point(|e| e.start <= start);
        self.entries.insert(pos, entry);
        seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mild() -> Vec<Code> {
        vec![Code::new("SNOMED-CT", "23502007", "Mild_Lookuptablitis")]
    }

    #[test]
    fn test_open_and_close_condition() {
        let mut record = HealthRecord::new();
        record.open_condition(&mild(), 100).unwrap();
        assert!(record.is_active("23502007"));
        assert_eq!(record.active("23502007").unwrap().start, 100);

        assert!(record.close_condition("23502007", 200));
        assert!(!record.is_active("23502007"));
        assert_eq!(record.entries()[0].stop, Some(200));
    }

    #[test]
    fn test_second_open_rejected() {
        let mut record = HealthRecord::new();
        record.open_condition(&mild(), 100).unwrap();
        let err = record.open_condition(&mild(), 150).unwrap_err();
        assert_eq!(
            err,
            RecordError::AlreadyActive {
                code: "23502007".into(),
                since: 100
            }
        );
    }

    #[test]
    fn test_reopen_after_close() {
        let mut record = HealthRecord::new();
        record.open_condition(&mild(), 100).unwrap();
        record.close_condition("23502007", 150);
        record.open_condition(&mild(), 200).unwrap();
        assert_eq!(record.conditions().count(), 2);
    }

    #[test]
    fn test_close_unknown_is_noop() {
        let mut record = HealthRecord::new();
        assert!(!record.close_condition("nope", 10));
    }

    #[test]
    fn test_entries_ordered_by_time() {
        let mut record = HealthRecord::new();
        record.record_encounter("wellness", &[], 300);
        record.record_encounter("wellness", &[], 100);
        record.record_encounter("urgent", &[], 300);
        let starts: Vec<_> = record.entries().iter().map(|e| (e.start, e.seq)).collect();
        assert_eq!(starts, vec![(100, 1), (300, 0), (300, 2)]);
    }

    #[test]
    fn test_stop_clamped_to_start() {
        let mut record = HealthRecord::new();
        record.open_condition(&mild(), 500).unwrap();
        record.close_condition("23502007", 400);
        assert_eq!(record.entries()[0].stop, Some(500));
    }

    #[test]
    fn test_death_entry_appended() {
        let mut record = HealthRecord::new();
        record.open_condition(&mild(), 10).unwrap();
        record.record_death(&[], 50);
        assert!(record.is_active("23502007"));
        assert_eq!(record.entries().last().unwrap().kind, EntryKind::Death);
    }
}
