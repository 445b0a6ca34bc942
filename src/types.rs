use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::outcome::{classify, RunOutcome};

lazy_static! {
    static ref TIME_SLOT_PATTERN: Regex =
        Regex::new(r"^([01]\d|2[0-3]):[0-5]\d-([01]\d|2[0-3]):[0-5]\d$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{0}' is not a time slot in HH:MM-HH:MM form")]
pub struct ParseTimeSlotError(String);

/// A bookable slot as the site labels it, e.g. `07:30-08:00`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeSlot(String);

impl TimeSlot {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `07:30 - 08:00`, the way slots are printed in notifications.
    pub fn spaced(&self) -> String {
        self.0.replacen('-', " - ", 1)
    }
}

impl FromStr for TimeSlot {
    type Err = ParseTimeSlotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if TIME_SLOT_PATTERN.is_match(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(ParseTimeSlotError(s.to_string()))
        }
    }
}

impl TryFrom<String> for TimeSlot {
    type Error = ParseTimeSlotError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeSlot> for String {
    fn from(slot: TimeSlot) -> Self {
        slot.0
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotResult {
    pub success: bool,
    pub message: String,
}

impl SlotResult {
    pub fn not_attempted() -> Self {
        Self {
            success: false,
            message: "Not attempted".into(),
        }
    }

    pub fn confirmed(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// A run in progress. Each configured slot starts as "not attempted" and is
/// recorded at most once; `finalize` consumes the run, so a run can only be
/// turned into a report once. Slots are attempted in configured order.
#[derive(Debug)]
pub struct ReservationRun {
    run_id: Uuid,
    started_at: DateTime<Tz>,
    target_date: NaiveDate,
    order: Vec<TimeSlot>,
    results: BTreeMap<TimeSlot, SlotResult>,
    recorded: BTreeSet<TimeSlot>,
}

impl ReservationRun {
    pub fn new(started_at: DateTime<Tz>, target_date: NaiveDate, slots: &[TimeSlot]) -> Self {
        let mut order = Vec::with_capacity(slots.len());
        let mut results = BTreeMap::new();
        for slot in slots {
            if results.insert(slot.clone(), SlotResult::not_attempted()).is_none() {
                order.push(slot.clone());
            }
        }
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            target_date,
            order,
            results,
            recorded: BTreeSet::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn target_date(&self) -> NaiveDate {
        self.target_date
    }

    pub fn slots(&self) -> Vec<TimeSlot> {
        self.order.clone()
    }

    pub fn results(&self) -> &BTreeMap<TimeSlot, SlotResult> {
        &self.results
    }

    pub fn record(&mut self, slot: &TimeSlot, result: SlotResult) {
        if !self.results.contains_key(slot) {
            warn!(%slot, "Ignoring result for a slot that is not part of this run");
            return;
        }
        if !self.recorded.insert(slot.clone()) {
            warn!(%slot, "Slot result was already recorded, keeping the first one");
            return;
        }
        self.results.insert(slot.clone(), result);
    }

    pub fn finalize(self, finished_at: DateTime<Tz>, error: Option<String>) -> RunReport {
        let duration = finished_at - self.started_at;
        let outcome = classify(&self.results);
        RunReport {
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            target_date: self.target_date,
            results: self.results,
            outcome,
            error,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Tz>,
    pub finished_at: DateTime<Tz>,
    pub duration_secs: f64,
    pub target_date: NaiveDate,
    pub results: BTreeMap<TimeSlot, SlotResult>,
    pub outcome: RunOutcome,
    pub error: Option<String>,
}

impl RunReport {
    pub fn successful_slots(&self) -> usize {
        self.results.values().filter(|result| result.success).count()
    }
}
