use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{SlotResult, TimeSlot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    AllSuccess,
    PartialSuccess,
    NoSuccess,
}

impl RunOutcome {
    pub fn is_success(self) -> bool {
        self != RunOutcome::NoSuccess
    }
}

/// Classifies a finished run by how many of its slots were confirmed.
pub fn classify(results: &BTreeMap<TimeSlot, SlotResult>) -> RunOutcome {
    let successful = results.values().filter(|result| result.success).count();
    match successful {
        0 => RunOutcome::NoSuccess,
        n if n == results.len() => RunOutcome::AllSuccess,
        _ => RunOutcome::PartialSuccess,
    }
}
