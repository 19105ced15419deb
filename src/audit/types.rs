use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::catalog::types::Part;

/// A user's inventory check against one set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Audit {
  /// `audit-{set_number}-{created millis}`
  pub id: String,
  /// Normalized set number
  pub set_number: String,
  pub set_name: String,
  pub set_year: Option<i32>,
  pub image_url: Option<String>,
  pub theme: String,
  /// Count published by the catalog, spares excluded
  pub published_part_count: u32,
  /// Sum of all line quantities, spares included
  pub total_parts: u32,
  pub parts: Vec<Part>,
  #[serde(default)]
  pub parts_status: BTreeMap<String, PartStatus>,
  pub progress: Progress,
  pub created_at: DateTime<Utc>,
  pub last_modified: DateTime<Utc>,
}

impl Audit {
  pub fn part(&self, part_id: &str) -> Option<&Part> {
    self.parts.iter().find(|p| p.id == part_id)
  }

  pub fn status(&self, part_id: &str) -> PartStatus {
    self.parts_status.get(part_id).copied().unwrap_or_default()
  }

  /// Display state of one line.
  pub fn check_state(&self, part: &Part) -> CheckState {
    CheckState::derive(self.status(&part.id).quantity, part.quantity)
  }
}

/// Tracked state of one part line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartStatus {
  #[serde(default)]
  pub checked: bool,
  /// Pieces found so far, never above the line's required quantity
  #[serde(default)]
  pub quantity: u32,
}

impl PartStatus {
  /// Count `collected` pieces of a line that needs `required`.
  pub fn counted(collected: u32, required: u32) -> Self {
    Self {
      checked: false,
      quantity: collected.min(required),
    }
  }

  /// Tick the checkbox: all pieces found.
  pub fn complete(required: u32) -> Self {
    Self::counted(required, required)
  }

  pub fn clamped(self, required: u32) -> Self {
    Self {
      quantity: self.quantity.min(required),
      ..self
    }
  }
}

/// Three-way display state derived from (collected, required).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
  Unchecked,
  Partial,
  Complete,
}

impl CheckState {
  pub fn derive(collected: u32, required: u32) -> Self {
    if collected >= required {
      CheckState::Complete
    } else if collected == 0 {
      CheckState::Unchecked
    } else {
      CheckState::Partial
    }
  }
}

/// Completion statistics, always recomputed from part statuses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
  pub completed: u32,
  pub total: u32,
  pub percentage: u32,
}

impl Progress {
  pub fn new(completed: u32, total: u32) -> Self {
    let percentage = if total == 0 {
      0
    } else {
      (f64::from(completed) * 100.0 / f64::from(total)).round() as u32
    };

    Self {
      completed,
      total,
      percentage,
    }
  }
}

/// How progress is counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrackingMode {
  /// One unit per line; a line counts once it is complete
  Checkbox,
  /// One unit per piece
  #[default]
  Counter,
}

/// Line filter for listing parts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum PartFilter {
  #[default]
  All,
  Complete,
  Incomplete,
}

impl PartFilter {
  pub fn matches(self, state: CheckState) -> bool {
    match self {
      PartFilter::All => true,
      PartFilter::Complete => state == CheckState::Complete,
      PartFilter::Incomplete => state != CheckState::Complete,
    }
  }
}
