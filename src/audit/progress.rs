use std::collections::BTreeMap;

use super::types::{CheckState, PartStatus, Progress, TrackingMode};
use crate::catalog::types::Part;

/// Recompute progress over every part of an audit.
///
/// In counter mode a line contributes `min(collected, required)` of its
/// `required` pieces, so over-counting never pushes completion past 100%.
pub fn calculate_progress(
  parts: &[Part],
  statuses: &BTreeMap<String, PartStatus>,
  mode: TrackingMode,
) -> Progress {
  let status = |part: &Part| statuses.get(&part.id).copied().unwrap_or_default();

  match mode {
    TrackingMode::Checkbox => {
      let completed = parts
        .iter()
        .filter(|&part| {
          let line = status(part);
          line.checked || CheckState::derive(line.quantity, part.quantity) == CheckState::Complete
        })
        .count();
      Progress::new(completed as u32, parts.len() as u32)
    }
    TrackingMode::Counter => {
      let (completed, total) = parts.iter().fold((0u32, 0u32), |(have, need), part| {
        (
          have + status(part).quantity.min(part.quantity),
          need + part.quantity,
        )
      });
      Progress::new(completed, total)
    }
  }
}
