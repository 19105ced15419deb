use chrono::{DateTime, Utc};

use crate::error::ValidationError;

/// Canonicalize a set number: `75192` becomes `75192-1`, anything that
/// already carries a variant suffix is kept as is.
pub fn normalize_set_number(input: &str) -> Result<String, ValidationError> {
  let trimmed = input.trim();
  if trimmed.is_empty() {
    return Err(ValidationError::EmptyInput("set number"));
  }

  if trimmed.contains('-') {
    Ok(trimmed.to_string())
  } else {
    Ok(format!("{}-1", trimmed))
  }
}

/// Human-friendly age of a timestamp ("5 minutes ago").
pub fn format_relative(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
  let elapsed = now - then;
  let minutes = elapsed.num_minutes();
  let hours = elapsed.num_hours();
  let days = elapsed.num_days();

  let plural = |n: i64, unit: &str| format!("{} {}{} ago", n, unit, if n == 1 { "" } else { "s" });

  if minutes < 1 {
    "Just now".to_string()
  } else if minutes < 60 {
    plural(minutes, "minute")
  } else if hours < 24 {
    plural(hours, "hour")
  } else if days < 7 {
    plural(days, "day")
  } else {
    then.format("%Y-%m-%d").to_string()
  }
}
