use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Source of the current time, injected into everything that stamps or
/// expires records.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

pub type SharedClock = Arc<dyn Clock>;

pub fn system() -> SharedClock {
  Arc::new(SystemClock)
}

#[cfg(test)]
pub mod testing {
  use super::*;
  use chrono::{Duration, TimeZone};
  use std::sync::Mutex;

  /// Clock that only moves when told to.
  pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
  }

  impl ManualClock {
    pub fn new() -> Arc<Self> {
      Arc::new(Self {
        now: Mutex::new(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()),
      })
    }

    pub fn advance(&self, by: Duration) {
      let mut now = self.now.lock().unwrap();
      *now += by;
    }
  }

  impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
      *self.now.lock().unwrap()
    }
  }
}
