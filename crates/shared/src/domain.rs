use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NightId(pub i64);

/// One tracked sleep session. Owned by the store; controllers hold at most a
/// transient copy of the currently open night.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Night {
    pub id: NightId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub quality: Option<i32>,
}

impl Night {
    /// An open night has not been stopped yet; `end_time` still equals
    /// `start_time`.
    pub fn is_open(&self) -> bool {
        self.end_time == self.start_time
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NoOpenNight,
    NightOpen,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn night_at(start: DateTime<Utc>, end: DateTime<Utc>) -> Night {
        Night {
            id: NightId(1),
            start_time: start,
            end_time: end,
            quality: None,
        }
    }

    #[test]
    fn night_is_open_while_end_equals_start() {
        let now = Utc::now();
        assert!(night_at(now, now).is_open());
    }

    #[test]
    fn night_is_closed_once_end_advances() {
        let now = Utc::now();
        assert!(!night_at(now, now + Duration::seconds(1)).is_open());
    }
}
