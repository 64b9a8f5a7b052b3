use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stops shorter than this are treated as accidental and not logged.
pub const MIN_TIMED_SECS: i64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimerError {
    #[error("The timer is already paused")]
    AlreadyPaused,
    #[error("The timer is already running")]
    AlreadyRunning,
}

/// A live timer on one habit. It is stored between invocations, so it keeps
/// the wall-clock start of the current run plus the seconds banked by
/// earlier runs before a pause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningTimer {
    pub habit_id: i64,
    pub banked_secs: i64,
    /// `None` while paused.
    pub running_since: Option<DateTime<Utc>>,
}

impl RunningTimer {
    pub fn start(habit_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            habit_id,
            banked_secs: 0,
            running_since: Some(now),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.running_since.is_none()
    }

    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> i64 {
        let current = self
            .running_since
            .map(|since| (now - since).num_seconds().max(0))
            .unwrap_or(0);
        self.banked_secs.saturating_add(current)
    }

    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<(), TimerError> {
        if self.is_paused() {
            return Err(TimerError::AlreadyPaused);
        }
        self.banked_secs = self.elapsed_secs(now);
        self.running_since = None;
        Ok(())
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<(), TimerError> {
        if !self.is_paused() {
            return Err(TimerError::AlreadyRunning);
        }
        self.running_since = Some(now);
        Ok(())
    }
}

/// Whole minutes to log for a stopped timer, rounded half-up and never
/// below one. `None` for stops under [`MIN_TIMED_SECS`].
pub fn minutes_to_log(secs: i64) -> Option<i64> {
    if secs < MIN_TIMED_SECS {
        return None;
    }
    Some(((secs + 30) / 60).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn pauses_do_not_count() {
        let mut t = RunningTimer::start(3, at(0));
        assert_eq!(t.elapsed_secs(at(90)), 90);

        t.pause(at(100)).unwrap();
        assert!(t.is_paused());
        assert_eq!(t.elapsed_secs(at(1000)), 100);

        t.resume(at(1000)).unwrap();
        assert_eq!(t.elapsed_secs(at(1000) + Duration::seconds(20)), 120);
    }

    #[test]
    fn pause_and_resume_reject_repeats() {
        let mut t = RunningTimer::start(3, at(0));
        assert_eq!(t.resume(at(1)), Err(TimerError::AlreadyRunning));
        t.pause(at(2)).unwrap();
        assert_eq!(t.pause(at(3)), Err(TimerError::AlreadyPaused));
    }

    #[test]
    fn clock_going_backwards_counts_as_zero() {
        let t = RunningTimer::start(3, at(500));
        assert_eq!(t.elapsed_secs(at(400)), 0);
    }

    #[test]
    fn minutes_round_and_floor_at_one() {
        assert_eq!(minutes_to_log(4), None);
        assert_eq!(minutes_to_log(5), Some(1));
        assert_eq!(minutes_to_log(89), Some(1));
        assert_eq!(minutes_to_log(90), Some(2));
        assert_eq!(minutes_to_log(25 * 60 + 10), Some(25));
    }

    #[test]
    fn survives_a_json_round_trip() {
        let mut t = RunningTimer::start(9, at(0));
        t.pause(at(42)).unwrap();
        let json = serde_json::to_string(&t).unwrap();
        let back: RunningTimer = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }
}
