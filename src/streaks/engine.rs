use std::collections::BTreeSet;

use crate::models::{HeatmapDay, StreakResult};
use crate::streaks::day::{DateError, Day};

/// Deduplicated set of satisfied calendar days, ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionSet(BTreeSet<Day>);

impl CompletionSet {
    /// Fails on the first value that is not a calendar date.
    pub fn parse_all<I, S>(values: I) -> Result<Self, DateError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        values
            .into_iter()
            .map(|s| Day::parse(s.as_ref()))
            .collect::<Result<BTreeSet<_>, _>>()
            .map(CompletionSet)
    }

    pub fn contains(&self, day: Day) -> bool {
        self.0.contains(&day)
    }

    /// Days in `[start, end]`, ascending.
    pub fn between(&self, start: Day, end: Day) -> impl DoubleEndedIterator<Item = Day> + '_ {
        let (lo, hi) = if start <= end { (start, end) } else { (end, start) };
        let empty = start > end;
        self.0.range(lo..=hi).copied().filter(move |_| !empty)
    }
}

impl FromIterator<Day> for CompletionSet {
    fn from_iter<I: IntoIterator<Item = Day>>(iter: I) -> Self {
        CompletionSet(iter.into_iter().collect())
    }
}

/// Largest window the CLI and config accept: ten years of days.
pub const MAX_WINDOW_DAYS: u32 = 3650;

/// First day of the trailing window of `window_days` days ending at `today`.
/// `None` for an empty window.
pub fn window_start(window_days: u32, today: Day) -> Option<Day> {
    if window_days == 0 {
        return None;
    }
    let span = i32::try_from(window_days - 1).unwrap_or(i32::MAX);
    Some(today.minus_days(span))
}

/// Current and longest runs of consecutive days.
///
/// The current streak survives until the end of the day after its last
/// entry, so a run ending yesterday still reads as current before today's
/// entry is logged. Days after `today` are ignored.
pub fn compute_streaks(dates: &CompletionSet, today: Day) -> StreakResult {
    let days: Vec<Day> = dates.0.range(..=today).copied().collect();
    let Some(&most_recent) = days.last() else {
        return StreakResult::default();
    };

    let mut current = 0u32;
    if most_recent >= today.pred() {
        let mut expected = most_recent;
        for &day in days.iter().rev() {
            if day != expected {
                break;
            }
            current += 1;
            expected = expected.pred();
        }
    }

    let mut longest = 1u32;
    let mut run = 1u32;
    for pair in days.windows(2) {
        if pair[1].days_since(pair[0]) == 1 {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 1;
        }
    }

    StreakResult {
        current,
        longest: longest.max(current),
    }
}

pub fn compute_heatmap(dates: &CompletionSet, window_days: u32, today: Day) -> Vec<HeatmapDay> {
    let Some(start) = window_start(window_days, today) else {
        return Vec::new();
    };
    let mut out = Vec::with_capacity(window_days.min(MAX_WINDOW_DAYS) as usize);
    let mut day = start;
    while day <= today {
        out.push(HeatmapDay {
            date: day,
            satisfied: dates.contains(day),
        });
        day = day.succ();
    }
    out
}

/// Percentage of days in the trailing window that are satisfied, rounded
/// half-up. Zero for an empty window.
pub fn compute_consistency(dates: &CompletionSet, window_days: u32, today: Day) -> u8 {
    let Some(start) = window_start(window_days, today) else {
        return 0;
    };
    let hits = dates.between(start, today).count() as u64;
    percent(hits, window_days as u64)
}

/// `round(100 * part / whole)` clamped to `[0, 100]`; zero when `whole` is 0.
pub fn percent(part: u64, whole: u64) -> u8 {
    if whole == 0 {
        return 0;
    }
    let pct = (200 * part + whole) / (2 * whole);
    pct.min(100) as u8
}
