use unicode_width::UnicodeWidthStr;

use crate::models::HeatmapDay;

/// Format minutes as "45min", "2hr" or "1hr 30min"
pub fn format_minutes(minutes: i64) -> String {
    if minutes < 60 {
        return format!("{}min", minutes);
    }
    let hours = minutes / 60;
    let mins = minutes % 60;
    if mins > 0 {
        format!("{}hr {}min", hours, mins)
    } else {
        format!("{}hr", hours)
    }
}

/// Clock-style elapsed time: "04:05", or "1:02:03" once past an hour
pub fn format_elapsed(secs: i64) -> String {
    let secs = secs.max(0);
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{:02}:{:02}", m, s)
    }
}

/// Create a simple ASCII progress bar
pub fn progress_bar(filled: u32, total: u32, width: usize) -> String {
    if total == 0 {
        return "░".repeat(width);
    }
    let ratio = (filled as f64 / total as f64).min(1.0);
    let filled_count = (ratio * width as f64).round() as usize;
    let empty_count = width.saturating_sub(filled_count);
    format!("{}{}", "█".repeat(filled_count), "░".repeat(empty_count))
}

/// Left-align `s` in a column of `width` terminal cells. Emoji count double.
pub fn pad(s: &str, width: usize) -> String {
    let used = UnicodeWidthStr::width(s);
    format!("{}{}", s, " ".repeat(width.saturating_sub(used)))
}

/// Heatmap rows of up to `per_row` days, oldest first: ● done, · missed.
pub fn heatmap_rows(days: &[HeatmapDay], per_row: usize) -> Vec<String> {
    days.chunks(per_row.max(1))
        .map(|chunk| {
            chunk
                .iter()
                .map(|d| if d.satisfied { "●" } else { "·" })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaks::Day;

    #[test]
    fn minutes() {
        assert_eq!(format_minutes(45), "45min");
        assert_eq!(format_minutes(120), "2hr");
        assert_eq!(format_minutes(95), "1hr 35min");
    }

    #[test]
    fn elapsed() {
        assert_eq!(format_elapsed(245), "04:05");
        assert_eq!(format_elapsed(3723), "1:02:03");
        assert_eq!(format_elapsed(-10), "00:00");
    }

    #[test]
    fn bars() {
        assert_eq!(progress_bar(1, 2, 4), "██░░");
        assert_eq!(progress_bar(5, 0, 3), "░░░");
        assert_eq!(progress_bar(9, 3, 3), "███");
    }

    #[test]
    fn padding_counts_display_width() {
        assert_eq!(pad("ab", 4), "ab  ");
        assert_eq!(pad("🎯x", 5), "🎯x  ");
        assert_eq!(pad("toolong", 3), "toolong");
    }

    #[test]
    fn heatmap_rows_chunk_days() {
        let start = Day::parse("2024-01-01").unwrap();
        let days: Vec<HeatmapDay> = (0..5)
            .map(|i| HeatmapDay {
                date: start.minus_days(-i),
                satisfied: i % 2 == 0,
            })
            .collect();
        assert_eq!(heatmap_rows(&days, 3), vec!["● · ●", "· ●"]);
    }
}
