//! 📊 progress.rs: "Are we there yet?" -- every migration, every step, forever.
//!
//! 🚀 Two things live here: a spinner that keeps you company while the cloud
//! thinks about it, and a table so comfy it has lumbar support for the summaries.
//!
//! ⚠️ Watching the spinner will not make the domain provision faster.
//! Neither will refreshing the console. We've tried. Science says no.
//!
//! 🦆 The duck has nothing to do with this module. It's just vibing.

use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use indicatif::{ProgressBar, ProgressStyle};

/// ⏱️ Formats a Duration into MM:SS or HH:MM:SS.
/// If it shows HH:MM:SS, the upgrade is doing upgrade things. Go touch grass.
pub(crate) fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// 🌀 A spinner for one long wait. Hidden automatically when stderr isn't a terminal,
/// so CI logs stay clean and tests stay quiet.
pub(crate) struct PollSpinner {
    label: String,
    bar: ProgressBar,
    started: Instant,
}

impl std::fmt::Debug for PollSpinner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 ProgressBar is a diva and doesn't derive Debug
        f.debug_struct("PollSpinner")
            .field("label", &self.label)
            .finish()
    }
}

impl PollSpinner {
    pub(crate) fn new(label: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        // -- 🎨 template is a compile-time constant; a bad one falls back to the default style
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {prefix} [{elapsed}] {msg}") {
            bar.set_style(style);
        }
        bar.set_prefix(label.to_string());
        bar.enable_steady_tick(Duration::from_millis(120));
        Self {
            label: label.to_string(),
            bar,
            started: Instant::now(),
        }
    }

    /// 🔄 Swap the message next to the spinner. Usually the latest status the cloud told us.
    pub(crate) fn note(&self, attempt: u32, note: &str) {
        self.bar.set_message(format!("attempt {attempt}: {note}"));
    }

    /// ✅ Stop spinning and return how long we spun.
    pub(crate) fn finish(self) -> Duration {
        self.bar.finish_and_clear();
        self.started.elapsed()
    }
}

/// 🍽️ Builds a condensed table with a header row and right-aligned numeric-looking cells.
pub(crate) fn render_table(header: &[&str], rows: &[Vec<String>]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.iter().map(|h| Cell::new(h)).collect::<Vec<_>>());

    for row in rows {
        table.add_row(
            row.iter()
                .map(|value| {
                    // -- 🔢 numbers lean right, words lean left, like a well-run spreadsheet
                    let alignment = if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
                        CellAlignment::Right
                    } else {
                        CellAlignment::Left
                    };
                    Cell::new(value).set_alignment(alignment)
                })
                .collect::<Vec<_>>(),
        );
    }

    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_durations_get_dressed_for_the_logs() {
        assert_eq!(format_duration(Duration::from_secs(0)), "00:00");
        assert_eq!(format_duration(Duration::from_secs(75)), "01:15");
        assert_eq!(format_duration(Duration::from_secs(3 * 3600 + 61)), "03:01:01");
    }

    #[test]
    fn the_one_where_the_table_remembers_every_row() {
        let the_rendered = render_table(
            &["source", "destination", "total"],
            &[
                vec!["movies".to_string(), "movies-reindex".to_string(), "1".to_string()],
                vec!["corp".to_string(), "corp-reindex".to_string(), "3".to_string()],
            ],
        );

        assert!(the_rendered.contains("source"));
        assert!(the_rendered.contains("movies-reindex"));
        assert!(the_rendered.contains("corp-reindex"));
    }
}
