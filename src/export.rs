//! CSV rendering of the detection log.

use crate::storage::{LogEntry, LogStatistics};

pub const CSV_HEADER: &str = "ID,Timestamp,Class,Category,Confidence";

/// Render log entries as CSV, header included. An empty log exports the
/// header alone.
///
/// Class names and categories come from the validated catalog (no commas,
/// quotes or whitespace), so no field quoting is required.
pub fn render_csv(entries: &[LogEntry]) -> String {
    let mut out = String::with_capacity(64 + entries.len() * 48);
    out.push_str(CSV_HEADER);
    out.push('\n');
    for entry in entries {
        out.push_str(&format!(
            "{},{},{},{},{:.2}\n",
            entry.id,
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.class_name,
            entry.category,
            entry.confidence,
        ));
    }
    out
}

/// Render session statistics as CSV key/value rows.
pub fn render_statistics(stats: &LogStatistics) -> String {
    let mut out = String::new();
    out.push_str("Metric,Value\n");
    out.push_str(&format!("Session,{}\n", stats.session_id));
    out.push_str(&format!("Total Detections,{}\n", stats.total_detections));
    out.push_str(&format!("Inorganic Count,{}\n", stats.inorganic_count));
    out.push_str(&format!("Organic Count,{}\n", stats.organic_count));
    out.push_str(&format!(
        "Inorganic Percentage,{:.1}\n",
        stats.inorganic_percentage
    ));
    out.push_str(&format!(
        "Organic Percentage,{:.1}\n",
        stats.organic_percentage
    ));
    for (class_name, count) in &stats.class_counts {
        out.push_str(&format!("Class {},{}\n", class_name, count));
    }
    out
}
