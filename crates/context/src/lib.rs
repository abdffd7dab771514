//! Context text for the decision loop.
//!
//! Pure transform from the merged adapter snapshot to ordered
//! natural-language sections, one per adapter identity present, plus a
//! trailing time section. Absent adapters produce no section: a
//! disabled screen adapter simply omits the `[desktop]` block rather
//! than emitting a placeholder.

use chrono::{DateTime, Local};
use familiar_adapter::{Snapshot, SnapshotEntry};

/// Render the snapshot as context text, stamped with the current local
/// time.
pub fn build_context(snapshot: &Snapshot) -> String {
    build_context_at(snapshot, Local::now())
}

/// Render the snapshot as context text at an explicit instant. Pure;
/// never fails on missing or oddly-shaped payloads.
pub fn build_context_at(snapshot: &Snapshot, now: DateTime<Local>) -> String {
    let mut lines = Vec::new();

    if let Some(screen) = snapshot.get("screen") {
        lines.extend(screen_lines(screen));
    }
    if let Some(keyboard) = snapshot.get("keyboard") {
        lines.extend(keyboard_lines(keyboard));
    }
    if let Some(voice) = snapshot.get("voice") {
        lines.extend(voice_lines(voice, snapshot));
    }

    lines.push(format!("[time] {}", now.format("%A %Y-%m-%d %H:%M")));

    lines.join("\n")
}

fn screen_lines(entry: &SnapshotEntry) -> Vec<String> {
    let mut lines = Vec::new();

    let title = entry
        .data
        .get("active_window")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    let process = entry
        .data
        .get("process")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    if !title.is_empty() || !process.is_empty() {
        let description = [process, title]
            .iter()
            .filter(|part| !part.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join(" / ");
        lines.push(format!("[desktop] The user is working in {description}"));
    }

    if let Some(content) = entry.data.get("content").and_then(|v| v.as_object()) {
        let kind = content.get("type").and_then(|v| v.as_str());
        let text = content.get("content").and_then(|v| v.as_str()).unwrap_or("");
        match kind {
            Some("ocr") if !text.is_empty() => {
                lines.push(format!("[screen] On-screen text: {text}"));
            }
            Some("screenshot_b64") => {
                lines.push("[screen] A screenshot of the display was captured".to_string());
            }
            _ => {}
        }
    }

    lines
}

fn keyboard_lines(entry: &SnapshotEntry) -> Vec<String> {
    let Some(rate) = entry.data.get("typing_rate").and_then(|v| v.as_u64()) else {
        return Vec::new();
    };
    let active = entry
        .data
        .get("active")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    if active {
        vec![format!("[typing] The user is typing, about {rate} keys/min")]
    } else {
        vec!["[typing] The keyboard is idle".to_string()]
    }
}

fn voice_lines(entry: &SnapshotEntry, snapshot: &Snapshot) -> Vec<String> {
    if !entry.data.contains_key("recognized_text") {
        return Vec::new();
    }
    let ago = snapshot
        .taken_at
        .signed_duration_since(entry.observed_at)
        .num_seconds()
        .max(0);
    vec![format!("[voice] Last speech heard {ago} seconds ago")]
}
