use crate::Chapter;

/// Formats seconds as `m:ss`, `mm:ss` or `h:mm:ss`.
pub fn format_seconds(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    let h = total / 3600;
    let m = (total / 60) % 60;
    let s = total % 60;

    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

/// Renders chapters in the copy format, one markdown heading per chapter.
///
/// Returns `None` when there is nothing to copy.
pub fn copy_chapters(chapters: &[Chapter], with_timestamps: bool) -> Option<String> {
    let mut text = String::new();
    for c in chapters {
        let mut title = format!("# {}", c.chapter.trim());
        if with_timestamps {
            title = format!("{title} - {}", format_seconds(c.start));
        }
        let content = c.summary.as_deref().unwrap_or_default().trim();
        text.push_str(&format!("{title}\n\n{content}\n\n"));
    }

    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
