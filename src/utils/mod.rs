use regex::Regex;

use crate::domain::Format;

/// Numeric rank of a resolution label, taken from its leading digits
/// ("1080p" -> 1080, "1280x720" -> 1280). Labels without digits have no rank.
pub fn resolution_rank(label: &str) -> Option<u64> {
    let re = Regex::new(r"^\s*(\d+)").ok()?;
    let caps = re.captures(label)?;
    caps[1].parse::<u64>().ok()
}

/// Pick the resolution with the highest rank. Ties keep the earliest entry,
/// unranked labels lose to every ranked one.
pub fn highest_resolution(resolutions: &[String]) -> Option<&str> {
    let mut best: Option<(&str, Option<u64>)> = None;

    for label in resolutions {
        let rank = resolution_rank(label);
        match best {
            Some((_, best_rank)) if rank <= best_rank => {}
            _ => best = Some((label.as_str(), rank)),
        }
    }

    best.map(|(label, _)| label)
}

/// Compact display of engagement counters: anything over 999 becomes `X.XK`.
pub fn format_count(value: u64) -> String {
    if value > 999 {
        // half-up on the tenths digit, e.g. 1250 -> 1.3K
        let tenths = (value + 50) / 100;
        format!("{}.{}K", tenths / 10, tenths % 10)
    } else {
        value.to_string()
    }
}

/// Sanitize filename to remove invalid characters
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            _ => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Filename offered in the save dialog: `<postID>.<format>`.
pub fn save_filename(post_id: &str, format: Format) -> String {
    let sanitized = sanitize_filename(post_id);
    let stem = sanitized.trim_matches(|c| c == '.' || c == ' ');
    let stem = if stem.is_empty() { "video" } else { stem };

    format!("{}.{}", stem, format.extension())
}
