//! Relative time labels

use chrono::{DateTime, Utc};

fn hours_between(created_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - created_at).num_hours().max(0)
}

/// Long form used on posts: "3 hours ago", "1 day ago"
pub fn post_age_label(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let hours = hours_between(created_at, now);
    match hours {
        0 => "Just now".to_string(),
        1 => "1 hour ago".to_string(),
        2..=23 => format!("{hours} hours ago"),
        _ => match hours / 24 {
            1 => "1 day ago".to_string(),
            days => format!("{days} days ago"),
        },
    }
}

/// Short form used on statuses: "3h ago", "1d ago"
pub fn status_age_label(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let hours = hours_between(created_at, now);
    match hours {
        0 => "Just now".to_string(),
        1..=23 => format!("{hours}h ago"),
        _ => format!("{}d ago", hours / 24),
    }
}
