//! Parsing and policy for the platform's compact duration tokens.

/// Videos shorter than this many seconds count as short-form clips and are
/// excluded from curation.
pub const SHORT_FORM_THRESHOLD_SECS: i64 = 300;

/// Converts a compact `PT#H#M#S` duration token into total seconds.
///
/// Every component is optional (`PT45S`, `PT10M`, `PT1H`). A token that does
/// not match the grammar yields 0 instead of an error: one malformed record
/// must not abort a batch of otherwise valid videos, and a zero-second video
/// is filtered out downstream anyway.
pub fn parse_duration(token: &str) -> i64 {
    let Some(rest) = token.strip_prefix("PT") else {
        return 0;
    };

    let mut total = 0i64;
    let mut digits = String::new();
    for ch in rest.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        // Unit letter must follow at least one digit.
        let Ok(value) = digits.parse::<i64>() else {
            return 0;
        };
        digits.clear();
        match ch {
            'H' => total += value * 3600,
            'M' => total += value * 60,
            'S' => total += value,
            _ => return 0,
        }
    }

    if !digits.is_empty() {
        // Trailing digits without a unit letter.
        return 0;
    }
    total
}

/// Whether a video of `duration_secs` qualifies for the curated list.
pub fn is_long_form(duration_secs: i64) -> bool {
    duration_secs >= SHORT_FORM_THRESHOLD_SECS
}
