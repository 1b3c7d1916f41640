//! Parsing of raw probe values into structured observations.
//!
//! Probes read from a live page can be absent or garbled at any tick; every
//! function here degrades to `None` instead of erroring so a bad read costs
//! one cycle, nothing more.

use crate::types::RoundObservation;

/// Extract a round id from the previous-slide probe text.
///
/// The page renders the id as `#` followed by the round number somewhere in
/// the slide's text. A run of 5–7 digits after a `#` is an id; runs longer
/// than 7 are truncated to the first 7, runs shorter than 5 are skipped.
pub fn parse_round_id(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'#' {
            let digits: &[u8] = &bytes[i + 1..];
            let run = digits.iter().take_while(|b| b.is_ascii_digit()).count();
            if run >= 5 {
                let take = run.min(7);
                // Slice is pure ASCII digits, valid UTF-8 by construction.
                return Some(String::from_utf8_lossy(&digits[..take]).into_owned());
            }
        }
        i += 1;
    }
    None
}

/// Build a [`RoundObservation`] from the two previous-round probes.
///
/// `None` when the text probe is absent or carries no id; the color probe is
/// passed through untouched and classified later, on acceptance.
pub fn observe(prev_text: Option<&str>, prev_color: Option<&str>) -> Option<RoundObservation> {
    let id = parse_round_id(prev_text?)?;
    Some(RoundObservation {
        id,
        raw_color: prev_color.map(str::to_owned),
    })
}

/// Normalize the countdown probe for the `tick` payload.
///
/// Strips a single leading `0` if present, then removes the first `:`.
/// `"0:45"` → `"45"`, `"0:07"` → `"07"`, `"1:30"` → `"130"`.
pub fn format_timer(raw: &str) -> String {
    let trimmed = raw.strip_prefix('0').unwrap_or(raw);
    match trimmed.find(':') {
        Some(pos) => {
            let mut out = String::with_capacity(trimmed.len() - 1);
            out.push_str(&trimmed[..pos]);
            out.push_str(&trimmed[pos + 1..]);
            out
        }
        None => trimmed.to_owned(),
    }
}
