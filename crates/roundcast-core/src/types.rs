use std::fmt;

use serde::{Deserialize, Serialize};

/// CSS color the page paints a round that closed up.
pub const UP_SIGNAL: &str = "rgb(49, 208, 170)";
/// CSS color the page paints a round that closed down.
pub const DOWN_SIGNAL: &str = "rgb(237, 75, 158)";

/// Classification of a finished round's color signal.
///
/// Anything that is not one of the two canonical signals — including an
/// absent probe — collapses into `Unknown`. The store and the wire protocol
/// both carry the numeric code, never the variant name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorClass {
    Up,
    Down,
    Unknown,
}

impl ColorClass {
    /// Numeric wire/store encoding: Up = 1, Down = 2, Unknown = 3.
    pub fn code(self) -> u8 {
        match self {
            Self::Up => 1,
            Self::Down => 2,
            Self::Unknown => 3,
        }
    }

    /// Classify a raw computed-style value by exact match.
    pub fn from_signal(raw: Option<&str>) -> Self {
        match raw {
            Some(UP_SIGNAL) => Self::Up,
            Some(DOWN_SIGNAL) => Self::Down,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ColorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One poll tick's view of the previous (finished) round.
///
/// Built by the extractor, consumed by the dedup engine, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundObservation {
    /// Numeric round id, 5–7 digits, as printed on the page.
    pub id: String,
    /// Raw computed-style color of the round, if the probe found one.
    pub raw_color: Option<String>,
}

/// A round the dedup engine accepted as new.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedRound {
    pub id: String,
    pub color: ColorClass,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_signals_map_to_up_and_down() {
        assert_eq!(ColorClass::from_signal(Some(UP_SIGNAL)), ColorClass::Up);
        assert_eq!(ColorClass::from_signal(Some(DOWN_SIGNAL)), ColorClass::Down);
    }

    #[test]
    fn anything_else_is_unknown() {
        assert_eq!(
            ColorClass::from_signal(Some("rgb(0, 0, 0)")),
            ColorClass::Unknown
        );
        assert_eq!(ColorClass::from_signal(Some("")), ColorClass::Unknown);
        assert_eq!(ColorClass::from_signal(None), ColorClass::Unknown);
    }

    #[test]
    fn numeric_codes() {
        assert_eq!(ColorClass::Up.code(), 1);
        assert_eq!(ColorClass::Down.code(), 2);
        assert_eq!(ColorClass::Unknown.code(), 3);
    }

    #[test]
    fn serde_uses_lowercase_variant_names() {
        assert_eq!(serde_json::to_string(&ColorClass::Up).unwrap(), "\"up\"");
        assert_eq!(
            serde_json::from_str::<ColorClass>("\"down\"").unwrap(),
            ColorClass::Down
        );
    }

    #[test]
    fn near_miss_signal_is_unknown() {
        // Same channels, different formatting — exact match only.
        assert_eq!(
            ColorClass::from_signal(Some("rgb(49,208,170)")),
            ColorClass::Unknown
        );
    }
}
