//! Dedup & classification: decides whether an observation is a new round.

use crate::types::{AcceptedRound, ColorClass, RoundObservation};

/// Tracks the last accepted round id and gates duplicate observations.
///
/// The poll loop re-reads the same slide many times per round; only the first
/// read of a fresh id is accepted. This engine is the sole writer of the
/// last-seen id, and the poll loop is its sole caller, so acceptance is
/// at-most-once per id without any locking.
#[derive(Debug, Default)]
pub struct DedupEngine {
    last_seen: Option<String>,
}

impl DedupEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently accepted round id, if any.
    pub fn last_seen(&self) -> Option<&str> {
        self.last_seen.as_deref()
    }

    /// Accept the observation if it carries an id different from the last
    /// accepted one. On acceptance the raw color is classified and the
    /// last-seen id advances; a rejected observation changes nothing.
    pub fn process(&mut self, obs: Option<RoundObservation>) -> Option<AcceptedRound> {
        let obs = obs?;
        if self.last_seen.as_deref() == Some(obs.id.as_str()) {
            return None;
        }
        let color = ColorClass::from_signal(obs.raw_color.as_deref());
        self.last_seen = Some(obs.id.clone());
        Some(AcceptedRound { id: obs.id, color })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UP_SIGNAL;

    fn obs(id: &str, color: Option<&str>) -> Option<RoundObservation> {
        Some(RoundObservation {
            id: id.into(),
            raw_color: color.map(str::to_owned),
        })
    }

    #[test]
    fn first_observation_is_accepted() {
        let mut engine = DedupEngine::new();
        let accepted = engine.process(obs("111111", Some(UP_SIGNAL))).unwrap();
        assert_eq!(accepted.id, "111111");
        assert_eq!(accepted.color, ColorClass::Up);
        assert_eq!(engine.last_seen(), Some("111111"));
    }

    #[test]
    fn repeated_id_is_rejected() {
        let mut engine = DedupEngine::new();
        assert!(engine.process(obs("111111", None)).is_some());
        assert!(engine.process(obs("111111", None)).is_none());
        assert!(engine.process(obs("111111", Some(UP_SIGNAL))).is_none());
        assert_eq!(engine.last_seen(), Some("111111"));
    }

    #[test]
    fn absent_observation_is_rejected_and_keeps_state() {
        let mut engine = DedupEngine::new();
        assert!(engine.process(None).is_none());
        assert!(engine.process(obs("222222", None)).is_some());
        assert!(engine.process(None).is_none());
        assert_eq!(engine.last_seen(), Some("222222"));
    }

    #[test]
    fn alternating_ids_each_accepted_exactly_once() {
        let mut engine = DedupEngine::new();
        let mut accepted = Vec::new();
        for id in ["100001", "100001", "100002", "100002", "100003"] {
            if let Some(a) = engine.process(obs(id, None)) {
                accepted.push(a.id);
            }
        }
        assert_eq!(accepted, vec!["100001", "100002", "100003"]);
    }

    #[test]
    fn earlier_id_reappearing_is_accepted_again() {
        // Dedup only compares against the immediately previous id; the page
        // never replays old rounds, so no history is kept.
        let mut engine = DedupEngine::new();
        assert!(engine.process(obs("100001", None)).is_some());
        assert!(engine.process(obs("100002", None)).is_some());
        assert!(engine.process(obs("100001", None)).is_some());
    }

    #[test]
    fn unclassifiable_color_accepted_as_unknown() {
        let mut engine = DedupEngine::new();
        let accepted = engine.process(obs("333333", Some("rgb(9, 9, 9)"))).unwrap();
        assert_eq!(accepted.color, ColorClass::Unknown);
        let accepted = engine.process(obs("333334", None)).unwrap();
        assert_eq!(accepted.color, ColorClass::Unknown);
    }
}
