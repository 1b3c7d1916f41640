//! Running count of consecutive rounds sharing a classification.

use crate::types::ColorClass;

/// Counts consecutive accepted rounds with the same [`ColorClass`].
///
/// Updated once per accepted round, never per poll tick. The first round
/// establishes the baseline with a count of 1; there is no prior class for it
/// to "match", so a count of 1 carries no streak meaning.
#[derive(Debug, Default)]
pub struct StreakCounter {
    last: Option<ColorClass>,
    count: u32,
}

impl StreakCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one accepted round's class and return the current streak length.
    pub fn update(&mut self, color: ColorClass) -> u32 {
        match self.last {
            Some(last) if last == color => self.count += 1,
            _ => self.count = 1,
        }
        self.last = Some(color);
        self.count
    }

    pub fn len(&self) -> u32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_none()
    }
}
