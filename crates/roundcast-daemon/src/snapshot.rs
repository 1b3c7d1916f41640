//! The narrow seam between the poll loop and the rendered page.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("probe failed: {0}")]
    Probe(String),
}

/// Point-in-time reads of the four values the poll loop cares about.
///
/// An absent DOM node is `Ok(None)`, not an error — page layout churn costs
/// one field for one cycle. Errors are reserved for the transport underneath
/// (browser gone, evaluation rejected), and even those only fail the cycle
/// they occur in.
#[async_trait]
pub trait PageProbes: Send + Sync {
    /// Text content of the previous (finished) round's slide.
    async fn previous_round_text(&self) -> Result<Option<String>, SnapshotError>;

    /// Computed color of the previous round's result panel.
    async fn previous_round_color(&self) -> Result<Option<String>, SnapshotError>;

    /// Computed color of the currently active round's panel.
    async fn active_round_color(&self) -> Result<Option<String>, SnapshotError>;

    /// Raw countdown text, e.g. `"0:45"`.
    async fn timer_text(&self) -> Result<Option<String>, SnapshotError>;
}
