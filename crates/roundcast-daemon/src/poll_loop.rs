//! The poll loop: one fixed-period timeline driving extraction, dedup,
//! streaks, persistence, and fan-out.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use roundcast_core::{format_timer, observe, DedupEngine, StreakCounter};

use crate::snapshot::{PageProbes, SnapshotError};
use crate::store::RoundSink;

/// Event fanned out to every connected subscriber.
///
/// Serialized form is the wire protocol: `{"event": "new-round", "data":
/// {"id": ..., "colorClass": 1|2|3}}` and `{"event": "tick", "data":
/// {"timer": ..., "liveColor": ...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum RoundEvent {
    #[serde(rename_all = "camelCase")]
    NewRound { id: String, color_class: u8 },
    #[serde(rename_all = "camelCase")]
    Tick { timer: String, live_color: String },
}

/// Orchestrates one poll cycle per period for the process lifetime.
///
/// Sole owner of the dedup and streak state: no other task mutates them, so
/// each accepted id triggers exactly one store submit, one streak update, and
/// one `new-round` broadcast. The store submit runs detached; the broadcast
/// never blocks on slow subscribers. Neither can fail the other.
pub struct PollLoop {
    probes: Box<dyn PageProbes>,
    store: Arc<dyn RoundSink>,
    events_tx: broadcast::Sender<RoundEvent>,
    dedup: DedupEngine,
    streak: StreakCounter,
    period: Duration,
    cancel: CancellationToken,
}

impl PollLoop {
    pub fn new(
        probes: Box<dyn PageProbes>,
        store: Arc<dyn RoundSink>,
        events_tx: broadcast::Sender<RoundEvent>,
        period: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            probes,
            store,
            events_tx,
            dedup: DedupEngine::new(),
            streak: StreakCounter::new(),
            period,
            cancel,
        }
    }

    /// Id of the most recently accepted round, if any.
    pub fn last_round_id(&self) -> Option<&str> {
        self.dedup.last_seen()
    }

    /// Length of the current same-color streak.
    pub fn current_streak(&self) -> u32 {
        self.streak.len()
    }

    /// Run cycles until cancelled. A failed cycle is logged and the next one
    /// starts on schedule; no cycle outcome affects future cycles.
    pub async fn run(&mut self) {
        let mut interval = tokio::time::interval(self.period);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.cycle().await {
                        tracing::warn!(error = %e, "poll cycle failed");
                    }
                }
                _ = self.cancel.cancelled() => {
                    tracing::info!("poll loop: cancellation requested, stopping");
                    break;
                }
            }
        }
    }

    /// One poll cycle: round path (extract → dedup → streak → store +
    /// broadcast), then the unconditional tick path.
    pub async fn cycle(&mut self) -> Result<(), SnapshotError> {
        let timer = self.probes.timer_text().await?;

        let prev_text = self.probes.previous_round_text().await?;
        let prev_color = self.probes.previous_round_color().await?;
        let observation = observe(prev_text.as_deref(), prev_color.as_deref());

        if let Some(accepted) = self.dedup.process(observation) {
            let streak = self.streak.update(accepted.color);
            tracing::info!(
                id = %accepted.id,
                color = %accepted.color,
                streak,
                "new round accepted"
            );

            // Detached submit: outcome is logged, never awaited by the loop.
            let store = Arc::clone(&self.store);
            let id = accepted.id.clone();
            let color = accepted.color;
            tokio::spawn(async move {
                let date = Utc::now().date_naive();
                match store.submit(date, &id, color).await {
                    Ok(()) => tracing::info!(id = %id, "round stored"),
                    Err(e) => tracing::warn!(id = %id, error = %e, "failed to store round"),
                }
            });

            // Send fails only when no subscriber is connected.
            let _ = self.events_tx.send(RoundEvent::NewRound {
                id: accepted.id,
                color_class: accepted.color.code(),
            });
        }

        // Tick path: fires every cycle the timer probe is readable, whether
        // or not a round was accepted.
        if let Some(raw_timer) = timer {
            let live_color = self.probes.active_round_color().await?.unwrap_or_default();
            let _ = self.events_tx.send(RoundEvent::Tick {
                timer: format_timer(&raw_timer),
                live_color,
            });
        }

        Ok(())
    }
}
