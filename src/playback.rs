//! Playback simulation: emulates a player's progress reporting.
//!
//! One run resolves the item, picks a claimed watch time that never exceeds
//! the real content length, then walks a jittered heartbeat schedule in
//! accelerated real time and closes with a progress report. Any failed call
//! aborts the remaining steps.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::KeyValue;
use tracing::{debug, info};

use crate::adapter::{
    AdapterError, AdapterResult, Heartbeat, HeartbeatKind, PlaybackChannel, PlaybackTarget,
};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::jitter::Jitter;
use crate::model::ContentItem;
use crate::telemetry::metrics;

/// Shortest watch ever claimed, seconds.
pub const MIN_REPORTED_SECS: f64 = 5.0;
/// Claimed time stays this far (1–3 s, random) below the real length.
pub const SAFETY_BUFFER_SECS: (f64, f64) = (1.0, 3.0);
/// Heartbeat spacing at speed factor 1.
pub const BASE_CADENCE_SECS: f64 = 15.0;
pub const MIN_CADENCE_SECS: f64 = 5.0;

const POSITION_JITTER_SECS: f64 = 1.0;
const STEP_WAIT_JITTER: (f64, f64) = (0.7, 1.3);
const PAUSE_PROBABILITY: f64 = 0.08;
const PAUSE_SECS: (f64, f64) = (1.0, 5.0);
const SEEK_PROBABILITY: f64 = 0.03;
const SEEK_SETTLE_SECS: (f64, f64) = (0.5, 1.5);

#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    pub nominal_secs: f64,
    pub jitter_percent: f64,
    pub speed_factor: f64,
    /// Upper bound for every platform call.
    pub call_timeout: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            nominal_secs: 30.0,
            jitter_percent: 10.0,
            speed_factor: 1.0,
            call_timeout: Duration::from_secs(20),
        }
    }
}

impl From<&Config> for PlaybackConfig {
    fn from(config: &Config) -> Self {
        Self {
            nominal_secs: config.nominal_duration_secs,
            jitter_percent: config.jitter_percent,
            speed_factor: config.speed_factor,
            call_timeout: config.call_timeout,
        }
    }
}

/// Heartbeat schedule for one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cadence {
    /// Claimed seconds between heartbeats.
    pub interval_secs: f64,
    pub steps: u32,
    /// Nominal real seconds between heartbeats, before jitter.
    pub step_wait_secs: f64,
}

impl Cadence {
    pub fn new(target_secs: f64, speed_factor: f64) -> Self {
        let speed = speed_factor.max(1.0);
        let interval_secs = (BASE_CADENCE_SECS / speed).floor().max(MIN_CADENCE_SECS);
        let steps = (target_secs / interval_secs).floor().max(0.0) as u32;
        let allotted_real_secs = target_secs / speed;
        Self {
            interval_secs,
            steps,
            step_wait_secs: allotted_real_secs / f64::from(steps.max(1)),
        }
    }

    /// Whether the last regular beat falls short of `target_secs`.
    pub fn needs_final_beat(&self, target_secs: f64) -> bool {
        f64::from(self.steps) * self.interval_secs + f64::EPSILON < target_secs
    }
}

/// Claimed watch time for content `true_secs` long.
///
/// Nominal time jittered by ±half the jitter band, raised to
/// [`MIN_REPORTED_SECS`], then capped below the real length by a random
/// safety buffer. The cap wins over the minimum. May return a value
/// `<= 0` for content shorter than the buffer.
pub fn target_duration(
    nominal_secs: f64,
    jitter_percent: f64,
    true_secs: f64,
    jitter: &dyn Jitter,
) -> f64 {
    let half_band = jitter_percent / 2.0;
    let factor = 1.0 + jitter.uniform(-half_band, half_band) / 100.0;
    let buffer = jitter.uniform(SAFETY_BUFFER_SECS.0, SAFETY_BUFFER_SECS.1);
    (nominal_secs * factor)
        .max(MIN_REPORTED_SECS)
        .min(true_secs - buffer)
}

/// What a finished run reported.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackOutcome {
    pub reported_secs: f64,
    pub heartbeats: u32,
    pub pauses: u32,
    pub seeks: u32,
}

/// Drives one simulated playback per call over a [`PlaybackChannel`].
pub struct PlaybackSimulator {
    channel: Arc<dyn PlaybackChannel>,
    jitter: Arc<dyn Jitter>,
    config: PlaybackConfig,
}

impl PlaybackSimulator {
    pub fn new(
        channel: Arc<dyn PlaybackChannel>,
        jitter: Arc<dyn Jitter>,
        config: PlaybackConfig,
    ) -> Self {
        Self {
            channel,
            jitter,
            config,
        }
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// Run the full playback sequence for `item`.
    ///
    /// Not cancellation safe by intent: callers let a started run finish so
    /// the platform never sees a half-closed session.
    pub async fn simulate(&self, item: &ContentItem) -> Result<PlaybackOutcome> {
        let target = self
            .bounded("resolve", self.channel.resolve(item))
            .await?;

        let true_secs = match item.duration_secs {
            Some(listed) if listed > 0.0 => listed.min(target.duration_secs),
            _ => target.duration_secs,
        };
        let reported_secs = target_duration(
            self.config.nominal_secs,
            self.config.jitter_percent,
            true_secs,
            self.jitter.as_ref(),
        );
        if reported_secs <= 0.0 {
            return Err(Error::Other(format!(
                "item {} is too short to simulate ({true_secs:.1}s)",
                item.id
            )));
        }

        let cadence = Cadence::new(reported_secs, self.config.speed_factor);
        debug!(
            item_id = %item.id,
            reported_secs,
            interval_secs = cadence.interval_secs,
            steps = cadence.steps,
            "playback schedule"
        );

        let mut outcome = PlaybackOutcome {
            reported_secs,
            heartbeats: 0,
            pauses: 0,
            seeks: 0,
        };

        for step in 1..=cadence.steps {
            let wait = cadence.step_wait_secs
                * self.jitter.uniform(STEP_WAIT_JITTER.0, STEP_WAIT_JITTER.1);
            sleep_secs(wait).await;

            let nominal = f64::from(step) * cadence.interval_secs;
            let position = (nominal
                + self.jitter.uniform(-POSITION_JITTER_SECS, POSITION_JITTER_SECS))
            .clamp(0.0, reported_secs);
            self.beat(&target, step, position, HeartbeatKind::Progress, &mut outcome)
                .await?;

            if self.jitter.chance(PAUSE_PROBABILITY) {
                sleep_secs(self.jitter.uniform(PAUSE_SECS.0, PAUSE_SECS.1)).await;
                self.beat(&target, step, position, HeartbeatKind::Resume, &mut outcome)
                    .await?;
                outcome.pauses += 1;
            }

            if step > 2 && self.jitter.chance(SEEK_PROBABILITY) {
                let earlier = self.jitter.uniform(0.0, position);
                self.beat(&target, step, earlier, HeartbeatKind::Seek, &mut outcome)
                    .await?;
                sleep_secs(self.jitter.uniform(SEEK_SETTLE_SECS.0, SEEK_SETTLE_SECS.1)).await;
                outcome.seeks += 1;
            }
        }

        if cadence.needs_final_beat(reported_secs) {
            self.beat(
                &target,
                cadence.steps + 1,
                reported_secs,
                HeartbeatKind::Final,
                &mut outcome,
            )
            .await?;
        }

        self.bounded(
            "report_progress",
            self.channel.report_progress(&target, reported_secs),
        )
        .await?;

        info!(
            item_id = %item.id,
            reported_secs,
            heartbeats = outcome.heartbeats,
            pauses = outcome.pauses,
            seeks = outcome.seeks,
            "playback reported"
        );
        Ok(outcome)
    }

    async fn beat(
        &self,
        target: &PlaybackTarget,
        step: u32,
        position_secs: f64,
        kind: HeartbeatKind,
        outcome: &mut PlaybackOutcome,
    ) -> Result<()> {
        let beat = Heartbeat {
            step,
            position_secs,
            kind,
        };
        self.bounded("heartbeat", self.channel.heartbeat(target, &beat))
            .await?;
        outcome.heartbeats += 1;
        metrics::heartbeats_emitted().add(1, &[KeyValue::new("kind", kind_label(kind))]);
        Ok(())
    }

    /// Await a platform call, failing it after `call_timeout`.
    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = AdapterResult<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.config.call_timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(AdapterError::Timeout {
                operation,
                secs: self.config.call_timeout.as_secs_f64(),
            }
            .into()),
        }
    }
}

async fn sleep_secs(secs: f64) {
    let wait = Duration::try_from_secs_f64(secs).unwrap_or_default();
    if !wait.is_zero() {
        tokio::time::sleep(wait).await;
    }
}

fn kind_label(kind: HeartbeatKind) -> &'static str {
    match kind {
        HeartbeatKind::Progress => "progress",
        HeartbeatKind::Resume => "resume",
        HeartbeatKind::Seek => "seek",
        HeartbeatKind::Final => "final",
    }
}
