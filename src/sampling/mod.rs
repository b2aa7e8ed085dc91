//! Periodic clock sources driving live recomputation. Each [ClockSource] owns a background task
//! that publishes wall-clock samples at a fixed rate until it is stopped or dropped.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::utils::clock::Clock;

/// Sampled once per second. Sub-second precision is not visible in rollup tables.
pub const SLOW_PERIOD: Duration = Duration::from_secs(1);

/// Period of a clock sampled `fps` times per second.
pub fn render_period(fps: u32) -> Duration {
    Duration::from_secs(1) / fps.max(1)
}

pub struct ClockSource {
    name: &'static str,
    samples: watch::Receiver<DateTime<Utc>>,
    shutdown: CancellationToken,
}

impl ClockSource {
    /// Spawns the sampling task. The first sample is published right away.
    pub fn start(name: &'static str, period: Duration, clock: Arc<dyn Clock>) -> Self {
        let (sender, samples) = watch::channel(clock.time());
        let shutdown = CancellationToken::new();
        debug!("Starting {name} clock with period {period:?}");
        tokio::spawn(sample(sender, clock, period, shutdown.clone()));
        Self {
            name,
            samples,
            shutdown,
        }
    }

    /// Waits for a sample that wasn't seen yet. Samples published while nobody was waiting are
    /// collapsed into the latest one. Returns [None] once the source is stopped.
    pub async fn next(&mut self) -> Option<DateTime<Utc>> {
        self.samples.changed().await.ok()?;
        Some(*self.samples.borrow_and_update())
    }

    /// Most recent sample, seen or not.
    pub fn latest(&self) -> DateTime<Utc> {
        *self.samples.borrow()
    }

    pub fn stop(&self) {
        if !self.shutdown.is_cancelled() {
            debug!("Stopping {} clock", self.name);
            self.shutdown.cancel();
        }
    }
}

impl Drop for ClockSource {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sample(
    sender: watch::Sender<DateTime<Utc>>,
    clock: Arc<dyn Clock>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut sample_point = clock.instant();
    loop {
        if sender.send(clock.time()).is_err() {
            trace!("Clock receiver is gone");
            return;
        }
        sample_point += period;

        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = clock.sleep_until(sample_point) => ()
        }
    }
}
