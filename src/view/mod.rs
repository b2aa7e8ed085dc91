//! The client event loop. [ViewModule] owns an [state::ActivityView] and processes one stimulus
//! at a time: transport events, fast and slow clock samples, and viewport gestures.

pub mod state;

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use chrono::{DateTime, Utc};
use state::{ActivityView, Rollups};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    sampling::{ClockSource, SLOW_PERIOD},
    transport::{protocol::TransportEvent, TransportHandle},
    utils::clock::Clock,
    viewport::{layout::TimelineFrame, Gesture},
};

/// Draws what the view computed. Implementations decide how pixels or characters get produced.
#[cfg_attr(test, mockall::automock)]
pub trait Presenter {
    /// Whether timeline frames are drawn at all. Frames are only computed if they are.
    fn shows_timeline(&self) -> bool;

    fn present_rollups(&mut self, rollups: &Rollups);

    fn present_timeline(&mut self, frame: &TimelineFrame);
}

pub struct ViewModule<P: Presenter> {
    view: ActivityView,
    transport: TransportHandle,
    gestures: mpsc::Receiver<Gesture>,
    presenter: P,
    clock: Arc<dyn Clock>,
    render_period: Duration,
    shutdown: CancellationToken,
}

impl<P: Presenter> ViewModule<P> {
    pub fn new(
        view: ActivityView,
        transport: TransportHandle,
        gestures: mpsc::Receiver<Gesture>,
        presenter: P,
        clock: Arc<dyn Clock>,
        render_period: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            view,
            transport,
            gestures,
            presenter,
            clock,
            render_period,
            shutdown,
        }
    }

    /// Executes the view event loop. The clock sources live exactly as long as this call.
    pub async fn run(mut self) -> Result<P> {
        let mut fast = self
            .presenter
            .shows_timeline()
            .then(|| ClockSource::start("fast", self.render_period, self.clock.clone()));
        let mut slow = ClockSource::start("slow", SLOW_PERIOD, self.clock.clone());

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                event = self.transport.events.recv() => match event {
                    Some(event) => self.on_transport(event),
                    None => {
                        info!("Transport stopped");
                        break;
                    }
                },
                Some(gesture) = self.gestures.recv() => {
                    debug!("Applying gesture {gesture:?}");
                    self.view.apply_gesture(gesture);
                    if let Some(fast) = &fast {
                        self.presenter.present_timeline(&self.view.frame(fast.latest()));
                    }
                },
                Some(now) = next_sample(&mut fast) => {
                    self.presenter.present_timeline(&self.view.frame(now));
                },
                Some(now) = slow.next() => {
                    self.view.tick(now);
                    self.present_rollups();
                },
            }
        }

        if let Some(fast) = &fast {
            fast.stop();
        }
        slow.stop();
        Ok(self.presenter)
    }

    fn on_transport(&mut self, event: TransportEvent) {
        let session = match &event {
            TransportEvent::Connected { session }
            | TransportEvent::Message { session, .. }
            | TransportEvent::Disconnected { session } => *session,
        };
        if let Err(e) = self.view.handle_event(event) {
            warn!("Dropping session {session}: {e}");
            self.transport.reset(session);
        }
        self.present_rollups();
    }

    fn present_rollups(&mut self) {
        if self.view.take_changed() {
            self.presenter.present_rollups(&self.view.rollups());
        }
    }
}

/// Next sample of an optional source. Pending forever without one.
async fn next_sample(source: &mut Option<ClockSource>) -> Option<DateTime<Utc>> {
    match source {
        Some(source) => source.next().await,
        None => std::future::pending().await,
    }
}
