use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::{
    activity::{
        aggregation::{Aggregator, AppKey, HostKey, KeyExtractor},
        format::format_duration,
        interval_log::IntervalLog,
    },
    transport::protocol::{ProtocolError, TransportEvent, TransportMessage},
    viewport::{layout::TimelineFrame, Gesture, Viewport},
};

/// One line of a rollup table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollupRow {
    pub key: Arc<str>,
    pub millis: i64,
    pub duration: String,
}

/// What the rollup tables show at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rollups {
    /// Absent until the first snapshot arrives.
    pub current: Option<Arc<str>>,
    /// The producer is unreachable and the data may be out of date.
    pub stale: bool,
    pub sites: Vec<RollupRow>,
    pub apps: Vec<RollupRow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Connection {
    Disconnected,
    /// Connected, waiting for the snapshot of this session.
    Handshake(u64),
    Synced(u64),
}

/// All state of a client: the interval log is the single source of truth, the aggregators and
/// the viewport only read it.
pub struct ActivityView {
    log: IntervalLog,
    hosts: Aggregator<HostKey>,
    apps: Aggregator<AppKey>,
    viewport: Viewport,
    connection: Connection,
    status_changed: bool,
}

impl ActivityView {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            log: IntervalLog::new(),
            hosts: Aggregator::new(HostKey),
            apps: Aggregator::new(AppKey),
            viewport,
            connection: Connection::Disconnected,
            status_changed: true,
        }
    }

    pub fn log(&self) -> &IntervalLog {
        &self.log
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Applies an event from the transport. An error means the session it came from must be
    /// dropped, the log is left as it was.
    pub fn handle_event(&mut self, event: TransportEvent) -> Result<(), ProtocolError> {
        match event {
            TransportEvent::Connected { session } => {
                info!("Session {session} connected, waiting for snapshot");
                self.set_connection(Connection::Handshake(session));
            }
            TransportEvent::Disconnected { session } => {
                if self.session() == Some(session) {
                    warn!("Session {session} lost, keeping last known state");
                    self.set_connection(Connection::Disconnected);
                }
            }
            TransportEvent::Message { session, message } => {
                if self.session() != Some(session) {
                    debug!("Ignoring message of old session {session}");
                    return Ok(());
                }
                self.apply_message(session, message)?;
            }
        }
        Ok(())
    }

    fn apply_message(&mut self, session: u64, message: TransportMessage) -> Result<(), ProtocolError> {
        let change = match message {
            TransportMessage::Snapshot(segments) => {
                self.set_connection(Connection::Synced(session));
                self.log.apply_snapshot(segments)
            }
            TransportMessage::Delta(_) if self.connection != Connection::Synced(session) => {
                return Err(ProtocolError::DeltaBeforeSnapshot(session));
            }
            TransportMessage::Delta(segment) => self.log.apply_delta(segment)?,
        };
        self.hosts.apply(&self.log, change);
        self.apps.apply(&self.log, change);
        Ok(())
    }

    /// Slow clock sample: refreshes live durations.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        self.hosts.tick(&self.log, now);
        self.apps.tick(&self.log, now);
    }

    pub fn apply_gesture(&mut self, gesture: Gesture) {
        self.viewport.apply(gesture);
    }

    /// Fast clock sample: the timeline with the open segment extended up to `now`.
    pub fn frame(&self, now: DateTime<Utc>) -> TimelineFrame {
        self.viewport.frame(&self.log, now)
    }

    /// Whether anything shown in the rollup tables changed since the last call.
    pub fn take_changed(&mut self) -> bool {
        let status = std::mem::take(&mut self.status_changed);
        let hosts = !self.hosts.take_changed().is_empty();
        let apps = !self.apps.take_changed().is_empty();
        status || hosts || apps
    }

    /// Name of what the user is on right now: the site, otherwise the app.
    pub fn current_activity(&self) -> Option<Arc<str>> {
        let last = self.log.last()?;
        if !last.is_open() {
            return Some("Idle".into());
        }
        Some(last.host().unwrap_or_else(|| last.app.clone()))
    }

    pub fn rollups(&self) -> Rollups {
        Rollups {
            current: self.current_activity(),
            stale: !matches!(self.connection, Connection::Synced(_)),
            sites: rows(&self.hosts),
            apps: rows(&self.apps),
        }
    }

    fn session(&self) -> Option<u64> {
        match self.connection {
            Connection::Disconnected => None,
            Connection::Handshake(session) | Connection::Synced(session) => Some(session),
        }
    }

    fn set_connection(&mut self, connection: Connection) {
        if self.connection != connection {
            self.connection = connection;
            self.status_changed = true;
        }
    }
}

fn rows<K: KeyExtractor>(aggregator: &Aggregator<K>) -> Vec<RollupRow> {
    aggregator
        .rollup()
        .into_iter()
        .map(|v| RollupRow {
            key: v.key.clone(),
            millis: v.live_ms,
            duration: format_duration(v.live_ms),
        })
        .collect()
}
