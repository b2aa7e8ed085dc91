use thiserror::Error;
use tracing::{debug, trace};

use super::entities::ActivitySegment;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LogError {
    #[error("received a delta before any snapshot")]
    DeltaOnEmptyLog,
}

/// Describes what an update did to the log, so consumers can update themselves without looking
/// at every segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogChange {
    /// The whole log was replaced.
    Replaced,
    /// `closed` is the index of the segment whose end was just set, absent when the log was
    /// already idle. `opened` is the index of the newly appended open segment, absent when the
    /// delta signalled idleness.
    Extended {
        closed: Option<usize>,
        opened: Option<usize>,
    },
}

/// Ordered sequence of [ActivitySegment]s. Only the last element may be open, and only its end
/// ever changes after it was added.
#[derive(Debug, Default, Clone)]
pub struct IntervalLog {
    segments: Vec<ActivitySegment>,
}

impl IntervalLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[ActivitySegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn last(&self) -> Option<&ActivitySegment> {
        self.segments.last()
    }

    /// Returns the segment still in progress, if any.
    pub fn open_segment(&self) -> Option<&ActivitySegment> {
        self.segments.last().filter(|v| v.is_open())
    }

    /// Replaces the whole log. Idle entries are not representable as segments and are skipped;
    /// an open entry anywhere but the tail is closed at the start of its successor.
    pub fn apply_snapshot(&mut self, segments: Vec<ActivitySegment>) -> LogChange {
        let mut segments = segments
            .into_iter()
            .filter(|v| !v.is_idle())
            .collect::<Vec<_>>();
        segments.sort_by_key(|v| v.start);

        let len = segments.len();
        for i in 1..len {
            let next_start = segments[i].start;
            let previous = &mut segments[i - 1];
            if previous.end.is_none() {
                trace!("Closing open segment {:?} inside snapshot", previous.app);
                previous.end = Some(next_start);
            }
        }

        debug!("Applying snapshot of {len} segments");
        self.segments = segments;
        LogChange::Replaced
    }

    /// Closes the current last segment at `next.start` and, unless `next` signals idleness,
    /// appends it as the new open segment.
    pub fn apply_delta(&mut self, mut next: ActivitySegment) -> Result<LogChange, LogError> {
        let last_index = self.segments.len().checked_sub(1).ok_or(LogError::DeltaOnEmptyLog)?;

        let last = &mut self.segments[last_index];
        // An idle gap leaves the previous end untouched, the new segment just starts later.
        let closed = if last.is_open() {
            last.end = Some(next.start);
            Some(last_index)
        } else {
            None
        };

        if next.is_idle() {
            debug!("User went idle at {}", next.start);
            return Ok(LogChange::Extended {
                closed,
                opened: None,
            });
        }

        next.end = None;
        debug!("Opening segment {:?} at {}", next.app, next.start);
        self.segments.push(next);
        Ok(LogChange::Extended {
            closed,
            opened: Some(last_index + 1),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::{IntervalLog, LogChange, LogError};
    use crate::activity::entities::ActivitySegment;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 5, 9, 0, 0).unwrap()
    }

    fn chrome_snapshot() -> Vec<ActivitySegment> {
        vec![ActivitySegment::new("Chrome", t0())
            .with_end(t0() + Duration::minutes(1))
            .with_url("https://a.com")]
    }

    #[test]
    fn delta_on_empty_log_is_rejected() {
        let mut log = IntervalLog::new();
        assert_eq!(
            log.apply_delta(ActivitySegment::new("Slack", t0())),
            Err(LogError::DeltaOnEmptyLog)
        );

        log.apply_snapshot(vec![]);
        assert_eq!(
            log.apply_delta(ActivitySegment::new("Slack", t0())),
            Err(LogError::DeltaOnEmptyLog)
        );
        assert!(log.is_empty());
    }

    #[test]
    fn delta_closes_and_opens() {
        let mut log = IntervalLog::new();
        log.apply_snapshot(vec![ActivitySegment::new("Chrome", t0())]);

        let change = log
            .apply_delta(ActivitySegment::new("Slack", t0() + Duration::minutes(1)))
            .unwrap();

        assert_eq!(
            change,
            LogChange::Extended {
                closed: Some(0),
                opened: Some(1)
            }
        );
        assert_eq!(log.segments()[0].end, Some(t0() + Duration::minutes(1)));
        assert_eq!(log.open_segment().map(|v| &*v.app), Some("Slack"));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn idle_delta_appends_nothing() {
        let mut log = IntervalLog::new();
        log.apply_snapshot(vec![ActivitySegment::new("Chrome", t0())]);
        let t1 = t0() + Duration::seconds(42);

        let change = log.apply_delta(ActivitySegment::new("", t1)).unwrap();

        assert_eq!(
            change,
            LogChange::Extended {
                closed: Some(0),
                opened: None
            }
        );
        assert_eq!(log.len(), 1);
        assert_eq!(log.last().unwrap().end, Some(t1));
        assert!(log.open_segment().is_none());

        // The gap is just missing from the log.
        let t2 = t1 + Duration::minutes(5);
        let change = log.apply_delta(ActivitySegment::new("Slack", t2)).unwrap();
        assert_eq!(
            change,
            LogChange::Extended {
                closed: None,
                opened: Some(1)
            }
        );
        assert_eq!(log.segments()[0].end, Some(t1));
        assert_eq!(log.segments()[1].start, t2);
    }

    #[test]
    fn delta_end_is_ignored() {
        let mut log = IntervalLog::new();
        log.apply_snapshot(chrome_snapshot());
        let start = t0() + Duration::minutes(3);
        log.apply_delta(ActivitySegment::new("Slack", start).with_end(start + Duration::hours(1)))
            .unwrap();

        assert!(log.last().unwrap().is_open());
    }

    #[test]
    fn snapshot_replaces_everything() {
        let mut log = IntervalLog::new();
        log.apply_snapshot(chrome_snapshot());
        log.apply_delta(ActivitySegment::new("Slack", t0() + Duration::minutes(1)))
            .unwrap();

        let change = log.apply_snapshot(chrome_snapshot());

        assert_eq!(change, LogChange::Replaced);
        assert_eq!(log.segments(), chrome_snapshot().as_slice());
    }

    #[test]
    fn snapshot_is_normalized() {
        let mut log = IntervalLog::new();
        log.apply_snapshot(vec![
            ActivitySegment::new("Slack", t0() + Duration::minutes(2)),
            ActivitySegment::new("", t0() + Duration::minutes(1)),
            ActivitySegment::new("Chrome", t0()),
        ]);

        let segments = log.segments();
        assert_eq!(segments.len(), 2);
        assert_eq!(&*segments[0].app, "Chrome");
        assert_eq!(segments[0].end, Some(t0() + Duration::minutes(2)));
        assert!(segments[1].is_open());
    }
}
