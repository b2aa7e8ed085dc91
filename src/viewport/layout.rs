use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::activity::{entities::ActivitySegment, interval_log::IntervalLog};

use super::{color::Hsl, Viewport};

/// Extra time an open segment is assumed to still cover when deciding whether it is visible.
const OPEN_SEGMENT_LOOKAHEAD_MS: i64 = 60 * 60 * 1000;

/// A positioned segment, ready to be drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub x: f64,
    pub width: f64,
    pub app: Arc<str>,
    pub title: Arc<str>,
    pub fill: Hsl,
    pub border: Hsl,
    /// The bar of the open segment, growing with every frame.
    pub live: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub x: f64,
    pub label: String,
}

/// Everything needed to draw the timeline at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineFrame {
    pub width: f64,
    pub bars: Vec<Bar>,
    pub ticks: Vec<Tick>,
}

impl Viewport {
    /// Lays out `log` as it looks at `now`, the latest fast clock sample.
    pub fn frame(&self, log: &IntervalLog, now: DateTime<Utc>) -> TimelineFrame {
        TimelineFrame {
            width: self.width(),
            bars: log
                .segments()
                .iter()
                .filter(|v| !self.is_culled(v, now))
                .map(|v| self.bar(v, now))
                .collect(),
            ticks: self.ticks(),
        }
    }

    /// Approximate left edge test: a segment is skipped once its right end has scrolled past the
    /// left edge. Segments beyond the right edge are still laid out.
    pub fn is_culled(&self, segment: &ActivitySegment, now: DateTime<Utc>) -> bool {
        let right = segment
            .end
            .unwrap_or(now + Duration::milliseconds(OPEN_SEGMENT_LOOKAHEAD_MS));
        self.x(right) < 0.
    }

    pub fn bar(&self, segment: &ActivitySegment, now: DateTime<Utc>) -> Bar {
        Bar {
            x: self.x(segment.start),
            width: self.length(segment.start, segment.end.unwrap_or(now)),
            app: segment.app.clone(),
            title: segment.title.clone(),
            fill: Hsl::fill(&segment.title),
            border: Hsl::border(&segment.app),
            live: segment.is_open(),
        }
    }

    /// Hour marks of the day, never thinned out.
    pub fn ticks(&self) -> Vec<Tick> {
        self.marks()
            .iter()
            .map(|mark| Tick {
                x: self.x(mark.to_utc()),
                label: mark.format("%X").to_string(),
            })
            .collect()
    }
}
