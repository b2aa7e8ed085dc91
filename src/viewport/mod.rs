//! Maps wall-clock time to horizontal pixels and handles pan/zoom gestures.
//! [layout] turns the interval log into bars and hour ticks using the same transform.

pub mod color;
pub mod layout;

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use tracing::trace;

use crate::utils::time::{day_anchor, hour_marks};

pub const MS_PER_HOUR: f64 = 3_600_000.;
pub const MIN_ZOOM: f64 = 1.;
pub const MAX_ZOOM: f64 = 600.;
const ZOOM_SENSITIVITY: f64 = 0.1;

/// User input that moves the viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gesture {
    /// Plain scroll or drag.
    Pan { delta_x: f64 },
    /// Modified scroll with the cursor at `cursor_x` pixels from the left edge.
    Zoom { delta_y: f64, cursor_x: f64 },
}

/// Pan/zoom state. `zoom` is in pixels per hour, `translate` in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportState {
    zoom: f64,
    translate: f64,
}

impl ViewportState {
    pub fn new(zoom: f64, translate: f64) -> Self {
        Self {
            zoom: zoom.clamp(MIN_ZOOM, MAX_ZOOM),
            translate,
        }
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn translate(&self) -> f64 {
        self.translate
    }

    pub fn pixels_per_ms(&self) -> f64 {
        self.zoom / MS_PER_HOUR
    }

    pub fn apply(&mut self, gesture: Gesture) {
        match gesture {
            Gesture::Pan { delta_x } => self.translate -= delta_x,
            Gesture::Zoom { delta_y, cursor_x } => {
                let old = self.zoom;
                let new = (old * 2f64.powf(-delta_y * ZOOM_SENSITIVITY)).clamp(MIN_ZOOM, MAX_ZOOM);
                // Keeps the instant under the cursor in place.
                self.translate = (new / old) * (self.translate - cursor_x) + cursor_x;
                self.zoom = new;
            }
        }
    }
}

/// Rounds to a tenth of a pixel so continuously redrawn positions don't jitter.
pub fn round10(value: f64) -> f64 {
    (value * 10.).round() / 10.
}

/// The visible window over the time axis of a single day.
#[derive(Debug, Clone)]
pub struct Viewport {
    state: ViewportState,
    /// Origin of the time axis: the reference hour of the current local day.
    anchor: DateTime<Utc>,
    marks: Vec<DateTime<FixedOffset>>,
    width: f64,
}

impl Viewport {
    pub fn new<Tz: TimeZone>(now: DateTime<Tz>, width: f64, state: ViewportState) -> Self {
        Self {
            anchor: day_anchor(now.clone()).to_utc(),
            marks: hour_marks(now)
                .into_iter()
                .map(|v| v.fixed_offset())
                .collect(),
            width,
            state,
        }
    }

    /// Creates a viewport with `now` in the middle of its width.
    pub fn centered<Tz: TimeZone>(now: DateTime<Tz>, width: f64, zoom: f64) -> Self {
        let mut viewport = Self::new(now.clone(), width, ViewportState::new(zoom, 0.));
        let offset = viewport.x(now.to_utc());
        viewport.state.translate = width / 2. - offset;
        viewport
    }

    pub fn state(&self) -> ViewportState {
        self.state
    }

    pub fn anchor(&self) -> DateTime<Utc> {
        self.anchor
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn marks(&self) -> &[DateTime<FixedOffset>] {
        &self.marks
    }

    /// Horizontal pixel position of `instant`.
    pub fn x(&self, instant: DateTime<Utc>) -> f64 {
        round10(self.offset(instant) + self.state.translate)
    }

    /// Pixel length of a time span.
    pub fn length(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
        round10((to - from).num_milliseconds() as f64 * self.state.pixels_per_ms())
    }

    pub fn apply(&mut self, gesture: Gesture) {
        self.state.apply(gesture);
        trace!("Viewport moved to {:?}", self.state);
    }

    fn offset(&self, instant: DateTime<Utc>) -> f64 {
        (instant - self.anchor).num_milliseconds() as f64 * self.state.pixels_per_ms()
    }
}
