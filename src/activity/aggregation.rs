use std::{cmp::Reverse, collections::HashMap, fmt::Debug, sync::Arc};

use chrono::{DateTime, Utc};
use tracing::{instrument, trace};

use super::{
    entities::ActivitySegment,
    interval_log::{IntervalLog, LogChange},
};

/// Decides which bucket a segment is counted in. Returning [None] means the segment is not
/// counted by this aggregator at all.
pub trait KeyExtractor: Debug {
    fn key(&self, segment: &ActivitySegment) -> Option<Arc<str>>;
}

/// Groups segments by the host of their url.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostKey;

impl KeyExtractor for HostKey {
    fn key(&self, segment: &ActivitySegment) -> Option<Arc<str>> {
        segment.host()
    }
}

/// Groups segments by application name.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppKey;

impl KeyExtractor for AppKey {
    fn key(&self, segment: &ActivitySegment) -> Option<Arc<str>> {
        Some(segment.app.clone()).filter(|v| !v.is_empty())
    }
}

/// Time spent on a single key. All values are in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedAccumulator {
    pub key: Arc<str>,
    pub closed_ms: i64,
    pub live_ms: i64,
}

impl KeyedAccumulator {
    fn new(key: Arc<str>) -> Self {
        Self {
            key,
            closed_ms: 0,
            live_ms: 0,
        }
    }
}

/// Keeps per key durations up to date as the [IntervalLog] grows. Deltas and clock samples touch
/// at most two accumulators; only snapshots trigger a full rescan.
#[derive(Debug)]
pub struct Aggregator<K: KeyExtractor> {
    extractor: K,
    /// Insertion ordered. Keys are never removed during a session.
    accumulators: Vec<KeyedAccumulator>,
    index: HashMap<Arc<str>, usize>,
    /// Accumulator whose live value currently includes the open segment.
    live: Option<usize>,
    last_sample: Option<DateTime<Utc>>,
    dirty: Vec<usize>,
}

impl<K: KeyExtractor> Aggregator<K> {
    pub fn new(extractor: K) -> Self {
        Self {
            extractor,
            accumulators: vec![],
            index: HashMap::new(),
            live: None,
            last_sample: None,
            dirty: vec![],
        }
    }

    pub fn get(&self, key: &str) -> Option<&KeyedAccumulator> {
        self.index.get(key).map(|&i| &self.accumulators[i])
    }

    pub fn len(&self) -> usize {
        self.accumulators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accumulators.is_empty()
    }

    /// Reacts to a structural change of `log`.
    #[instrument(skip(self, log), fields(extractor = ?self.extractor))]
    pub fn apply(&mut self, log: &IntervalLog, change: LogChange) {
        match change {
            LogChange::Replaced => self.rescan(log),
            LogChange::Extended { closed, opened } => {
                let segments = log.segments();
                if let Some(segment) = closed.and_then(|i| segments.get(i)) {
                    self.add_closed(segment);
                }
                if let Some(segment) = opened.and_then(|i| segments.get(i)) {
                    if let Some(key) = self.extractor.key(segment) {
                        self.entry(key);
                    }
                }
            }
        }
        self.refresh_live(log);
    }

    /// Reacts to a new clock sample. Only the accumulator of the open segment is recomputed.
    pub fn tick(&mut self, log: &IntervalLog, now: DateTime<Utc>) {
        self.last_sample = Some(now);
        self.refresh_live(log);
    }

    /// Entries sorted by live duration, longest first. Equal durations keep first seen order.
    pub fn rollup(&self) -> Vec<&KeyedAccumulator> {
        let mut entries = self.accumulators.iter().collect::<Vec<_>>();
        entries.sort_by_key(|v| Reverse(v.live_ms));
        entries
    }

    /// Keys whose displayed value changed since the previous call.
    pub fn take_changed(&mut self) -> Vec<Arc<str>> {
        let mut dirty = std::mem::take(&mut self.dirty);
        dirty.sort_unstable();
        dirty.dedup();
        dirty
            .into_iter()
            .map(|i| self.accumulators[i].key.clone())
            .collect()
    }

    fn rescan(&mut self, log: &IntervalLog) {
        trace!("Rescanning {} segments", log.len());
        for acc in self.accumulators.iter_mut() {
            acc.closed_ms = 0;
        }
        self.live = None;
        for segment in log.segments() {
            match self.extractor.key(segment) {
                Some(key) => {
                    let i = self.entry(key);
                    if let Some(ms) = segment.closed_millis() {
                        self.accumulators[i].closed_ms += ms;
                    }
                }
                None => continue,
            }
        }
        for (i, acc) in self.accumulators.iter_mut().enumerate() {
            if acc.live_ms != acc.closed_ms {
                acc.live_ms = acc.closed_ms;
                self.dirty.push(i);
            }
        }
    }

    fn add_closed(&mut self, segment: &ActivitySegment) {
        let (Some(key), Some(ms)) = (self.extractor.key(segment), segment.closed_millis()) else {
            return;
        };
        let i = self.entry(key);
        let acc = &mut self.accumulators[i];
        acc.closed_ms += ms;
        // The live accumulator is recomputed by refresh_live.
        if self.live != Some(i) {
            acc.live_ms = acc.closed_ms;
        }
        self.dirty.push(i);
    }

    fn entry(&mut self, key: Arc<str>) -> usize {
        if let Some(&i) = self.index.get(&key) {
            return i;
        }
        trace!("New key {key}");
        let i = self.accumulators.len();
        self.accumulators.push(KeyedAccumulator::new(key.clone()));
        self.index.insert(key, i);
        self.dirty.push(i);
        i
    }

    fn refresh_live(&mut self, log: &IntervalLog) {
        let open = log.open_segment().and_then(|segment| {
            let i = *self.index.get(&self.extractor.key(segment)?)?;
            Some((i, segment.start))
        });

        if let Some(previous) = self.live.take() {
            if open.map(|v| v.0) != Some(previous) {
                self.set_live(previous, 0);
            }
        }

        if let Some((i, start)) = open {
            let extra = self
                .last_sample
                .map(|now| (now - start).num_milliseconds().max(0))
                .unwrap_or(0);
            self.set_live(i, extra);
            self.live = Some(i);
        }
    }

    fn set_live(&mut self, i: usize, extra_ms: i64) {
        let acc = &mut self.accumulators[i];
        let live = acc.closed_ms + extra_ms;
        if acc.live_ms != live {
            acc.live_ms = live;
            self.dirty.push(i);
        }
    }
}
