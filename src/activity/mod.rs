//! The activity pipeline: an [interval_log::IntervalLog] fed by the transport and the
//! [aggregation::Aggregator]s reading it.

pub mod aggregation;
pub mod entities;
pub mod format;
pub mod interval_log;
