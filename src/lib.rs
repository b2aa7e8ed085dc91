//! Live view of user activity. A tracker streams activity segments over a WebSocket, this crate
//! keeps them in an interval log, rolls them up into time per website and per app, and lays them
//! out on a pannable, zoomable timeline of the day.
//!

pub mod activity;
pub mod cli;
pub mod sampling;
pub mod transport;
pub mod utils;
pub mod view;
pub mod viewport;
