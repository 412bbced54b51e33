//! Statistics for sockets and scribes

pub mod metrics;

pub use metrics::{ScribeReport, SocketCounters, SocketStats};
