//! Scheduler layer
//!
//! Admits queued jobs to run in submission order, never more than the
//! configured number at a time.

pub mod pool;

pub use pool::{Admission, Scheduler};
