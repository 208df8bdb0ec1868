//! Read/write lock contention harness.
//!
//! [`SharedResource`] holds its lock for a random stretch on every access;
//! [`ContentionDriver`] throws populations of readers and writers at it,
//! either once each (bounded) or in a loop until the resource is closed.

mod driver;
mod resource;

pub use driver::{ContentionDriver, RunReport, UnboundedRun};
pub use resource::{ResourceStats, SharedResource};
