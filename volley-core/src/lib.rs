//! Core of the volley load-generation engine: the trigger pipeline that turns
//! declarative rate inputs into "fire now" signals, and the execution core
//! that dispatches those signals through a bounded worker pool with graceful
//! drain and unconditional teardown.

mod duration;
mod error;

pub mod runner;
pub mod trigger;

pub use duration::parse_duration;
pub use error::{Error, Result};
