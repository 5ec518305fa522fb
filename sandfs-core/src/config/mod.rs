//! Service configuration: hard limits, defaults, and environment overrides.

pub mod constants;
mod limits;

pub use limits::{Limits, limits};
