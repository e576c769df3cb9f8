//! Queue runners.
//!
//! A [`runner::Runner`] drains one switchboard queue by repeatedly
//! claiming items and handing them to an injected [`runner::Behavior`].
//! The behaviors live here too: the news gateway, the digest batcher,
//! and the bounce detector.

pub mod bounce;
pub mod digest;
pub mod error;
pub mod nntp;
pub mod runner;

pub use error::{BehaviorError, Result};
pub use runner::{Behavior, Disposition, Runner, RunnerSettings};
