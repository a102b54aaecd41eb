// Correctness and logic
#![warn(clippy::unit_cmp)]
#![warn(clippy::match_same_arms)]
// Performance-focused
#![warn(clippy::inefficient_to_string)]
#![warn(clippy::map_clone)]
#![warn(clippy::unnecessary_to_owned)]
#![warn(clippy::needless_collect)]
// Style and idiomatic Rust
#![warn(clippy::redundant_clone)]
#![warn(clippy::needless_return)]
#![warn(clippy::manual_map)]
#![warn(clippy::unwrap_used)]
// Maintainability
#![warn(clippy::missing_panics_doc)]
#![warn(missing_docs)]

//! # streamcheck
//!
//! A conformance and stress harness for callback-driven real-time audio
//! streaming drivers. It drives a driver through its full lifecycle —
//! capability negotiation, buffer allocation, callback-driven streaming,
//! and shutdown — to validate correct behavior under sustained operation,
//! and can pipe recorded or played audio through WAV files for end-to-end
//! correctness checks.
//!
//! ## Overview
//!
//! A run walks the driver through the mandatory call sequence: initialize,
//! query channel counts, survey the candidate sample rates, enumerate
//! channel formats, resolve and apply the streaming rate, allocate
//! per-channel double buffers, stream until a fixed number of buffer
//! switches has been observed, then stop. Any driver call failing along the
//! way ends the run as a failure.
//!
//! The pieces compose bottom-up:
//!
//! - [`format`]: maps the driver's native sample types (int 16/24/32,
//!   float 32/64, both endiannesses) to the file container's PCM formats.
//! - [`transcode`]: converts between the driver's per-channel double
//!   buffers and the interleaved byte streams the files use.
//! - [`negotiate`]: channel enumeration, the uniform-sample-type policy,
//!   and sample-rate resolution.
//! - [`session`]: the driver lifecycle as an explicit state machine with
//!   RAII buffer release.
//! - [`bridge`]: the single point of contact with the driver's callback
//!   thread, bound through a strictly single-occupancy global slot.
//! - [`run`]: orchestration, the bounded-run success criterion, and the
//!   first-writer-wins outcome.
//! - [`files`]: WAV collaborators presenting raw interleaved bytes.
//! - [`synthetic`]: a bundled reference driver for the binary and tests.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use streamcheck::run::{Config, Runner};
//! use streamcheck::synthetic::{SyntheticConfig, SyntheticDriver};
//!
//! let driver = Arc::new(SyntheticDriver::new(SyntheticConfig::default()));
//! let passed = Runner::new(Config::default(), driver).run();
//! assert!(passed);
//! ```
//!
//! ## Concurrency model
//!
//! Two threads of control: the caller, and the driver's callback thread
//! whose scheduling belongs to the driver. The only synchronized shared
//! state is the run outcome (mutex plus condition variable,
//! first-writer-wins) and the buffer memory (per-channel mutexes). The
//! caller blocks without a timeout until the outcome resolves; a driver
//! that never calls back hangs the run — a documented limitation.
//!
//! Only one session may stream at a time: the driver ABI has no per-call
//! user context, so callbacks reach the harness through a single global
//! binding slot with strict occupancy enforcement.

pub mod bridge;
pub mod cli;
pub mod driver;
mod error;
pub mod files;
pub mod format;
pub mod negotiate;
pub mod run;
pub mod session;
pub mod synthetic;
pub mod transcode;

pub use crate::driver::{
    AudioDriver, BufferDescriptor, BufferHalf, BufferRequest, BufferSizeRange, ChannelCounts,
    ChannelDescriptor, Direction, DriverCallbacks, DriverError, DriverInfo, DriverResult, Latency,
    MessageSelector, SamplePosition, TimeInfo,
};
pub use crate::error::{FileError, HarnessError, HarnessResult};
pub use crate::format::{DriverSampleType, Endianness, FileFormat, SampleEncoding, SampleFormat};
pub use crate::run::{BUFFER_SWITCH_THRESHOLD, Config, Outcome, RunOutcome, Runner};
pub use crate::session::{CANDIDATE_RATES, CapabilitySurvey, Session, SessionState};
