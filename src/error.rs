//! Error types and result aliases for the harness.

use std::path::PathBuf;

use thiserror::Error;

use crate::driver::{Direction, DriverError};
use crate::format::{DriverSampleType, SampleEncoding};
use crate::session::SessionState;

/// Convenience type alias for results that may contain a [`HarnessError`].
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Errors that end a run.
///
/// Every variant is terminal for the run it occurs in: the harness performs
/// no retries on individual driver calls, and negotiation failures carry no
/// fallback path.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The driver reports zero channels in both directions.
    #[error("driver reports no channels in either direction")]
    NoChannelsAtAll,

    /// Channels of one direction disagree on their sample type.
    ///
    /// Heterogeneous per-channel formats are ruled out by policy; the
    /// message names both conflicting types.
    #[error("{direction} channels do not share a sample type (found {first} and {second})")]
    SampleTypeMismatch {
        /// Direction whose channels disagree.
        direction: Direction,
        /// First sample type encountered.
        first: DriverSampleType,
        /// The conflicting sample type.
        second: DriverSampleType,
    },

    /// A direction required by the configuration has no channels at all.
    #[error("no {direction} channels")]
    NoChannels {
        /// The empty direction.
        direction: Direction,
    },

    /// The driver accepted a sample rate but a read-back disagreed.
    #[error("sample rate {requested} Hz did not take effect (driver reports {actual} Hz)")]
    SampleRateNotApplied {
        /// Rate that was requested and set.
        requested: f64,
        /// Rate the driver reported afterwards.
        actual: f64,
    },

    /// The driver returned an empty buffer set from buffer creation.
    #[error("driver allocated no buffers")]
    NoBuffers,

    /// A session operation was invoked out of lifecycle order.
    #[error("operation '{operation}' not valid in session state {state:?}")]
    InvalidSessionState {
        /// Name of the rejected operation.
        operation: &'static str,
        /// State the session was in.
        state: SessionState,
    },

    /// A driver lifecycle call returned a non-success code.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// A file collaborator failed during streaming.
    #[error(transparent)]
    File(#[from] FileError),

    /// Failure while setting up or validating the input file.
    #[error("cannot input from file: {0}")]
    InputFile(#[source] Box<HarnessError>),

    /// Failure while setting up the output file.
    #[error("cannot output to file: {0}")]
    OutputFile(#[source] Box<HarnessError>),

    /// The streaming phase recorded a failure outcome before the
    /// buffer-switch threshold was reached.
    #[error("streaming ended in failure before reaching the buffer switch threshold")]
    RunFailed,
}

impl HarnessError {
    /// Wraps an error with input-file context.
    pub fn input_context(err: impl Into<HarnessError>) -> Self {
        Self::InputFile(Box::new(err.into()))
    }

    /// Wraps an error with output-file context.
    pub fn output_context(err: impl Into<HarnessError>) -> Self {
        Self::OutputFile(Box::new(err.into()))
    }
}

/// Errors raised by the input/output file collaborators.
#[derive(Debug, Error)]
pub enum FileError {
    /// The container could not be opened or created.
    #[error("unable to open '{}': {source}", path.display())]
    Open {
        /// Path of the file.
        path: PathBuf,
        /// Error reported by the container codec.
        #[source]
        source: hound::Error,
    },

    /// Reading samples from the container failed.
    #[error("unable to read input file: {0}")]
    Read(#[source] hound::Error),

    /// Writing samples to the container failed.
    #[error("unable to write to output file: {0}")]
    Write(#[source] hound::Error),

    /// Patching the container metadata on close failed.
    #[error("unable to finalize output file: {0}")]
    Finalize(#[source] hound::Error),

    /// The input file's rate disagrees with the negotiated rate.
    #[error("input file sample rate mismatch: expected {expected} Hz, got {actual} Hz")]
    SampleRateMismatch {
        /// Negotiated rate.
        expected: u32,
        /// Rate the container reports.
        actual: u32,
    },

    /// The input file's channel count disagrees with the driver's.
    #[error("input file channel count mismatch: expected {expected}, got {actual}")]
    ChannelCountMismatch {
        /// Channel count the driver direction requires.
        expected: usize,
        /// Channel count the container reports.
        actual: usize,
    },

    /// The container reports a sample format with no driver equivalent.
    #[error("unrecognized file sample format: {bits}-bit {encoding}")]
    UnrecognizedFormat {
        /// Bits per sample the container reports.
        bits: u16,
        /// Numeric encoding the container reports.
        encoding: SampleEncoding,
    },

    /// The input file's sample type disagrees with the negotiated type.
    #[error("input file sample type mismatch: expected {expected}, got {actual}")]
    SampleTypeMismatch {
        /// Negotiated driver sample type.
        expected: DriverSampleType,
        /// Sample type the container maps to.
        actual: DriverSampleType,
    },

    /// The driver sample type cannot be represented in the container.
    #[error("sample type {0} is not supported as a file format")]
    UnsupportedSampleType(DriverSampleType),
}
