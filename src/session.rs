//! Driver session state machine.
//!
//! Sequences the mandatory driver lifecycle calls as an explicit enumerated
//! state with guarded transitions, so every guard and its failure path can
//! be exercised on its own. Any driver-call failure moves the session to
//! [`SessionState::Failed`] and short-circuits the remaining steps; buffer
//! memory is released exactly once on every exit path through the
//! [`Buffers`] guard.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::driver::{
    AudioDriver, BufferDescriptor, BufferRequest, BufferSizeRange, ChannelCounts,
    ChannelDescriptor, Direction, DriverCallbacks, DriverInfo,
};
use crate::error::{HarnessError, HarnessResult};
use crate::negotiate;

/// The fixed candidate rates surveyed by the capability probe, in Hz.
pub const CANDIDATE_RATES: [f64; 4] = [44100.0, 48000.0, 96000.0, 192000.0];

/// Lifecycle position of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No driver call issued yet.
    Uninitialized,
    /// The driver initialized successfully.
    Initialized,
    /// The candidate-rate survey completed.
    RatesProbed,
    /// Per-channel metadata was collected.
    ChannelsEnumerated,
    /// The effective sample rate was applied and verified.
    FormatsResolved,
    /// Driver buffers are allocated and callbacks registered.
    BuffersCreated,
    /// Streaming is running.
    Started,
    /// Streaming was stopped normally.
    Stopped,
    /// A driver call failed; only teardown remains.
    Failed,
}

/// What the capability survey learned about the driver.
#[derive(Debug, Clone)]
pub struct CapabilitySurvey {
    /// Channel counts for both directions.
    pub channel_counts: ChannelCounts,
    /// The rate in effect before any rate was applied.
    pub initial_sample_rate: f64,
    /// The subset of [`CANDIDATE_RATES`] the driver accepted.
    pub supported_rates: Vec<f64>,
}

/// Owns driver buffers for the lifetime of a streaming attempt.
///
/// Dropping the guard releases the buffers through the driver, exactly
/// once, whether the run succeeded, failed, or panicked.
pub struct Buffers {
    driver: Arc<dyn AudioDriver>,
    descriptors: Vec<BufferDescriptor>,
}

impl Buffers {
    fn new(driver: Arc<dyn AudioDriver>, descriptors: Vec<BufferDescriptor>) -> Self {
        Self {
            driver,
            descriptors,
        }
    }

    /// The allocated per-channel buffers.
    pub fn descriptors(&self) -> &[BufferDescriptor] {
        &self.descriptors
    }
}

impl Drop for Buffers {
    fn drop(&mut self) {
        if self.descriptors.is_empty() {
            return;
        }
        debug!("dispose_buffers()");
        if let Err(err) = self.driver.dispose_buffers() {
            error!(%err, "failed to dispose driver buffers");
        }
    }
}

/// A single streaming attempt against one driver.
pub struct Session {
    driver: Arc<dyn AudioDriver>,
    state: SessionState,
    channel_counts: Option<ChannelCounts>,
    channels: Vec<ChannelDescriptor>,
    buffers: Option<Buffers>,
}

impl Session {
    /// Creates a session in the [`SessionState::Uninitialized`] state.
    pub fn new(driver: Arc<dyn AudioDriver>) -> Self {
        Self {
            driver,
            state: SessionState::Uninitialized,
            channel_counts: None,
            channels: Vec::new(),
            buffers: None,
        }
    }

    /// Current lifecycle position.
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// The driver under test.
    pub fn driver(&self) -> &Arc<dyn AudioDriver> {
        &self.driver
    }

    /// Channel metadata collected by [`enumerate_channels`](Self::enumerate_channels).
    pub fn channels(&self) -> &[ChannelDescriptor] {
        &self.channels
    }

    /// Buffers allocated by [`create_buffers`](Self::create_buffers), empty
    /// before allocation.
    pub fn buffer_descriptors(&self) -> &[BufferDescriptor] {
        self.buffers
            .as_ref()
            .map_or(&[], |buffers| buffers.descriptors())
    }

    fn expect_state(&self, expected: SessionState, operation: &'static str) -> HarnessResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(HarnessError::InvalidSessionState {
                operation,
                state: self.state,
            })
        }
    }

    /// Runs `body` as the transition from `from` to `to`: on success the
    /// session advances to `to`, on failure it moves to
    /// [`SessionState::Failed`].
    fn advance<T>(
        &mut self,
        from: SessionState,
        to: SessionState,
        operation: &'static str,
        body: impl FnOnce(&mut Self) -> HarnessResult<T>,
    ) -> HarnessResult<T> {
        self.expect_state(from, operation)?;
        match body(self) {
            Ok(value) => {
                self.state = to;
                Ok(value)
            }
            Err(err) => {
                self.state = SessionState::Failed;
                Err(err)
            }
        }
    }

    /// Initializes the driver.
    pub fn initialize(&mut self) -> HarnessResult<DriverInfo> {
        self.advance(
            SessionState::Uninitialized,
            SessionState::Initialized,
            "initialize",
            |session| {
                debug!("initialize()");
                let info = session.driver.initialize()?;
                info!(name = %info.name, version = info.version, "driver initialized");
                Ok(info)
            },
        )
    }

    /// Surveys the driver's capabilities: channel counts, the initial
    /// sample rate, and which of [`CANDIDATE_RATES`] it accepts.
    ///
    /// Every supported candidate is set and read back; a read-back mismatch
    /// fails the session. Unsupported candidates are skipped without
    /// failing — this is a survey, not the final configuration.
    pub fn probe_sample_rates(&mut self) -> HarnessResult<CapabilitySurvey> {
        self.advance(
            SessionState::Initialized,
            SessionState::RatesProbed,
            "probe_sample_rates",
            |session| {
                debug!("channel_counts()");
                let channel_counts = session.driver.channel_counts()?;
                info!(
                    inputs = channel_counts.inputs,
                    outputs = channel_counts.outputs,
                    "channel counts"
                );
                if channel_counts.is_empty() {
                    return Err(HarnessError::NoChannelsAtAll);
                }
                session.channel_counts = Some(channel_counts);

                debug!("sample_rate()");
                let initial_sample_rate = session.driver.sample_rate()?;
                info!(rate = initial_sample_rate, "initial sample rate");

                let mut supported_rates = Vec::new();
                for rate in CANDIDATE_RATES {
                    debug!(rate, "can_sample_rate()");
                    match session.driver.can_sample_rate(rate) {
                        Ok(()) => {
                            negotiate::apply_sample_rate(session.driver.as_ref(), rate)?;
                            supported_rates.push(rate);
                        }
                        Err(err) => debug!(rate, %err, "candidate rate not supported"),
                    }
                }

                Ok(CapabilitySurvey {
                    channel_counts,
                    initial_sample_rate,
                    supported_rates,
                })
            },
        )
    }

    /// Collects metadata for every channel in both directions.
    pub fn enumerate_channels(&mut self) -> HarnessResult<()> {
        self.advance(
            SessionState::RatesProbed,
            SessionState::ChannelsEnumerated,
            "enumerate_channels",
            |session| {
                let counts = session
                    .channel_counts
                    .ok_or(HarnessError::NoChannelsAtAll)?;
                session.channels = negotiate::enumerate_channels(session.driver.as_ref(), counts)?;
                Ok(())
            },
        )
    }

    /// Applies the resolved streaming rate (capability check, set, exact
    /// read-back).
    pub fn resolve_formats(&mut self, sample_rate: f64) -> HarnessResult<()> {
        self.advance(
            SessionState::ChannelsEnumerated,
            SessionState::FormatsResolved,
            "resolve_formats",
            |session| negotiate::apply_sample_rate(session.driver.as_ref(), sample_rate),
        )
    }

    /// Queries the driver's buffer length bounds.
    pub fn buffer_size_range(&self) -> HarnessResult<BufferSizeRange> {
        self.expect_state(SessionState::FormatsResolved, "buffer_size_range")?;
        debug!("buffer_size_range()");
        let range = self.driver.buffer_size_range()?;
        info!(
            min = range.min,
            max = range.max,
            preferred = range.preferred,
            granularity = range.granularity,
            "buffer size bounds"
        );
        Ok(range)
    }

    /// Tells the driver the host finishes output buffers promptly.
    ///
    /// Not every driver supports the notification; failure is logged and
    /// tolerated.
    pub fn mark_output_ready(&self) -> HarnessResult<()> {
        self.expect_state(SessionState::FormatsResolved, "mark_output_ready")?;
        debug!("output_ready()");
        match self.driver.output_ready() {
            Ok(()) => debug!("output ready acknowledged"),
            Err(err) => debug!(%err, "output ready not supported"),
        }
        Ok(())
    }

    /// Allocates double buffers for every channel in both directions, sized
    /// to `frames_per_buffer`, registering `callbacks` with the driver.
    pub fn create_buffers(
        &mut self,
        frames_per_buffer: usize,
        callbacks: DriverCallbacks,
    ) -> HarnessResult<()> {
        self.advance(
            SessionState::FormatsResolved,
            SessionState::BuffersCreated,
            "create_buffers",
            |session| {
                let counts = session
                    .channel_counts
                    .ok_or(HarnessError::NoChannelsAtAll)?;
                let mut requests = Vec::with_capacity(counts.total());
                for channel in 0..counts.inputs {
                    requests.push(BufferRequest {
                        direction: Direction::Input,
                        channel,
                    });
                }
                for channel in 0..counts.outputs {
                    requests.push(BufferRequest {
                        direction: Direction::Output,
                        channel,
                    });
                }

                debug!(
                    channels = requests.len(),
                    frames_per_buffer, "create_buffers()"
                );
                let descriptors =
                    session
                        .driver
                        .create_buffers(&requests, frames_per_buffer, callbacks)?;
                if descriptors.is_empty() {
                    return Err(HarnessError::NoBuffers);
                }
                session.buffers = Some(Buffers::new(Arc::clone(&session.driver), descriptors));
                Ok(())
            },
        )
    }

    /// Starts streaming.
    pub fn start(&mut self) -> HarnessResult<()> {
        self.advance(
            SessionState::BuffersCreated,
            SessionState::Started,
            "start",
            |session| {
                debug!("start()");
                session.driver.start().map_err(HarnessError::from)
            },
        )
    }

    /// Stops streaming.
    pub fn stop(&mut self) -> HarnessResult<()> {
        self.advance(
            SessionState::Started,
            SessionState::Stopped,
            "stop",
            |session| {
                debug!("stop()");
                session.driver.stop().map_err(HarnessError::from)
            },
        )
    }
}
