//! The driver ABI surface the harness consumes.
//!
//! [`AudioDriver`] is the seam between the harness and the device under
//! test: fourteen lifecycle operations, each returning a [`DriverError`]
//! carrying the driver's numeric error code on failure. Buffer memory is
//! owned by the driver and shared with the harness through
//! [`BufferDescriptor`] handles; the callback set ([`DriverCallbacks`]) is a
//! group of plain function pointers, because the ABI offers no per-call user
//! context.

use std::fmt;
use std::sync::Arc;

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use thiserror::Error;

use crate::format::DriverSampleType;

/// Convenience type alias for results that may contain a [`DriverError`].
pub type DriverResult<T> = Result<T, DriverError>;

/// Error codes a driver may surface, mirroring the native ABI numbering.
pub mod error_code {
    /// Hardware input or output is not present or available.
    pub const NOT_PRESENT: i32 = -1000;
    /// Hardware is malfunctioning.
    pub const HW_MALFUNCTION: i32 = -999;
    /// An input parameter was invalid.
    pub const INVALID_PARAMETER: i32 = -998;
    /// The call is not legal in the driver's current mode.
    pub const INVALID_MODE: i32 = -997;
    /// The sample position is not advancing.
    pub const SP_NOT_ADVANCING: i32 = -996;
    /// No clock source is available.
    pub const NO_CLOCK: i32 = -995;
    /// The driver could not allocate memory.
    pub const NO_MEMORY: i32 = -994;
}

/// A non-success code returned by a driver lifecycle call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (driver error code {code})")]
pub struct DriverError {
    /// The driver's numeric error code.
    pub code: i32,
    /// Human-readable description of the failed call.
    pub message: String,
}

impl DriverError {
    /// Creates an error with an explicit code.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The call is not legal in the driver's current mode.
    pub fn invalid_mode(message: impl Into<String>) -> Self {
        Self::new(error_code::INVALID_MODE, message)
    }

    /// An input parameter was rejected.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(error_code::INVALID_PARAMETER, message)
    }

    /// The requested resource is not present.
    pub fn not_present(message: impl Into<String>) -> Self {
        Self::new(error_code::NOT_PRESENT, message)
    }

    /// The driver could not allocate memory.
    pub fn no_memory(message: impl Into<String>) -> Self {
        Self::new(error_code::NO_MEMORY, message)
    }
}

/// Direction of a channel, from the driver's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Recorded by the driver, read by the harness.
    Input,
    /// Produced by the harness, played by the driver.
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => f.write_str("input"),
            Self::Output => f.write_str("output"),
        }
    }
}

/// Selector for one half of a double buffer, supplied at callback time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferHalf {
    /// Half 0.
    First,
    /// Half 1.
    Second,
}

impl BufferHalf {
    /// The 0/1 index of this half.
    pub const fn index(self) -> usize {
        match self {
            Self::First => 0,
            Self::Second => 1,
        }
    }

    /// The other half.
    pub const fn other(self) -> Self {
        match self {
            Self::First => Self::Second,
            Self::Second => Self::First,
        }
    }
}

/// Identity reported by the driver on initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverInfo {
    /// Display name of the driver.
    pub name: String,
    /// Driver version number.
    pub version: u32,
}

/// Channel counts for both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelCounts {
    /// Number of input channels.
    pub inputs: usize,
    /// Number of output channels.
    pub outputs: usize,
}

impl ChannelCounts {
    /// Channel count for one direction.
    pub const fn for_direction(self, direction: Direction) -> usize {
        match direction {
            Direction::Input => self.inputs,
            Direction::Output => self.outputs,
        }
    }

    /// True when both directions are empty.
    pub const fn is_empty(self) -> bool {
        self.inputs == 0 && self.outputs == 0
    }

    /// Total channels across both directions.
    pub const fn total(self) -> usize {
        self.inputs + self.outputs
    }
}

/// Per-channel metadata produced once during negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDescriptor {
    /// Channel index within its direction.
    pub index: usize,
    /// Input or output.
    pub direction: Direction,
    /// Whether the channel currently participates in streaming.
    pub active: bool,
    /// Group the channel belongs to.
    pub group: u32,
    /// Native sample representation of the channel.
    pub sample_type: DriverSampleType,
    /// Display name reported by the driver.
    pub name: String,
}

/// Buffer length bounds reported by the driver, in frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSizeRange {
    /// Smallest supported buffer length.
    pub min: usize,
    /// Largest supported buffer length.
    pub max: usize,
    /// The driver's preferred buffer length.
    pub preferred: usize,
    /// Allowed step between lengths; `-1` means powers of two.
    pub granularity: i64,
}

/// Input and output latencies reported by the driver, in frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Latency {
    /// Frames of input latency.
    pub input: usize,
    /// Frames of output latency.
    pub output: usize,
}

/// Stream position reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplePosition {
    /// Frames elapsed since the stream started.
    pub samples: u64,
    /// System timestamp of the position snapshot, in nanoseconds.
    pub timestamp_ns: u64,
}

/// Timing metadata delivered with the richer buffer-switch callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeInfo {
    /// Frames elapsed since the stream started.
    pub sample_position: u64,
    /// System timestamp of the switch, in nanoseconds.
    pub system_time_ns: u64,
    /// Sample rate in effect at the switch.
    pub sample_rate: f64,
}

/// Selectors understood by the generic message callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSelector {
    /// "Does the host handle the selector passed in `value`?"
    SelectorSupported,
    /// Host engine version query.
    EngineVersion,
    /// The driver requests a reset.
    ResetRequest,
    /// The driver announces a buffer size change.
    BufferSizeChange,
    /// The driver requests a resync.
    ResyncRequest,
    /// The driver announces changed latencies.
    LatenciesChanged,
    /// "Does the host support the time-info buffer switch?"
    SupportsTimeInfo,
    /// "Does the host support time code?"
    SupportsTimeCode,
}

impl MessageSelector {
    /// The ABI's numeric code for this selector.
    pub const fn raw(self) -> i64 {
        match self {
            Self::SelectorSupported => 1,
            Self::EngineVersion => 2,
            Self::ResetRequest => 3,
            Self::BufferSizeChange => 4,
            Self::ResyncRequest => 5,
            Self::LatenciesChanged => 6,
            Self::SupportsTimeInfo => 7,
            Self::SupportsTimeCode => 8,
        }
    }

    /// Decodes a numeric selector code.
    pub const fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            1 => Some(Self::SelectorSupported),
            2 => Some(Self::EngineVersion),
            3 => Some(Self::ResetRequest),
            4 => Some(Self::BufferSizeChange),
            5 => Some(Self::ResyncRequest),
            6 => Some(Self::LatenciesChanged),
            7 => Some(Self::SupportsTimeInfo),
            8 => Some(Self::SupportsTimeCode),
            _ => None,
        }
    }
}

/// The callback set a host registers with the driver.
///
/// Plain function pointers: the ABI carries no user-context parameter, so
/// any state a callback needs must travel through a side channel (see the
/// callback bridge).
#[derive(Clone, Copy)]
pub struct DriverCallbacks {
    /// Invoked when the driver switches double-buffer halves.
    pub buffer_switch: fn(half: BufferHalf, direct_process: bool),
    /// Buffer switch with timing metadata; the return value is the host's
    /// timing feedback (`None` for "no feedback").
    pub buffer_switch_time_info:
        fn(time: Option<TimeInfo>, half: BufferHalf, direct_process: bool) -> Option<TimeInfo>,
    /// Invoked when the driver's sample rate changes outside host control.
    pub sample_rate_changed: fn(rate: f64),
    /// Generic host query; returns 0 for "not handled".
    pub message: fn(selector: MessageSelector, value: i64) -> i64,
}

impl fmt::Debug for DriverCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverCallbacks")
            .field("buffer_switch", &(self.buffer_switch as *const ()))
            .field(
                "buffer_switch_time_info",
                &(self.buffer_switch_time_info as *const ()),
            )
            .field("sample_rate_changed", &(self.sample_rate_changed as *const ()))
            .field("message", &(self.message as *const ()))
            .finish()
    }
}

/// One channel requested from buffer creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRequest {
    /// Input or output.
    pub direction: Direction,
    /// Channel index within its direction.
    pub channel: usize,
}

/// A per-channel double buffer allocated by the driver.
///
/// The two equally sized halves are owned by the driver and shared with the
/// harness under a mutex; the driver writes one half while the harness
/// transcodes the other, selected by the [`BufferHalf`] passed to each
/// buffer-switch callback. Cloning the descriptor shares the same memory.
#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    direction: Direction,
    channel: usize,
    halves: Arc<Mutex<[Vec<u8>; 2]>>,
}

impl BufferDescriptor {
    /// Allocates a descriptor with two zeroed halves of `bytes_per_half`.
    pub fn new(direction: Direction, channel: usize, bytes_per_half: usize) -> Self {
        Self {
            direction,
            channel,
            halves: Arc::new(Mutex::new([
                vec![0; bytes_per_half],
                vec![0; bytes_per_half],
            ])),
        }
    }

    /// Direction of the channel this buffer belongs to.
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    /// Channel index within its direction.
    pub const fn channel(&self) -> usize {
        self.channel
    }

    /// Locks and returns one half of the buffer.
    pub fn half(&self, half: BufferHalf) -> MappedMutexGuard<'_, [u8]> {
        MutexGuard::map(self.halves.lock(), |halves| {
            halves[half.index()].as_mut_slice()
        })
    }

    /// Byte length of each half.
    pub fn bytes_per_half(&self) -> usize {
        self.halves.lock()[0].len()
    }
}

/// The lifecycle surface of a real-time audio streaming driver.
///
/// Operations are listed in the order a conforming host uses them. Every
/// call may fail with a [`DriverError`]; the harness treats each failure as
/// terminal for the run.
pub trait AudioDriver: Send + Sync {
    /// Initializes the driver and reports its identity.
    fn initialize(&self) -> DriverResult<DriverInfo>;

    /// Reports the available input and output channel counts.
    fn channel_counts(&self) -> DriverResult<ChannelCounts>;

    /// Reports supported buffer length bounds, in frames.
    fn buffer_size_range(&self) -> DriverResult<BufferSizeRange>;

    /// Reports the sample rate currently in effect.
    fn sample_rate(&self) -> DriverResult<f64>;

    /// Checks whether `rate` can be set, without setting it.
    fn can_sample_rate(&self, rate: f64) -> DriverResult<()>;

    /// Sets the sample rate.
    fn set_sample_rate(&self, rate: f64) -> DriverResult<()>;

    /// Tells the driver the host finishes output buffers promptly.
    fn output_ready(&self) -> DriverResult<()>;

    /// Reports metadata for one channel.
    fn channel_info(&self, channel: usize, direction: Direction) -> DriverResult<ChannelDescriptor>;

    /// Allocates double buffers for the requested channels and registers the
    /// callback set. Each buffer holds `frames_per_buffer` frames per half.
    fn create_buffers(
        &self,
        requests: &[BufferRequest],
        frames_per_buffer: usize,
        callbacks: DriverCallbacks,
    ) -> DriverResult<Vec<BufferDescriptor>>;

    /// Releases all buffers allocated by [`create_buffers`](Self::create_buffers).
    fn dispose_buffers(&self) -> DriverResult<()>;

    /// Reports input and output latencies, in frames.
    fn latencies(&self) -> DriverResult<Latency>;

    /// Starts streaming; the driver begins invoking the callback set from
    /// its own thread.
    fn start(&self) -> DriverResult<()>;

    /// Stops streaming; no callbacks are invoked after this returns.
    fn stop(&self) -> DriverResult<()>;

    /// Reports the current stream position.
    fn sample_position(&self) -> DriverResult<SamplePosition>;
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Shared fixtures for unit tests across the crate.

    use super::*;

    fn noop_buffer_switch(_half: BufferHalf, _direct_process: bool) {}

    fn noop_buffer_switch_time_info(
        _time: Option<TimeInfo>,
        _half: BufferHalf,
        _direct_process: bool,
    ) -> Option<TimeInfo> {
        None
    }

    fn noop_sample_rate_changed(_rate: f64) {}

    fn noop_message(_selector: MessageSelector, _value: i64) -> i64 {
        0
    }

    /// A callback set that ignores every invocation.
    pub(crate) fn noop_callbacks() -> DriverCallbacks {
        DriverCallbacks {
            buffer_switch: noop_buffer_switch,
            buffer_switch_time_info: noop_buffer_switch_time_info,
            sample_rate_changed: noop_sample_rate_changed,
            message: noop_message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_half_indices() {
        assert_eq!(BufferHalf::First.index(), 0);
        assert_eq!(BufferHalf::Second.index(), 1);
        assert_eq!(BufferHalf::First.other(), BufferHalf::Second);
        assert_eq!(BufferHalf::Second.other(), BufferHalf::First);
    }

    #[test]
    fn test_message_selector_raw_round_trip() {
        for raw in 1..=8 {
            let selector = MessageSelector::from_raw(raw).expect("valid selector code");
            assert_eq!(selector.raw(), raw);
        }
        assert_eq!(MessageSelector::from_raw(0), None);
        assert_eq!(MessageSelector::from_raw(9), None);
    }

    #[test]
    fn test_buffer_descriptor_shares_memory_across_clones() {
        let descriptor = BufferDescriptor::new(Direction::Input, 0, 8);
        let clone = descriptor.clone();

        descriptor.half(BufferHalf::First).fill(0xAB);
        assert!(clone.half(BufferHalf::First).iter().all(|&b| b == 0xAB));
        assert!(clone.half(BufferHalf::Second).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_channel_counts_helpers() {
        let counts = ChannelCounts {
            inputs: 2,
            outputs: 4,
        };
        assert_eq!(counts.for_direction(Direction::Input), 2);
        assert_eq!(counts.for_direction(Direction::Output), 4);
        assert_eq!(counts.total(), 6);
        assert!(!counts.is_empty());
        assert!(
            ChannelCounts {
                inputs: 0,
                outputs: 0
            }
            .is_empty()
        );
    }
}
