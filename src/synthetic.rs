//! Synthetic reference driver.
//!
//! An in-process stand-in for a real streaming driver, used by the binary
//! and the end-to-end tests. It honors the full [`AudioDriver`] surface:
//! double buffers are allocated on demand and disposed exactly once, input
//! channels are filled with a deterministic ramp each cycle, and after
//! `start` a dedicated thread invokes the registered callbacks at a fixed
//! cadence, alternating buffer halves, until `stop`.
//!
//! Not a production driver — it exists so the harness has a device to
//! exercise without loading one from the system.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use i24::I24;
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::driver::{
    AudioDriver, BufferDescriptor, BufferHalf, BufferRequest, BufferSizeRange, ChannelCounts,
    ChannelDescriptor, Direction, DriverCallbacks, DriverError, DriverInfo, DriverResult, Latency,
    MessageSelector, SamplePosition, TimeInfo,
};
use crate::format::DriverSampleType;

/// Behavior knobs for a [`SyntheticDriver`].
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// Number of input channels.
    pub input_channels: usize,
    /// Number of output channels.
    pub output_channels: usize,
    /// Sample type reported for every channel.
    pub sample_type: DriverSampleType,
    /// Overrides the sample type of individual input channels by index;
    /// channels beyond the list use `sample_type`. Lets tests exercise the
    /// uniform-type negotiation failure.
    pub input_type_overrides: Vec<DriverSampleType>,
    /// Rate in effect before any rate is applied.
    pub initial_sample_rate: f64,
    /// Rates the driver accepts.
    pub supported_rates: Vec<f64>,
    /// Buffer length bounds reported to the host.
    pub buffer_size: BufferSizeRange,
    /// Pause between buffer switches.
    pub switch_interval: Duration,
    /// Makes `start` fail, for failure-path tests.
    pub fail_start: bool,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            input_channels: 2,
            output_channels: 2,
            sample_type: DriverSampleType::Float32Lsb,
            input_type_overrides: Vec::new(),
            initial_sample_rate: 48000.0,
            supported_rates: vec![44100.0, 48000.0, 96000.0, 192000.0],
            buffer_size: BufferSizeRange {
                min: 64,
                max: 4096,
                preferred: 256,
                granularity: -1,
            },
            switch_interval: Duration::from_millis(1),
            fail_start: false,
        }
    }
}

struct Allocation {
    descriptors: Vec<BufferDescriptor>,
    callbacks: DriverCallbacks,
    frames: usize,
}

struct Worker {
    stop: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

impl Worker {
    fn halt(self) {
        self.stop.store(true, Ordering::SeqCst);
        if self.handle.join().is_err() {
            error!("synthetic driver stream thread panicked");
        }
    }
}

struct DriverState {
    initialized: bool,
    sample_rate: f64,
    allocation: Option<Allocation>,
    worker: Option<Worker>,
}

/// A configurable software driver honoring the full ABI.
pub struct SyntheticDriver {
    config: SyntheticConfig,
    state: Mutex<DriverState>,
    position: Arc<AtomicU64>,
    create_calls: AtomicUsize,
    dispose_calls: AtomicUsize,
}

impl SyntheticDriver {
    /// Creates a driver with the given behavior.
    pub fn new(config: SyntheticConfig) -> Self {
        let initial_sample_rate = config.initial_sample_rate;
        Self {
            config,
            state: Mutex::new(DriverState {
                initialized: false,
                sample_rate: initial_sample_rate,
                allocation: None,
                worker: None,
            }),
            position: Arc::new(AtomicU64::new(0)),
            create_calls: AtomicUsize::new(0),
            dispose_calls: AtomicUsize::new(0),
        }
    }

    /// How many times buffer creation was attempted.
    pub fn create_count(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// How many times buffer disposal was attempted.
    pub fn dispose_count(&self) -> usize {
        self.dispose_calls.load(Ordering::SeqCst)
    }

    fn counts(&self) -> ChannelCounts {
        ChannelCounts {
            inputs: self.config.input_channels,
            outputs: self.config.output_channels,
        }
    }

    fn ensure_initialized(&self) -> DriverResult<()> {
        if self.state.lock().initialized {
            Ok(())
        } else {
            Err(DriverError::invalid_mode("driver not initialized"))
        }
    }

    fn sample_type_of(&self, channel: usize, direction: Direction) -> DriverSampleType {
        if direction == Direction::Input {
            if let Some(&override_type) = self.config.input_type_overrides.get(channel) {
                return override_type;
            }
        }
        self.config.sample_type
    }
}

impl AudioDriver for SyntheticDriver {
    fn initialize(&self) -> DriverResult<DriverInfo> {
        let mut state = self.state.lock();
        if state.initialized {
            return Err(DriverError::invalid_mode("driver already initialized"));
        }
        state.initialized = true;
        Ok(DriverInfo {
            name: "synthetic loopback".to_owned(),
            version: 1,
        })
    }

    fn channel_counts(&self) -> DriverResult<ChannelCounts> {
        self.ensure_initialized()?;
        Ok(self.counts())
    }

    fn buffer_size_range(&self) -> DriverResult<BufferSizeRange> {
        self.ensure_initialized()?;
        Ok(self.config.buffer_size)
    }

    fn sample_rate(&self) -> DriverResult<f64> {
        self.ensure_initialized()?;
        Ok(self.state.lock().sample_rate)
    }

    fn can_sample_rate(&self, rate: f64) -> DriverResult<()> {
        self.ensure_initialized()?;
        if self.config.supported_rates.contains(&rate) {
            Ok(())
        } else {
            Err(DriverError::new(
                crate::driver::error_code::NO_CLOCK,
                format!("sample rate {rate} Hz not supported"),
            ))
        }
    }

    fn set_sample_rate(&self, rate: f64) -> DriverResult<()> {
        self.can_sample_rate(rate)?;
        self.state.lock().sample_rate = rate;
        Ok(())
    }

    fn output_ready(&self) -> DriverResult<()> {
        self.ensure_initialized()?;
        Ok(())
    }

    fn channel_info(&self, channel: usize, direction: Direction) -> DriverResult<ChannelDescriptor> {
        self.ensure_initialized()?;
        if channel >= self.counts().for_direction(direction) {
            return Err(DriverError::invalid_parameter(format!(
                "no {direction} channel {channel}"
            )));
        }
        Ok(ChannelDescriptor {
            index: channel,
            direction,
            active: true,
            group: 0,
            sample_type: self.sample_type_of(channel, direction),
            name: format!("{direction} {channel}"),
        })
    }

    fn create_buffers(
        &self,
        requests: &[BufferRequest],
        frames_per_buffer: usize,
        callbacks: DriverCallbacks,
    ) -> DriverResult<Vec<BufferDescriptor>> {
        self.ensure_initialized()?;
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock();
        if state.allocation.is_some() {
            return Err(DriverError::invalid_mode("buffers already created"));
        }

        let mut descriptors = Vec::with_capacity(requests.len());
        for request in requests {
            if request.channel >= self.counts().for_direction(request.direction) {
                return Err(DriverError::invalid_parameter(format!(
                    "no {} channel {}",
                    request.direction, request.channel
                )));
            }
            let width = self
                .sample_type_of(request.channel, request.direction)
                .byte_width();
            descriptors.push(BufferDescriptor::new(
                request.direction,
                request.channel,
                frames_per_buffer * width,
            ));
        }

        state.allocation = Some(Allocation {
            descriptors: descriptors.clone(),
            callbacks,
            frames: frames_per_buffer,
        });
        Ok(descriptors)
    }

    fn dispose_buffers(&self) -> DriverResult<()> {
        self.ensure_initialized()?;
        self.dispose_calls.fetch_add(1, Ordering::SeqCst);

        let (worker, allocation) = {
            let mut state = self.state.lock();
            (state.worker.take(), state.allocation.take())
        };
        // A host may dispose without stopping first; tolerate it.
        if let Some(worker) = worker {
            worker.halt();
        }
        if allocation.is_none() {
            return Err(DriverError::invalid_mode("no buffers to dispose"));
        }
        Ok(())
    }

    fn latencies(&self) -> DriverResult<Latency> {
        self.ensure_initialized()?;
        Ok(Latency {
            input: self.config.buffer_size.preferred,
            output: self.config.buffer_size.preferred,
        })
    }

    fn start(&self) -> DriverResult<()> {
        self.ensure_initialized()?;
        if self.config.fail_start {
            return Err(DriverError::new(
                crate::driver::error_code::HW_MALFUNCTION,
                "start failure injected",
            ));
        }

        let mut state = self.state.lock();
        if state.worker.is_some() {
            return Err(DriverError::invalid_mode("already started"));
        }
        let Some(allocation) = state.allocation.as_ref() else {
            return Err(DriverError::invalid_mode("no buffers created"));
        };

        let stop = Arc::new(AtomicBool::new(false));
        let descriptors = allocation.descriptors.clone();
        let callbacks = allocation.callbacks;
        let frames = allocation.frames;
        let sample_rate = state.sample_rate;
        let sample_type = self.config.sample_type;
        let interval = self.config.switch_interval;
        let position = Arc::clone(&self.position);
        let stop_flag = Arc::clone(&stop);

        self.position.store(0, Ordering::SeqCst);
        let handle = thread::spawn(move || {
            stream_worker(
                descriptors,
                callbacks,
                frames,
                sample_type,
                sample_rate,
                interval,
                position,
                stop_flag,
            );
        });
        state.worker = Some(Worker { stop, handle });
        debug!("synthetic driver started");
        Ok(())
    }

    fn stop(&self) -> DriverResult<()> {
        self.ensure_initialized()?;
        let worker = self.state.lock().worker.take();
        match worker {
            Some(worker) => {
                worker.halt();
                debug!("synthetic driver stopped");
                Ok(())
            }
            None => Err(DriverError::invalid_mode("not started")),
        }
    }

    fn sample_position(&self) -> DriverResult<SamplePosition> {
        self.ensure_initialized()?;
        let samples = self.position.load(Ordering::SeqCst);
        let sample_rate = self.state.lock().sample_rate;
        Ok(SamplePosition {
            samples,
            timestamp_ns: (samples as f64 / sample_rate * 1e9) as u64,
        })
    }
}

/// The callback-invoking thread: fill input buffers with a ramp, announce
/// the switch, alternate halves, repeat until told to stop.
#[allow(clippy::too_many_arguments)]
fn stream_worker(
    descriptors: Vec<BufferDescriptor>,
    callbacks: DriverCallbacks,
    frames: usize,
    sample_type: DriverSampleType,
    sample_rate: f64,
    interval: Duration,
    position: Arc<AtomicU64>,
    stop: Arc<AtomicBool>,
) {
    // Ask the host whether it accepts the time-info switch, through the
    // registered message callback.
    let supports_time_info = (callbacks.message)(
        MessageSelector::SelectorSupported,
        MessageSelector::SupportsTimeInfo.raw(),
    ) == 1
        && (callbacks.message)(MessageSelector::SupportsTimeInfo, 0) == 1;

    let mut half = BufferHalf::First;
    while !stop.load(Ordering::SeqCst) {
        let start_tick = position.load(Ordering::SeqCst);
        for descriptor in &descriptors {
            if descriptor.direction() == Direction::Input {
                let mut region = descriptor.half(half);
                fill_ramp(&mut region, sample_type, start_tick);
            }
        }

        let samples = position.fetch_add(frames as u64, Ordering::SeqCst) + frames as u64;
        if supports_time_info {
            let time = TimeInfo {
                sample_position: samples,
                system_time_ns: (samples as f64 / sample_rate * 1e9) as u64,
                sample_rate,
            };
            (callbacks.buffer_switch_time_info)(Some(time), half, true);
        } else {
            (callbacks.buffer_switch)(half, true);
        }

        half = half.other();
        thread::sleep(interval);
    }
}

/// Fills a channel region with a deterministic ramp starting at `start_tick`.
fn fill_ramp(region: &mut [u8], sample_type: DriverSampleType, start_tick: u64) {
    let width = sample_type.byte_width();
    for (i, chunk) in region.chunks_exact_mut(width).enumerate() {
        let tick = start_tick.wrapping_add(i as u64);
        match sample_type {
            DriverSampleType::Int16Lsb => chunk.copy_from_slice(&(tick as i16).to_le_bytes()),
            DriverSampleType::Int16Msb => chunk.copy_from_slice(&(tick as i16).to_be_bytes()),
            DriverSampleType::Int24Lsb => {
                let value = I24::saturating_from_i32((tick % 0x0080_0000) as i32);
                chunk.copy_from_slice(&value.to_le_bytes());
            }
            DriverSampleType::Int24Msb => {
                let mut bytes = I24::saturating_from_i32((tick % 0x0080_0000) as i32).to_le_bytes();
                bytes.reverse();
                chunk.copy_from_slice(&bytes);
            }
            DriverSampleType::Int32Lsb => chunk.copy_from_slice(&(tick as i32).to_le_bytes()),
            DriverSampleType::Int32Msb => chunk.copy_from_slice(&(tick as i32).to_be_bytes()),
            DriverSampleType::Float32Lsb => {
                chunk.copy_from_slice(&ramp_value_f32(tick).to_le_bytes());
            }
            DriverSampleType::Float32Msb => {
                chunk.copy_from_slice(&ramp_value_f32(tick).to_be_bytes());
            }
            DriverSampleType::Float64Lsb => {
                chunk.copy_from_slice(&f64::from(ramp_value_f32(tick)).to_le_bytes());
            }
            DriverSampleType::Float64Msb => {
                chunk.copy_from_slice(&f64::from(ramp_value_f32(tick)).to_be_bytes());
            }
        }
    }
}

/// The float ramp: a sawtooth over 1000 ticks, in `[0, 1)`.
pub fn ramp_value_f32(tick: u64) -> f32 {
    ((tick % 1000) as f32) / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calls_require_initialization() {
        let driver = SyntheticDriver::new(SyntheticConfig::default());
        assert!(driver.channel_counts().is_err());
        assert!(driver.sample_rate().is_err());

        driver.initialize().unwrap();
        assert_eq!(
            driver.channel_counts().unwrap(),
            ChannelCounts {
                inputs: 2,
                outputs: 2
            }
        );
        // Double initialization is a mode error.
        assert!(driver.initialize().is_err());
    }

    #[test]
    fn test_rate_capability_is_checked_on_set() {
        let driver = SyntheticDriver::new(SyntheticConfig {
            supported_rates: vec![48000.0],
            ..SyntheticConfig::default()
        });
        driver.initialize().unwrap();

        assert!(driver.can_sample_rate(48000.0).is_ok());
        assert!(driver.can_sample_rate(96000.0).is_err());
        assert!(driver.set_sample_rate(96000.0).is_err());

        driver.set_sample_rate(48000.0).unwrap();
        assert_eq!(driver.sample_rate().unwrap(), 48000.0);
    }

    #[test]
    fn test_channel_info_honors_overrides() {
        let driver = SyntheticDriver::new(SyntheticConfig {
            input_type_overrides: vec![DriverSampleType::Int16Lsb],
            ..SyntheticConfig::default()
        });
        driver.initialize().unwrap();

        let first = driver.channel_info(0, Direction::Input).unwrap();
        assert_eq!(first.sample_type, DriverSampleType::Int16Lsb);
        let second = driver.channel_info(1, Direction::Input).unwrap();
        assert_eq!(second.sample_type, DriverSampleType::Float32Lsb);
        let output = driver.channel_info(0, Direction::Output).unwrap();
        assert_eq!(output.sample_type, DriverSampleType::Float32Lsb);

        assert!(driver.channel_info(2, Direction::Input).is_err());
    }

    #[test]
    fn test_buffer_lifecycle_guards() {
        let driver = SyntheticDriver::new(SyntheticConfig::default());
        driver.initialize().unwrap();

        // Start without buffers is a mode error.
        assert!(driver.start().is_err());

        let requests = [BufferRequest {
            direction: Direction::Input,
            channel: 0,
        }];
        let noop = crate::driver::test_support::noop_callbacks();
        let descriptors = driver.create_buffers(&requests, 16, noop).unwrap();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].bytes_per_half(), 16 * 4);

        // A second allocation without disposal is rejected.
        assert!(driver.create_buffers(&requests, 16, noop).is_err());

        driver.dispose_buffers().unwrap();
        assert!(driver.dispose_buffers().is_err());
        assert_eq!(driver.dispose_count(), 2);
    }

    #[test]
    fn test_ramp_fill_is_deterministic() {
        let mut region = vec![0u8; 4 * 4];
        fill_ramp(&mut region, DriverSampleType::Float32Lsb, 10);
        for (i, chunk) in region.chunks_exact(4).enumerate() {
            let value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            assert_eq!(value, ramp_value_f32(10 + i as u64));
        }
    }
}
