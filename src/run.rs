//! Run controller.
//!
//! Orchestrates negotiation, buffer allocation, and streaming against one
//! driver, blocking the caller until the run resolves. Success is declared
//! the moment the buffer-switch counter reaches
//! [`BUFFER_SWITCH_THRESHOLD`]; failure is declared by any callback-side
//! error or any driver call failing along the way. The outcome is
//! first-writer-wins and never reset.

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info};

use crate::bridge::CallbackBridge;
use crate::driver::{AudioDriver, BufferDescriptor, BufferHalf, ChannelCounts, Direction};
use crate::error::{HarnessError, HarnessResult};
use crate::files::{InputFile, OutputFile};
use crate::negotiate;
use crate::session::Session;
use crate::transcode;

/// Buffer switches required to declare a run successful.
///
/// High enough to sustain the driver past its first few cycles and trigger
/// steady-state failure modes, low enough to finish quickly.
pub const BUFFER_SWITCH_THRESHOLD: u64 = 30;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The buffer-switch threshold was reached.
    Success,
    /// A callback-side error or driver failure ended the run.
    Failure,
}

/// The shared pass/fail flag for one run.
///
/// Set at most once: the first writer wins and later writes are no-ops.
/// Observers block on [`wait`](Self::wait) until a writer arrives.
#[derive(Default)]
pub struct RunOutcome {
    state: Mutex<Option<Outcome>>,
    signal: Condvar,
}

impl RunOutcome {
    /// Creates an unresolved outcome.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves the outcome, unless a previous writer already did.
    pub fn set(&self, outcome: Outcome) {
        let mut state = self.state.lock();
        if state.is_some() {
            return;
        }
        *state = Some(outcome);
        drop(state);
        self.signal.notify_all();
    }

    /// The outcome, if resolved.
    pub fn get(&self) -> Option<Outcome> {
        *self.state.lock()
    }

    /// Blocks until the outcome resolves.
    ///
    /// There is deliberately no timeout: a driver that never invokes a
    /// callback leaves the caller blocked indefinitely.
    pub fn wait(&self) -> Outcome {
        let mut state = self.state.lock();
        loop {
            if let Some(outcome) = *state {
                return outcome;
            }
            self.signal.wait(&mut state);
        }
    }
}

/// Immutable run parameters, fixed before the run starts.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// WAV file played into the driver's output-bound buffers.
    pub input_file: Option<PathBuf>,
    /// WAV file recording the driver's input-bound buffers.
    pub output_file: Option<PathBuf>,
    /// Explicit sample rate, overriding file and driver defaults.
    pub sample_rate: Option<f64>,
}

/// Per-run streaming state touched only from the driver's callback thread.
struct StreamEngine {
    driver: Arc<dyn AudioDriver>,
    descriptors: Vec<BufferDescriptor>,
    frames: usize,
    input: Option<InputFile>,
    input_width: usize,
    output_channels: usize,
    output: Option<OutputFile>,
    output_width: usize,
    outcome: Arc<RunOutcome>,
    switch_count: u64,
}

impl StreamEngine {
    /// One real buffer switch: log the stream position, drain driver input
    /// to the output file, feed the input file into driver output, count.
    fn process(&mut self, half: BufferHalf) -> HarnessResult<()> {
        // Once the run has resolved, later switches are left untouched so
        // the output file holds exactly the threshold's worth of frames.
        if self.outcome.get().is_some() {
            return Ok(());
        }

        // Position is observational only.
        match self.driver.sample_position() {
            Ok(position) => debug!(
                samples = position.samples,
                timestamp_ns = position.timestamp_ns,
                "sample position"
            ),
            Err(err) => debug!(%err, "sample position unavailable"),
        }

        if let Some(output) = self.output.as_mut() {
            let bytes =
                transcode::to_interleaved(&self.descriptors, self.output_width, self.frames, half);
            output.write_interleaved(&bytes)?;
        }

        if let Some(input) = self.input.as_mut() {
            let wanted = self.frames * self.output_channels * self.input_width;
            let mut bytes = input.read_interleaved(wanted)?;
            // Zero-fill whatever the file could no longer supply.
            bytes.resize(wanted, 0);
            transcode::from_interleaved(&bytes, &self.descriptors, self.input_width, half);
        }

        self.switch_count += 1;
        debug!(count = self.switch_count, "buffer switch count");
        if self.switch_count >= BUFFER_SWITCH_THRESHOLD {
            self.outcome.set(Outcome::Success);
        }
        Ok(())
    }
}

/// The error boundary between the driver's callback thread and the harness:
/// failures and panics become the failure outcome and nothing propagates
/// back across the driver ABI.
fn contain(engine: &Arc<Mutex<StreamEngine>>, outcome: &Arc<RunOutcome>, half: BufferHalf) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| engine.lock().process(half)));
    match result {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            error!("fatal error during buffer switch: {err}");
            outcome.set(Outcome::Failure);
        }
        Err(_) => {
            error!("panic during buffer switch");
            outcome.set(Outcome::Failure);
        }
    }
}

/// Drives one full conformance run against one driver.
pub struct Runner {
    config: Config,
    driver: Arc<dyn AudioDriver>,
}

impl Runner {
    /// Creates a runner for `driver` with the given parameters.
    pub fn new(config: Config, driver: Arc<dyn AudioDriver>) -> Self {
        Self { config, driver }
    }

    /// Runs to completion and reports pass/fail.
    ///
    /// All errors are contained here: the cause is logged and `false`
    /// returned.
    pub fn run(&self) -> bool {
        match self.run_session() {
            Ok(()) => {
                info!("run finished: PASS");
                true
            }
            Err(err) => {
                error!("fatal error: {err}");
                error!("run finished: FAIL");
                false
            }
        }
    }

    fn run_session(&self) -> HarnessResult<()> {
        // Bound before the session so drop order tears down in reverse:
        // buffers are disposed (quiescing the driver) while the bridge is
        // still able to field a late callback.
        let bridge = CallbackBridge::bind();

        let mut session = Session::new(Arc::clone(&self.driver));
        session.initialize()?;
        let survey = session.probe_sample_rates()?;
        session.enumerate_channels()?;
        let counts = survey.channel_counts;
        let channels = session.channels().to_vec();

        let mut target_rate = self.config.sample_rate;

        // The input file plays into the driver's output-bound channels, so
        // it must agree with their format.
        let mut input = None;
        let mut input_width = 0;
        if let Some(path) = &self.config.input_file {
            let prepared = prepare_input(path.as_path(), &channels, counts, &mut target_rate)
                .map_err(HarnessError::input_context)?;
            input_width = prepared.1;
            input = Some(prepared.0);
        }

        let target_rate =
            negotiate::resolve_sample_rate(target_rate, None, survey.initial_sample_rate);
        info!(rate = target_rate, "resolved sample rate");

        // The output file records the driver's input-bound channels.
        let mut output = None;
        let mut output_width = 0;
        if let Some(path) = &self.config.output_file {
            let prepared = prepare_output(path.as_path(), &channels, counts, target_rate)
                .map_err(HarnessError::output_context)?;
            output_width = prepared.1;
            output = Some(prepared.0);
        }

        session.resolve_formats(target_rate)?;
        let range = session.buffer_size_range()?;
        session.mark_output_ready()?;

        session.create_buffers(range.preferred, bridge.driver_callbacks())?;

        let outcome = Arc::new(RunOutcome::new());
        let engine = Arc::new(Mutex::new(StreamEngine {
            driver: Arc::clone(&self.driver),
            descriptors: session.buffer_descriptors().to_vec(),
            frames: range.preferred,
            input,
            input_width,
            output_channels: counts.outputs,
            output,
            output_width,
            outcome: Arc::clone(&outcome),
            switch_count: 0,
        }));

        bridge.set_buffer_switch({
            let engine = Arc::clone(&engine);
            let outcome = Arc::clone(&outcome);
            move |half, direct_process| {
                debug!(?half, direct_process, "buffer switch");
                contain(&engine, &outcome, half);
            }
        });
        bridge.set_buffer_switch_time_info({
            let engine = Arc::clone(&engine);
            let outcome = Arc::clone(&outcome);
            move |time, half, direct_process| {
                debug!(?time, ?half, direct_process, "buffer switch (time info)");
                contain(&engine, &outcome, half);
                None
            }
        });

        // Light re-entrancy exercise before starting: query the rate and
        // channel set once more, observationally.
        self.log_driver_snapshot(counts);

        session.start()?;

        info!(
            threshold = BUFFER_SWITCH_THRESHOLD,
            "waiting for buffer switches"
        );
        let result = outcome.wait();
        if result != Outcome::Success {
            return Err(HarnessError::RunFailed);
        }

        info!(
            threshold = BUFFER_SWITCH_THRESHOLD,
            "reached buffer switch threshold, stopping"
        );
        session.stop()?;

        if let Some(output) = engine.lock().output.take() {
            output
                .finalize()
                .map_err(|err| HarnessError::output_context(HarnessError::File(err)))?;
        }

        // No terminal driver shutdown is issued beyond `stop`: the driver's
        // lifecycle is expected to tolerate the host exiting after it.
        Ok(())
    }

    /// Observational queries the run logs but never fails on.
    fn log_driver_snapshot(&self, counts: ChannelCounts) {
        match self.driver.sample_rate() {
            Ok(rate) => debug!(rate, "sample rate snapshot"),
            Err(err) => debug!(%err, "sample rate snapshot unavailable"),
        }
        for direction in [Direction::Input, Direction::Output] {
            for channel in 0..counts.for_direction(direction) {
                match self.driver.channel_info(channel, direction) {
                    Ok(info) => debug!(
                        channel,
                        %direction,
                        active = info.active,
                        sample_type = %info.sample_type,
                        "channel snapshot"
                    ),
                    Err(err) => debug!(channel, %direction, %err, "channel snapshot unavailable"),
                }
            }
        }
        match self.driver.latencies() {
            Ok(latency) => info!(
                input = latency.input,
                output = latency.output,
                "latencies (frames)"
            ),
            Err(err) => debug!(%err, "latencies unavailable"),
        }
    }
}

/// Opens and validates the input file against the output-direction format,
/// resolving the target rate from the file when not explicitly configured.
fn prepare_input(
    path: &std::path::Path,
    channels: &[crate::driver::ChannelDescriptor],
    counts: ChannelCounts,
    target_rate: &mut Option<f64>,
) -> HarnessResult<(InputFile, usize)> {
    let sample_type = negotiate::common_sample_type(channels, Direction::Output)?;
    let width = sample_type.byte_width();
    let file = InputFile::open(path)?;
    let rate = *target_rate.get_or_insert(f64::from(file.sample_rate()));
    file.validate(rate, counts.outputs, sample_type)?;
    info!(path = %path.display(), rate, "input file validated");
    Ok((file, width))
}

/// Creates the output file with metadata matching the input-direction
/// format.
fn prepare_output(
    path: &std::path::Path,
    channels: &[crate::driver::ChannelDescriptor],
    counts: ChannelCounts,
    target_rate: f64,
) -> HarnessResult<(OutputFile, usize)> {
    let sample_type = negotiate::common_sample_type(channels, Direction::Input)?;
    let width = sample_type.byte_width();
    let file = OutputFile::create(path, target_rate, counts.inputs, sample_type)?;
    info!(path = %path.display(), rate = target_rate, "output file created");
    Ok((file, width))
}
