//! End-to-end runs against the bundled reference driver.
//!
//! The callback bridge binds a process-global slot, so tests that run a
//! full session serialize on a lock instead of racing for it.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use streamcheck::run::{BUFFER_SWITCH_THRESHOLD, Config, Runner};
use streamcheck::synthetic::{SyntheticConfig, SyntheticDriver, ramp_value_f32};
use streamcheck::{DriverSampleType, HarnessError};

static RUN_LOCK: Mutex<()> = Mutex::new(());

fn run_with(config: Config, driver: Arc<SyntheticDriver>) -> bool {
    let _guard = RUN_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    Runner::new(config, driver).run()
}

fn write_float_wav(path: &Path, channels: u16, sample_rate: u32, frames: usize) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for frame in 0..frames {
        for _ in 0..channels {
            writer.write_sample(frame as f32 * 0.001).unwrap();
        }
    }
    writer.finalize().unwrap();
}

#[test]
fn output_capture_produces_exact_float_wav() {
    let dir = tempfile::tempdir().unwrap();
    let out_path = dir.path().join("capture.wav");

    let driver = Arc::new(SyntheticDriver::new(SyntheticConfig::default()));
    let config = Config {
        output_file: Some(out_path.clone()),
        ..Config::default()
    };

    assert!(run_with(config, Arc::clone(&driver)));
    assert_eq!(driver.dispose_count(), 1);

    let mut reader = hound::WavReader::open(&out_path).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, 48000);
    assert_eq!(spec.bits_per_sample, 32);
    assert_eq!(spec.sample_format, hound::SampleFormat::Float);

    // Exactly the threshold's worth of preferred-size buffers.
    let frames_per_buffer = 256;
    assert_eq!(
        u64::from(reader.duration()),
        BUFFER_SWITCH_THRESHOLD * frames_per_buffer
    );

    // Content is the driver's deterministic ramp, identical per channel.
    let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
    for (i, sample) in samples.iter().enumerate() {
        let frame = (i / 2) as u64;
        assert_eq!(*sample, ramp_value_f32(frame), "sample index {i}");
    }
}

#[test]
fn zero_channel_driver_fails_before_any_allocation() {
    let driver = Arc::new(SyntheticDriver::new(SyntheticConfig {
        input_channels: 0,
        output_channels: 0,
        ..SyntheticConfig::default()
    }));

    assert!(!run_with(Config::default(), Arc::clone(&driver)));
    assert_eq!(driver.create_count(), 0);
    assert_eq!(driver.dispose_count(), 0);
}

#[test]
fn short_input_file_is_zero_padded_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let in_path = dir.path().join("short.wav");
    // Far fewer frames than the run consumes (30 switches x 256 frames).
    write_float_wav(&in_path, 2, 48000, 100);

    let driver = Arc::new(SyntheticDriver::new(SyntheticConfig::default()));
    let config = Config {
        input_file: Some(in_path),
        ..Config::default()
    };

    assert!(run_with(config, driver));
}

#[test]
fn unsupported_probe_candidates_do_not_fail_the_run() {
    let driver = Arc::new(SyntheticDriver::new(SyntheticConfig {
        supported_rates: vec![48000.0],
        ..SyntheticConfig::default()
    }));

    assert!(run_with(Config::default(), driver));
}

#[test]
fn explicit_sample_rate_override_reaches_the_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let out_path = dir.path().join("rate.wav");

    let driver = Arc::new(SyntheticDriver::new(SyntheticConfig::default()));
    let config = Config {
        output_file: Some(out_path.clone()),
        sample_rate: Some(96000.0),
        ..Config::default()
    };

    assert!(run_with(config, driver));

    let reader = hound::WavReader::open(&out_path).unwrap();
    assert_eq!(reader.spec().sample_rate, 96000);
}

#[test]
fn input_file_rate_mismatch_fails_before_streaming() {
    let dir = tempfile::tempdir().unwrap();
    let in_path = dir.path().join("wrong_rate.wav");
    write_float_wav(&in_path, 2, 44100, 16);

    let driver = Arc::new(SyntheticDriver::new(SyntheticConfig::default()));
    let config = Config {
        input_file: Some(in_path),
        // Forces the configured rate to win over the file's rate.
        sample_rate: Some(48000.0),
        ..Config::default()
    };

    assert!(!run_with(config, Arc::clone(&driver)));
    assert_eq!(driver.create_count(), 0);
}

#[test]
fn heterogeneous_input_sample_types_fail_output_setup() {
    let dir = tempfile::tempdir().unwrap();
    let out_path = dir.path().join("never.wav");

    let driver = Arc::new(SyntheticDriver::new(SyntheticConfig {
        input_type_overrides: vec![DriverSampleType::Int16Lsb],
        ..SyntheticConfig::default()
    }));
    let config = Config {
        output_file: Some(out_path),
        ..Config::default()
    };

    assert!(!run_with(config, Arc::clone(&driver)));
    assert_eq!(driver.create_count(), 0);
}

#[test]
fn driver_start_failure_fails_the_run_and_releases_buffers() {
    let driver = Arc::new(SyntheticDriver::new(SyntheticConfig {
        fail_start: true,
        ..SyntheticConfig::default()
    }));

    assert!(!run_with(Config::default(), Arc::clone(&driver)));
    assert_eq!(driver.create_count(), 1);
    assert_eq!(driver.dispose_count(), 1);
}

#[test]
fn mismatch_error_names_both_conflicting_types() {
    // The negotiation error surface, observed through the public API.
    let channels = vec![
        streamcheck::ChannelDescriptor {
            index: 0,
            direction: streamcheck::Direction::Input,
            active: true,
            group: 0,
            sample_type: DriverSampleType::Float32Lsb,
            name: "input 0".to_owned(),
        },
        streamcheck::ChannelDescriptor {
            index: 1,
            direction: streamcheck::Direction::Input,
            active: true,
            group: 0,
            sample_type: DriverSampleType::Int24Lsb,
            name: "input 1".to_owned(),
        },
    ];
    let err = streamcheck::negotiate::common_sample_type(&channels, streamcheck::Direction::Input)
        .unwrap_err();
    assert!(matches!(err, HarnessError::SampleTypeMismatch { .. }));
    let message = err.to_string();
    assert!(message.contains("float32-lsb"));
    assert!(message.contains("int24-lsb"));
}

#[test]
fn slow_driver_still_reaches_the_threshold() {
    // A coarser switch cadence exercises the blocking wait a little harder.
    let driver = Arc::new(SyntheticDriver::new(SyntheticConfig {
        switch_interval: Duration::from_millis(5),
        buffer_size: streamcheck::BufferSizeRange {
            min: 32,
            max: 512,
            preferred: 64,
            granularity: -1,
        },
        ..SyntheticConfig::default()
    }));

    assert!(run_with(Config::default(), driver));
}
