//! Channel and format negotiation.
//!
//! Collects per-channel metadata, enforces the uniform-sample-type policy
//! (all channels of a direction must share one sample type), and resolves
//! the effective streaming sample rate.

use tracing::debug;

use crate::driver::{AudioDriver, ChannelCounts, ChannelDescriptor, Direction};
use crate::error::{HarnessError, HarnessResult};
use crate::format::DriverSampleType;

/// Collects metadata for every channel, inputs first, then outputs.
///
/// Any failed lookup fails negotiation.
pub fn enumerate_channels(
    driver: &dyn AudioDriver,
    counts: ChannelCounts,
) -> HarnessResult<Vec<ChannelDescriptor>> {
    let mut channels = Vec::with_capacity(counts.total());
    for index in 0..counts.inputs {
        channels.push(query_channel(driver, index, Direction::Input)?);
    }
    for index in 0..counts.outputs {
        channels.push(query_channel(driver, index, Direction::Output)?);
    }
    Ok(channels)
}

fn query_channel(
    driver: &dyn AudioDriver,
    index: usize,
    direction: Direction,
) -> HarnessResult<ChannelDescriptor> {
    let info = driver.channel_info(index, direction)?;
    debug!(
        index,
        %direction,
        active = info.active,
        group = info.group,
        sample_type = %info.sample_type,
        name = %info.name,
        "channel info"
    );
    Ok(info)
}

/// Determines the single sample type shared by all channels of `direction`.
///
/// Fails with a mismatch error naming both conflicting types if the set is
/// not uniform, and with a distinct error if the direction has no channels.
pub fn common_sample_type(
    channels: &[ChannelDescriptor],
    direction: Direction,
) -> HarnessResult<DriverSampleType> {
    let mut common: Option<DriverSampleType> = None;
    for channel in channels.iter().filter(|c| c.direction == direction) {
        match common {
            None => common = Some(channel.sample_type),
            Some(first) if first != channel.sample_type => {
                return Err(HarnessError::SampleTypeMismatch {
                    direction,
                    first,
                    second: channel.sample_type,
                });
            }
            Some(_) => {}
        }
    }
    common.ok_or(HarnessError::NoChannels { direction })
}

/// Resolves the effective streaming rate: the explicit configuration value
/// wins, then the input file's reported rate, then the driver's current
/// default.
pub fn resolve_sample_rate(
    configured: Option<f64>,
    input_file: Option<f64>,
    driver_default: f64,
) -> f64 {
    configured.or(input_file).unwrap_or(driver_default)
}

/// Applies `rate` to the driver: capability check, set, then a read-back
/// that must report the requested rate exactly.
#[allow(clippy::float_cmp)]
pub fn apply_sample_rate(driver: &dyn AudioDriver, rate: f64) -> HarnessResult<()> {
    driver.can_sample_rate(rate)?;
    driver.set_sample_rate(rate)?;
    let actual = driver.sample_rate()?;
    if actual != rate {
        return Err(HarnessError::SampleRateNotApplied {
            requested: rate,
            actual,
        });
    }
    debug!(rate, "sample rate applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(
        index: usize,
        direction: Direction,
        sample_type: DriverSampleType,
    ) -> ChannelDescriptor {
        ChannelDescriptor {
            index,
            direction,
            active: true,
            group: 0,
            sample_type,
            name: format!("{direction} {index}"),
        }
    }

    #[test]
    fn test_common_sample_type_uniform() {
        let channels = vec![
            channel(0, Direction::Input, DriverSampleType::Float32Lsb),
            channel(1, Direction::Input, DriverSampleType::Float32Lsb),
            channel(0, Direction::Output, DriverSampleType::Int16Lsb),
        ];

        assert_eq!(
            common_sample_type(&channels, Direction::Input).unwrap(),
            DriverSampleType::Float32Lsb
        );
        assert_eq!(
            common_sample_type(&channels, Direction::Output).unwrap(),
            DriverSampleType::Int16Lsb
        );
    }

    #[test]
    fn test_common_sample_type_mismatch_names_both_types() {
        let channels = vec![
            channel(0, Direction::Input, DriverSampleType::Float32Lsb),
            channel(1, Direction::Input, DriverSampleType::Int32Lsb),
        ];

        let err = common_sample_type(&channels, Direction::Input).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("float32-lsb"), "message: {message}");
        assert!(message.contains("int32-lsb"), "message: {message}");
        assert!(message.contains("input"), "message: {message}");
    }

    #[test]
    fn test_common_sample_type_empty_direction_is_distinct_error() {
        let channels = vec![channel(0, Direction::Input, DriverSampleType::Float32Lsb)];

        let err = common_sample_type(&channels, Direction::Output).unwrap_err();
        assert!(matches!(
            err,
            HarnessError::NoChannels {
                direction: Direction::Output
            }
        ));
    }

    #[test]
    fn test_mismatch_in_other_direction_does_not_affect_result() {
        let channels = vec![
            channel(0, Direction::Input, DriverSampleType::Int16Lsb),
            channel(0, Direction::Output, DriverSampleType::Float32Lsb),
            channel(1, Direction::Output, DriverSampleType::Float64Lsb),
        ];

        assert_eq!(
            common_sample_type(&channels, Direction::Input).unwrap(),
            DriverSampleType::Int16Lsb
        );
        assert!(common_sample_type(&channels, Direction::Output).is_err());
    }

    #[test]
    fn test_sample_rate_resolution_order() {
        assert_eq!(
            resolve_sample_rate(Some(96000.0), Some(44100.0), 48000.0),
            96000.0
        );
        assert_eq!(resolve_sample_rate(None, Some(44100.0), 48000.0), 44100.0);
        assert_eq!(resolve_sample_rate(None, None, 48000.0), 48000.0);
    }
}
