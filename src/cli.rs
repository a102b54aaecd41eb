//! Command-line surface of the harness binary.

use std::path::PathBuf;

use clap::{Arg, ArgMatches, Command, value_parser};

use crate::run::Config;

/// Builds the argument parser.
///
/// Malformed options surface as clap usage errors, which exit the process
/// with code 2.
pub fn build_cli() -> Command {
    Command::new(env!("CARGO_PKG_NAME"))
        .about("Drive an audio streaming driver through its full lifecycle and report pass/fail")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("input-file")
                .long("input-file")
                .value_name("PATH")
                .help("Play raw samples from this WAV file into the driver's output buffers")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("output-file")
                .long("output-file")
                .value_name("PATH")
                .help("Record the driver's input buffers into this WAV file")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("sample-rate")
                .long("sample-rate")
                .value_name("RATE")
                .help(
                    "Sample rate to use; defaults to the input file rate, if any, \
                     otherwise the driver's initial rate",
                )
                .value_parser(value_parser!(f64)),
        )
}

/// Extracts the run configuration from parsed arguments.
pub fn config_from_matches(matches: &ArgMatches) -> Config {
    Config {
        input_file: matches.get_one::<PathBuf>("input-file").cloned(),
        output_file: matches.get_one::<PathBuf>("output-file").cloned(),
        sample_rate: matches.get_one::<f64>("sample-rate").copied(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_options_yields_empty_config() {
        let matches = build_cli()
            .try_get_matches_from(["streamcheck"])
            .expect("parse");
        let config = config_from_matches(&matches);
        assert!(config.input_file.is_none());
        assert!(config.output_file.is_none());
        assert!(config.sample_rate.is_none());
    }

    #[test]
    fn test_all_options_parse() {
        let matches = build_cli()
            .try_get_matches_from([
                "streamcheck",
                "--input-file",
                "in.wav",
                "--output-file",
                "out.wav",
                "--sample-rate",
                "96000",
            ])
            .expect("parse");
        let config = config_from_matches(&matches);
        assert_eq!(config.input_file, Some(PathBuf::from("in.wav")));
        assert_eq!(config.output_file, Some(PathBuf::from("out.wav")));
        assert_eq!(config.sample_rate, Some(96000.0));
    }

    #[test]
    fn test_malformed_sample_rate_is_a_usage_error() {
        assert!(
            build_cli()
                .try_get_matches_from(["streamcheck", "--sample-rate", "fast"])
                .is_err()
        );
    }

    #[test]
    fn test_unknown_option_is_a_usage_error() {
        assert!(
            build_cli()
                .try_get_matches_from(["streamcheck", "--loop-forever"])
                .is_err()
        );
    }
}
