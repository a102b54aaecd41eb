use std::process::ExitCode;
use std::sync::Arc;

use streamcheck::cli;
use streamcheck::run::Runner;
use streamcheck::synthetic::{SyntheticConfig, SyntheticDriver};

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    // Exits with code 2 on malformed options.
    let matches = cli::build_cli().get_matches();
    let config = cli::config_from_matches(&matches);

    // The harness runs against the bundled reference driver, standing in
    // for whatever driver a build would link against.
    let driver = Arc::new(SyntheticDriver::new(SyntheticConfig::default()));

    if Runner::new(config, driver).run() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}
