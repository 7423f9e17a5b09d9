//! Desktop simulator for the ccm-hello onboarding sequence.
//!
//! Runs the same [`Sequencer`] the firmware runs, but the UART is replaced
//! by an in-memory [`SimulatedModule`] that answers the AT command set.
//! Long waits are scaled down by `CCM_SIM_TIME_SCALE` so a full cloud-sync
//! run finishes in about a second.
//!
//! ```text
//! RUST_LOG=debug CCM_FLOW=aws-direct CCM_SIM_SCENARIO=flaky-connect cargo run -p ccm-simulator
//! cargo run -p ccm-simulator -- config.json
//! ```

mod module;
mod settings;

use std::path::PathBuf;
use std::process::ExitCode;

use ccm_core::{AtResources, Sequencer};
use embassy_futures::block_on;
// Links the host time driver that atat's timeouts run on
use embassy_time as _;
use log::{error, info, warn};

use module::SimulatedModule;
use settings::Settings;

const BANNER: &str = "******************AIROC™ CCM MQTT HELLO WORLD******************";

fn main() -> ExitCode {
    // `.env` may set RUST_LOG, so it is read before the logger starts
    let dotenv = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match dotenv {
        Ok(path) => info!("Loaded {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => warn!("Ignoring .env: {}", e),
    }

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let settings = match Settings::load(config_path.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("{}", BANNER);
    info!(
        "Scenario {:?}, flow {:?}, onboarding {:?}, time scale {}",
        settings.scenario, settings.config.flow, settings.config.onboarding, settings.time_scale
    );

    // -----------------------------------------------------------------------
    // Wire the sequencer to the simulated module
    // -----------------------------------------------------------------------

    let config = &settings.config;
    let module = SimulatedModule::new(settings.scenario);
    let (rx, tx) = module.serial();

    let mut resources = AtResources::new();
    let (ingress, client) = resources.split(rx, tx, config.ping_host.clone());
    let mut sequencer = Sequencer::new(client, settings.delay(), settings.policy, config);

    let result = block_on(ingress.run_with(sequencer.run()));

    match result {
        Ok(report) => {
            info!(
                "Done: {:?} flow, already connected: {}, onboarded: {}, connect attempts: {}, published: {}",
                report.flow,
                report.already_connected,
                report.onboarded,
                report.connect_attempts,
                report.published
            );
            for (topic, payload) in module.published() {
                info!("Published {:?} on {}", payload, topic);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Run failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
