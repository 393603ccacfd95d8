mod config;
mod core;
mod credentials;
mod error;
mod logger;
mod prelude;
mod utility;

use std::process::ExitCode;

use crate::prelude::*;

const DEFAULT_CONFIG_PATH: &str = "kestrel.toml";

#[tokio::main]
async fn main() -> ExitCode {
    let cfg_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_owned());
    let config: Config = match config::read_or_create(&cfg_path) {
        Ok(config) => config,
        Err(why) => {
            eprintln!("Could not read the configuration from {}: {}", cfg_path, why);
            return ExitCode::FAILURE;
        }
    };

    let logger = configure_root(&config.log_target(), config.log_format());
    if let Err(why) = config.validate() {
        crit!(logger, "Invalid configuration"; "file" => &cfg_path, "reason" => why.to_string());
        eprintln!("Invalid configuration in {}: {}", cfg_path, why);
        return ExitCode::FAILURE;
    }

    let requirements = match BootstrapRequirements::from_config(logger.clone(), config) {
        Ok(requirements) => requirements,
        Err(why) => {
            crit!(logger, "Could not prepare the bootstrap"; "reason" => why.to_string());
            eprintln!("Startup failed: {}", why);
            return ExitCode::FAILURE;
        }
    };

    let state = match bootstrap(requirements).await {
        Ok(state) => state,
        Err(why) => {
            let reason = error_chain(&why);
            crit!(logger, "Startup aborted";
                "stage" => why.stage().map(|s| s.to_string()),
                "reason" => &reason,
            );
            eprintln!("Startup failed: {}", reason);
            return ExitCode::FAILURE;
        }
    };

    idle(state, shutdown_signal(logger.clone())).await;
    ExitCode::SUCCESS
}
