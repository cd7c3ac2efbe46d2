//! docker-image-runner: pull an image from Docker Hub and run a command inside it

use docker_image_runner::cli::{Args, Runner};
use docker_image_runner::config::RegistryConfig;
use docker_image_runner::error::Result;
use docker_image_runner::logging::Logger;
use docker_image_runner::runtime::ExitOutcome;
use std::process::ExitCode;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse_args().from_env();
    let output = if args.quiet {
        Logger::new_quiet()
    } else {
        Logger::new(args.verbose)
    };

    match run(args).await {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(e) => {
            output.error(&format!("{} (stage: {})", e, e.stage()));
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitOutcome> {
    let registry = RegistryConfig::from_env()?;
    let (config, request) = args.into_run(registry)?;
    Runner::new(config).run(&request).await
}
