//! Command-line argument parsing

use crate::config::{RegistryConfig, RunConfig};
use crate::error::{Result, RunnerError};
use crate::image::ImageReference;
use crate::cli::runner::RunRequest;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "docker-image-runner")]
#[command(about = "Pull a Docker Hub image and run a command inside it")]
#[command(version, author)]
pub struct Args {
    /// Verbose output
    #[arg(long = "verbose", short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Only report errors
    #[arg(long = "quiet", short = 'q', global = true, help = "Suppress progress output")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a command inside an image
    Run(RunArgs),
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Image reference, e.g. busybox or alpine:3.19
    #[arg(value_name = "IMAGE")]
    pub image: String,

    /// Absolute path of the command followed by its arguments
    #[arg(
        value_name = "COMMAND",
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command_line: Vec<String>,

    /// Check each layer blob against its sha256 digest
    #[arg(long = "verify-digests", help = "Verify layer digests before unpacking")]
    pub verify_digests: bool,
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }

    /// Load settings from environment variables where flags were not given
    pub fn from_env(mut self) -> Self {
        if std::env::var("DOCKER_RUNNER_VERBOSE").is_ok() {
            self.verbose = true;
        }

        let Commands::Run(run) = &mut self.command;
        if std::env::var("DOCKER_RUNNER_VERIFY_DIGESTS").is_ok() {
            run.verify_digests = true;
        }

        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.verbose && self.quiet {
            return Err(RunnerError::Config(
                "--verbose and --quiet cannot be used together".to_string(),
            ));
        }

        let Commands::Run(run) = &self.command;
        ImageReference::parse(&run.image)?;
        match run.command_line.first() {
            Some(command) if command.starts_with('/') => Ok(()),
            Some(command) => Err(RunnerError::Config(format!(
                "Command must be an absolute path: {}",
                command
            ))),
            None => Err(RunnerError::Config("No command given".to_string())),
        }
    }

    /// Split into run settings and the run request
    pub fn into_run(self, registry: RegistryConfig) -> Result<(RunConfig, RunRequest)> {
        self.validate()?;

        let Commands::Run(run) = self.command;
        let image = ImageReference::parse(&run.image)?;
        let mut command_line = run.command_line.into_iter();
        let command = command_line
            .next()
            .map(PathBuf::from)
            .ok_or_else(|| RunnerError::Config("No command given".to_string()))?;

        let config = RunConfig {
            registry,
            verbose: self.verbose,
            quiet: self.quiet,
            verify_digests: run.verify_digests,
            ..RunConfig::default()
        };
        let request = RunRequest {
            image,
            command,
            args: command_line.collect(),
        };

        Ok((config, request))
    }
}
