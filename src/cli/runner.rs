//! Runner that drives one container run from image reference to exit code

use crate::config::RunConfig;
use crate::error::{Result, RunnerError};
use crate::image::ImageReference;
use crate::logging::Logger;
use crate::registry::RegistryClient;
use crate::rootfs::{LayerMaterializer, LayerStats, RootWorkspace, StageOutcome, stage_binary};
use crate::runtime::{ExitOutcome, IsolatedExecutor, Isolation};
use std::path::{Path, PathBuf};

/// What to run and where it comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub image: ImageReference,
    /// Absolute path, resolved inside the container root
    pub command: PathBuf,
    pub args: Vec<String>,
}

pub struct Runner {
    config: RunConfig,
    output: Logger,
}

impl Runner {
    pub fn new(config: RunConfig) -> Self {
        let output = if config.quiet {
            Logger::new_quiet()
        } else {
            Logger::new(config.verbose)
        };

        Self { config, output }
    }

    pub fn output(&self) -> &Logger {
        &self.output
    }

    /// Pull, assemble, execute. The temporary root is gone when this returns,
    /// whatever the outcome.
    pub async fn run(&self, request: &RunRequest) -> Result<ExitOutcome> {
        self.output.section(&format!("Running {}", request.image));

        let workspace = self.allocate_root()?;
        let stats = self.prepare_root(request, workspace.path()).await?;
        self.output.success(&format!(
            "Root filesystem ready in {}",
            self.output.format_duration(self.output.elapsed())
        ));
        self.output.summary_kv(
            "Root filesystem",
            &[
                ("Path", workspace.path().display().to_string()),
                ("Entries", stats.entries().to_string()),
                ("Written", self.output.format_size(stats.bytes)),
            ],
        );

        let outcome = self.execute(request, workspace.path()).await?;
        match outcome {
            ExitOutcome::Exited(code) => self
                .output
                .verbose(&format!("{} exited with code {}", request.command.display(), code)),
            ExitOutcome::Signaled(signal) => self.output.warning(&format!(
                "{} terminated by signal {}",
                request.command.display(),
                signal
            )),
        }

        drop(workspace);
        Ok(outcome)
    }

    fn allocate_root(&self) -> Result<RootWorkspace> {
        match &self.config.root_parent {
            Some(parent) => {
                RootWorkspace::create_in(parent, &self.config.root_prefix, self.output.clone())
            }
            None => RootWorkspace::create(&self.config.root_prefix, self.output.clone()),
        }
    }

    /// Authenticate, fetch the manifest, unpack every layer into `root` and
    /// stage the command binary. Nothing is executed.
    pub async fn prepare_root(&self, request: &RunRequest, root: &Path) -> Result<LayerStats> {
        self.output.step(&format!("Requesting pull token for {}", request.image));
        let client = RegistryClient::builder(self.config.registry.clone())
            .with_logger(self.output.clone())
            .build(&request.image)
            .await?;

        self.output.step(&format!("Fetching manifest for {}", request.image));
        let manifest = client.pull_manifest(&request.image).await?;
        self.output.info(&format!(
            "{} layers, {} compressed",
            manifest.layers.len(),
            self.output.format_size(manifest.total_size())
        ));

        let stats = LayerMaterializer::new(&client, self.output.clone())
            .with_digest_verification(self.config.verify_digests)
            .materialize_all(&request.image, &manifest, root)
            .await?;

        match stage_binary(&request.command, root, &self.output)? {
            StageOutcome::AlreadyPresent(_) => {
                self.output.verbose("Command found in image");
            }
            StageOutcome::Copied(path) => {
                self.output
                    .verbose(&format!("Command staged at {}", path.display()));
            }
        }

        Ok(stats)
    }

    /// Run the command against an assembled root and wait for it.
    ///
    /// The executor works on a blocking thread: the PID namespace request
    /// applies to the calling thread, and waiting on the child must not stall
    /// the runtime.
    pub async fn execute(&self, request: &RunRequest, root: &Path) -> Result<ExitOutcome> {
        let isolation = if self.config.isolate {
            Isolation::container(root)
        } else {
            self.output
                .warning("Isolation disabled; the command runs on the host");
            Isolation::disabled()
        };

        self.output.step(&format!(
            "Executing {} {}",
            request.command.display(),
            request.args.join(" ")
        ));

        let mut executor = IsolatedExecutor::new(isolation, self.output.clone());
        let command = request.command.clone();
        let args = request.args.clone();
        tokio::task::spawn_blocking(move || executor.run(&command, &args))
            .await
            .map_err(|e| RunnerError::Exec(format!("Executor thread failed: {}", e)))?
    }
}
