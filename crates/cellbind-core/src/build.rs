//! Ordered build steps run through the launcher.
//!
//! A [`BuildPlan`] stands in for a build tool: it looks up the launcher once
//! when it starts and calls it for every compile and link step. Whatever
//! capture scope is active at that moment decides how the output is handled.

use std::sync::Arc;
use std::time::Instant;

use crate::error::Result;
use crate::spawn::{self, Spawn, SpawnOptions};

/// One compiler or linker invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStep {
    /// Short description for logs (e.g. "compile cell_3.cpp").
    pub label: String,

    /// Executable followed by its arguments.
    pub command: Vec<String>,
}

impl BuildStep {
    /// A step called `label` running `command`.
    pub fn new<I, S>(label: impl Into<String>, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            label: label.into(),
            command: command.into_iter().map(Into::into).collect(),
        }
    }
}

/// Steps of one extension build, run in order.
#[derive(Debug, Clone, Default)]
pub struct BuildPlan {
    steps: Vec<BuildStep>,
    options: SpawnOptions,
}

impl BuildPlan {
    /// An empty plan with default [`SpawnOptions`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Flags passed to the launcher for every step.
    pub fn with_options(mut self, options: SpawnOptions) -> Self {
        self.options = options;
        self
    }

    /// Append a step.
    pub fn step<I, S>(mut self, label: impl Into<String>, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps.push(BuildStep::new(label, command));
        self
    }

    /// Append an already built step.
    pub fn push(&mut self, step: BuildStep) {
        self.steps.push(step);
    }

    /// Steps in the order they run.
    pub fn steps(&self) -> &[BuildStep] {
        &self.steps
    }

    /// Flags every step is launched with.
    pub fn options(&self) -> &SpawnOptions {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step through the process-wide launcher.
    ///
    /// The launcher is looked up once, before the first step.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Build`](crate::Error::Build) for the first step that
    /// fails to launch or exits unsuccessfully. Later steps do not run.
    pub fn run(&self) -> Result<()> {
        let launcher: Arc<dyn Spawn> = spawn::launcher();
        self.run_with(launcher.as_ref())
    }

    /// Run every step through `launcher`, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Same as [`BuildPlan::run`].
    pub fn run_with(&self, launcher: &dyn Spawn) -> Result<()> {
        let start = Instant::now();

        for (index, step) in self.steps.iter().enumerate() {
            tracing::debug!(step = index + 1, total = self.steps.len(), "{}", step.label);
            if let Err(e) = launcher.spawn(&step.command, &self.options) {
                tracing::warn!("Build step '{}' failed: {}", step.label, e);
                return Err(e.into());
            }
        }

        tracing::debug!(
            "Build finished: {} steps in {}ms",
            self.steps.len(),
            start.elapsed().as_millis()
        );
        Ok(())
    }
}
