//! Shared configuration loader for the nzymes tools.
//!
//! `defaults/nzymes.default.toml` is embedded into every binary so that docs and
//! runtime behavior stay in sync. Applications layer user-specific files on top
//! of those defaults via [`Loader`] before deserializing into [`NzymesConfig`].

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, ValueKind};
use nzymes::nzymes::sandbox::{Disabled, ProcessSandbox};
use nzymes::nzymes::{EngineOptions, Sandbox};
use serde::Deserialize;
use std::path::Path;

const DEFAULT_TOML: &str = include_str!("../defaults/nzymes.default.toml");

/// Top-level configuration consumed by nzymes applications.
#[derive(Debug, Clone, Deserialize)]
pub struct NzymesConfig {
    pub engine: EngineOptions,
    pub sandbox: SandboxConfig,
}

/// How stored code is run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SandboxConfig {
    pub enabled: bool,
    pub program: String,
    pub args: Vec<String>,
}

impl SandboxConfig {
    /// The sandbox this configuration describes.
    pub fn sandbox(&self) -> Box<dyn Sandbox> {
        if self.enabled {
            Box::new(ProcessSandbox::new(self.program.clone()).args(self.args.clone()))
        } else {
            Box::new(Disabled)
        }
    }
}

/// Helper for layering user overrides over the built-in defaults.
#[derive(Debug, Clone)]
pub struct Loader {
    builder: ConfigBuilder<DefaultState>,
}

impl Loader {
    /// Start a loader seeded with the embedded defaults.
    pub fn new() -> Self {
        let builder = Config::builder().add_source(File::from_str(DEFAULT_TOML, FileFormat::Toml));
        Self { builder }
    }

    /// Layer a configuration file. Missing files trigger an error.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(true);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Layer an optional configuration file (ignored if the file is absent).
    pub fn with_optional_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(false);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Apply a single key/value override (useful for CLI settings).
    pub fn set_override<I>(mut self, key: &str, value: I) -> Result<Self, ConfigError>
    where
        I: Into<ValueKind>,
    {
        self.builder = self.builder.set_override(key, value)?;
        Ok(self)
    }

    /// Finalize the builder and deserialize the resulting configuration.
    pub fn build(self) -> Result<NzymesConfig, ConfigError> {
        self.builder.build()?.try_deserialize()
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience helper for callers that only need the defaults.
pub fn load_defaults() -> Result<NzymesConfig, ConfigError> {
    Loader::new().build()
}
