//! Compiling a module to native code with the SpiderMonkey shell.
//!
//! The shell runs a small driver script that calls `wasmExtractCode` and
//! writes two artifacts next to each other: the raw code buffer
//! (`wasm.bin`) and the segment metadata (`wasm.segments.json`).

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

/// Environment variable naming the shell explicitly
pub const SHELL_ENV: &str = "WASMDIS_SPIDERMONKEY";

/// Prefix of the artifacts written into the output directory
pub const ARTIFACT_STEM: &str = "wasm";

const DRIVER_NAME: &str = "spidermonkey-driver.js";
const DRIVER_SOURCE: &str = include_str!("../driver/spidermonkey-driver.js");

/// Errors raised while producing native code
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// No usable shell was found
    #[error("no SpiderMonkey shell found (tried {0}); set WASMDIS_SPIDERMONKEY or use jsvu")]
    NotFound(String),

    /// The shell could not be started
    #[error("failed to run {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The shell ran but reported failure
    #[error("{} exited with {status}", path.display())]
    Failed { path: PathBuf, status: ExitStatus },

    /// The shell succeeded but an artifact is missing
    #[error("compiler output not found: {}", .0.display())]
    MissingOutput(PathBuf),

    /// Preparing the output directory failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Compilation tier passed to `wasmExtractCode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CompileTier {
    /// Whatever tier the engine settles on
    #[default]
    Stable,
    /// The best tier available
    Best,
    /// Baseline compiler only
    Baseline,
    /// Optimizing compiler only
    Ion,
}

impl fmt::Display for CompileTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileTier::Stable => write!(f, "stable"),
            CompileTier::Best => write!(f, "best"),
            CompileTier::Baseline => write!(f, "baseline"),
            CompileTier::Ion => write!(f, "ion"),
        }
    }
}

/// Paths of a compiled module's native code and segment metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledArtifacts {
    pub code: PathBuf,
    pub segments: PathBuf,
}

impl CompiledArtifacts {
    /// Artifacts written under `prefix`: `prefix.bin` and `prefix.segments.json`.
    pub fn with_prefix(prefix: &Path) -> Self {
        let mut code = prefix.as_os_str().to_owned();
        code.push(".bin");
        let mut segments = prefix.as_os_str().to_owned();
        segments.push(".segments.json");
        Self {
            code: code.into(),
            segments: segments.into(),
        }
    }

    /// The first artifact that does not exist, if any.
    pub fn first_missing(&self) -> Option<&Path> {
        [&self.code, &self.segments]
            .into_iter()
            .find(|p| !p.is_file())
            .map(PathBuf::as_path)
    }
}

/// A SpiderMonkey JS shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiderMonkey {
    shell: PathBuf,
}

impl SpiderMonkey {
    pub fn new(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    /// Find the shell from `WASMDIS_SPIDERMONKEY` or the jsvu install directory.
    pub fn locate() -> Result<Self, CompileError> {
        if let Some(path) = std::env::var_os(SHELL_ENV) {
            return Ok(Self::new(path));
        }

        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from);
        let candidates = jsvu_candidates(home.as_deref());

        candidates
            .iter()
            .find(|p| p.is_file())
            .map(Self::new)
            .ok_or_else(|| {
                let looked = candidates
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                CompileError::NotFound(looked)
            })
    }

    pub fn shell(&self) -> &Path {
        &self.shell
    }

    /// Compile `module` and write the artifacts into `out_dir`.
    pub fn compile(
        &self,
        module: &Path,
        out_dir: &Path,
        tier: CompileTier,
    ) -> Result<CompiledArtifacts, CompileError> {
        fs::create_dir_all(out_dir)?;

        let driver = out_dir.join(DRIVER_NAME);
        fs::write(&driver, DRIVER_SOURCE)?;

        let prefix = out_dir.join(ARTIFACT_STEM);
        let artifacts = CompiledArtifacts::with_prefix(&prefix);

        log::info!("compiling {} with {} (tier {})", module.display(), self.shell.display(), tier);
        let status = Command::new(&self.shell)
            .arg(&driver)
            .arg(module)
            .arg(&prefix)
            .arg(tier.to_string())
            .status()
            .map_err(|source| CompileError::Spawn {
                path: self.shell.clone(),
                source,
            })?;

        if !status.success() {
            return Err(CompileError::Failed {
                path: self.shell.clone(),
                status,
            });
        }

        if let Some(missing) = artifacts.first_missing() {
            return Err(CompileError::MissingOutput(missing.to_path_buf()));
        }
        Ok(artifacts)
    }
}

/// Shell locations jsvu installs to, in order of preference.
fn jsvu_candidates(home: Option<&Path>) -> Vec<PathBuf> {
    let Some(home) = home else {
        return Vec::new();
    };
    let jsvu = home.join(".jsvu");
    vec![jsvu.join("sm"), jsvu.join("sm.cmd")]
}
