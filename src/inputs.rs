//! Locating and loading the three inputs of a run.
//!
//! Two layouts are accepted:
//!
//! - a `.wasm` file, which is compiled into the output directory first;
//! - a prefix `DIR/NAME` with `NAME.wasm`, `NAME.bin` and
//!   `NAME.segments.json` already present in `DIR`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::compile::{CompileTier, CompiledArtifacts, SpiderMonkey};
use crate::module::ModuleInfo;
use crate::segment::SegmentMap;
use crate::DisassemblyError;

/// Errors raised while locating or reading inputs
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    /// A required input file does not exist
    #[error("{what} not found: {}", path.display())]
    Missing { what: &'static str, path: PathBuf },

    /// An input file exists but could not be read
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where the module and its native code come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputLayout {
    /// A module that still has to be compiled
    Module { wasm: PathBuf },
    /// A module with previously extracted native code
    Prebuilt {
        wasm: PathBuf,
        artifacts: CompiledArtifacts,
    },
}

impl InputLayout {
    /// Decide the layout for `input`.
    ///
    /// An existing file is a module to compile; anything else is treated as
    /// a prefix whose three files must all exist.
    pub fn detect(input: &Path) -> Result<Self, InputError> {
        if input.is_file() {
            return Ok(InputLayout::Module {
                wasm: input.to_path_buf(),
            });
        }

        let artifacts = CompiledArtifacts::with_prefix(input);
        require("binary", &artifacts.code)?;
        require("segments", &artifacts.segments)?;

        let mut wasm = input.as_os_str().to_owned();
        wasm.push(".wasm");
        let wasm = PathBuf::from(wasm);
        require("wasm module", &wasm)?;

        Ok(InputLayout::Prebuilt { wasm, artifacts })
    }

    pub fn wasm(&self) -> &Path {
        match self {
            InputLayout::Module { wasm } | InputLayout::Prebuilt { wasm, .. } => wasm,
        }
    }

    /// Produce the native code artifacts, compiling when needed.
    pub fn prepare(
        &self,
        out_dir: &Path,
        tier: CompileTier,
    ) -> Result<CompiledArtifacts, DisassemblyError> {
        match self {
            InputLayout::Prebuilt { artifacts, .. } => Ok(artifacts.clone()),
            InputLayout::Module { wasm } => {
                let shell = SpiderMonkey::locate()?;
                Ok(shell.compile(wasm, out_dir, tier)?)
            }
        }
    }
}

fn require(what: &'static str, path: &Path) -> Result<(), InputError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(InputError::Missing {
            what,
            path: path.to_path_buf(),
        })
    }
}

fn read(path: &Path) -> Result<Vec<u8>, InputError> {
    fs::read(path).map_err(|source| InputError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Everything a report is built from, loaded and cross-referenced.
#[derive(Debug, Clone)]
pub struct LoadedInputs {
    pub module: ModuleInfo,
    /// Segments with names already resolved
    pub segments: SegmentMap,
    pub code: Vec<u8>,
}

impl LoadedInputs {
    pub fn load(wasm: &Path, artifacts: &CompiledArtifacts) -> Result<Self, DisassemblyError> {
        log::info!("analyzing module {}", wasm.display());
        let module = ModuleInfo::parse(&read(wasm)?)?;

        log::info!("processing segment data");
        let segments = SegmentMap::from_reader(read(&artifacts.segments)?.as_slice())?
            .resolve_all(&module.function_names);

        let code = read(&artifacts.code)?;
        log::debug!(
            "{} segments ({} functions), {} bytes of native code",
            segments.len(),
            segments.functions().count(),
            code.len()
        );

        Ok(Self {
            module,
            segments,
            code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TINY: &[u8] = include_bytes!("../tests/fixtures/tiny.wasm");

    fn write_prebuilt(dir: &Path, segments: &str) -> PathBuf {
        let prefix = dir.join("tiny");
        fs::write(dir.join("tiny.wasm"), TINY).unwrap();
        fs::write(dir.join("tiny.bin"), [0x55, 0xc3, 0xf4, 0xf4]).unwrap();
        fs::write(dir.join("tiny.segments.json"), segments).unwrap();
        prefix
    }

    #[test]
    fn test_existing_file_is_module_layout() {
        let dir = tempfile::tempdir().unwrap();
        let wasm = dir.path().join("m.wasm");
        fs::write(&wasm, TINY).unwrap();

        assert_eq!(InputLayout::detect(&wasm).unwrap(), InputLayout::Module { wasm: wasm.clone() });
    }

    #[test]
    fn test_prefix_is_prebuilt_layout() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = write_prebuilt(dir.path(), "[]");

        let layout = InputLayout::detect(&prefix).unwrap();
        assert_eq!(layout.wasm(), dir.path().join("tiny.wasm"));
        match layout {
            InputLayout::Prebuilt { artifacts, .. } => {
                assert_eq!(artifacts.code, dir.path().join("tiny.bin"));
                assert_eq!(artifacts.segments, dir.path().join("tiny.segments.json"));
            }
            other => panic!("expected prebuilt layout, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_prebuilt_files_are_named() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("tiny");

        let err = InputLayout::detect(&prefix).unwrap_err();
        assert!(matches!(err, InputError::Missing { what: "binary", .. }));

        fs::write(dir.path().join("tiny.bin"), [0xc3]).unwrap();
        let err = InputLayout::detect(&prefix).unwrap_err();
        assert!(matches!(err, InputError::Missing { what: "segments", .. }));

        fs::write(dir.path().join("tiny.segments.json"), "[]").unwrap();
        let err = InputLayout::detect(&prefix).unwrap_err();
        assert!(err.to_string().starts_with("wasm module not found"));
    }

    #[test]
    fn test_load_resolves_names() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = write_prebuilt(
            dir.path(),
            r#"[{ "kind": 0, "begin": 0, "end": 4,
                  "funcIndex": 1, "funcBodyBegin": 0, "funcBodyEnd": 2 }]"#,
        );
        let layout = InputLayout::detect(&prefix).unwrap();
        let artifacts = layout.prepare(dir.path(), CompileTier::Stable).unwrap();

        let inputs = LoadedInputs::load(layout.wasm(), &artifacts).unwrap();
        assert_eq!(inputs.code.len(), 4);
        assert_eq!(inputs.module.import_count, 1);
        let seg = inputs.segments.iter().next().unwrap();
        assert_eq!(seg.name.as_deref(), Some("helper"));
    }

    #[test]
    fn test_load_rejects_bad_segments() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = write_prebuilt(dir.path(), r#"[{ "kind": 0 }]"#);
        let layout = InputLayout::detect(&prefix).unwrap();
        let artifacts = layout.prepare(dir.path(), CompileTier::Stable).unwrap();

        let err = LoadedInputs::load(layout.wasm(), &artifacts).unwrap_err();
        assert!(matches!(err, DisassemblyError::Segments(_)));
    }
}
