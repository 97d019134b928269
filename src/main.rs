use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use wasmdis::{
    collapse::DEFAULT_DEAD_MNEMONIC,
    compile::CompileTier,
    decoder::CapstoneDecoder,
    inputs::{InputLayout, LoadedInputs},
    report::{NameFilter, Progress, ReportEmitter, ReportOptions},
    Architecture,
};

/// Name of the report written into the output directory
const REPORT_FILE: &str = "disassembly.txt";

/// Annotated native disassembly of a WebAssembly module compiled by SpiderMonkey.
///
/// INPUT is either a `.wasm` file, which is compiled with the SpiderMonkey
/// shell first, or a prefix `DIR/NAME` where `DIR` already holds
/// `NAME.wasm`, `NAME.bin` and `NAME.segments.json`.
#[derive(Parser, Debug)]
#[command(name = "wasmdis", version, about, long_about = None)]
struct Cli {
    /// Module to compile, or prefix of previously extracted artifacts
    input: PathBuf,

    /// Directory receiving the compiled artifacts and disassembly.txt
    output_dir: PathBuf,

    /// Case-insensitive regex a function name must match to be disassembled
    filter: Option<String>,

    /// Compilation tier used when compiling a module
    #[arg(long, value_enum, default_value_t = CompileTier::Stable)]
    tier: CompileTier,

    /// Architecture of the native code
    #[arg(long, value_enum, default_value_t = Architecture::X86_64)]
    arch: Architecture,

    /// Mnemonic treated as padding and collapsed into "..."
    #[arg(long, default_value = DEFAULT_DEAD_MNEMONIC)]
    dead_mnemonic: String,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

/// In-place progress on a terminal, every fifth segment.
fn show_progress(p: Progress) {
    if p.index % 5 == 0 {
        eprint!("\r {} / {} ...      ", p.index, p.total);
        let _ = io::stderr().flush();
    }
}

fn run(cli: &Cli) -> Result<PathBuf> {
    let filter = cli
        .filter
        .as_deref()
        .filter(|f| !f.trim().is_empty())
        .map(NameFilter::new)
        .transpose()
        .context("invalid function name filter")?;

    let layout = InputLayout::detect(&cli.input)?;
    let artifacts = layout
        .prepare(&cli.output_dir, cli.tier)
        .with_context(|| format!("failed to produce native code for {}", cli.input.display()))?;
    let inputs = LoadedInputs::load(layout.wasm(), &artifacts)?;

    let decoder = CapstoneDecoder::for_architecture(cli.arch)
        .with_context(|| format!("failed to create {} decoder", cli.arch))?;
    let options = ReportOptions {
        dead_mnemonic: cli.dead_mnemonic.clone(),
        ..ReportOptions::default()
    };
    let mut emitter = ReportEmitter::new(&decoder, &inputs.code, &inputs.segments, options)
        .with_module(&inputs.module);
    if let Some(filter) = filter {
        emitter = emitter.with_filter(filter);
    }

    std::fs::create_dir_all(&cli.output_dir)
        .with_context(|| format!("failed to create {}", cli.output_dir.display()))?;
    let output_path = cli.output_dir.join(REPORT_FILE);

    log::info!("performing disassembly");
    write_report(&emitter, &output_path)
        .with_context(|| format!("failed to write {}", output_path.display()))?;

    Ok(output_path)
}

fn write_report(emitter: &ReportEmitter<'_, CapstoneDecoder>, path: &Path) -> Result<()> {
    if !io::stderr().is_terminal() {
        emitter.write_to(path)?;
        return Ok(());
    }

    let mut out = io::BufWriter::new(std::fs::File::create(path)?);
    emitter.emit_with_progress(&mut out, show_progress)?;
    out.flush()?;
    eprint!("\r");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let output_path = run(&cli)?;
    println!("Complete. Results written to {}.", output_path.display());
    Ok(())
}
