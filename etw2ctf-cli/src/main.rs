//! Command-line front end for the `etw2ctf` library: parses options
//! (grounded on the original `main.cpp`'s `Options`/`ParseOptions`), wires
//! the platform [`etw2ctf::provider::windows::WindowsProviderApi`] to a
//! [`etw2ctf::PipelineDriver`], and maps pipeline errors to a process exit
//! code.

mod output;

use clap::{CommandFactory, Parser};
use etw2ctf::PipelineDriver;
use etw2ctf::provider::windows::WindowsProviderApi;
use log::{error, info};
use output::DirectoryStreamSink;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Converts ETW traces into CTF traces.
#[derive(Parser, Debug)]
#[command(name = "etw2ctf", version, about = "Converts ETW traces to CTF traces")]
struct Cli {
    /// Input ETW trace files to convert.
    files: Vec<PathBuf>,

    /// Output directory for the produced CTF trace.
    #[arg(long, default_value = "ctf")]
    output: PathBuf,

    /// Overwrite the output directory's existing top-level files.
    #[arg(long)]
    overwrite: bool,

    /// Split each ETW buffer into a separate CTF stream.
    #[arg(long = "split-buffer")]
    split_buffer: bool,

    /// Split the CTF stream into packets of this many bytes.
    #[arg(long = "packet-size", default_value_t = 4096)]
    packet_size: usize,
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();

    // No positional files at all: print usage and succeed, matching the
    // original's "no arguments" behavior -- this never touches the
    // filesystem.
    if cli.files.is_empty() {
        Cli::command().print_help().ok();
        println!();
        return ExitCode::SUCCESS;
    }

    if cli.packet_size <= 1 {
        eprintln!("invalid packet size '{}': must be greater than 1", cli.packet_size);
        return ExitCode::FAILURE;
    }

    // Missing input files are a fatal pre-flight error, checked before any
    // I/O -- including before the output directory is created.
    for file in &cli.files {
        if !file.exists() {
            eprintln!("input file not found: {}", file.display());
            return ExitCode::FAILURE;
        }
    }

    let mut sink = match DirectoryStreamSink::open_folder(&cli.output, cli.overwrite) {
        Ok(sink) => sink,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let mut provider = WindowsProviderApi::new();
    let mut driver = PipelineDriver::new(cli.packet_size);
    let file_refs: Vec<&Path> = cli.files.iter().map(PathBuf::as_path).collect();

    return match driver.convert(&mut provider, &file_refs, &mut sink, cli.split_buffer) {
        Ok(()) => {
            info!(
                "wrote {} input file(s) to {} ({} distinct event layouts)",
                cli.files.len(),
                cli.output.display(),
                driver.layout_count()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    };
}
