// sdcard: host-side front end for the sdcard-core medium layer
// Drives a host-directory medium from the command line

mod cli;

use std::io::{self, IsTerminal, Read, Write};
use std::process::ExitCode;

use sdcard_core::driver::HostDriver;
use sdcard_core::{Frame, Medium, MediumConfig, ProgressSink, StorageError};
use thiserror::Error;

use crate::cli::{Cli, Command};

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Copy progress as a percentage on stderr.
struct PercentProgress {
    last: Option<u64>,
    interactive: bool,
}

impl PercentProgress {
    fn new() -> Self {
        Self {
            last: None,
            interactive: io::stderr().is_terminal(),
        }
    }
}

impl ProgressSink for PercentProgress {
    fn update(&mut self, current: u64, total: u64) -> bool {
        let percent = if total == 0 { 100 } else { current * 100 / total };
        if self.last != Some(percent) {
            self.last = Some(percent);
            if self.interactive {
                eprint!("\r{:3}%", percent);
            } else {
                eprintln!("{}%", percent);
            }
        }
        true
    }

    fn hide(&mut self) {
        if self.interactive && self.last.is_some() {
            eprintln!();
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

fn load_config(cli: &Cli) -> io::Result<MediumConfig> {
    let mut config = match &cli.config {
        Some(path) => MediumConfig::load(path)?,
        None => MediumConfig::load_default()?,
    };
    // CLI flag overrides config setting
    if let Some(root) = &cli.root {
        config.root = root.clone();
    }
    Ok(config)
}

fn execute(medium: &mut Medium<HostDriver>, command: Command) -> Result<(), CliError> {
    let mut out = io::stdout().lock();
    match command {
        Command::Catalog { dir } => {
            let mut lines = Vec::new();
            medium.list_entries(&dir, |entry| {
                lines.push(format!("{}\t{}\t{}", entry.name, entry.kind, entry.size));
            })?;
            for line in lines {
                writeln!(out, "{}", line)?;
            }
        }
        Command::Count { dir } => {
            writeln!(out, "{}", medium.count_entries(&dir)?)?;
        }
        Command::Upload { file } => {
            let mut sink_error = None;
            medium.upload(&file, |frame| {
                if let Frame::Data(bytes) = frame {
                    if sink_error.is_none() {
                        sink_error = out.write_all(bytes).err();
                    }
                }
            })?;
            if let Some(e) = sink_error {
                return Err(e.into());
            }
        }
        Command::Download { file, truncate } => {
            let mut data = Vec::new();
            io::stdin().lock().read_to_end(&mut data)?;
            medium.download(&file, truncate, &data)?;
        }
        Command::Copy { src, dst } => {
            medium.copy_file(&src, &dst, &mut PercentProgress::new())?;
        }
        Command::Move { src, dst } => medium.move_entry(&src, &dst)?,
        Command::Delete { path } => medium.delete_entry(&path)?,
        Command::Mkdir { path } => medium.make_directory(&path)?,
        Command::Rmdir { path } => medium.remove_directory(&path)?,
        Command::Date { path } => {
            writeln!(out, "{}", medium.get_date(&path)?)?;
        }
        Command::Time { path } => {
            writeln!(out, "{}", medium.get_time(&path)?)?;
        }
        Command::Usage => {
            let usage = medium.usage_info()?;
            writeln!(
                out,
                "used {}\nfree {}\ntotal {}",
                usage.used_bytes,
                usage.free_bytes,
                usage.total_bytes()
            )?;
        }
        Command::Exists { path } => medium.exists(&path)?,
        Command::Numbers { file, separator } => {
            let separator = cli::separator_byte(separator)?;
            let values = medium.open_scanner(&file)?.collect_floats(separator)?;
            for value in values {
                writeln!(out, "{}", value)?;
            }
        }
    }
    out.flush()?;
    Ok(())
}

fn main() -> ExitCode {
    let cli = cli::parse();
    init_logging(cli.verbose);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("sdcard: {}", e);
            return ExitCode::from(2);
        }
    };
    let mut medium = config.open_host();
    log::debug!(
        "medium root: {}, zone: {:?}",
        medium.driver().root().display(),
        medium.bridge().zone()
    );
    medium.initialize();

    match execute(&mut medium, cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Storage(e)) => {
            eprintln!("**ERROR: {},\"{}\"", e.code(), e);
            ExitCode::FAILURE
        }
        Err(CliError::Io(e)) => {
            eprintln!("sdcard: {}", e);
            ExitCode::FAILURE
        }
    }
}
