// CLI argument parsing for the sdcard host tool

use clap::{Parser, Subcommand};
use std::io::{self, ErrorKind};
use std::path::PathBuf;

const CLI_AFTER_HELP: &str = "\
Paths are absolute paths on the medium, e.g. /lists/run.list.
The medium is a host directory: --root, else `root` in sdcard.toml
(read from --config or $SDCARD_HOME, default ~/.sdcard).

Failures print **ERROR: <code>,\"<message>\" and exit with status 1.";

/// sdcard - inspect and edit an instrument's storage medium from the host
#[derive(Parser, Debug)]
#[command(
    name = "sdcard",
    version,
    about = "Inspect and edit an instrument's storage medium from the host",
    after_help = CLI_AFTER_HELP
)]
pub struct Cli {
    /// Host directory backing the medium (overrides the config file)
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Configuration file (default: $SDCARD_HOME/sdcard.toml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log operation details to stderr
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// List a directory: name, kind tag and size per line
    Catalog {
        #[arg(default_value = "/")]
        dir: String,
    },
    /// Count the entries of a directory
    Count {
        #[arg(default_value = "/")]
        dir: String,
    },
    /// Write a file's raw bytes to stdout
    Upload { file: String },
    /// Store stdin in a file, appending unless --truncate is given
    Download {
        file: String,
        #[arg(long)]
        truncate: bool,
    },
    /// Copy a file, reporting progress on stderr
    Copy { src: String, dst: String },
    /// Rename a file or directory
    Move { src: String, dst: String },
    /// Delete a file
    Delete { path: String },
    /// Create a directory
    Mkdir { path: String },
    /// Remove an empty directory
    Rmdir { path: String },
    /// Print the local date of a file's last write
    Date { path: String },
    /// Print the local time of a file's last write
    Time { path: String },
    /// Print used, free and total bytes
    Usage,
    /// Succeed if the path exists
    Exists { path: String },
    /// Print the numbers stored in a text file, one per line
    Numbers {
        file: String,
        /// Separator between numbers
        #[arg(long, default_value = ",")]
        separator: char,
    },
}

/// Separator byte for the numeric scanner.
pub fn separator_byte(separator: char) -> io::Result<u8> {
    if !separator.is_ascii() {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            format!("separator must be a single ASCII character: {:?}", separator),
        ));
    }
    Ok(separator as u8)
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_cli(args: &str) -> Result<Cli, clap::Error> {
        let mut argv = vec!["sdcard"];
        argv.extend(args.split_whitespace());
        Cli::try_parse_from(argv)
    }

    #[test]
    fn test_catalog_defaults_to_root() {
        let cli = parse_cli("catalog").unwrap();
        assert_eq!(cli.command, Command::Catalog { dir: "/".into() });
        assert!(!cli.verbose);
        assert!(cli.root.is_none());
    }

    #[test]
    fn test_global_flags() {
        let cli = parse_cli("--root /tmp/card -v --config a.toml usage").unwrap();
        assert_eq!(cli.root, Some(PathBuf::from("/tmp/card")));
        assert_eq!(cli.config, Some(PathBuf::from("a.toml")));
        assert!(cli.verbose);
        assert_eq!(cli.command, Command::Usage);
    }

    #[test]
    fn test_download_truncate_flag() {
        let cli = parse_cli("download /a.bin --truncate").unwrap();
        assert_eq!(
            cli.command,
            Command::Download {
                file: "/a.bin".into(),
                truncate: true
            }
        );
        let cli = parse_cli("download /a.bin").unwrap();
        assert!(matches!(cli.command, Command::Download { truncate: false, .. }));
    }

    #[test]
    fn test_copy_needs_two_paths() {
        assert!(parse_cli("copy /a.bin").is_err());
        let cli = parse_cli("copy /a.bin /b.bin").unwrap();
        assert_eq!(
            cli.command,
            Command::Copy {
                src: "/a.bin".into(),
                dst: "/b.bin".into()
            }
        );
    }

    #[test]
    fn test_numbers_separator() {
        let cli = parse_cli("numbers /run.list --separator ;").unwrap();
        assert!(matches!(cli.command, Command::Numbers { separator: ';', .. }));
        assert_eq!(separator_byte(';').unwrap(), b';');
        assert!(separator_byte('§').is_err());
    }

    #[test]
    fn test_missing_subcommand_is_error() {
        assert!(parse_cli("").is_err());
        assert!(parse_cli("frobnicate").is_err());
    }
}
