use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process::{ExitCode, ExitStatus};

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use sdiff::config::{self, Config, DiffFlags, DEFAULT_DIFF_PROGRAM};
use sdiff::diffproc::DiffProcess;
use sdiff::error::{SdiffError, EXIT_TROUBLE, EXIT_USAGE};
use sdiff::merge::{Merger, ShellEditor};
use sdiff::sync::{DisplayOnly, Finish, SpanSink, Synchronizer};

const LOG_ENV: &str = "SDIFF_LOG";

#[derive(Debug, Parser)]
#[command(
    name = "sdiff",
    version,
    about = "Compare two files side by side and optionally merge them"
)]
struct Cli {
    /// Left file.
    file1: PathBuf,

    /// Right file.
    file2: PathBuf,

    /// Treat all files as text.
    #[arg(short = 'a', long)]
    text: bool,

    /// Ignore changes whose lines are all blank.
    #[arg(short = 'B', long)]
    ignore_blank_lines: bool,

    /// Ignore changes in the amount of white space.
    #[arg(short = 'b', long)]
    ignore_space_change: bool,

    /// Program used to compare the files.
    #[arg(short = 'D', long, value_name = "PROGRAM", default_value = DEFAULT_DIFF_PROGRAM)]
    diff_program: PathBuf,

    /// Try hard to find a smaller set of changes.
    #[arg(short = 'd', long)]
    minimal: bool,

    /// Ignore changes due to tab expansion.
    #[arg(short = 'E', long)]
    ignore_tab_expansion: bool,

    /// Assume large files with many scattered small changes.
    #[arg(short = 'H', long)]
    speed_large_files: bool,

    /// Ignore changes whose lines all match RE. May be repeated.
    #[arg(short = 'I', long, value_name = "RE")]
    ignore_matching_lines: Vec<String>,

    /// Ignore case differences.
    #[arg(short = 'i', long)]
    ignore_case: bool,

    /// Show only the left column of common lines.
    #[arg(short = 'l', long)]
    left_column: bool,

    /// Merge interactively into FILE.
    #[arg(short = 'o', long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Strip trailing carriage return on input.
    #[arg(short = 'S', long)]
    strip_trailing_cr: bool,

    /// Do not show common lines.
    #[arg(short = 's', long)]
    suppress_common_lines: bool,

    /// Expand tabs to spaces in output.
    #[arg(short = 't', long)]
    expand_tabs: bool,

    /// Ignore all white space.
    #[arg(short = 'W', long)]
    ignore_all_space: bool,

    /// Total output width in columns.
    #[arg(short = 'w', long, value_name = "NUM")]
    width: Option<usize>,
}

impl Cli {
    fn into_config(self) -> (Config, PathBuf, PathBuf) {
        let config = Config {
            diff_program: self.diff_program,
            diff_flags: DiffFlags {
                text: self.text,
                ignore_blank_lines: self.ignore_blank_lines,
                ignore_space_change: self.ignore_space_change,
                minimal: self.minimal,
                ignore_tab_expansion: self.ignore_tab_expansion,
                speed_large_files: self.speed_large_files,
                ignore_case: self.ignore_case,
                ignore_all_space: self.ignore_all_space,
                ignore_matching_lines: self.ignore_matching_lines,
            },
            width: self.width.unwrap_or_else(config::detect_width),
            left_column: self.left_column,
            suppress_common: self.suppress_common_lines,
            expand_tabs: self.expand_tabs,
            strip_cr: self.strip_trailing_cr,
            output: self.output,
            editor: config::default_editor(),
        };
        (config, self.file1, self.file2)
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn status_code(status: ExitStatus) -> u8 {
    status
        .code()
        .and_then(|code| u8::try_from(code).ok())
        .unwrap_or(EXIT_TROUBLE)
}

fn run(config: &Config, file1: &Path, file2: &Path) -> Result<u8> {
    let left = File::open(file1).with_context(|| format!("Failed to open {}", file1.display()))?;
    let right = File::open(file2).with_context(|| format!("Failed to open {}", file2.display()))?;

    let mut merger = match &config.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            Some(Merger::new(
                io::stdin().lock(),
                io::stdout(),
                BufWriter::new(file),
                ShellEditor::new(config.editor.clone()),
            ))
        }
        None => None,
    };

    let (process, diff_output) = DiffProcess::spawn(config, file1, file2)?;

    let result = {
        let mut display_only = DisplayOnly;
        let sink: &mut dyn SpanSink = match merger.as_mut() {
            Some(merger) => merger,
            None => &mut display_only,
        };
        let mut sync = Synchronizer::new(
            config,
            diff_output,
            BufReader::new(left),
            BufReader::new(right),
            BufWriter::new(io::stdout().lock()),
        );
        sync.run(sink)
        // Dropping `sync` closes our end of the pipe.
    };

    if let Some(merger) = merger {
        merger.finish().context("Failed to write merge output")?;
    }

    match result {
        Ok(Finish::Completed) => Ok(status_code(process.finish()?)),
        Ok(Finish::Quit) => {
            debug!("quit requested, stopping diff");
            drop(process);
            Ok(0)
        }
        Err(err) if err.is_protocol() => {
            // Output the engine could not keep well-formed usually means the
            // engine failed; report its status rather than ours.
            let status = process.finish().ok().and_then(|status| status.code());
            match status {
                Some(status) if status >= 2 => Err(SdiffError::DiffFailed {
                    status,
                    source: Box::new(err),
                }
                .into()),
                _ => Err(err.into()),
            }
        }
        Err(err) => Err(err.into()),
    }
}

/// Parses the command line. Every rejection ends with a usage summary, even
/// the value errors clap reports without one.
fn parse_cli() -> Result<Cli, ExitCode> {
    match Cli::try_parse() {
        Ok(cli) => Ok(cli),
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        Err(err) => {
            let _ = err.print();
            if !err.render().to_string().contains("Usage:") {
                eprintln!("\n{}", Cli::command().render_usage());
            }
            Err(ExitCode::from(EXIT_USAGE))
        }
    }
}

fn main() -> ExitCode {
    let cli = match parse_cli() {
        Ok(cli) => cli,
        Err(code) => return code,
    };
    init_logging();

    let (config, file1, file2) = cli.into_config();
    debug!(?config, "starting");

    match run(&config, &file1, &file2) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("sdiff: {err:#}");
            let code = err
                .downcast_ref::<SdiffError>()
                .map_or(EXIT_TROUBLE, SdiffError::exit_code);
            ExitCode::from(code)
        }
    }
}
