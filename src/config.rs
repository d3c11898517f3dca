use std::env;
use std::ffi::OsString;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

pub const DEFAULT_DIFF_PROGRAM: &str = "/usr/bin/diff";
pub const DEFAULT_EDITOR: &str = "vi";
pub const DEFAULT_WIDTH: usize = 130;

/// Environment variables forwarded to the differencing engine. Everything
/// else is dropped.
pub const ENV_ALLOW_LIST: &[&str] = &["TMPDIR"];

/// Comparison options forwarded verbatim to the differencing engine.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiffFlags {
    pub text: bool,
    pub ignore_blank_lines: bool,
    pub ignore_space_change: bool,
    pub minimal: bool,
    pub ignore_tab_expansion: bool,
    pub speed_large_files: bool,
    pub ignore_case: bool,
    pub ignore_all_space: bool,
    pub ignore_matching_lines: Vec<String>,
}

/// Everything a run needs, fixed once the command line has been validated.
#[derive(Clone, Debug)]
pub struct Config {
    pub diff_program: PathBuf,
    pub diff_flags: DiffFlags,
    /// Total display width; each column gets `(width - 3) / 2` cells.
    pub width: usize,
    pub left_column: bool,
    pub suppress_common: bool,
    pub expand_tabs: bool,
    pub strip_cr: bool,
    /// Merge result file. Its presence turns on the interactive merge.
    pub output: Option<PathBuf>,
    pub editor: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            diff_program: PathBuf::from(DEFAULT_DIFF_PROGRAM),
            diff_flags: DiffFlags::default(),
            width: DEFAULT_WIDTH,
            left_column: false,
            suppress_common: false,
            expand_tabs: false,
            strip_cr: false,
            output: None,
            editor: DEFAULT_EDITOR.to_string(),
        }
    }
}

impl Config {
    pub fn column_width(&self) -> usize {
        self.width.saturating_sub(3) / 2
    }

    /// Name the differencing engine sees as `argv[0]`.
    pub fn display_name(&self) -> OsString {
        self.diff_program
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| self.diff_program.clone().into_os_string())
    }

    /// Engine flags, in a fixed order, without the two file operands.
    pub fn diff_args(&self) -> Vec<OsString> {
        let flags = &self.diff_flags;
        let mut args: Vec<OsString> = Vec::new();
        let switches = [
            (flags.text, "-a"),
            (flags.ignore_blank_lines, "-B"),
            (flags.ignore_space_change, "-b"),
            (flags.minimal, "-d"),
            (flags.ignore_tab_expansion, "-E"),
            (flags.speed_large_files, "-H"),
            (flags.ignore_case, "-i"),
            (flags.ignore_all_space, "-w"),
            (self.strip_cr, "--strip-trailing-cr"),
        ];
        for (enabled, flag) in switches {
            if enabled {
                args.push(flag.into());
            }
        }
        for pattern in &flags.ignore_matching_lines {
            args.push("-I".into());
            args.push(pattern.into());
        }
        args
    }
}

/// Terminal width when stdout is a terminal, otherwise the classic default.
pub fn detect_width() -> usize {
    if io::stdout().is_terminal() {
        if let Ok((cols, _rows)) = crossterm::terminal::size() {
            if cols > 0 {
                return usize::from(cols);
            }
        }
    }
    DEFAULT_WIDTH
}

pub fn default_editor() -> String {
    ["EDITOR", "VISUAL"]
        .iter()
        .filter_map(|name| env::var(name).ok())
        .find(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_EDITOR.to_string())
}
