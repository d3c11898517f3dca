use std::fs::{File, OpenOptions};
use std::io::{BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempPath;
use tracing::debug;

use crate::error::{IoResultExt, Result, SdiffError};
use crate::sync::{Flow, SpanSink};

pub const PROMPT: &str = "% ";

pub const HELP: &str = "\
e:\tedit an empty buffer
eb:\tedit both sides, left then right
el:\tedit the left side
er:\tedit the right side
l:\tkeep the left side
r:\tkeep the right side
s:\tstop showing identical lines
v:\tshow identical lines
q:\tquit
";

/// Opens a file in an external editor and returns once the editor exits.
pub trait Editor {
    fn edit(&mut self, path: &Path) -> Result<()>;
}

/// Runs `$EDITOR file` through `sh -c`.
pub struct ShellEditor {
    editor: String,
    command: Option<(PathBuf, String)>,
}

impl ShellEditor {
    pub fn new(editor: impl Into<String>) -> Self {
        Self {
            editor: editor.into(),
            command: None,
        }
    }

    /// Built on first use; the scratch path never changes during a run.
    fn command_for(&mut self, path: &Path) -> &str {
        if matches!(&self.command, Some((cached, _)) if cached != path) {
            self.command = None;
        }
        let editor = &self.editor;
        let (_, line) = self.command.get_or_insert_with(|| {
            let line = format!(
                "{} {}",
                shell_quote(editor),
                shell_quote(&path.to_string_lossy())
            );
            (path.to_path_buf(), line)
        });
        line
    }
}

impl Editor for ShellEditor {
    fn edit(&mut self, path: &Path) -> Result<()> {
        let line = self.command_for(path);
        debug!(command = line, "running editor");
        let status = Command::new("sh")
            .arg("-c")
            .arg(line)
            .status()
            .map_err(|source| SdiffError::Spawn {
                program: "sh".to_string(),
                source,
            })?;
        // A non-zero exit is the editor's business; only a signal aborts.
        if status.code().is_none() {
            return Err(SdiffError::EditorAbnormal(status.to_string()));
        }
        Ok(())
    }
}

/// Wraps `s` in single quotes for `sh`. Backslashes are already literal
/// inside single quotes; embedded single quotes become `'\''`.
pub fn shell_quote(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('\'');
    for ch in s.chars() {
        if ch == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    quoted
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Seed {
    Empty,
    Left,
    Right,
    Both,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Action {
    Left,
    Right,
    Edit(Seed),
    Silent,
    Verbose,
    Quit,
    Help,
}

impl Action {
    fn parse(input: &str) -> Self {
        match input.trim() {
            "l" => Self::Left,
            "r" => Self::Right,
            "e" => Self::Edit(Seed::Empty),
            "el" => Self::Edit(Seed::Left),
            "er" => Self::Edit(Seed::Right),
            "eb" => Self::Edit(Seed::Both),
            "s" => Self::Silent,
            "v" => Self::Verbose,
            "q" => Self::Quit,
            _ => Self::Help,
        }
    }
}

/// Interactive merge: asks the user how to resolve each differing span and
/// appends the answer to the merge output.
pub struct Merger<R, W, O, E> {
    input: R,
    prompt: W,
    output: O,
    editor: E,
    command: String,
    scratch: Option<TempPath>,
    edited: Vec<u8>,
}

impl<R, W, O, E> Merger<R, W, O, E>
where
    R: BufRead,
    W: Write,
    O: Write,
    E: Editor,
{
    pub fn new(input: R, prompt: W, output: O, editor: E) -> Self {
        Self {
            input,
            prompt,
            output,
            editor,
            command: String::new(),
            scratch: None,
            edited: Vec::new(),
        }
    }

    /// Flushes the merge output and hands it back.
    pub fn finish(mut self) -> Result<O> {
        self.output.flush().op("writing merge output")?;
        Ok(self.output)
    }

    fn scratch_path(&mut self) -> Result<PathBuf> {
        let scratch = match self.scratch.take() {
            Some(scratch) => scratch,
            None => {
                let file = tempfile::Builder::new()
                    .prefix("sdiff.")
                    .tempfile()
                    .op("creating scratch file")?;
                debug!(path = %file.path().display(), "created scratch file");
                file.into_temp_path()
            }
        };
        Ok(self.scratch.insert(scratch).to_path_buf())
    }

    fn edit(&mut self, seed: Seed, left: &[u8], right: &[u8]) -> Result<()> {
        let path = self.scratch_path()?;
        {
            // Truncate in place rather than recreating: the path stays valid
            // for the whole run.
            let mut file = OpenOptions::new()
                .write(true)
                .truncate(true)
                .open(&path)
                .op("opening scratch file")?;
            let none: &[u8] = &[];
            let (first, second) = match seed {
                Seed::Empty => (none, none),
                Seed::Left => (left, none),
                Seed::Right => (right, none),
                Seed::Both => (left, right),
            };
            file.write_all(first)
                .and_then(|()| file.write_all(second))
                .op("writing scratch file")?;
        }

        self.editor.edit(&path)?;

        self.edited.clear();
        File::open(&path)
            .and_then(|mut file| file.read_to_end(&mut self.edited))
            .op("reading scratch file")?;
        self.output
            .write_all(&self.edited)
            .op("writing merge output")
    }
}

impl<R, W, O, E> SpanSink for Merger<R, W, O, E>
where
    R: BufRead,
    W: Write,
    O: Write,
    E: Editor,
{
    fn common(&mut self, line: &[u8]) -> Result<()> {
        self.output.write_all(line).op("writing merge output")
    }

    fn resolve(&mut self, left: &[u8], right: &[u8], suppress_common: &mut bool) -> Result<Flow> {
        loop {
            self.prompt
                .write_all(PROMPT.as_bytes())
                .and_then(|()| self.prompt.flush())
                .op("writing prompt")?;

            self.command.clear();
            if self.input.read_line(&mut self.command).op("reading command")? == 0 {
                debug!("end of input at merge prompt");
                return Ok(Flow::Quit);
            }

            match Action::parse(&self.command) {
                Action::Left => {
                    self.output.write_all(left).op("writing merge output")?;
                    return Ok(Flow::Continue);
                }
                Action::Right => {
                    self.output.write_all(right).op("writing merge output")?;
                    return Ok(Flow::Continue);
                }
                Action::Edit(seed) => {
                    self.edit(seed, left, right)?;
                    return Ok(Flow::Continue);
                }
                Action::Silent => *suppress_common = true,
                Action::Verbose => *suppress_common = false,
                Action::Quit => return Ok(Flow::Quit),
                Action::Help => self
                    .prompt
                    .write_all(HELP.as_bytes())
                    .op("writing prompt")?,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Records what it was asked to edit and optionally overwrites the file.
    #[derive(Default)]
    struct ScriptedEditor {
        seen: Vec<(PathBuf, String)>,
        replace_with: Option<String>,
        fail: bool,
    }

    impl Editor for &mut ScriptedEditor {
        fn edit(&mut self, path: &Path) -> Result<()> {
            if self.fail {
                return Err(SdiffError::EditorAbnormal("signal: 9 (SIGKILL)".to_string()));
            }
            let seed = fs::read_to_string(path).unwrap();
            self.seen.push((path.to_path_buf(), seed));
            if let Some(text) = &self.replace_with {
                fs::write(path, text).unwrap();
            }
            Ok(())
        }
    }

    struct Outcome {
        flows: Vec<Flow>,
        prompt: String,
        output: String,
        suppress: bool,
    }

    fn drive(input: &str, editor: &mut ScriptedEditor, spans: &[(&str, &str)]) -> Outcome {
        let mut prompt = Vec::new();
        let mut suppress = false;
        let mut flows = Vec::new();
        let output = {
            let mut merger = Merger::new(input.as_bytes(), &mut prompt, Vec::new(), editor);
            merger.common(b"shared\n").unwrap();
            for (left, right) in spans {
                let flow = merger
                    .resolve(left.as_bytes(), right.as_bytes(), &mut suppress)
                    .unwrap();
                flows.push(flow);
                if flow == Flow::Quit {
                    break;
                }
            }
            merger.finish().unwrap()
        };
        Outcome {
            flows,
            prompt: String::from_utf8(prompt).unwrap(),
            output: String::from_utf8(output).unwrap(),
            suppress,
        }
    }

    #[test]
    fn test_left_keeps_left_without_editor() {
        let mut editor = ScriptedEditor::default();
        let outcome = drive("l\n", &mut editor, &[("foo\n", "bar\n")]);
        assert_eq!(outcome.flows, [Flow::Continue]);
        assert_eq!(outcome.output, "shared\nfoo\n");
        assert_eq!(outcome.prompt, PROMPT);
        assert!(editor.seen.is_empty());
    }

    #[test]
    fn test_right_keeps_right_and_whitespace_is_trimmed() {
        let mut editor = ScriptedEditor::default();
        let outcome = drive("  r \n", &mut editor, &[("foo\n", "bar\n")]);
        assert_eq!(outcome.output, "shared\nbar\n");
    }

    #[test]
    fn test_each_span_gets_its_own_prompt() {
        let mut editor = ScriptedEditor::default();
        let outcome = drive("l\nr\n", &mut editor, &[("a\n", "b\n"), ("c\n", "d\n")]);
        assert_eq!(outcome.flows, [Flow::Continue, Flow::Continue]);
        assert_eq!(outcome.output, "shared\na\nd\n");
        assert_eq!(outcome.prompt, format!("{PROMPT}{PROMPT}"));
    }

    #[test]
    fn test_unknown_and_empty_commands_print_help() {
        let mut editor = ScriptedEditor::default();
        let outcome = drive("x\n\nl\n", &mut editor, &[("foo\n", "bar\n")]);
        assert_eq!(outcome.prompt, format!("{PROMPT}{HELP}{PROMPT}{HELP}{PROMPT}"));
        assert_eq!(outcome.output, "shared\nfoo\n");
    }

    #[test]
    fn test_silent_and_verbose_toggle_without_resolving() {
        let mut editor = ScriptedEditor::default();
        let outcome = drive("s\nr\n", &mut editor, &[("foo\n", "bar\n")]);
        assert!(outcome.suppress);
        assert_eq!(outcome.prompt, format!("{PROMPT}{PROMPT}"));
        assert_eq!(outcome.output, "shared\nbar\n");

        let outcome = drive("s\nv\nl\n", &mut editor, &[("foo\n", "bar\n")]);
        assert!(!outcome.suppress);
        assert_eq!(outcome.output, "shared\nfoo\n");
    }

    #[test]
    fn test_quit_and_end_of_input_stop_the_run() {
        let mut editor = ScriptedEditor::default();
        let outcome = drive("q\nl\n", &mut editor, &[("foo\n", "bar\n"), ("x\n", "y\n")]);
        assert_eq!(outcome.flows, [Flow::Quit]);
        assert_eq!(outcome.output, "shared\n");

        let outcome = drive("", &mut editor, &[("foo\n", "bar\n")]);
        assert_eq!(outcome.flows, [Flow::Quit]);
        assert_eq!(outcome.output, "shared\n");
    }

    #[test]
    fn test_edit_seeds_and_persists_scratch_contents() {
        let mut editor = ScriptedEditor {
            replace_with: Some("merged\n".to_string()),
            ..ScriptedEditor::default()
        };
        let outcome = drive("eb\n", &mut editor, &[("foo\n", "bar\n")]);
        assert_eq!(outcome.output, "shared\nmerged\n");
        assert_eq!(editor.seen.len(), 1);
        assert_eq!(editor.seen[0].1, "foo\nbar\n");
    }

    #[test]
    fn test_edit_seeds() {
        let mut editor = ScriptedEditor::default();
        let spans = [("L\n", "R\n"), ("L\n", "R\n"), ("L\n", "R\n"), ("L\n", "R\n")];
        let outcome = drive("e\nel\ner\neb\n", &mut editor, &spans);
        let seeds: Vec<&str> = editor.seen.iter().map(|(_, seed)| seed.as_str()).collect();
        assert_eq!(seeds, ["", "L\n", "R\n", "L\nR\n"]);
        // Unchanged scratch contents are persisted as-is.
        assert_eq!(outcome.output, "shared\nL\nR\nL\nR\n");
    }

    #[test]
    fn test_scratch_file_is_reused_and_truncated() {
        let mut editor = ScriptedEditor::default();
        drive("eb\nel\n", &mut editor, &[("long left\n", "long right\n"), ("s\n", "t\n")]);
        assert_eq!(editor.seen.len(), 2);
        assert_eq!(editor.seen[0].0, editor.seen[1].0);
        let name = editor.seen[0].0.file_name().map(|name| name.to_string_lossy().into_owned());
        assert!(name.is_some_and(|name| name.starts_with("sdiff.")), "{:?}", editor.seen[0].0);
        assert_eq!(editor.seen[1].1, "s\n");
        // Removed once the merger is dropped.
        assert!(!editor.seen[0].0.exists());
    }

    #[test]
    fn test_editor_failure_propagates() {
        let mut editor = ScriptedEditor {
            fail: true,
            ..ScriptedEditor::default()
        };
        let mut suppress = false;
        let mut merger = Merger::new(&b"e\n"[..], Vec::new(), Vec::new(), &mut editor);
        let err = merger.resolve(b"a\n", b"b\n", &mut suppress).unwrap_err();
        assert!(matches!(err, SdiffError::EditorAbnormal(_)));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("vi"), "'vi'");
        assert_eq!(shell_quote("/tmp/it's"), "'/tmp/it'\\''s'");
        assert_eq!(shell_quote("C:\\x"), "'C:\\x'");
    }

    #[test]
    fn test_shell_editor_command_is_built_once_per_path() {
        let mut editor = ShellEditor::new("my editor");
        let first = editor.command_for(Path::new("/tmp/sdiff.a")).to_string();
        assert_eq!(first, "'my editor' '/tmp/sdiff.a'");
        assert_eq!(editor.command_for(Path::new("/tmp/sdiff.a")), first);
        assert_eq!(
            editor.command_for(Path::new("/tmp/sdiff.b")),
            "'my editor' '/tmp/sdiff.b'"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_editor_runs_command() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut editor = ShellEditor::new("true");
        editor.edit(file.path()).unwrap();
        // Exit status 1 is still a normal termination.
        let mut editor = ShellEditor::new("false");
        editor.edit(file.path()).unwrap();
    }
}
