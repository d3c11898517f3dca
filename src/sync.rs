//! Re-synchronizes ed-style diff output against the two compared files.
//!
//! The differencing engine only reports what changed. Everything in between
//! is read straight from the files, so two cursors (`line_a`, `line_b`) track
//! how far each file has been consumed, and every record is checked against
//! them before and after it is applied.

use std::io::{BufRead, Write};

use tracing::{debug, trace};

use crate::config::Config;
use crate::error::{IoResultExt, Result, SdiffError};
use crate::hunk::{parse_header, Hunk, HunkKind};
use crate::lbuf::{trim_newline, LineBuffer};
use crate::render::{Columns, Marker};

const LEFT_PREFIX: &str = "< ";
const RIGHT_PREFIX: &str = "> ";
const SEPARATOR: &[u8] = b"---";

/// What the caller should do after a span has been handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// How a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Finish {
    /// Every record and every trailing common line was processed.
    Completed,
    /// The sink asked to stop early.
    Quit,
}

/// Receives reconciled spans in file order.
pub trait SpanSink {
    /// A line shared by both files, verbatim from the left file.
    fn common(&mut self, line: &[u8]) -> Result<()>;

    /// One differing span. Each side holds newline-terminated lines and either
    /// may be empty. The sink may flip `suppress_common` for the rest of the run.
    fn resolve(&mut self, left: &[u8], right: &[u8], suppress_common: &mut bool) -> Result<Flow>;
}

/// Sink for plain side-by-side display: nothing is persisted.
#[derive(Debug, Default)]
pub struct DisplayOnly;

impl SpanSink for DisplayOnly {
    fn common(&mut self, _line: &[u8]) -> Result<()> {
        Ok(())
    }

    fn resolve(&mut self, _left: &[u8], _right: &[u8], _suppress: &mut bool) -> Result<Flow> {
        Ok(Flow::Continue)
    }
}

/// One input file and its cursor.
struct Side<R> {
    name: &'static str,
    read_op: &'static str,
    reader: R,
    text: LineBuffer,
    /// Number of the next line to be read, 1-based.
    line: usize,
}

impl<R: BufRead> Side<R> {
    fn new(name: &'static str, read_op: &'static str, reader: R) -> Self {
        Self {
            name,
            read_op,
            reader,
            text: LineBuffer::new(),
            line: 1,
        }
    }

    fn next_line(&mut self) -> Result<bool> {
        let n = self.text.read_line(&mut self.reader).op(self.read_op)?;
        if n == 0 {
            return Ok(false);
        }
        self.line += 1;
        Ok(true)
    }
}

pub struct Synchronizer<'c, D, A, B, W> {
    config: &'c Config,
    diff: D,
    a: Side<A>,
    b: Side<B>,
    out: W,
    columns: Columns,
    suppress_common: bool,
    /// Current raw line of diff output.
    record: LineBuffer,
    left: LineBuffer,
    right: LineBuffer,
    /// Header of the hunk in progress, kept for error reports.
    header: String,
}

impl<'c, D, A, B, W> Synchronizer<'c, D, A, B, W>
where
    D: BufRead,
    A: BufRead,
    B: BufRead,
    W: Write,
{
    pub fn new(config: &'c Config, diff: D, file_a: A, file_b: B, out: W) -> Self {
        Self {
            config,
            diff,
            a: Side::new("left", "reading left file", file_a),
            b: Side::new("right", "reading right file", file_b),
            out,
            columns: Columns::new(config),
            suppress_common: config.suppress_common,
            record: LineBuffer::with_capacity(128),
            left: LineBuffer::with_capacity(256),
            right: LineBuffer::with_capacity(256),
            header: String::new(),
        }
    }

    /// Cursor as `(line_a, line_b)`: the next unread line of each file.
    pub fn cursor(&self) -> (usize, usize) {
        (self.a.line, self.b.line)
    }

    pub fn run(&mut self, sink: &mut dyn SpanSink) -> Result<Finish> {
        loop {
            // A final append hunk may lack its newline; end of input here is
            // the normal way out either way.
            if self.record.read_line(&mut self.diff).op("reading diff output")? == 0 {
                break;
            }
            self.header.clear();
            self.header
                .push_str(&String::from_utf8_lossy(self.record.trimmed()));
            let hunk = parse_header(&self.header)?;
            trace!(%hunk, cursor = ?self.cursor(), "hunk");

            if self.lead_in(&hunk, sink)? == Flow::Quit {
                return Ok(self.quit());
            }
            match hunk.kind {
                HunkKind::Add => self.add(&hunk)?,
                HunkKind::Delete => self.delete(&hunk)?,
                HunkKind::Change => self.change(&hunk)?,
            }
            if self.a.line - 1 != hunk.a_end || self.b.line - 1 != hunk.c_end {
                return Err(SdiffError::CursorMismatch(self.header.clone()));
            }

            if self.resolve(sink)? == Flow::Quit {
                return Ok(self.quit());
            }
        }

        if self.drain(sink)? == Flow::Quit {
            return Ok(self.quit());
        }
        self.out.flush().op("writing output")?;
        Ok(Finish::Completed)
    }

    fn quit(&self) -> Finish {
        debug!(cursor = ?self.cursor(), "stopped at user request");
        Finish::Quit
    }

    /// Hands the accumulated span to the sink once the display is up to date.
    fn resolve(&mut self, sink: &mut dyn SpanSink) -> Result<Flow> {
        self.out.flush().op("writing output")?;
        sink.resolve(
            self.left.as_bytes(),
            self.right.as_bytes(),
            &mut self.suppress_common,
        )
    }

    /// Copies the common lines in front of `hunk`.
    ///
    /// With `-B` or `-I` the engine drops records, so the gap may be longer on
    /// one side. The shared part is shown as common and the surplus as a
    /// one-sided span of its own. A hunk that starts behind the cursor is fatal.
    fn lead_in(&mut self, hunk: &Hunk, sink: &mut dyn SpanSink) -> Result<Flow> {
        let (Some(a), Some(b)) = hunk.lead_in(self.a.line, self.b.line) else {
            return Err(SdiffError::CursorMismatch(self.header.clone()));
        };
        for _ in 0..a.min(b) {
            if !self.a.next_line()? || !self.b.next_line()? {
                return Err(SdiffError::CursorMismatch(self.header.clone()));
            }
            self.emit_common(sink)?;
        }
        if a == b {
            return Ok(Flow::Continue);
        }

        trace!(a, b, "uneven gap");
        self.left.reset();
        self.right.reset();
        for _ in b..a {
            if !self.a.next_line()? {
                return Err(SdiffError::CursorMismatch(self.header.clone()));
            }
            self.left_only()?;
        }
        for _ in a..b {
            if !self.b.next_line()? {
                return Err(SdiffError::CursorMismatch(self.header.clone()));
            }
            self.right_only()?;
        }
        self.resolve(sink)
    }

    fn add(&mut self, hunk: &Hunk) -> Result<()> {
        self.left.reset();
        self.right.reset();
        for _ in 0..hunk.c_len() {
            self.take_content(RIGHT_PREFIX)?;
            self.right_only()?;
        }
        Ok(())
    }

    fn delete(&mut self, hunk: &Hunk) -> Result<()> {
        self.left.reset();
        self.right.reset();
        for _ in 0..hunk.a_len() {
            self.take_content(LEFT_PREFIX)?;
            self.left_only()?;
        }
        Ok(())
    }

    /// Accumulates and shows the current line of A on its own.
    fn left_only(&mut self) -> Result<()> {
        push_line(&mut self.left, self.a.text.as_bytes());
        self.columns
            .write_row(&mut self.out, self.a.text.as_bytes(), Marker::LeftOnly, b"")
            .op("writing output")
    }

    fn right_only(&mut self) -> Result<()> {
        push_line(&mut self.right, self.b.text.as_bytes());
        self.columns
            .write_row(&mut self.out, b"", Marker::RightOnly, self.b.text.as_bytes())
            .op("writing output")
    }

    fn change(&mut self, hunk: &Hunk) -> Result<()> {
        self.left.reset();
        for _ in 0..hunk.a_len() {
            self.take_content(LEFT_PREFIX)?;
            push_line(&mut self.left, self.a.text.as_bytes());
        }
        self.take_separator()?;

        // Right lines arrive one at a time and pair off against the left
        // lines already buffered; `pos` is the start of the next unpaired one.
        self.right.reset();
        let mut pos = 0;
        for _ in 0..hunk.c_len() {
            self.take_content(RIGHT_PREFIX)?;
            push_line(&mut self.right, self.b.text.as_bytes());
            if pos < self.left.len() {
                let end = next_line_end(self.left.as_bytes(), pos);
                self.columns
                    .write_row(
                        &mut self.out,
                        &self.left.as_bytes()[pos..end],
                        Marker::Changed,
                        self.b.text.as_bytes(),
                    )
                    .op("writing output")?;
                pos = end;
            } else {
                self.columns
                    .write_row(&mut self.out, b"", Marker::RightOnly, self.b.text.as_bytes())
                    .op("writing output")?;
            }
        }
        while pos < self.left.len() {
            let end = next_line_end(self.left.as_bytes(), pos);
            self.columns
                .write_row(&mut self.out, &self.left.as_bytes()[pos..end], Marker::LeftOnly, b"")
                .op("writing output")?;
            pos = end;
        }
        Ok(())
    }

    /// Reads one prefixed content record and the file line it stands for.
    fn take_content(&mut self, prefix: &'static str) -> Result<()> {
        self.take_record()?;
        let content = match self.record.as_bytes().strip_prefix(prefix.as_bytes()) {
            Some(content) => content,
            None => {
                return Err(SdiffError::BadPrefix {
                    expected: prefix,
                    line: self.record_text(),
                })
            }
        };

        let strip_cr = self.config.strip_cr;
        let (side_name, side_line, matched) = if prefix == LEFT_PREFIX {
            let found = self.a.next_line()?;
            let matched = found && trim_newline(content, strip_cr) == self.a.text.trimmed_cr(strip_cr);
            (self.a.name, self.a.line, matched)
        } else {
            let found = self.b.next_line()?;
            let matched = found && trim_newline(content, strip_cr) == self.b.text.trimmed_cr(strip_cr);
            (self.b.name, self.b.line, matched)
        };
        if !matched {
            return Err(SdiffError::ContentMismatch {
                side: side_name,
                line_no: side_line - 1,
                line: self.record_text(),
            });
        }

        self.skip_no_newline_marker()
    }

    fn take_separator(&mut self) -> Result<()> {
        self.take_record()?;
        if self.record.trimmed() != SEPARATOR {
            return Err(SdiffError::MissingSeparator(self.record_text()));
        }
        Ok(())
    }

    fn take_record(&mut self) -> Result<()> {
        if self.record.read_line(&mut self.diff).op("reading diff output")? == 0 {
            return Err(SdiffError::TruncatedHunk(self.header.clone()));
        }
        Ok(())
    }

    /// Consumes a `\ No newline at end of file` note, if one comes next.
    fn skip_no_newline_marker(&mut self) -> Result<()> {
        let next = self.diff.fill_buf().op("reading diff output")?;
        if next.first() == Some(&b'\\') {
            self.record.read_line(&mut self.diff).op("reading diff output")?;
        }
        Ok(())
    }

    fn record_text(&self) -> String {
        String::from_utf8_lossy(self.record.trimmed()).into_owned()
    }

    fn emit_common(&mut self, sink: &mut dyn SpanSink) -> Result<()> {
        if !self.suppress_common {
            let (marker, right) = if self.config.left_column {
                (Marker::LeftColumn, &b""[..])
            } else {
                (Marker::Common, self.b.text.as_bytes())
            };
            self.columns
                .write_row(&mut self.out, self.a.text.as_bytes(), marker, right)
                .op("writing output")?;
        }
        sink.common(self.a.text.as_bytes())
    }

    /// Pairs off whatever both files still hold after the last record. A tail
    /// left on one side only is shown and resolved as a one-sided span.
    fn drain(&mut self, sink: &mut dyn SpanSink) -> Result<Flow> {
        self.left.reset();
        self.right.reset();
        loop {
            let more_a = self.a.next_line()?;
            let more_b = self.b.next_line()?;
            match (more_a, more_b) {
                (true, true) => self.emit_common(sink)?,
                (true, false) => self.left_only()?,
                (false, true) => self.right_only()?,
                (false, false) => break,
            }
        }
        if self.left.is_empty() && self.right.is_empty() {
            return Ok(Flow::Continue);
        }
        trace!(cursor = ?self.cursor(), "uneven tail");
        self.resolve(sink)
    }
}

/// Appends `line` to an accumulator, newline-terminated.
fn push_line(acc: &mut LineBuffer, line: &[u8]) {
    acc.extend(trim_newline(line, false));
    acc.append(b'\n');
}

fn next_line_end(buf: &[u8], from: usize) -> usize {
    buf[from..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(buf.len(), |i| from + i + 1)
}
