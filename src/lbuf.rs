use std::borrow::Cow;
use std::io::{self, BufRead};

const GROW_STEP: usize = 64;

/// Reusable byte accumulator for one line (or one hunk side) at a time.
///
/// `reset` keeps the allocation, so a single buffer serves every line of a run.
#[derive(Debug, Default, Clone)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn append(&mut self, byte: u8) {
        self.reserve(1);
        self.buf.push(byte);
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.reserve(bytes.len());
        self.buf.extend_from_slice(bytes);
    }

    /// Logical truncation. Capacity is untouched.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn as_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.buf)
    }

    /// Content without its line terminator.
    pub fn trimmed(&self) -> &[u8] {
        trim_newline(&self.buf, false)
    }

    /// Content without its line terminator, also dropping a `\r` before it
    /// when `strip_cr` is set.
    pub fn trimmed_cr(&self, strip_cr: bool) -> &[u8] {
        trim_newline(&self.buf, strip_cr)
    }

    /// Replaces the content with the next line of `reader`, newline included.
    ///
    /// Returns the number of bytes read; `0` means end of input.
    pub fn read_line<R: BufRead>(&mut self, reader: &mut R) -> io::Result<usize> {
        self.reset();
        loop {
            let (done, used) = {
                let available = match reader.fill_buf() {
                    Ok(available) => available,
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => return Err(err),
                };
                match available.iter().position(|&b| b == b'\n') {
                    Some(i) => {
                        self.extend(&available[..=i]);
                        (true, i + 1)
                    }
                    None => {
                        self.extend(available);
                        (available.is_empty(), available.len())
                    }
                }
            };
            reader.consume(used);
            if done {
                return Ok(self.len());
            }
        }
    }

    fn reserve(&mut self, additional: usize) {
        let needed = self.buf.len() + additional;
        if needed > self.buf.capacity() {
            let target = needed.max(self.buf.capacity() * 2).max(GROW_STEP);
            self.buf.reserve_exact(target - self.buf.len());
        }
    }
}

pub fn trim_newline(line: &[u8], strip_cr: bool) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    if strip_cr {
        line.strip_suffix(b"\r").unwrap_or(line)
    } else {
        line
    }
}
