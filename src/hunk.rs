use std::fmt;

use crate::error::{Result, SdiffError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HunkKind {
    Add,
    Delete,
    Change,
}

impl HunkKind {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'a' => Some(Self::Add),
            b'd' => Some(Self::Delete),
            b'c' => Some(Self::Change),
            _ => None,
        }
    }

    fn as_char(self) -> char {
        match self {
            Self::Add => 'a',
            Self::Delete => 'd',
            Self::Change => 'c',
        }
    }
}

/// One ed-style diff record header, e.g. `5,6c7`.
///
/// Ranges are 1-based and inclusive. For `Add` the left range names the line
/// the text is appended after, for `Delete` the right range names the line the
/// removed text would have followed; both may be `0`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Hunk {
    pub kind: HunkKind,
    pub a_start: usize,
    pub a_end: usize,
    pub c_start: usize,
    pub c_end: usize,
}

impl Hunk {
    pub fn a_len(&self) -> usize {
        match self.kind {
            HunkKind::Add => 0,
            _ => self.a_end - self.a_start + 1,
        }
    }

    pub fn c_len(&self) -> usize {
        match self.kind {
            HunkKind::Delete => 0,
            _ => self.c_end - self.c_start + 1,
        }
    }

    /// Common lines that must precede this hunk on each side, given a cursor
    /// pointing at the next unread line of A and of B.
    pub fn lead_in(&self, line_a: usize, line_b: usize) -> (Option<usize>, Option<usize>) {
        let (a_last, b_last) = match self.kind {
            HunkKind::Add => (Some(self.a_start), self.c_start.checked_sub(1)),
            HunkKind::Delete => (self.a_start.checked_sub(1), Some(self.c_start)),
            HunkKind::Change => (self.a_start.checked_sub(1), self.c_start.checked_sub(1)),
        };
        let a_count = a_last.and_then(|last| (last + 1).checked_sub(line_a));
        let b_count = b_last.and_then(|last| (last + 1).checked_sub(line_b));
        (a_count, b_count)
    }
}

impl fmt::Display for Hunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.a_start)?;
        if self.a_end != self.a_start {
            write!(f, ",{}", self.a_end)?;
        }
        write!(f, "{}{}", self.kind.as_char(), self.c_start)?;
        if self.c_end != self.c_start {
            write!(f, ",{}", self.c_end)?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Begin,
    Num1,
    Comma1,
    Num2,
    Type,
    Num3,
    Comma2,
    Num4,
}

/// Parses a header line (without its newline).
///
/// The grammar is `N1[,N2](a|c|d)N3[,N4]`. An append may not carry a left
/// range (`3,4a5` is rejected while `3,4c5` and `3,4d5` are accepted) and a
/// delete may not carry a right range that spans more than one line. Line
/// numbers must stay below `usize::MAX` so that `end + 1` is always defined.
pub fn parse_header(line: &str) -> Result<Hunk> {
    parse_fields(line).ok_or_else(|| SdiffError::InvalidHeader(line.to_string()))
}

fn parse_fields(line: &str) -> Option<Hunk> {
    let mut state = State::Begin;
    let mut nums: [Option<usize>; 4] = [None; 4];
    let mut kind = None;

    for &byte in line.as_bytes() {
        state = match (state, byte) {
            (State::Begin | State::Num1, b'0'..=b'9') => {
                push_digit(&mut nums[0], byte)?;
                State::Num1
            }
            (State::Comma1 | State::Num2, b'0'..=b'9') => {
                push_digit(&mut nums[1], byte)?;
                State::Num2
            }
            (State::Type | State::Num3, b'0'..=b'9') => {
                push_digit(&mut nums[2], byte)?;
                State::Num3
            }
            (State::Comma2 | State::Num4, b'0'..=b'9') => {
                push_digit(&mut nums[3], byte)?;
                State::Num4
            }
            (State::Num1, b',') => State::Comma1,
            (State::Num3, b',') => State::Comma2,
            (State::Num1, b'a' | b'c' | b'd') | (State::Num2, b'c' | b'd') => {
                kind = HunkKind::from_byte(byte);
                State::Type
            }
            _ => return None,
        };
    }

    if !matches!(state, State::Num3 | State::Num4) {
        return None;
    }

    let kind = kind?;
    let a_start = nums[0]?;
    let a_end = nums[1].unwrap_or(a_start);
    let c_start = nums[2]?;
    let c_end = nums[3].unwrap_or(c_start);

    if a_start > a_end || c_start > c_end {
        return None;
    }
    if kind == HunkKind::Delete && c_start != c_end {
        return None;
    }

    Some(Hunk {
        kind,
        a_start,
        a_end,
        c_start,
        c_end,
    })
}

fn push_digit(slot: &mut Option<usize>, byte: u8) -> Option<()> {
    let value = slot
        .unwrap_or(0)
        .checked_mul(10)?
        .checked_add(usize::from(byte - b'0'))
        .filter(|&value| value < usize::MAX)?;
    *slot = Some(value);
    Some(())
}
