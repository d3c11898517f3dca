use std::io::{self, Write};

use unicode_width::UnicodeWidthChar;

use crate::config::Config;
use crate::lbuf::trim_newline;

const TAB_STOP: usize = 8;

/// The gutter character between the two columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Marker {
    Common,
    LeftOnly,
    RightOnly,
    Changed,
    /// Common line shown only in the left column (`--left-column`).
    LeftColumn,
}

impl Marker {
    pub fn as_char(self) -> char {
        match self {
            Self::Common => ' ',
            Self::LeftOnly => '<',
            Self::RightOnly => '>',
            Self::Changed => '|',
            Self::LeftColumn => '(',
        }
    }
}

/// Two fixed-width columns separated by a one-character gutter.
pub struct Columns {
    width: usize,
    expand_tabs: bool,
    strip_cr: bool,
    row: String,
}

impl Columns {
    pub fn new(config: &Config) -> Self {
        Self {
            width: config.column_width(),
            expand_tabs: config.expand_tabs,
            strip_cr: config.strip_cr,
            row: String::new(),
        }
    }

    /// Writes one row. `left` and `right` may still carry their newline.
    pub fn write_row<W: Write>(
        &mut self,
        out: &mut W,
        left: &[u8],
        marker: Marker,
        right: &[u8],
    ) -> io::Result<()> {
        self.row.clear();
        let left = String::from_utf8_lossy(trim_newline(left, self.strip_cr));
        let right = String::from_utf8_lossy(trim_newline(right, self.strip_cr));

        fit(&mut self.row, &left, self.width, true, self.expand_tabs);
        self.row.push(' ');
        self.row.push(marker.as_char());
        if marker != Marker::LeftColumn {
            self.row.push(' ');
            fit(&mut self.row, &right, self.width, false, self.expand_tabs);
        }

        let end = self.row.trim_end_matches(' ').len();
        self.row.truncate(end);
        self.row.push('\n');
        out.write_all(self.row.as_bytes())
    }
}

/// Appends `text` cut to `width` display cells, padding with spaces when asked.
fn fit(out: &mut String, text: &str, width: usize, pad: bool, expand_tabs: bool) {
    let mut col = 0;
    for ch in text.chars() {
        if ch == '\t' && expand_tabs {
            let stop = (col / TAB_STOP + 1) * TAB_STOP;
            let stop = stop.min(width);
            if stop == col {
                break;
            }
            out.extend(std::iter::repeat(' ').take(stop - col));
            col = stop;
            continue;
        }
        let cells = ch.width().unwrap_or(1);
        if col + cells > width {
            break;
        }
        out.push(ch);
        col += cells;
    }
    if pad {
        out.extend(std::iter::repeat(' ').take(width - col));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(width: usize) -> Columns {
        Columns::new(&Config {
            width,
            ..Config::default()
        })
    }

    fn row(columns: &mut Columns, left: &str, marker: Marker, right: &str) -> String {
        let mut out = Vec::new();
        columns
            .write_row(&mut out, left.as_bytes(), marker, right.as_bytes())
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_markers() {
        let mut cols = columns(21);
        assert_eq!(row(&mut cols, "alpha\n", Marker::Common, "alpha\n"), "alpha       alpha\n");
        assert_eq!(row(&mut cols, "gone\n", Marker::LeftOnly, ""), "gone      <\n");
        assert_eq!(row(&mut cols, "", Marker::RightOnly, "new\n"), "          > new\n");
        assert_eq!(row(&mut cols, "foo", Marker::Changed, "bar"), "foo       | bar\n");
        assert_eq!(row(&mut cols, "kept", Marker::LeftColumn, "kept"), "kept      (\n");
    }

    #[test]
    fn test_truncates_long_lines() {
        let mut cols = columns(21);
        assert_eq!(
            row(&mut cols, "0123456789abc", Marker::Changed, "abcdefghijklm"),
            "012345678 | abcdefghi\n"
        );
    }

    #[test]
    fn test_wide_characters_never_split() {
        let mut cols = columns(13);
        // Five cells per column; the third ideograph would end on cell six.
        assert_eq!(row(&mut cols, "日本語", Marker::LeftOnly, ""), "日本  <\n");
    }

    #[test]
    fn test_tab_expansion() {
        let mut cols = Columns::new(&Config {
            width: 43,
            expand_tabs: true,
            ..Config::default()
        });
        assert_eq!(
            row(&mut cols, "a\tb", Marker::Common, "\tc"),
            "a       b                      c\n"
        );
    }

    #[test]
    fn test_strip_cr() {
        let mut cols = Columns::new(&Config {
            width: 21,
            strip_cr: true,
            ..Config::default()
        });
        assert_eq!(row(&mut cols, "dos\r\n", Marker::Common, "dos\r\n"), "dos         dos\n");
    }

    #[test]
    fn test_zero_width_columns() {
        let mut cols = columns(3);
        assert_eq!(row(&mut cols, "abc", Marker::Changed, "def"), " |\n");
    }
}
