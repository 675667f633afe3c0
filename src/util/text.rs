// logcore - util/text.rs
//
// Tab-expanded display-width math shared by the indexer's maxLength scan
// (index::engine), LogData's line getters, and SearchEngine's matched-line
// maxLength accounting — one expansion rule, used everywhere the GLOSSARY's
// "display width" is computed.

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::util::constants::TAB_STOP;

/// Expand tabs to the next multiple of `TAB_STOP` columns.
pub fn expand_tabs(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut col = 0usize;
    for c in line.chars() {
        if c == '\t' {
            let next = ((col / TAB_STOP) + 1) * TAB_STOP;
            for _ in col..next {
                out.push(' ');
            }
            col = next;
        } else {
            out.push(c);
            col += UnicodeWidthChar::width(c).unwrap_or(1);
        }
    }
    out
}

/// Tab-expanded display width of `line`, in columns.
pub fn display_width(line: &str) -> usize {
    UnicodeWidthStr::width(expand_tabs(line).as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tab_expands_to_next_stop() {
        assert_eq!(expand_tabs("a\tb"), "a       b");
        assert_eq!(display_width("a\tb"), 9);
    }

    #[test]
    fn plain_ascii_width_is_char_count() {
        assert_eq!(display_width("hello"), 5);
    }
}
