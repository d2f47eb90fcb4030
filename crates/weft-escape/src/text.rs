//! Whitespace classification and indentation helpers.

use crate::NBSP;

/// True for every character Unicode considers whitespace, including the
/// oddballs (`NEL`, Ogham space mark, ideographic space) that `char` methods
/// in older editions missed. NBSP *is* whitespace here; collapsing decides
/// separately whether to absorb it.
#[must_use]
pub fn is_unicode_whitespace(c: char) -> bool {
    matches!(
        c,
        '\u{0009}'..='\u{000D}' // tab, LF, VT, FF, CR
            | ' '
            | '\u{0085}' // NEL
            | NBSP
            | '\u{1680}' // Ogham space mark
            | '\u{180E}' // Mongolian vowel separator
            | '\u{2000}'..='\u{200A}' // en quad .. hair space
            | '\u{2028}' // line separator
            | '\u{2029}' // paragraph separator
            | '\u{202F}' // narrow no-break space
            | '\u{205F}' // medium mathematical space
            | '\u{3000}' // ideographic space
    )
}

/// True if `s` contains nothing but Unicode whitespace (or is empty).
#[must_use]
pub fn all_whitespace(s: &str) -> bool {
    s.chars().all(is_unicode_whitespace)
}

/// Append `n` spaces to `out`.
pub fn push_spaces(out: &mut String, n: usize) {
    out.extend(std::iter::repeat_n(' ', n));
}

/// Append `s` line by line, passing each line through `emit` and re-indenting
/// every continuation line by `indent_level` spaces. When `retain_newline` is
/// false the newline itself is dropped (attribute values are single-line) but
/// the indentation is still inserted.
pub fn append_indented_lines(
    s: &str,
    indent_level: usize,
    retain_newline: bool,
    mut emit: impl FnMut(&str, &mut String),
    out: &mut String,
) {
    let mut rest = s;
    loop {
        match rest.find('\n') {
            Some(pos) => {
                emit(&rest[..pos], out);
                if retain_newline {
                    out.push('\n');
                }
                push_spaces(out, indent_level);
                rest = &rest[pos + 1..];
            }
            None => {
                emit(rest, out);
                break;
            }
        }
    }
}
