//! Contextual HTML escaping for weft templates.
//!
//! Implements OWASP XSS prevention rule #1: every character that could open
//! or close markup is rewritten as an entity reference before it reaches an
//! HTML body or attribute value. Quotes and backslashes are escaped in
//! *both* contexts, so a value can never break out of a quoted attribute
//! even if a caller picks the wrong context.
//!
//! The escaper is a pure transform into a caller-provided output buffer;
//! it never fails and never allocates beyond the buffer it is given.

mod text;

pub use text::{all_whitespace, append_indented_lines, is_unicode_whitespace, push_spaces};

use std::sync::LazyLock;

use regex::Regex;

/// No-break space, kept out of whitespace collapsing and rendered as `&nbsp;`.
pub const NBSP: char = '\u{00A0}';

/// Matches a syntactically valid entity reference starting at an ampersand:
/// decimal (`&#123;`), hex (`&#x1F4A9;`) or named (`&amp;`).
static ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^&(#[0-9]{1,5}|#x[0-9a-fA-F]{1,4}|[a-zA-Z]\w+);").unwrap());

/// Entities are assumed to be at most this long, bounding the lookahead
/// window for [`AmpersandMode::SmartEntity`].
const MAX_ENTITY_LEN: usize = 32;

/// How ampersands are escaped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum AmpersandMode {
    /// Every `&` becomes `&amp;`. The safe default for untrusted values.
    #[default]
    Always,
    /// Ampersands pass through untouched. Use only for text that is known
    /// to already be entity-encoded.
    Never,
    /// An `&` that starts a syntactically valid entity reference passes
    /// through; any other `&` becomes `&amp;` (so `H&M` is escaped but
    /// `&hellip;` survives).
    SmartEntity,
}

/// How newline characters are rendered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum NewlineMode {
    /// Treat a newline as ordinary whitespace (collapsed like any other).
    #[default]
    Space,
    /// Keep the newline character in the output.
    Preserve,
    /// Replace the newline with a `<br>` element.
    Break,
}

/// Escaping behavior knobs shared by text and attribute contexts.
#[derive(Clone, Copy, Debug, Default)]
pub struct EscapeOptions {
    /// Ampersand policy.
    pub ampersand: AmpersandMode,
    /// Newline policy.
    pub newline: NewlineMode,
    /// Keep runs of whitespace instead of collapsing them to one space.
    /// Set while pretty-printing so indentation is not eaten.
    pub preserve_runs: bool,
}

/// Escape `raw` for an HTML text (body) context, appending to `out`.
pub fn escape_text(raw: &str, opts: EscapeOptions, out: &mut String) {
    escape_into(raw, opts, out);
}

/// Escape `raw` for a quoted HTML attribute value, appending to `out`.
///
/// Identical to [`escape_text`] except that newlines are never preserved:
/// attribute values are single-line.
pub fn escape_attribute(raw: &str, opts: EscapeOptions, out: &mut String) {
    escape_into(
        raw,
        EscapeOptions {
            newline: NewlineMode::Space,
            ..opts
        },
        out,
    );
}

/// Escape `raw` with default options, returning a new string.
#[must_use]
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + raw.len() / 4);
    escape_text(raw, EscapeOptions::default(), &mut out);
    out
}

fn escape_into(raw: &str, opts: EscapeOptions, out: &mut String) {
    for (i, c) in raw.char_indices() {
        match c {
            '&' => match opts.ampersand {
                AmpersandMode::Always => out.push_str("&amp;"),
                AmpersandMode::Never => out.push('&'),
                AmpersandMode::SmartEntity => {
                    if starts_valid_entity(&raw[i..]) {
                        out.push('&');
                    } else {
                        out.push_str("&amp;");
                    }
                }
            },
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            // Quotes and backslashes are escaped regardless of context so a
            // value can never terminate a quoted attribute.
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '\\' => out.push_str("&lsol;"),
            // Typographic characters that tend to get mangled across
            // charsets; emit named entities instead.
            '\u{2014}' => out.push_str("&mdash;"),
            '\u{2013}' => out.push_str("&ndash;"),
            '\u{201C}' => out.push_str("&ldquo;"),
            '\u{201D}' => out.push_str("&rdquo;"),
            '\u{2018}' => out.push_str("&lsquo;"),
            '\u{2019}' => out.push_str("&rsquo;"),
            '\u{00AB}' => out.push_str("&laquo;"),
            '\u{00BB}' => out.push_str("&raquo;"),
            '\u{00A3}' => out.push_str("&pound;"),
            '\u{00A9}' => out.push_str("&copy;"),
            '\u{00AE}' => out.push_str("&reg;"),
            NBSP => out.push_str("&nbsp;"),
            '\n' => match opts.newline {
                NewlineMode::Break => out.push_str("<br>"),
                NewlineMode::Preserve => out.push('\n'),
                NewlineMode::Space => push_collapsed_space(out, opts.preserve_runs),
            },
            c if (c as u32) <= 32 || is_unicode_whitespace(c) => {
                push_collapsed_space(out, opts.preserve_runs);
            }
            c => out.push(c),
        }
    }
}

/// Control characters and Unicode whitespace become a single space;
/// consecutive whitespace collapses to one unless runs are preserved.
fn push_collapsed_space(out: &mut String, preserve_runs: bool) {
    if preserve_runs || (!out.is_empty() && !out.ends_with(' ')) {
        out.push(' ');
    }
}

fn starts_valid_entity(tail: &str) -> bool {
    let mut end = tail.len().min(MAX_ENTITY_LEN);
    while !tail.is_char_boundary(end) {
        end -= 1;
    }
    ENTITY_RE.is_match(&tail[..end])
}
