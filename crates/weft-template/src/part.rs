//! The compiled template representation.
//!
//! A template compiles to a flat part sequence; rendering walks the
//! sequence once, substituting parameter values. All per-parameter
//! decisions (which property, which escaping strategy, what indent level)
//! are taken at compile time.

use std::any::TypeId;

/// How a substituted value is written into the output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ParamStrategy {
    /// Contextually escaped text.
    Escaped {
        /// Attribute-value context (newlines collapse to spaces) rather
        /// than body-text context.
        attr: bool,
    },
    /// Written verbatim: canonical numeric/boolean forms and URI values.
    Verbatim,
}

/// Resolution state of a nested-template part. Compilation leaves the
/// target unresolved; `finalize` patches in the registry index of the
/// nested model's entry, so forward references between models work.
#[derive(Clone, Copy, Debug)]
pub(crate) enum NestedTarget {
    Unresolved {
        type_id: TypeId,
        type_name: &'static str,
    },
    Resolved(usize),
}

/// One element of a compiled template.
#[derive(Debug)]
pub(crate) enum Part {
    /// Static markup, emitted as-is (re-indented across lines when nested).
    Literal(String),
    /// Pretty-print break: a newline followed by `level` spaces of indent.
    Indent { level: usize },
    /// A scalar parameter substitution.
    Param {
        name: &'static str,
        prop: usize,
        strategy: ParamStrategy,
        /// Indent level at the point of substitution, for re-indenting
        /// multi-line values while pretty-printing.
        level: usize,
    },
    /// A nested-model parameter, rendered through the nested type's
    /// default template.
    Nested {
        name: &'static str,
        prop: usize,
        level: usize,
        target: NestedTarget,
    },
    /// The page shell's title slot: the page model's `_title`, escaped.
    Title { level: usize },
    /// The page shell's body slot: the pre-rendered fragment, spliced in.
    Body { level: usize },
}

/// A fully compiled template for one model type.
#[derive(Debug, Default)]
pub(crate) struct CompiledTemplate {
    pub(crate) parts: Vec<Part>,
    /// True when the source was a whole HTML document (doctype or `<html>`
    /// root) rather than a fragment.
    pub(crate) whole_document: bool,
}

impl CompiledTemplate {
    /// Append a literal, coalescing with a preceding literal part.
    pub(crate) fn push_literal(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Part::Literal(prev)) = self.parts.last_mut() {
            prev.push_str(text);
        } else {
            self.parts.push(Part::Literal(text.to_owned()));
        }
    }

    /// Append an indent break. Two consecutive breaks collapse to the
    /// later one, so empty elements do not produce blank lines.
    pub(crate) fn push_indent(&mut self, level: usize) {
        if let Some(Part::Indent { level: prev }) = self.parts.last_mut() {
            *prev = level;
        } else {
            self.parts.push(Part::Indent { level });
        }
    }

    /// Drop a trailing indent break so output never ends mid-indent.
    pub(crate) fn trim_trailing_indent(&mut self) {
        if matches!(self.parts.last(), Some(Part::Indent { .. })) {
            self.parts.pop();
        }
    }
}
