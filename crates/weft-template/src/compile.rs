//! Template compilation: markup in, part sequence out.
//!
//! The compiler runs once per template at startup. It parses the markup
//! leniently (void elements need no closing tag, unknown entities pass
//! through), scans text and attribute values for `{{name}}` tokens, binds
//! each token to a model property and fixes its escaping strategy from the
//! property's declared kind. Pretty-printing decisions (where line breaks
//! and indentation go) are also taken here, so rendering is a single pass.

use std::sync::LazyLock;

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::reader::Reader;
use regex::Regex;
use weft_escape::{
    escape_attribute, escape_text, is_unicode_whitespace, AmpersandMode, EscapeOptions, NBSP,
};

use crate::error::{CompileError, CompileErrorKind};
use crate::html::{is_inline_element, is_void_element, UrlAttrs};
use crate::model::{PropertyMap, ValueKind, BODY_PROPERTY, TITLE_PROPERTY};
use crate::options::TemplateOptions;
use crate::part::{CompiledTemplate, NestedTarget, Part, ParamStrategy};

/// A substitutable parameter token: `{{identifier}}`, no interior
/// whitespace. Anything else containing braces is literal text.
static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{[A-Za-z_][A-Za-z0-9_]*\}\}").unwrap());

/// Escaping applied to literal template markup on its way into the part
/// sequence. Smart ampersands keep author-written entity references
/// (`&hellip;`) intact; whitespace runs were collapsed beforehand.
const LITERAL_OPTS: EscapeOptions = EscapeOptions {
    ampersand: AmpersandMode::SmartEntity,
    newline: weft_escape::NewlineMode::Space,
    preserve_runs: true,
};

/// Compile one template source for a model whose properties are `props`.
pub(crate) fn compile(
    source: &str,
    model: &'static str,
    path: &str,
    props: &PropertyMap,
    options: &TemplateOptions,
    url_attrs: &UrlAttrs,
) -> Result<CompiledTemplate, CompileError> {
    let mut compiler = Compiler {
        props,
        options,
        url_attrs,
        stack: Vec::new(),
        out: CompiledTemplate::default(),
    };
    compiler
        .run(source)
        .map_err(|kind| CompileError::new(model, path, kind))?;
    tracing::debug!(
        model,
        path,
        parts = compiler.out.parts.len(),
        whole_document = compiler.out.whole_document,
        "compiled template"
    );
    Ok(compiler.out)
}

struct OpenElement {
    name: String,
    /// Nesting depth of the element itself (its children sit one deeper).
    depth: usize,
    inline: bool,
    /// Inside a `<p>` subtree, where a line break would show up as
    /// rendered whitespace.
    para: bool,
    /// Set once a block-level child forced a line break, which in turn puts
    /// the closing tag on its own line.
    has_block_child: bool,
}

struct Compiler<'a> {
    props: &'a PropertyMap,
    options: &'a TemplateOptions,
    url_attrs: &'a UrlAttrs,
    stack: Vec<OpenElement>,
    out: CompiledTemplate,
}

impl Compiler<'_> {
    fn run(&mut self, source: &str) -> Result<(), CompileErrorKind> {
        let mut reader = Reader::from_str(source);
        let config = reader.config_mut();
        config.trim_text(false);
        // Leniency: we keep our own element stack (void elements never get
        // closing tags) and report mismatches with template context.
        config.check_end_names = false;
        config.allow_unmatched_ends = true;

        loop {
            match reader.read_event()? {
                Event::Start(e) => self.open_tag(&reader, &e, false)?,
                Event::Empty(e) => self.open_tag(&reader, &e, true)?,
                Event::End(e) => self.end_tag(&reader, &e)?,
                Event::Text(e) => {
                    let text = reader.decoder().decode(&e)?;
                    self.text(&text)?;
                }
                Event::GeneralRef(e) => {
                    // Author-written entity references pass through verbatim.
                    let entity = reader.decoder().decode(&e)?;
                    self.out.push_literal(&format!("&{entity};"));
                }
                Event::CData(e) => {
                    // No parameter substitution inside CDATA.
                    let text = String::from_utf8_lossy(&e);
                    self.literal_text(&text);
                }
                Event::Comment(e) => {
                    let text = reader.decoder().decode(&e)?;
                    self.comment(&text);
                }
                Event::DocType(e) => {
                    let text = reader.decoder().decode(&e)?;
                    self.out.whole_document = true;
                    self.out.push_literal(&format!("<!DOCTYPE {}>", text.trim()));
                }
                Event::Decl(_) | Event::PI(_) => {}
                Event::Eof => break,
            }
        }

        if let Some(open) = self.stack.last() {
            return Err(CompileErrorKind::Malformed(
                format!("element <{}> is never closed", open.name).into(),
            ));
        }
        self.out.trim_trailing_indent();
        Ok(())
    }

    fn open_tag(
        &mut self,
        reader: &Reader<&[u8]>,
        e: &BytesStart<'_>,
        empty: bool,
    ) -> Result<(), CompileErrorKind> {
        let name = decode_name(reader, e.name().as_ref());
        if self.stack.is_empty() && name.eq_ignore_ascii_case("html") {
            self.out.whole_document = true;
        }
        let void = is_void_element(&name);
        let inline = is_inline_element(&name);
        let depth = self.stack.len();
        let parent_para = self.stack.last().is_some_and(|e| e.para);

        if self.options.pretty_print && !inline && !parent_para {
            if let Some(parent) = self.stack.last_mut() {
                parent.has_block_child = true;
            }
            self.break_at(depth);
        }

        self.out.push_literal(&format!("<{name}"));
        for attr in e.attributes() {
            let attr = attr?;
            let key = decode_name(reader, attr.key.as_ref());
            let value = attr.unescape_value().map_or_else(
                |_| String::from_utf8_lossy(&attr.value).into_owned(),
                std::borrow::Cow::into_owned,
            );
            self.out.push_literal(&format!(" {key}=\""));
            self.attribute_value(&name, &key, &value, depth + 1)?;
            self.out.push_literal("\"");
        }
        self.out.push_literal(">");

        if void {
            // Void elements close themselves; never pushed on the stack.
            return Ok(());
        }
        if empty {
            self.out.push_literal(&format!("</{name}>"));
            return Ok(());
        }
        let para = parent_para || name.eq_ignore_ascii_case("p");
        self.stack.push(OpenElement {
            name,
            depth,
            inline,
            para,
            has_block_child: false,
        });
        Ok(())
    }

    fn end_tag(
        &mut self,
        reader: &Reader<&[u8]>,
        e: &BytesEnd<'_>,
    ) -> Result<(), CompileErrorKind> {
        let name = decode_name(reader, e.name().as_ref());
        if is_void_element(&name) {
            return Err(CompileErrorKind::VoidElementWithChildren(name));
        }
        let Some(top) = self.stack.pop() else {
            return Err(CompileErrorKind::Malformed(
                format!("stray closing tag </{name}>").into(),
            ));
        };
        if !top.name.eq_ignore_ascii_case(&name) {
            return Err(CompileErrorKind::Malformed(
                format!("closing tag </{name}> does not match open <{}>", top.name).into(),
            ));
        }
        if self.options.pretty_print && !top.inline && !top.para && top.has_block_child {
            self.break_at(top.depth);
        }
        self.out.push_literal(&format!("</{}>", top.name));
        Ok(())
    }

    /// Text content: scan for parameter tokens, escape the rest.
    fn text(&mut self, raw: &str) -> Result<(), CompileErrorKind> {
        // Raw angle brackets in text are author mistakes, not content;
        // content spells them &lt;/&gt;.
        if raw.contains(['<', '>']) {
            return Err(CompileErrorKind::Malformed(
                "bare '<' or '>' in text content; write &lt; or &gt;".into(),
            ));
        }
        let level = self.stack.len();
        let mut last = 0;
        for m in TOKEN_RE.find_iter(raw) {
            self.literal_text(&raw[last..m.start()]);
            let name = &raw[m.start() + 2..m.end() - 2];
            self.text_param(name, level)?;
            last = m.end();
        }
        self.literal_text(&raw[last..]);
        Ok(())
    }

    fn text_param(&mut self, name: &str, level: usize) -> Result<(), CompileErrorKind> {
        let Some((prop_idx, prop)) = self.props.get(name) else {
            return Err(CompileErrorKind::UnknownParameter(name.to_owned()));
        };
        let part = match prop.kind {
            ValueKind::Text | ValueKind::Char => Part::Param {
                name: prop.name,
                prop: prop_idx,
                strategy: ParamStrategy::Escaped { attr: false },
                level,
            },
            ValueKind::Int | ValueKind::UInt | ValueKind::Float | ValueKind::Bool => Part::Param {
                name: prop.name,
                prop: prop_idx,
                strategy: ParamStrategy::Verbatim,
                level,
            },
            ValueKind::Uri => {
                if self.options.strict_uri_attributes {
                    return Err(CompileErrorKind::UriParamOutsideUrlAttribute(
                        name.to_owned(),
                    ));
                }
                Part::Param {
                    name: prop.name,
                    prop: prop_idx,
                    strategy: ParamStrategy::Verbatim,
                    level,
                }
            }
            ValueKind::Nested { type_id, type_name } => Part::Nested {
                name: prop.name,
                prop: prop_idx,
                level,
                target: NestedTarget::Unresolved { type_id, type_name },
            },
            ValueKind::Slot => match prop.name {
                TITLE_PROPERTY => Part::Title { level },
                BODY_PROPERTY => Part::Body { level },
                other => return Err(CompileErrorKind::UnknownSlot(other.to_owned())),
            },
        };
        self.out.parts.push(part);
        Ok(())
    }

    /// An attribute value: scan for tokens, apply URL-attribute policy.
    fn attribute_value(
        &mut self,
        tag: &str,
        attr: &str,
        raw: &str,
        level: usize,
    ) -> Result<(), CompileErrorKind> {
        let url = self.url_attrs.is_url_attr(tag, attr);
        let strict = self.options.strict_uri_attributes && url;

        let tokens: Vec<_> = TOKEN_RE.find_iter(raw).collect();
        if strict {
            if tokens.len() > 1 {
                return Err(CompileErrorKind::LiteralInUrlAttribute(raw.to_owned()));
            }
            if let Some(m) = tokens.first() {
                let before = &raw[..m.start()];
                let after = &raw[m.end()..];
                if !before.trim().is_empty() {
                    return Err(CompileErrorKind::LiteralInUrlAttribute(before.to_owned()));
                }
                if !after.trim().is_empty() {
                    return Err(CompileErrorKind::LiteralInUrlAttribute(after.to_owned()));
                }
            }
        }

        let mut last = 0;
        for m in &tokens {
            self.attr_literal(&raw[last..m.start()]);
            let name = &raw[m.start() + 2..m.end() - 2];
            self.attr_param(name, url, level)?;
            last = m.end();
        }
        self.attr_literal(&raw[last..]);
        Ok(())
    }

    fn attr_param(&mut self, name: &str, url: bool, level: usize) -> Result<(), CompileErrorKind> {
        let Some((prop_idx, prop)) = self.props.get(name) else {
            return Err(CompileErrorKind::UnknownParameter(name.to_owned()));
        };
        let strict = self.options.strict_uri_attributes;
        let strategy = match prop.kind {
            ValueKind::Text | ValueKind::Char => {
                if strict && url {
                    return Err(CompileErrorKind::NonUriParamInUrlAttribute(name.to_owned()));
                }
                ParamStrategy::Escaped { attr: true }
            }
            ValueKind::Int | ValueKind::UInt | ValueKind::Float | ValueKind::Bool => {
                if strict && url {
                    return Err(CompileErrorKind::NonUriParamInUrlAttribute(name.to_owned()));
                }
                ParamStrategy::Verbatim
            }
            ValueKind::Uri => {
                if strict && !url {
                    return Err(CompileErrorKind::UriParamOutsideUrlAttribute(
                        name.to_owned(),
                    ));
                }
                ParamStrategy::Verbatim
            }
            ValueKind::Nested { .. } | ValueKind::Slot => {
                return Err(CompileErrorKind::ParameterInAttribute(name.to_owned()));
            }
        };
        self.out.parts.push(Part::Param {
            name: prop.name,
            prop: prop_idx,
            strategy,
            level,
        });
        Ok(())
    }

    /// Literal text content between tokens. Whitespace runs collapse to a
    /// single space; whitespace butting against a line break is dropped.
    fn literal_text(&mut self, raw: &str) {
        if raw.is_empty() {
            return;
        }
        let collapsed = collapse_whitespace(raw);
        if collapsed.trim().is_empty() {
            // Whitespace-only text: keep one space when flowing inline, drop
            // it at line breaks and at the very start.
            if !matches!(self.out.parts.last(), None | Some(Part::Indent { .. })) {
                self.out.push_literal(" ");
            }
            return;
        }
        let segment = if matches!(self.out.parts.last(), None | Some(Part::Indent { .. })) {
            collapsed.trim_start_matches(' ')
        } else {
            collapsed.as_str()
        };
        let mut escaped = String::with_capacity(segment.len());
        escape_text(segment, LITERAL_OPTS, &mut escaped);
        self.out.push_literal(&escaped);
    }

    fn attr_literal(&mut self, raw: &str) {
        if raw.is_empty() {
            return;
        }
        let mut escaped = String::with_capacity(raw.len());
        escape_attribute(&collapse_whitespace(raw), LITERAL_OPTS, &mut escaped);
        self.out.push_literal(&escaped);
    }

    /// Conditional and license comments survive; everything else is
    /// stripped from the output.
    fn comment(&mut self, text: &str) {
        let keep = text.trim_start().starts_with("[if ") || text.contains("@license");
        if keep {
            self.out.push_literal(&format!("<!--{text}-->"));
        }
    }

    /// Insert a pretty-print line break at `level`, eating any spaces that
    /// would otherwise dangle at the end of the previous line.
    fn break_at(&mut self, level: usize) {
        let drop_empty = if let Some(Part::Literal(prev)) = self.out.parts.last_mut() {
            let trimmed = prev.trim_end_matches(' ').len();
            prev.truncate(trimmed);
            prev.is_empty()
        } else {
            false
        };
        if drop_empty {
            self.out.parts.pop();
        }
        self.out.push_indent(level);
    }
}

fn decode_name(reader: &Reader<&[u8]>, name: &[u8]) -> String {
    reader.decoder().decode(name).map_or_else(
        |_| String::from_utf8_lossy(name).into_owned(),
        std::borrow::Cow::into_owned,
    )
}

/// Collapse whitespace runs to a single space. NBSP is content, not
/// whitespace, here; the escaper renders it as `&nbsp;`.
fn collapse_whitespace(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_run = false;
    for c in raw.chars() {
        if c != NBSP && ((c as u32) <= 32 || is_unicode_whitespace(c)) {
            if !in_run {
                out.push(' ');
            }
            in_run = true;
        } else {
            in_run = false;
            out.push(c);
        }
    }
    out
}
