//! Rendering: walk a compiled part sequence, substituting values.
//!
//! Rendering never allocates intermediate trees and takes no per-request
//! locks; the registry is shared immutably. On any error the output buffer
//! is discarded, so callers never see partial HTML.

use weft_escape::{
    append_indented_lines, escape_attribute, escape_text, push_spaces, EscapeOptions, NewlineMode,
};

use crate::error::{RenderError, MAX_NESTING_DEPTH};
use crate::model::{ModelDescriptor, TemplateModel, Value, BODY_PROPERTY, TITLE_PROPERTY};
use crate::part::{CompiledTemplate, NestedTarget, Part, ParamStrategy};
use crate::registry::{ModelEntry, TemplateRegistry};

/// A completed render.
#[derive(Debug)]
pub struct Rendered {
    html: String,
}

impl Rendered {
    /// The rendered HTML.
    #[must_use]
    pub fn html(&self) -> &str {
        &self.html
    }

    /// Take ownership of the rendered HTML.
    #[must_use]
    pub fn into_string(self) -> String {
        self.html
    }

    /// The media type to serve this under.
    #[must_use]
    pub const fn content_type() -> &'static str {
        "text/html; charset=utf-8"
    }
}

/// A ready-made page-shell model carrying only the two reserved slots.
/// The shell markup itself is host-supplied: register it with
/// [`TemplateRegistry::register_default_template`]. Any model declaring
/// `_title`/`_body` slots works as a shell; this one exists for hosts with
/// no shell state of their own.
pub struct PageShell;

impl TemplateModel for PageShell {
    fn descriptor() -> ModelDescriptor {
        ModelDescriptor::new::<Self>()
            .slot(TITLE_PROPERTY)
            .slot(BODY_PROPERTY)
    }
}

/// Page-shell slot inputs: the page model whose `_title` and rendered
/// fragment fill the shell.
struct Slots<'a> {
    model: &'a dyn TemplateModel,
    path: &'a str,
}

impl TemplateRegistry {
    /// Render `model` through its template at `path` (`""` for the default
    /// template), as a standalone fragment.
    ///
    /// # Errors
    ///
    /// Fails if the model type or template path is unknown, an accessor
    /// misbehaves, or nested templates recurse past [`MAX_NESTING_DEPTH`].
    pub fn render_fragment(
        &self,
        model: &dyn TemplateModel,
        path: &str,
    ) -> Result<Rendered, RenderError> {
        let renderer = Renderer {
            registry: self,
            slots: None,
        };
        let mut html = String::new();
        renderer.fragment(model, path, 0, 0, &mut html)?;
        Ok(Rendered { html })
    }

    /// Render `model` as a page or a fragment, depending on the model.
    ///
    /// A page model (one whose type declares a `_title` property) is
    /// woven into `shell`'s template: the `_title` fills the shell's
    /// title slot (escaped) and the rendered fragment fills the body
    /// slot. A model without a `_title` renders exactly as
    /// [`render_fragment`](Self::render_fragment) would, and no model at
    /// all renders nothing.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`render_fragment`](Self::render_fragment),
    /// for the shell and the page model both.
    pub fn render_page(
        &self,
        shell: &dyn TemplateModel,
        model: Option<&dyn TemplateModel>,
        path: &str,
    ) -> Result<Rendered, RenderError> {
        let Some(model) = model else {
            return Ok(Rendered {
                html: String::new(),
            });
        };
        let page = self
            .entry_of(model.as_any().type_id())
            .ok_or(RenderError::UnknownModel(model.type_name()))?;
        if page.title.is_none() {
            return self.render_fragment(model, path);
        }
        let entry = self
            .entry_of(shell.as_any().type_id())
            .ok_or(RenderError::UnknownModel(shell.type_name()))?;
        let template = entry
            .default_template
            .as_ref()
            .ok_or(RenderError::NoDefaultTemplate(entry.type_name))?;
        let renderer = Renderer {
            registry: self,
            slots: Some(Slots { model, path }),
        };
        let mut html = String::new();
        renderer.template(entry, template, shell, 0, 0, &mut html)?;
        Ok(Rendered { html })
    }
}

struct Renderer<'r> {
    registry: &'r TemplateRegistry,
    slots: Option<Slots<'r>>,
}

impl Renderer<'_> {
    fn fragment(
        &self,
        model: &dyn TemplateModel,
        path: &str,
        base: usize,
        depth: usize,
        out: &mut String,
    ) -> Result<(), RenderError> {
        let entry = self
            .registry
            .entry_of(model.as_any().type_id())
            .ok_or(RenderError::UnknownModel(model.type_name()))?;
        let template = if path.is_empty() {
            entry
                .default_template
                .as_ref()
                .ok_or(RenderError::NoDefaultTemplate(entry.type_name))?
        } else {
            entry
                .by_path
                .get(path)
                .ok_or_else(|| RenderError::UnknownTemplatePath {
                    model: entry.type_name,
                    path: path.to_owned(),
                })?
        };
        self.template(entry, template, model, base, depth, out)
    }

    fn template(
        &self,
        entry: &ModelEntry,
        template: &CompiledTemplate,
        model: &dyn TemplateModel,
        base: usize,
        depth: usize,
        out: &mut String,
    ) -> Result<(), RenderError> {
        for part in &template.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Indent { level } => indent(out, level + base),
                Part::Param {
                    name,
                    prop,
                    strategy,
                    level,
                } => {
                    let value = self.read(entry, *prop, model)?;
                    if value.is_null() {
                        continue;
                    }
                    self.scalar(entry, name, &value, *strategy, level + base, out)?;
                }
                Part::Nested {
                    name,
                    prop,
                    level,
                    target,
                } => {
                    let value = self.read(entry, *prop, model)?;
                    match value {
                        Value::Null => {}
                        Value::Nested(child) => {
                            let NestedTarget::Resolved(idx) = *target else {
                                return Err(RenderError::NotFinalized {
                                    model: entry.type_name,
                                    property: name,
                                });
                            };
                            if depth + 1 > MAX_NESTING_DEPTH {
                                return Err(RenderError::NestingTooDeep);
                            }
                            let child_entry = &self.registry.entries[idx];
                            let child_template = child_entry
                                .default_template
                                .as_ref()
                                .ok_or(RenderError::NoDefaultTemplate(child_entry.type_name))?;
                            self.template(
                                child_entry,
                                child_template,
                                child,
                                base + level,
                                depth + 1,
                                out,
                            )?;
                        }
                        _ => {
                            return Err(RenderError::KindMismatch {
                                model: entry.type_name,
                                property: name,
                            });
                        }
                    }
                }
                Part::Title { .. } => self.title_slot(out)?,
                Part::Body { level } => self.body_slot(level + base, out)?,
            }
        }
        Ok(())
    }

    fn read<'m>(
        &self,
        entry: &ModelEntry,
        prop: usize,
        model: &'m dyn TemplateModel,
    ) -> Result<Value<'m>, RenderError> {
        let property = entry.props.by_index(prop);
        property
            .read(model.as_any())
            .ok_or(RenderError::Accessor {
                model: entry.type_name,
                property: property.name,
            })
    }

    /// Write a scalar value under its compile-time strategy. A value
    /// inconsistent with the declared kind is refused rather than written
    /// with the wrong escaping.
    fn scalar(
        &self,
        entry: &ModelEntry,
        name: &'static str,
        value: &Value<'_>,
        strategy: ParamStrategy,
        level: usize,
        out: &mut String,
    ) -> Result<(), RenderError> {
        let mismatch = || RenderError::KindMismatch {
            model: entry.type_name,
            property: name,
        };
        match strategy {
            ParamStrategy::Verbatim => match value {
                Value::Int(n) => out.push_str(&n.to_string()),
                Value::UInt(n) => out.push_str(&n.to_string()),
                Value::Float(n) => out.push_str(&n.to_string()),
                Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
                Value::Uri(uri) => out.push_str(uri),
                _ => return Err(mismatch()),
            },
            ParamStrategy::Escaped { attr } => {
                let mut buf = [0_u8; 4];
                let raw: &str = match value {
                    Value::Str(s) => s,
                    Value::Char(c) => c.encode_utf8(&mut buf),
                    _ => return Err(mismatch()),
                };
                self.escaped(raw, attr, level, out);
            }
        }
        Ok(())
    }

    fn escaped(&self, raw: &str, attr: bool, level: usize, out: &mut String) {
        let pretty = self.registry.options.pretty_print;
        let opts = EscapeOptions {
            ampersand: self.registry.options.ampersand,
            newline: if pretty && !attr {
                NewlineMode::Preserve
            } else {
                NewlineMode::Space
            },
            preserve_runs: pretty && !attr,
        };
        if attr {
            escape_attribute(raw, opts, out);
        } else if pretty {
            // Multi-line values are re-indented to the substitution point.
            let mut escaped = String::with_capacity(raw.len());
            escape_text(raw, opts, &mut escaped);
            append_indented_lines(&escaped, level, true, |line, out| out.push_str(line), out);
        } else {
            escape_text(raw, opts, out);
        }
    }

    fn title_slot(&self, out: &mut String) -> Result<(), RenderError> {
        let Some(slots) = &self.slots else {
            return Ok(());
        };
        let model = slots.model;
        let entry = self
            .registry
            .entry_of(model.as_any().type_id())
            .ok_or(RenderError::UnknownModel(model.type_name()))?;
        let Some(title_prop) = entry.title else {
            return Ok(());
        };
        let value = self.read(entry, title_prop, model)?;
        let mut buf = [0_u8; 4];
        let raw: &str = match &value {
            Value::Null => return Ok(()),
            Value::Str(s) => s,
            Value::Char(c) => c.encode_utf8(&mut buf),
            _ => {
                return Err(RenderError::KindMismatch {
                    model: entry.type_name,
                    property: TITLE_PROPERTY,
                });
            }
        };
        let opts = EscapeOptions {
            ampersand: self.registry.options.ampersand,
            newline: NewlineMode::Space,
            preserve_runs: false,
        };
        escape_text(raw, opts, out);
        Ok(())
    }

    fn body_slot(&self, level: usize, out: &mut String) -> Result<(), RenderError> {
        let Some(slots) = &self.slots else {
            return Ok(());
        };
        self.fragment(slots.model, slots.path, level, 0, out)
    }
}

/// A pretty-print line break: newline (unless at the very start of the
/// output) plus one space per indent level.
fn indent(out: &mut String, level: usize) {
    if !out.is_empty() {
        out.push('\n');
    }
    push_spaces(out, level);
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::options::TemplateOptions;

    struct Greeting {
        name: String,
        count: i64,
    }

    impl TemplateModel for Greeting {
        fn descriptor() -> ModelDescriptor {
            ModelDescriptor::new::<Self>()
                .with_template("<p>Hello {{name}}, you have {{count}} new</p>")
                .text("name", |m: &Self| m.name.as_str().into())
                .int("count", |m: &Self| m.count.into())
        }
    }

    struct Item {
        name: String,
    }

    impl TemplateModel for Item {
        fn descriptor() -> ModelDescriptor {
            ModelDescriptor::new::<Self>()
                .with_template("<li>{{name}}</li>")
                .text("name", |m: &Self| m.name.as_str().into())
        }
    }

    struct Listing {
        first: Item,
    }

    fn first_item(m: &Listing) -> Option<&Item> {
        Some(&m.first)
    }

    impl TemplateModel for Listing {
        fn descriptor() -> ModelDescriptor {
            ModelDescriptor::new::<Self>()
                .with_template("<ul>{{first}}</ul>")
                .nested("first", first_item)
        }
    }

    struct Page {
        title: String,
    }

    impl TemplateModel for Page {
        fn descriptor() -> ModelDescriptor {
            ModelDescriptor::new::<Self>()
                .with_template("<p>hi</p>")
                .text("_title", |m: &Self| m.title.as_str().into())
        }
    }

    fn registry_with<T: TemplateModel>(options: TemplateOptions) -> TemplateRegistry {
        let mut reg = TemplateRegistry::new(options);
        reg.register_model::<T>().unwrap();
        reg.finalize().unwrap();
        reg
    }

    #[test]
    fn test_fragment_with_escaping() {
        let reg = registry_with::<Greeting>(TemplateOptions::default());
        let model = Greeting {
            name: "R & D <script>".to_owned(),
            count: 3,
        };
        let out = reg.render_fragment(&model, "").unwrap();
        assert_eq!(
            out.html(),
            "<p>Hello R &amp; D &lt;script&gt;, you have 3 new</p>"
        );
    }

    #[test]
    fn test_pretty_fragment() {
        let mut reg = TemplateRegistry::new(TemplateOptions {
            pretty_print: true,
            ..TemplateOptions::default()
        });
        reg.register_default_template::<Item>("<div><p>{{name}}</p></div>")
            .unwrap();
        reg.finalize().unwrap();
        let model = Item {
            name: "hi".to_owned(),
        };
        let out = reg.render_fragment(&model, "").unwrap();
        assert_eq!(out.html(), "<div>\n <p>hi</p>\n</div>");
    }

    #[test]
    fn test_pretty_reindents_multiline_values() {
        let mut reg = TemplateRegistry::new(TemplateOptions {
            pretty_print: true,
            ..TemplateOptions::default()
        });
        reg.register_default_template::<Item>("<div><p>{{name}}</p></div>")
            .unwrap();
        reg.finalize().unwrap();
        let model = Item {
            name: "a\nb".to_owned(),
        };
        let out = reg.render_fragment(&model, "").unwrap();
        assert_eq!(out.html(), "<div>\n <p>a\n  b</p>\n</div>");
    }

    #[test]
    fn test_attribute_value_single_line() {
        let mut reg = TemplateRegistry::new(TemplateOptions::default());
        reg.register_default_template::<Item>(r#"<div title="{{name}}">x</div>"#)
            .unwrap();
        reg.finalize().unwrap();
        let model = Item {
            name: "a\nb \"q\"".to_owned(),
        };
        let out = reg.render_fragment(&model, "").unwrap();
        assert_eq!(out.html(), "<div title=\"a b &quot;q&quot;\">x</div>");
    }

    #[test]
    fn test_nested_model() {
        let mut reg = TemplateRegistry::new(TemplateOptions::default());
        reg.register_model::<Listing>().unwrap();
        reg.register_model::<Item>().unwrap();
        reg.finalize().unwrap();
        let model = Listing {
            first: Item {
                name: "A".to_owned(),
            },
        };
        let out = reg.render_fragment(&model, "").unwrap();
        assert_eq!(out.html(), "<ul><li>A</li></ul>");
    }

    #[test]
    fn test_template_path_override() {
        let mut reg = TemplateRegistry::new(TemplateOptions::default());
        reg.register_template::<Item>("compact", "<span>{{name}}</span>")
            .unwrap();
        reg.finalize().unwrap();
        let model = Item {
            name: "x".to_owned(),
        };
        assert_eq!(
            reg.render_fragment(&model, "compact").unwrap().html(),
            "<span>x</span>"
        );
        assert_eq!(reg.render_fragment(&model, "").unwrap().html(), "<li>x</li>");
    }

    #[test]
    fn test_unknown_template_path() {
        let reg = registry_with::<Item>(TemplateOptions::default());
        let model = Item {
            name: "x".to_owned(),
        };
        let err = reg.render_fragment(&model, "nope").unwrap_err();
        assert!(matches!(err, RenderError::UnknownTemplatePath { .. }));
    }

    #[test]
    fn test_unregistered_model() {
        let reg = registry_with::<Item>(TemplateOptions::default());
        let model = Greeting {
            name: String::new(),
            count: 0,
        };
        let err = reg.render_fragment(&model, "").unwrap_err();
        assert!(matches!(err, RenderError::UnknownModel(_)));
    }

    const SHELL: &str = "<!DOCTYPE html>\
<html><head><title>{{_title}}</title></head><body>{{_body}}</body></html>";

    #[test]
    fn test_page_render() {
        let mut reg = TemplateRegistry::new(TemplateOptions::default());
        reg.register_default_template::<PageShell>(SHELL).unwrap();
        reg.register_model::<Page>().unwrap();
        reg.finalize().unwrap();
        let page = Page {
            title: "My <Page>".to_owned(),
        };
        let out = reg.render_page(&PageShell, Some(&page), "").unwrap();
        assert_eq!(
            out.html(),
            "<!DOCTYPE html><html><head><title>My &lt;Page&gt;</title></head>\
             <body><p>hi</p></body></html>"
        );
    }

    #[test]
    fn test_page_render_without_model_is_empty() {
        let mut reg = TemplateRegistry::new(TemplateOptions::default());
        reg.register_default_template::<PageShell>(SHELL).unwrap();
        reg.finalize().unwrap();
        let out = reg.render_page(&PageShell, None, "").unwrap();
        assert_eq!(out.html(), "");
    }

    #[test]
    fn test_titleless_model_renders_as_plain_fragment() {
        let mut reg = TemplateRegistry::new(TemplateOptions::default());
        reg.register_default_template::<PageShell>(SHELL).unwrap();
        reg.register_model::<Item>().unwrap();
        reg.finalize().unwrap();
        // Item declares no _title, so no page shell is woven around it.
        let model = Item {
            name: "x".to_owned(),
        };
        let out = reg.render_page(&PageShell, Some(&model), "").unwrap();
        assert_eq!(out.html(), "<li>x</li>");
    }

    #[test]
    fn test_cyclic_model_graph_aborts() {
        struct Looper;
        fn next(m: &Looper) -> Option<&Looper> {
            Some(m)
        }
        impl TemplateModel for Looper {
            fn descriptor() -> ModelDescriptor {
                ModelDescriptor::new::<Self>()
                    .with_template("<i>{{next}}</i>")
                    .nested("next", next)
            }
        }
        let reg = registry_with::<Looper>(TemplateOptions::default());
        let err = reg.render_fragment(&Looper, "").unwrap_err();
        assert!(matches!(err, RenderError::NestingTooDeep));
    }

    #[test]
    fn test_kind_mismatch_refused() {
        struct Lying {
            text: String,
        }
        impl TemplateModel for Lying {
            fn descriptor() -> ModelDescriptor {
                ModelDescriptor::new::<Self>()
                    .with_template("<p>{{n}}</p>")
                    .int("n", |m: &Self| m.text.as_str().into())
            }
        }
        let reg = registry_with::<Lying>(TemplateOptions::default());
        let model = Lying {
            text: "<script>".to_owned(),
        };
        let err = reg.render_fragment(&model, "").unwrap_err();
        assert!(matches!(err, RenderError::KindMismatch { .. }));
    }

    #[test]
    fn test_null_value_renders_empty() {
        struct Maybe {
            name: Option<String>,
        }
        impl TemplateModel for Maybe {
            fn descriptor() -> ModelDescriptor {
                ModelDescriptor::new::<Self>()
                    .with_template("<p>{{name}}</p>")
                    .text("name", |m: &Self| m.name.as_deref().into())
            }
        }
        let reg = registry_with::<Maybe>(TemplateOptions::default());
        let out = reg.render_fragment(&Maybe { name: None }, "").unwrap();
        assert_eq!(out.html(), "<p></p>");
    }

    #[test]
    fn test_rendered_content_type() {
        assert_eq!(Rendered::content_type(), "text/html; charset=utf-8");
    }
}
