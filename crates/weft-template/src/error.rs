//! Error types for template compilation and rendering.
//!
//! Compile errors are configuration errors: they surface during startup
//! registration/finalize and must never be seen per-request. Render errors
//! are the only failures a request can observe, and they leave the caller
//! with no partial output.

use std::borrow::Cow;

/// A configuration error, fatal at startup, tied to the model type and
/// template path that triggered it (`""` is the default-template path).
#[derive(Debug, thiserror::Error)]
#[error("template {path:?} for model {model}: {kind}")]
pub struct CompileError {
    /// Type name of the owning model.
    pub model: &'static str,
    /// Template path (`""` for the default template).
    pub path: String,
    /// What went wrong.
    pub kind: CompileErrorKind,
}

impl CompileError {
    pub(crate) fn new(
        model: &'static str,
        path: impl Into<String>,
        kind: CompileErrorKind,
    ) -> Self {
        Self {
            model,
            path: path.into(),
            kind,
        }
    }
}

/// The compile-time failure taxonomy.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CompileErrorKind {
    /// The template markup could not be parsed.
    #[error("malformed markup: {0}")]
    Malformed(Cow<'static, str>),

    /// Underlying markup reader error.
    #[error("markup reader error")]
    Xml(#[from] quick_xml::Error),

    /// Malformed attribute in the markup.
    #[error("markup attribute error")]
    Attr(#[from] quick_xml::events::attributes::AttrError),

    /// Encoding error while reading the markup.
    #[error("encoding error")]
    Encoding(#[from] quick_xml::encoding::EncodingError),

    /// A `{{name}}` token does not match any bound property of the model.
    #[error("unknown parameter {{{{{0}}}}}: no such property on the model")]
    UnknownParameter(String),

    /// A nested-model or page-shell slot parameter appeared inside an
    /// attribute value, where no sub-template can be embedded.
    #[error("parameter {{{{{0}}}}} cannot be used inside an HTML attribute")]
    ParameterInAttribute(String),

    /// A void element (`<br>`, `<img>`, ...) had child content.
    #[error("<{0}> is a void element, but has children")]
    VoidElementWithChildren(String),

    /// Strict URI mode: a URI-typed parameter was used outside a
    /// URL-bearing attribute.
    #[error("URI-typed parameter {{{{{0}}}}} used outside a URL attribute")]
    UriParamOutsideUrlAttribute(String),

    /// Strict URI mode: a URL-bearing attribute took a non-URI parameter.
    #[error("URL attribute requires a URI-typed parameter, got {{{{{0}}}}}")]
    NonUriParamInUrlAttribute(String),

    /// Strict URI mode: a URL-bearing attribute contained literal text
    /// besides the parameter itself.
    #[error("URL attribute may not contain anything besides a URI-typed parameter, got {0:?}")]
    LiteralInUrlAttribute(String),

    /// A page-shell slot property with a name other than the two reserved
    /// slots was referenced in a template.
    #[error("unknown page-shell slot {{{{{0}}}}} (only _title and _body exist)")]
    UnknownSlot(String),

    /// The same property name was bound twice on one model.
    #[error("property {0:?} is bound more than once")]
    DuplicateProperty(&'static str),

    /// A `_title` property must be text-kinded (it is woven into the page
    /// shell as an escaped string).
    #[error("_title property must be a text property")]
    TitleNotText,

    /// A nested parameter references a model type never registered.
    #[error("nested model {0} is not registered")]
    UnresolvedNested(&'static str),

    /// A nested parameter references a model type with no default template.
    #[error("nested model {0} has no default template")]
    NestedWithoutDefaultTemplate(&'static str),
}

/// Maximum depth of nested-template recursion before a render is aborted.
/// A model graph that reaches this is almost certainly cyclic.
pub const MAX_NESTING_DEPTH: usize = 64;

/// A per-request rendering failure. The output buffer is discarded; callers
/// never observe partial output.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RenderError {
    /// The model's type was never registered.
    #[error("model type {0} is not registered")]
    UnknownModel(&'static str),

    /// The model has no default template and none was named.
    #[error("model {0} does not have a default template, and no template path was given")]
    NoDefaultTemplate(&'static str),

    /// A named override template does not exist for the model.
    #[error("unknown template {path:?} for model {model}")]
    UnknownTemplatePath {
        /// Type name of the model.
        model: &'static str,
        /// The template path that was requested.
        path: String,
    },

    /// A property accessor could not produce a value (the model instance
    /// was not of the registered type).
    #[error("accessor for {model}.{property} failed")]
    Accessor {
        /// Type name of the model.
        model: &'static str,
        /// Property name.
        property: &'static str,
    },

    /// A property accessor returned a value inconsistent with the kind it
    /// was registered under.
    #[error("{model}.{property} returned a value inconsistent with its declared kind")]
    KindMismatch {
        /// Type name of the model.
        model: &'static str,
        /// Property name.
        property: &'static str,
    },

    /// A nested template was rendered before [`finalize`] resolved it.
    ///
    /// [`finalize`]: crate::TemplateRegistry::finalize
    #[error("nested template for {model}.{property} was rendered before finalize()")]
    NotFinalized {
        /// Type name of the model.
        model: &'static str,
        /// Property name.
        property: &'static str,
    },

    /// Nested-template recursion exceeded [`MAX_NESTING_DEPTH`]; the model
    /// graph is probably cyclic.
    #[error("nested templates recursed deeper than {MAX_NESTING_DEPTH}; is the model graph cyclic?")]
    NestingTooDeep,
}
