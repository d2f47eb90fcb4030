//! Engine configuration.
//!
//! A host typically deserializes [`TemplateOptions`] from a section of its
//! own TOML config and hands it to [`TemplateRegistry::new`].
//!
//! [`TemplateRegistry::new`]: crate::TemplateRegistry::new

use serde::Deserialize;
use weft_escape::AmpersandMode;

/// Engine-wide configuration, fixed at registry construction.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TemplateOptions {
    /// Pretty-print output: newline-plus-indent between block-level
    /// elements, whitespace runs preserved in escaped values.
    pub pretty_print: bool,

    /// Strict URI-attribute mode: URL-bearing attributes must contain
    /// exactly one URI-typed parameter and nothing else, and URI-typed
    /// parameters may not appear anywhere else. Off by default.
    pub strict_uri_attributes: bool,

    /// Allow properties registered as non-public to be bound. When off,
    /// such properties are dropped with a warning and templates referencing
    /// them fail compilation with "unknown parameter".
    pub allow_non_public_properties: bool,

    /// Ampersand escaping policy for substituted values.
    pub ampersand: AmpersandMode,
}
