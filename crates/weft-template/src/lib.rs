//! Compile-once HTML templating with typed model binding and contextual
//! escaping.
//!
//! Templates are plain HTML with `{{name}}` parameter tokens. Each token is
//! bound at startup to a property of a [`TemplateModel`], and the escaping
//! strategy for every substitution is fixed then from the property's
//! declared kind and the token's markup context (body text, attribute
//! value, or URL-bearing attribute). Rendering is a single pass over a
//! flat part sequence: no parsing, no reflection, no name lookups.
//!
//! # Lifecycle
//!
//! Build a [`TemplateRegistry`], register every model and template, call
//! [`TemplateRegistry::finalize`] to resolve nested-template references,
//! then share the registry immutably and render.
//!
//! ```
//! use weft_template::{ModelDescriptor, TemplateModel, TemplateOptions, TemplateRegistry};
//!
//! struct Greeting {
//!     name: String,
//! }
//!
//! impl TemplateModel for Greeting {
//!     fn descriptor() -> ModelDescriptor {
//!         ModelDescriptor::new::<Self>()
//!             .with_template("<p>Hello {{name}}</p>")
//!             .text("name", |m: &Self| m.name.as_str().into())
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut registry = TemplateRegistry::new(TemplateOptions::default());
//! registry.register_model::<Greeting>()?;
//! registry.finalize()?;
//!
//! let greeting = Greeting { name: "<Ada> & co".to_owned() };
//! let out = registry.render_fragment(&greeting, "")?;
//! assert_eq!(out.html(), "<p>Hello &lt;Ada&gt; &amp; co</p>");
//! # Ok(())
//! # }
//! ```

mod compile;
mod error;
mod html;
mod model;
mod options;
mod part;
mod registry;
mod render;
mod source;

pub use error::{CompileError, CompileErrorKind, RenderError, MAX_NESTING_DEPTH};
pub use html::UrlAttrs;
pub use model::{
    AsAny, ModelDescriptor, TemplateModel, Value, ValueKind, BODY_PROPERTY, TITLE_PROPERTY,
};
pub use options::TemplateOptions;
pub use registry::{TemplateInfo, TemplateRegistry};
pub use render::{PageShell, Rendered};
pub use source::{DirSource, LoadError, TemplateSource};
