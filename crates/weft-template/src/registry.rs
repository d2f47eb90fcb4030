//! The template registry: model registration, template compilation, and
//! the finalize step that resolves nested-template references.
//!
//! Lifecycle: construct with [`TemplateOptions`], register every model and
//! template, call [`TemplateRegistry::finalize`], then render. Registration
//! and finalize errors are configuration errors and should abort startup;
//! after finalize the registry is immutable and shared freely across
//! request threads.

use std::any::TypeId;
use std::collections::HashMap;

use crate::compile::compile;
use crate::error::{CompileError, CompileErrorKind};
use crate::html::UrlAttrs;
use crate::model::{PropertyMap, TemplateModel, ValueKind, TITLE_PROPERTY};
use crate::options::TemplateOptions;
use crate::part::{CompiledTemplate, NestedTarget, Part};

/// Everything the registry holds for one model type.
pub(crate) struct ModelEntry {
    pub(crate) type_name: &'static str,
    pub(crate) props: PropertyMap,
    /// Property index of a text-kinded `_title`, when the model is a page
    /// model.
    pub(crate) title: Option<usize>,
    pub(crate) default_template: Option<CompiledTemplate>,
    pub(crate) by_path: HashMap<String, CompiledTemplate>,
}

/// Summary of a compiled template, from [`TemplateRegistry::lookup`].
#[derive(Clone, Copy, Debug)]
pub struct TemplateInfo {
    /// Type name of the owning model.
    pub model: &'static str,
    /// True when the template source was a whole HTML document (doctype
    /// or `<html>` root) rather than a fragment.
    pub whole_document: bool,
}

/// Compiled templates for a set of model types.
pub struct TemplateRegistry {
    pub(crate) options: TemplateOptions,
    url_attrs: UrlAttrs,
    pub(crate) entries: Vec<ModelEntry>,
    by_type: HashMap<TypeId, usize>,
    pub(crate) finalized: bool,
}

impl TemplateRegistry {
    /// A registry with the given engine options.
    #[must_use]
    pub fn new(options: TemplateOptions) -> Self {
        Self {
            options,
            url_attrs: UrlAttrs::default(),
            entries: Vec::new(),
            by_type: HashMap::new(),
            finalized: false,
        }
    }

    /// The URL-bearing attribute whitelist, for registering custom
    /// elements before any templates are compiled.
    pub fn url_attrs_mut(&mut self) -> &mut UrlAttrs {
        &mut self.url_attrs
    }

    /// Register a model type: bind its properties and compile its embedded
    /// default template, if it declares one. Idempotent.
    ///
    /// # Errors
    ///
    /// Fails if the descriptor binds a property twice, declares a
    /// non-text `_title`, or its embedded template does not compile.
    pub fn register_model<T: TemplateModel>(&mut self) -> Result<(), CompileError> {
        self.ensure_model::<T>().map(|_| ())
    }

    /// Register (or replace) the template at `path` for model `T`,
    /// registering the model itself first if needed. The empty path names
    /// the default template.
    ///
    /// # Errors
    ///
    /// Fails if the model cannot be registered or the template does not
    /// compile.
    pub fn register_template<T: TemplateModel>(
        &mut self,
        path: &str,
        source: &str,
    ) -> Result<(), CompileError> {
        let idx = self.ensure_model::<T>()?;
        let entry = &self.entries[idx];
        let template = compile(
            source,
            entry.type_name,
            path,
            &entry.props,
            &self.options,
            &self.url_attrs,
        )?;
        let entry = &mut self.entries[idx];
        let model = entry.type_name;
        if path.is_empty() {
            entry.default_template = Some(template);
        } else {
            entry.by_path.insert(path.to_owned(), template);
        }
        // New references may need resolving.
        self.finalized = false;
        tracing::info!(model, path, "registered template");
        Ok(())
    }

    /// Register (or replace) the default template for model `T`.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`register_template`](Self::register_template).
    pub fn register_default_template<T: TemplateModel>(
        &mut self,
        source: &str,
    ) -> Result<(), CompileError> {
        self.register_template::<T>("", source)
    }

    /// Look up the template registered for model `T` at `path` (`""` for
    /// the default template).
    #[must_use]
    pub fn lookup<T: TemplateModel>(&self, path: &str) -> Option<TemplateInfo> {
        let entry = self.entry_of(TypeId::of::<T>())?;
        let template = if path.is_empty() {
            entry.default_template.as_ref()?
        } else {
            entry.by_path.get(path)?
        };
        Some(TemplateInfo {
            model: entry.type_name,
            whole_document: template.whole_document,
        })
    }

    /// True if model `T` has a template at `path` (`""` for the default).
    #[must_use]
    pub fn has_template<T: TemplateModel>(&self, path: &str) -> bool {
        self.lookup::<T>(path).is_some()
    }

    /// Resolve every nested-template reference. Must run after all
    /// registrations and before the first render; forward references
    /// between models are legal until this point.
    ///
    /// # Errors
    ///
    /// Fails if a nested parameter refers to a model type that was never
    /// registered, or one with no default template.
    pub fn finalize(&mut self) -> Result<(), CompileError> {
        let by_type = self.by_type.clone();
        let has_default: Vec<bool> = self
            .entries
            .iter()
            .map(|e| e.default_template.is_some())
            .collect();

        for entry in &mut self.entries {
            let owner = entry.type_name;
            let templates = entry
                .default_template
                .iter_mut()
                .map(|t| ("", t))
                .chain(entry.by_path.iter_mut().map(|(p, t)| (p.as_str(), t)));
            for (path, template) in templates {
                for part in &mut template.parts {
                    let Part::Nested { target, .. } = part else {
                        continue;
                    };
                    let NestedTarget::Unresolved { type_id, type_name } = *target else {
                        continue;
                    };
                    let Some(&idx) = by_type.get(&type_id) else {
                        return Err(CompileError::new(
                            owner,
                            path,
                            CompileErrorKind::UnresolvedNested(type_name),
                        ));
                    };
                    if !has_default[idx] {
                        return Err(CompileError::new(
                            owner,
                            path,
                            CompileErrorKind::NestedWithoutDefaultTemplate(type_name),
                        ));
                    }
                    *target = NestedTarget::Resolved(idx);
                }
            }
        }
        self.finalized = true;
        tracing::debug!(models = self.entries.len(), "registry finalized");
        Ok(())
    }

    pub(crate) fn entry_of(&self, type_id: TypeId) -> Option<&ModelEntry> {
        self.by_type.get(&type_id).map(|&idx| &self.entries[idx])
    }

    fn ensure_model<T: TemplateModel>(&mut self) -> Result<usize, CompileError> {
        if let Some(&idx) = self.by_type.get(&TypeId::of::<T>()) {
            return Ok(idx);
        }
        let desc = T::descriptor();
        let type_name = desc.type_name;
        let props =
            PropertyMap::build(type_name, desc.properties, self.options.allow_non_public_properties)
                .map_err(|kind| CompileError::new(type_name, "", kind))?;

        let title = match props.get(TITLE_PROPERTY) {
            Some((idx, prop)) => match prop.kind {
                ValueKind::Text => Some(idx),
                // The page shell's own slot is not a page title.
                ValueKind::Slot => None,
                _ => {
                    return Err(CompileError::new(
                        type_name,
                        "",
                        CompileErrorKind::TitleNotText,
                    ));
                }
            },
            None => None,
        };

        let default_template = match desc.default_template {
            Some(source) => Some(compile(
                source,
                type_name,
                "",
                &props,
                &self.options,
                &self.url_attrs,
            )?),
            None => None,
        };

        let idx = self.entries.len();
        self.entries.push(ModelEntry {
            type_name,
            props,
            title,
            default_template,
            by_path: HashMap::new(),
        });
        self.by_type.insert(TypeId::of::<T>(), idx);
        self.finalized = false;
        tracing::info!(model = type_name, "registered model");
        Ok(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelDescriptor, Value};

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
            ModelDescriptor::new::<Self>().nested("first", first_item)
        }
    }

    struct BadTitle;

    impl TemplateModel for BadTitle {
        fn descriptor() -> ModelDescriptor {
            ModelDescriptor::new::<Self>().int("_title", |_: &Self| Value::Int(1))
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut reg = TemplateRegistry::new(TemplateOptions::default());
        reg.register_model::<Item>().unwrap();
        assert!(reg.has_template::<Item>(""));
        assert!(!reg.has_template::<Item>("compact"));
        reg.register_template::<Item>("compact", "<span>{{name}}</span>")
            .unwrap();
        assert!(reg.has_template::<Item>("compact"));
    }

    #[test]
    fn test_lookup_reports_template_info() {
        let mut reg = TemplateRegistry::new(TemplateOptions::default());
        reg.register_model::<Item>().unwrap();
        reg.register_template::<Item>("page", "<html><body>{{name}}</body></html>")
            .unwrap();

        let info = reg.lookup::<Item>("").unwrap();
        assert!(info.model.contains("Item"));
        assert!(!info.whole_document);
        assert!(reg.lookup::<Item>("page").unwrap().whole_document);
        assert!(reg.lookup::<Item>("missing").is_none());
        assert!(reg.lookup::<Listing>("").is_none());
    }

    #[test]
    fn test_register_model_idempotent() {
        let mut reg = TemplateRegistry::new(TemplateOptions::default());
        reg.register_model::<Item>().unwrap();
        reg.register_model::<Item>().unwrap();
        assert_eq!(reg.entries.len(), 1);
    }

    #[test]
    fn test_auto_registration_through_template() {
        let mut reg = TemplateRegistry::new(TemplateOptions::default());
        reg.register_template::<Item>("alt", "<b>{{name}}</b>").unwrap();
        // The embedded default template came along.
        assert!(reg.has_template::<Item>(""));
    }

    #[test]
    fn test_finalize_resolves_forward_reference() {
        let mut reg = TemplateRegistry::new(TemplateOptions::default());
        // Listing's template refers to Item before Item is registered.
        reg.register_default_template::<Listing>("<ul>{{first}}</ul>")
            .unwrap();
        reg.register_model::<Item>().unwrap();
        reg.finalize().unwrap();
        assert!(reg.finalized);
    }

    #[test]
    fn test_finalize_rejects_unregistered_nested() {
        let mut reg = TemplateRegistry::new(TemplateOptions::default());
        reg.register_default_template::<Listing>("<ul>{{first}}</ul>")
            .unwrap();
        let err = reg.finalize().unwrap_err();
        assert!(matches!(err.kind, CompileErrorKind::UnresolvedNested(_)));
    }

    #[test]
    fn test_finalize_rejects_nested_without_default() {
        struct Bare;
        impl TemplateModel for Bare {
            fn descriptor() -> ModelDescriptor {
                ModelDescriptor::new::<Self>()
            }
        }
        struct Holder;
        fn bare(_: &Holder) -> Option<&Bare> {
            None
        }
        impl TemplateModel for Holder {
            fn descriptor() -> ModelDescriptor {
                ModelDescriptor::new::<Self>().nested("bare", bare)
            }
        }

        let mut reg = TemplateRegistry::new(TemplateOptions::default());
        reg.register_default_template::<Holder>("<div>{{bare}}</div>")
            .unwrap();
        reg.register_model::<Bare>().unwrap();
        let err = reg.finalize().unwrap_err();
        assert!(matches!(
            err.kind,
            CompileErrorKind::NestedWithoutDefaultTemplate(_)
        ));
    }

    #[test]
    fn test_non_text_title_rejected() {
        let mut reg = TemplateRegistry::new(TemplateOptions::default());
        let err = reg.register_model::<BadTitle>().unwrap_err();
        assert!(matches!(err.kind, CompileErrorKind::TitleNotText));
    }

    #[test]
    fn test_registration_after_finalize_requires_refinalize() {
        let mut reg = TemplateRegistry::new(TemplateOptions::default());
        reg.register_model::<Item>().unwrap();
        reg.finalize().unwrap();
        reg.register_template::<Item>("alt", "<i>{{name}}</i>").unwrap();
        assert!(!reg.finalized);
        reg.finalize().unwrap();
    }
}
