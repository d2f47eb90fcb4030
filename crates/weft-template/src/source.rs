//! Loading template sources from storage.
//!
//! Templates usually live as `.html` files next to the application; a
//! [`TemplateSource`] abstracts where they come from so tests and embedded
//! deployments can supply them differently.

use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::CompileError;
use crate::model::TemplateModel;
use crate::registry::TemplateRegistry;

/// Somewhere template sources can be loaded from.
pub trait TemplateSource {
    /// The template source at `path`, or `None` if there is none.
    ///
    /// # Errors
    ///
    /// Fails only on genuine I/O errors; a missing template is `None`.
    fn load(&self, path: &str) -> io::Result<Option<String>>;
}

/// Template files under a directory root. Template paths map to relative
/// file paths; anything escaping the root resolves to nothing.
#[derive(Clone, Debug)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    /// A source rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let rel = Path::new(path);
        let safe = !rel.as_os_str().is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        safe.then(|| self.root.join(rel))
    }
}

impl TemplateSource for DirSource {
    fn load(&self, path: &str) -> io::Result<Option<String>> {
        let Some(file) = self.resolve(path) else {
            tracing::warn!(path, "template path escapes the source root");
            return Ok(None);
        };
        match std::fs::read_to_string(&file) {
            Ok(source) => Ok(Some(source)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// Failure while loading and registering a template from a source.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The source failed to read.
    #[error("I/O error loading template")]
    Io(#[from] io::Error),

    /// The loaded template failed to compile.
    #[error(transparent)]
    Compile(#[from] CompileError),
}

impl TemplateRegistry {
    /// Load the template at `path` from `source` and register it for
    /// model `T`. Returns whether the source had it.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors and compile errors; a missing template is
    /// `Ok(false)`.
    pub fn register_template_from<T: TemplateModel>(
        &mut self,
        source: &dyn TemplateSource,
        path: &str,
    ) -> Result<bool, LoadError> {
        match source.load(path)? {
            Some(markup) => {
                self.register_template::<T>(path, &markup)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelDescriptor;
    use crate::options::TemplateOptions;

    struct Note {
        text: String,
    }

    impl TemplateModel for Note {
        fn descriptor() -> ModelDescriptor {
            ModelDescriptor::new::<Self>().text("text", |m: &Self| m.text.as_str().into())
        }
    }

    #[test]
    fn test_dir_source_loads_and_misses() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("note.html"), "<p>{{text}}</p>").unwrap();
        let source = DirSource::new(dir.path());

        assert_eq!(
            source.load("note.html").unwrap().as_deref(),
            Some("<p>{{text}}</p>")
        );
        assert_eq!(source.load("missing.html").unwrap(), None);
    }

    #[test]
    fn test_dir_source_refuses_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirSource::new(dir.path());
        assert_eq!(source.load("../etc/passwd").unwrap(), None);
        assert_eq!(source.load("").unwrap(), None);
    }

    #[test]
    fn test_register_from_source() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("note.html"), "<p>{{text}}</p>").unwrap();
        let source = DirSource::new(dir.path());

        let mut reg = TemplateRegistry::new(TemplateOptions::default());
        assert!(reg
            .register_template_from::<Note>(&source, "note.html")
            .unwrap());
        assert!(!reg
            .register_template_from::<Note>(&source, "other.html")
            .unwrap());
        reg.finalize().unwrap();

        let out = reg
            .render_fragment(
                &Note {
                    text: "x".to_owned(),
                },
                "note.html",
            )
            .unwrap();
        assert_eq!(out.html(), "<p>x</p>");
    }
}
