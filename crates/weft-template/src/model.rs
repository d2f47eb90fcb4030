//! Typed model binding.
//!
//! A template model describes its renderable properties once, through a
//! [`ModelDescriptor`], instead of being reflected over at render time. The
//! descriptor carries, per property, a declared [`ValueKind`] (which fixes
//! the escaping strategy at compile time) and a typed accessor closure
//! (erased internally over `dyn Any`). After registration no name lookup or
//! type dispatch happens on the render path.

use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::collections::HashMap;

use crate::error::CompileErrorKind;

/// Reserved property marking a model as a page model; woven into the page
/// shell's title slot as escaped text.
pub const TITLE_PROPERTY: &str = "_title";

/// Reserved page-shell slot receiving the pre-rendered fragment body.
pub const BODY_PROPERTY: &str = "_body";

/// Object-safe access to the concrete type behind a model reference.
pub trait AsAny: Any {
    /// The value as `dyn Any`, for accessor downcasting.
    fn as_any(&self) -> &dyn Any;
    /// The concrete type name, for diagnostics.
    fn type_name(&self) -> &'static str;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// A data object renderable through templates.
///
/// Implementations list their properties once:
///
/// ```
/// use weft_template::{ModelDescriptor, TemplateModel, Value};
///
/// struct Greeting {
///     name: String,
///     count: i64,
/// }
///
/// impl TemplateModel for Greeting {
///     fn descriptor() -> ModelDescriptor {
///         ModelDescriptor::new::<Self>()
///             .with_template("<b>{{name}}</b> seen {{count}} times")
///             .text("name", |m: &Self| m.name.as_str().into())
///             .int("count", |m: &Self| m.count.into())
///     }
/// }
/// ```
pub trait TemplateModel: AsAny + Send + Sync {
    /// Describe this type's properties and optional embedded default
    /// template. Called once, at registration.
    fn descriptor() -> ModelDescriptor
    where
        Self: Sized;
}

/// A value read from a model property.
pub enum Value<'a> {
    /// Absent value; renders as empty output, never as an error.
    Null,
    /// Text, escaped per context.
    Str(Cow<'a, str>),
    /// Single character, escaped per context.
    Char(char),
    /// Signed integer, canonical decimal form, unescaped.
    Int(i64),
    /// Unsigned integer, canonical decimal form, unescaped.
    UInt(u64),
    /// Float, canonical decimal form, unescaped.
    Float(f64),
    /// Boolean, `true`/`false`, unescaped.
    Bool(bool),
    /// Pre-sanitized URI, emitted verbatim.
    Uri(Cow<'a, str>),
    /// A nested model, rendered through its own default template.
    Nested(&'a (dyn TemplateModel + 'static)),
}

impl Value<'_> {
    pub(crate) fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Wrap a pre-sanitized URI string.
    pub fn uri<'a>(uri: impl Into<Cow<'a, str>>) -> Value<'a> {
        Value::Uri(uri.into())
    }
}

// Manual impl: `Nested` holds a trait object without a `Debug` bound, so
// it is shown by its type name.
impl std::fmt::Debug for Value<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Str(s) => f.debug_tuple("Str").field(s).finish(),
            Value::Char(c) => f.debug_tuple("Char").field(c).finish(),
            Value::Int(n) => f.debug_tuple("Int").field(n).finish(),
            Value::UInt(n) => f.debug_tuple("UInt").field(n).finish(),
            Value::Float(n) => f.debug_tuple("Float").field(n).finish(),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Uri(uri) => f.debug_tuple("Uri").field(uri).finish(),
            Value::Nested(model) => f.debug_tuple("Nested").field(&(*model).type_name()).finish(),
        }
    }
}

impl<'a> From<&'a str> for Value<'a> {
    fn from(s: &'a str) -> Self {
        Value::Str(Cow::Borrowed(s))
    }
}

impl From<String> for Value<'_> {
    fn from(s: String) -> Self {
        Value::Str(Cow::Owned(s))
    }
}

impl From<char> for Value<'_> {
    fn from(c: char) -> Self {
        Value::Char(c)
    }
}

impl From<bool> for Value<'_> {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value<'_> {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<i64> for Value<'_> {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<u32> for Value<'_> {
    fn from(n: u32) -> Self {
        Value::UInt(n.into())
    }
}

impl From<u64> for Value<'_> {
    fn from(n: u64) -> Self {
        Value::UInt(n)
    }
}

impl From<f64> for Value<'_> {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl<'a, T: Into<Value<'a>>> From<Option<T>> for Value<'a> {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// The declared kind of a property, fixed at registration. Classification
/// into an escaping strategy happens once, at template compile time.
#[derive(Clone, Copy, Debug)]
pub enum ValueKind {
    /// Escaped per surrounding context.
    Text,
    /// Escaped per surrounding context.
    Char,
    /// Canonical decimal form, unescaped.
    Int,
    /// Canonical decimal form, unescaped.
    UInt,
    /// Canonical decimal form, unescaped.
    Float,
    /// `true`/`false`, unescaped.
    Bool,
    /// Emitted verbatim; the caller guarantees sanitization.
    Uri,
    /// Rendered through the referenced model type's default template.
    Nested {
        /// Type id of the nested model type.
        type_id: TypeId,
        /// Type name of the nested model type, for diagnostics.
        type_name: &'static str,
    },
    /// A reserved page-shell slot (`_title`/`_body`), woven in by the page
    /// renderer rather than read from a model.
    Slot,
}

type Accessor = Box<dyn for<'a> Fn(&'a dyn Any) -> Option<Value<'a>> + Send + Sync>;

/// One named, typed, read-only binding from a property name to a value
/// getter. Immutable once built.
pub struct Property {
    pub(crate) name: &'static str,
    pub(crate) kind: ValueKind,
    pub(crate) non_public: bool,
    get: Accessor,
}

impl Property {
    pub(crate) fn read<'a>(&self, model: &'a dyn Any) -> Option<Value<'a>> {
        (self.get)(model)
    }
}

impl std::fmt::Debug for Property {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("non_public", &self.non_public)
            .finish_non_exhaustive()
    }
}

/// Builder for a model type's property set and embedded default template.
#[derive(Debug)]
pub struct ModelDescriptor {
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) default_template: Option<&'static str>,
    pub(crate) properties: Vec<Property>,
}

impl ModelDescriptor {
    /// Start a descriptor for model type `T`.
    #[must_use]
    pub fn new<T: TemplateModel>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            default_template: None,
            properties: Vec::new(),
        }
    }

    /// Embed a default-template source in the type, like a literal
    /// `_template` constant.
    #[must_use]
    pub fn with_template(mut self, source: &'static str) -> Self {
        self.default_template = Some(source);
        self
    }

    fn bind<T, F>(mut self, name: &'static str, kind: ValueKind, get: F) -> Self
    where
        T: TemplateModel,
        F: for<'a> Fn(&'a T) -> Value<'a> + Send + Sync + 'static,
    {
        assert_eq!(
            TypeId::of::<T>(),
            self.type_id,
            "descriptor for {} bound property {name:?} through a different model type",
            self.type_name,
        );
        self.properties.push(Property {
            name,
            kind,
            non_public: false,
            get: Box::new(move |any| any.downcast_ref::<T>().map(|m| get(m))),
        });
        self
    }

    /// Bind a text property, escaped per context.
    #[must_use]
    pub fn text<T, F>(self, name: &'static str, get: F) -> Self
    where
        T: TemplateModel,
        F: for<'a> Fn(&'a T) -> Value<'a> + Send + Sync + 'static,
    {
        self.bind(name, ValueKind::Text, get)
    }

    /// Bind a single-character property, escaped per context.
    #[must_use]
    pub fn character<T, F>(self, name: &'static str, get: F) -> Self
    where
        T: TemplateModel,
        F: for<'a> Fn(&'a T) -> Value<'a> + Send + Sync + 'static,
    {
        self.bind(name, ValueKind::Char, get)
    }

    /// Bind a signed-integer property, rendered unescaped.
    #[must_use]
    pub fn int<T, F>(self, name: &'static str, get: F) -> Self
    where
        T: TemplateModel,
        F: for<'a> Fn(&'a T) -> Value<'a> + Send + Sync + 'static,
    {
        self.bind(name, ValueKind::Int, get)
    }

    /// Bind an unsigned-integer property, rendered unescaped.
    #[must_use]
    pub fn uint<T, F>(self, name: &'static str, get: F) -> Self
    where
        T: TemplateModel,
        F: for<'a> Fn(&'a T) -> Value<'a> + Send + Sync + 'static,
    {
        self.bind(name, ValueKind::UInt, get)
    }

    /// Bind a float property, rendered unescaped.
    #[must_use]
    pub fn float<T, F>(self, name: &'static str, get: F) -> Self
    where
        T: TemplateModel,
        F: for<'a> Fn(&'a T) -> Value<'a> + Send + Sync + 'static,
    {
        self.bind(name, ValueKind::Float, get)
    }

    /// Bind a boolean property, rendered as `true`/`false` unescaped.
    #[must_use]
    pub fn boolean<T, F>(self, name: &'static str, get: F) -> Self
    where
        T: TemplateModel,
        F: for<'a> Fn(&'a T) -> Value<'a> + Send + Sync + 'static,
    {
        self.bind(name, ValueKind::Bool, get)
    }

    /// Bind a URI property. The value is emitted verbatim: the caller is
    /// responsible for producing a well-formed, pre-escaped URI.
    #[must_use]
    pub fn uri<T, F>(self, name: &'static str, get: F) -> Self
    where
        T: TemplateModel,
        F: for<'a> Fn(&'a T) -> Value<'a> + Send + Sync + 'static,
    {
        self.bind(name, ValueKind::Uri, get)
    }

    /// Bind a nested-model property of type `C`, rendered through `C`'s
    /// default template (resolved at finalize).
    #[must_use]
    pub fn nested<T, C, F>(self, name: &'static str, get: F) -> Self
    where
        T: TemplateModel,
        C: TemplateModel,
        F: for<'a> Fn(&'a T) -> Option<&'a C> + Send + Sync + 'static,
    {
        let kind = ValueKind::Nested {
            type_id: TypeId::of::<C>(),
            type_name: std::any::type_name::<C>(),
        };
        self.bind(name, kind, move |m: &T| {
            get(m).map_or(Value::Null, |c| Value::Nested(c))
        })
    }

    /// Declare a reserved page-shell slot. Only meaningful on the page
    /// shell model; slot values are woven in by the page renderer.
    #[must_use]
    pub fn slot(mut self, name: &'static str) -> Self {
        self.properties.push(Property {
            name,
            kind: ValueKind::Slot,
            non_public: false,
            get: Box::new(|_| Some(Value::Null)),
        });
        self
    }

    /// Mark the most recently bound property as non-public. Such
    /// properties are dropped (with a warning) unless the registry allows
    /// non-public access.
    #[must_use]
    pub fn non_public(mut self) -> Self {
        if let Some(last) = self.properties.last_mut() {
            last.non_public = true;
        }
        self
    }

    /// Merge a base type's descriptor in, without overriding names already
    /// bound here (more-derived declarations shadow base ones). Inherits
    /// the base's embedded template if this descriptor has none.
    #[must_use]
    pub fn extend(mut self, base: ModelDescriptor) -> Self {
        for prop in base.properties {
            if !self.properties.iter().any(|p| p.name == prop.name) {
                self.properties.push(prop);
            }
        }
        if self.default_template.is_none() {
            self.default_template = base.default_template;
        }
        self
    }
}

/// A model type's resolved, immutable property table.
#[derive(Debug)]
pub(crate) struct PropertyMap {
    props: Vec<Property>,
    by_name: HashMap<&'static str, usize>,
}

impl PropertyMap {
    /// Apply accessibility policy and index the descriptor's properties.
    /// Deterministic: same descriptor and policy, same map.
    pub(crate) fn build(
        model: &'static str,
        properties: Vec<Property>,
        allow_non_public: bool,
    ) -> Result<Self, CompileErrorKind> {
        let mut props = Vec::with_capacity(properties.len());
        let mut by_name = HashMap::new();
        for prop in properties {
            if prop.non_public && !allow_non_public {
                tracing::warn!(
                    model,
                    property = prop.name,
                    "dropping non-public property; enable allow-non-public-properties to bind it"
                );
                continue;
            }
            if by_name.contains_key(prop.name) {
                return Err(CompileErrorKind::DuplicateProperty(prop.name));
            }
            by_name.insert(prop.name, props.len());
            props.push(prop);
        }
        tracing::debug!(
            model,
            properties = ?props.iter().map(|p| p.name).collect::<Vec<_>>(),
            "bound model properties"
        );
        Ok(Self { props, by_name })
    }

    pub(crate) fn get(&self, name: &str) -> Option<(usize, &Property)> {
        let idx = *self.by_name.get(name)?;
        Some((idx, &self.props[idx]))
    }

    pub(crate) fn by_index(&self, idx: usize) -> &Property {
        &self.props[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Base {
        id: i64,
    }

    impl TemplateModel for Base {
        fn descriptor() -> ModelDescriptor {
            ModelDescriptor::new::<Self>()
                .with_template("base {{id}}")
                .int("id", |m: &Self| m.id.into())
        }
    }

    struct Derived {
        id: i64,
        label: String,
        secret: String,
    }

    impl TemplateModel for Derived {
        fn descriptor() -> ModelDescriptor {
            ModelDescriptor::new::<Self>()
                .int("id", |m: &Self| (m.id * 2).into())
                .text("label", |m: &Self| m.label.as_str().into())
                .text("secret", |m: &Self| m.secret.as_str().into())
                .non_public()
                .extend(Base::descriptor())
        }
    }

    #[test]
    fn test_accessor_reads_through_any() {
        let map =
            PropertyMap::build("Base", Base::descriptor().properties, false).unwrap();
        let model = Base { id: 7 };
        let (_, prop) = map.get("id").unwrap();
        let value = prop.read(model.as_any()).unwrap();
        assert!(matches!(value, Value::Int(7)));
    }

    #[test]
    fn test_accessor_rejects_foreign_type() {
        let map =
            PropertyMap::build("Base", Base::descriptor().properties, false).unwrap();
        let other = Derived {
            id: 1,
            label: String::new(),
            secret: String::new(),
        };
        let (_, prop) = map.get("id").unwrap();
        assert!(prop.read(other.as_any()).is_none());
    }

    #[test]
    fn test_extend_shadows_base_properties() {
        let desc = Derived::descriptor();
        // Derived's own "id" wins over Base's.
        let map = PropertyMap::build("Derived", desc.properties, true).unwrap();
        let model = Derived {
            id: 10,
            label: "x".to_owned(),
            secret: String::new(),
        };
        let (_, prop) = map.get("id").unwrap();
        assert!(matches!(prop.read(model.as_any()).unwrap(), Value::Int(20)));
    }

    #[test]
    fn test_extend_inherits_embedded_template() {
        let desc = Derived::descriptor();
        assert_eq!(desc.default_template, Some("base {{id}}"));
    }

    #[test]
    fn test_non_public_dropped_without_flag() {
        let desc = Derived::descriptor();
        let map = PropertyMap::build("Derived", desc.properties, false).unwrap();
        assert!(map.get("secret").is_none());
        assert!(map.get("label").is_some());
    }

    #[test]
    fn test_non_public_kept_with_flag() {
        let desc = Derived::descriptor();
        let map = PropertyMap::build("Derived", desc.properties, true).unwrap();
        assert!(map.get("secret").is_some());
    }

    #[test]
    fn test_duplicate_property_rejected() {
        let props = ModelDescriptor::new::<Base>()
            .int("id", |m: &Base| m.id.into())
            .int("id", |m: &Base| m.id.into())
            .properties;
        let err = PropertyMap::build("Base", props, false).unwrap_err();
        assert!(matches!(err, CompileErrorKind::DuplicateProperty("id")));
    }

    #[test]
    fn test_value_debug_names_nested_type() {
        let base = Base { id: 1 };
        let rendered = format!("{:?}", Value::Nested(&base));
        assert!(rendered.contains("Base"), "got {rendered}");
        assert_eq!(format!("{:?}", Value::Int(7)), "Int(7)");
    }

    #[test]
    fn test_null_option_value() {
        let v: Value<'_> = Option::<&str>::None.into();
        assert!(v.is_null());
        let v: Value<'_> = Some("x").into();
        assert!(matches!(v, Value::Str(_)));
    }
}
