//! Declarative object schemas and polymorphic type groups.
//!
//! Schemas are registered once at process start in a [`SchemaRegistry`] and
//! then shared immutably. Every configuration rule is checked at definition
//! time so that a malformed declaration fails before first use.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ConfigError, TieredResult, ValidationError};
use crate::object::TypedObject;
use crate::types::SemanticType;
use crate::value::Value;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid identifier regex"));

fn check_identifier(kind: &str, name: &str) -> TieredResult<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field: kind.to_string(),
            value: name.to_string(),
            reason: "not a valid identifier".to_string(),
        }
        .into())
    }
}

// =============================================================================
// DISCRIMINATORS
// =============================================================================

/// Anything a discriminator value can be read from: a typed instance or a
/// raw document.
pub trait Discriminated {
    /// Label used in error messages.
    fn kind_label(&self) -> String;

    /// The attribute's value as text, or `None` when it is unset or empty.
    fn discriminator(&self, attribute: &str) -> Option<String>;
}

impl Discriminated for TypedObject {
    fn kind_label(&self) -> String {
        self.type_name().to_string()
    }

    fn discriminator(&self, attribute: &str) -> Option<String> {
        match self.value_or_default(attribute) {
            Value::Text(s) | Value::Handle(s) if !s.is_empty() => Some(s),
            Value::Integer(i) => Some(i.to_string()),
            _ => None,
        }
    }
}

impl Discriminated for serde_json::Value {
    fn kind_label(&self) -> String {
        "Mapping".to_string()
    }

    fn discriminator(&self, attribute: &str) -> Option<String> {
        match self.get(attribute)? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

fn resolve_in<'m, D: Discriminated + ?Sized>(
    group: &str,
    selector: &str,
    mapping: &'m BTreeMap<String, String>,
    instance: &D,
) -> TieredResult<&'m str> {
    let value = instance
        .discriminator(selector)
        .ok_or_else(|| ValidationError::MissingDiscriminator {
            type_name: instance.kind_label(),
            attribute: selector.to_string(),
        })?;
    mapping.get(&value).map(String::as_str).ok_or_else(|| {
        ValidationError::UnknownDiscriminator {
            group: group.to_string(),
            value,
            known: mapping.keys().cloned().collect(),
        }
        .into()
    })
}

/// A "one-of" group: concrete object types sharing a selector attribute whose
/// value picks the variant. Resolution never falls back to a base type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OneOfGroup {
    name: String,
    selector: String,
    variants: BTreeMap<String, String>,
}

impl OneOfGroup {
    pub fn new(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selector: selector.into(),
            variants: BTreeMap::new(),
        }
    }

    /// Map a discriminator value to a concrete object type.
    pub fn variant(mut self, value: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.variants.insert(value.into(), type_name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn variants(&self) -> &BTreeMap<String, String> {
        &self.variants
    }

    /// Concrete type name for an instance or raw document.
    pub fn resolve<D: Discriminated + ?Sized>(&self, instance: &D) -> TieredResult<&str> {
        resolve_in(&self.name, &self.selector, &self.variants, instance)
    }
}

/// Property-level polymorphism: the concrete type of the property's value is
/// picked by another attribute of the owning object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polymorphism {
    selector: String,
    mapping: BTreeMap<String, String>,
}

impl Polymorphism {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            mapping: BTreeMap::new(),
        }
    }

    pub fn variant(mut self, value: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.mapping.insert(value.into(), type_name.into());
        self
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn mapping(&self) -> &BTreeMap<String, String> {
        &self.mapping
    }

    /// Concrete type for the property, read from the owner's selector.
    pub fn resolve<'a>(&'a self, owner: &TypedObject) -> TieredResult<&'a str> {
        resolve_in(owner.type_name(), &self.selector, &self.mapping, owner)
    }
}

// =============================================================================
// PROPERTIES
// =============================================================================

/// Declaration of a single property, validated when its schema is defined.
#[derive(Debug, Clone)]
pub struct PropertyDef {
    name: String,
    ty: SemanticType,
    list: bool,
    required: Option<bool>,
    default: Option<Value>,
    deprecated: bool,
    doc: Option<String>,
    polymorphism: Option<Polymorphism>,
}

impl PropertyDef {
    /// A `List<T>` type is taken as a list property of `T`.
    pub fn new(name: impl Into<String>, ty: SemanticType) -> Self {
        let (ty, list) = match ty {
            SemanticType::List(element) => (*element, true),
            other => (other, false),
        };
        Self {
            name: name.into(),
            ty,
            list,
            required: None,
            default: None,
            deprecated: false,
            doc: None,
            polymorphism: None,
        }
    }

    pub fn list(mut self) -> Self {
        self.list = true;
        self
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }

    /// `Value::Null` declares an explicit `None` default.
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn with_polymorphism(mut self, polymorphism: Polymorphism) -> Self {
        self.polymorphism = Some(polymorphism);
        self
    }
}

/// A validated property of a registered object type.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    name: String,
    ty: SemanticType,
    list: bool,
    required: bool,
    default: Option<Value>,
    deprecated: bool,
    doc: Option<String>,
    polymorphism: Option<Polymorphism>,
}

impl PropertyDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared element type; see [`effective_type`](Self::effective_type).
    pub fn ty(&self) -> &SemanticType {
        &self.ty
    }

    /// `List<T>` for list properties, otherwise `T`.
    pub fn effective_type(&self) -> SemanticType {
        if self.list {
            SemanticType::list(self.ty.clone())
        } else {
            self.ty.clone()
        }
    }

    pub fn is_list(&self) -> bool {
        self.list
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn is_deprecated(&self) -> bool {
        self.deprecated
    }

    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    pub fn polymorphism(&self) -> Option<&Polymorphism> {
        self.polymorphism.as_ref()
    }

    /// Scalar properties need no schema lookups to parse or serialize.
    pub fn is_scalar(&self) -> bool {
        !self.ty.is_composite() && self.polymorphism.is_none()
    }
}

// =============================================================================
// OBJECT SCHEMAS
// =============================================================================

/// Builder for an object type, consumed by [`SchemaRegistry::define_object`].
#[derive(Debug, Clone)]
pub struct ObjectSchemaBuilder {
    name: String,
    parent: Option<String>,
    properties: Vec<PropertyDef>,
}

impl ObjectSchemaBuilder {
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn property(mut self, def: PropertyDef) -> Self {
        self.properties.push(def);
        self
    }
}

/// A registered object type.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSchema {
    name: String,
    parent: Option<String>,
    /// Own name first, then each ancestor.
    lineage: Vec<String>,
    properties: BTreeMap<String, PropertyDescriptor>,
    scalar_members: Vec<String>,
    composite_members: Vec<String>,
}

impl ObjectSchema {
    pub fn builder(name: impl Into<String>) -> ObjectSchemaBuilder {
        ObjectSchemaBuilder {
            name: name.into(),
            parent: None,
            properties: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn lineage(&self) -> &[String] {
        &self.lineage
    }

    /// True when `type_name` is this type or one of its ancestors.
    pub fn is_a(&self, type_name: &str) -> bool {
        self.lineage.iter().any(|t| t == type_name)
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.get(name)
    }

    /// All properties, inherited ones included, in name order.
    pub fn properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.properties.values()
    }

    /// Scalar property names, in name order.
    pub fn scalar_members(&self) -> &[String] {
        &self.scalar_members
    }

    /// Object-typed or polymorphic property names, in name order.
    pub fn composite_members(&self) -> &[String] {
        &self.composite_members
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Immutable-after-startup registry of object types and one-of groups.
#[derive(Debug, Default, Clone)]
pub struct SchemaRegistry {
    objects: HashMap<String, Arc<ObjectSchema>>,
    groups: HashMap<String, Arc<OneOfGroup>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object type. Parents and referenced types must already be
    /// registered; a type may reference itself.
    pub fn define_object(&mut self, builder: ObjectSchemaBuilder) -> TieredResult<Arc<ObjectSchema>> {
        let ObjectSchemaBuilder {
            name,
            parent,
            properties: defs,
        } = builder;
        check_identifier("type name", &name)?;
        if self.objects.contains_key(&name) {
            return Err(ConfigError::DuplicateDefinition {
                kind: "Object type".to_string(),
                name,
            }
            .into());
        }

        let (mut lineage, mut properties) = match &parent {
            Some(parent_name) => {
                let parent_schema = self.object(parent_name)?;
                (
                    parent_schema.lineage.clone(),
                    parent_schema.properties.clone(),
                )
            }
            None => (Vec::new(), BTreeMap::new()),
        };
        lineage.insert(0, name.clone());

        for def in defs {
            check_identifier("property name", &def.name)?;
            if properties.contains_key(&def.name) {
                return Err(ConfigError::DuplicateDefinition {
                    kind: format!("Property of {}", name),
                    name: def.name,
                }
                .into());
            }
            let descriptor = self.validate_property(&name, def)?;
            properties.insert(descriptor.name.clone(), descriptor);
        }

        // selectors may name properties declared after the polymorphic one
        for descriptor in properties.values() {
            if let Some(poly) = &descriptor.polymorphism {
                if !properties.contains_key(&poly.selector) {
                    return Err(invalid_property(
                        &name,
                        &descriptor.name,
                        format!("selector attribute '{}' is not a property", poly.selector),
                    ));
                }
            }
        }

        let (scalar_members, composite_members): (Vec<String>, Vec<String>) = {
            let (scalar, composite): (Vec<_>, Vec<_>) =
                properties.values().partition(|p| p.is_scalar());
            (
                scalar.into_iter().map(|p| p.name.clone()).collect(),
                composite.into_iter().map(|p| p.name.clone()).collect(),
            )
        };

        let schema = Arc::new(ObjectSchema {
            name: name.clone(),
            parent,
            lineage,
            properties,
            scalar_members,
            composite_members,
        });
        self.objects.insert(name, Arc::clone(&schema));
        Ok(schema)
    }

    fn validate_property(&self, owner: &str, def: PropertyDef) -> TieredResult<PropertyDescriptor> {
        self.check_type_known(owner, &def.name, &def.ty)?;

        if def.list && def.polymorphism.is_some() {
            return Err(invalid_property(
                owner,
                &def.name,
                "polymorphism is not supported in combination with lists",
            ));
        }

        if let Some(poly) = &def.polymorphism {
            if poly.mapping.is_empty() {
                return Err(invalid_property(owner, &def.name, "polymorphism mapping is empty"));
            }
            for concrete in poly.mapping.values() {
                let schema = self.object(concrete)?;
                if !self.type_admits(&def.ty, &schema) {
                    return Err(invalid_property(
                        owner,
                        &def.name,
                        format!("{} is not a {}", concrete, def.ty),
                    ));
                }
            }
        }

        let required = match (&def.default, def.required) {
            (Some(Value::Null), Some(true)) => {
                return Err(invalid_property(
                    owner,
                    &def.name,
                    "default cannot be None when required is true",
                ))
            }
            (Some(Value::Null), _) => false,
            (_, Some(required)) => required,
            (_, None) => true,
        };

        match &def.default {
            Some(Value::Null) if def.ty.is_value_type() && !def.list => {
                return Err(invalid_property(
                    owner,
                    &def.name,
                    format!("None not allowed for {} properties", def.ty),
                ))
            }
            Some(default) if def.list => match default {
                Value::List(items) if items.is_empty() => {}
                Value::Null => {}
                _ => {
                    return Err(invalid_property(
                        owner,
                        &def.name,
                        "only an empty list is allowed as default for list properties",
                    ))
                }
            },
            Some(Value::Missing) => {
                return Err(invalid_property(owner, &def.name, "Missing is not a default"))
            }
            Some(default) if !default.is_null() && !def.ty.conforms(default) => {
                return Err(invalid_property(
                    owner,
                    &def.name,
                    format!("default {} is not a {}", default.type_label(), def.ty),
                ))
            }
            _ => {}
        }

        Ok(PropertyDescriptor {
            name: def.name,
            ty: def.ty,
            list: def.list,
            required,
            default: def.default,
            deprecated: def.deprecated,
            doc: def.doc,
            polymorphism: def.polymorphism,
        })
    }

    fn check_type_known(&self, owner: &str, property: &str, ty: &SemanticType) -> TieredResult<()> {
        match ty {
            SemanticType::Object(name) if name != owner && !self.objects.contains_key(name) => {
                Err(ConfigError::UnknownType { name: name.clone() }.into())
            }
            SemanticType::OneOf(group) => match self.groups.get(group.name()) {
                Some(registered) if **registered == **group => Ok(()),
                _ => Err(invalid_property(
                    owner,
                    property,
                    format!("one-of group '{}' is not registered", group.name()),
                )),
            },
            SemanticType::List(element) => self.check_type_known(owner, property, element),
            SemanticType::Union(alternatives) => alternatives
                .iter()
                .try_for_each(|alt| self.check_type_known(owner, property, alt)),
            _ => Ok(()),
        }
    }

    fn type_admits(&self, declared: &SemanticType, concrete: &ObjectSchema) -> bool {
        match declared {
            SemanticType::Object(name) => concrete.is_a(name),
            SemanticType::OneOf(group) => group.variants.values().any(|v| concrete.is_a(v)),
            SemanticType::Union(alternatives) => {
                alternatives.iter().any(|alt| self.type_admits(alt, concrete))
            }
            _ => false,
        }
    }

    /// Register a one-of group. Every variant must be registered and declare
    /// the selector property.
    pub fn define_group(&mut self, group: OneOfGroup) -> TieredResult<Arc<OneOfGroup>> {
        check_identifier("group name", &group.name)?;
        check_identifier("selector attribute", &group.selector)?;
        if self.groups.contains_key(&group.name) {
            return Err(ConfigError::DuplicateDefinition {
                kind: "One-of group".to_string(),
                name: group.name,
            }
            .into());
        }
        if group.variants.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "variants".to_string(),
                value: group.name,
                reason: "a one-of group needs at least one variant".to_string(),
            }
            .into());
        }
        for type_name in group.variants.values() {
            let schema = self.object(type_name)?;
            if schema.property(&group.selector).is_none() {
                return Err(invalid_property(
                    type_name,
                    &group.selector,
                    format!("selector of one-of group '{}' is not declared", group.name),
                ));
            }
        }

        let group = Arc::new(group);
        self.groups.insert(group.name.clone(), Arc::clone(&group));
        Ok(group)
    }

    pub fn object(&self, name: &str) -> TieredResult<Arc<ObjectSchema>> {
        self.objects
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownType { name: name.to_string() }.into())
    }

    pub fn group(&self, name: &str) -> TieredResult<Arc<OneOfGroup>> {
        self.groups
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownType { name: name.to_string() }.into())
    }

    /// Concrete schema of a polymorphic group for an instance or document.
    pub fn resolve_subtype<D: Discriminated + ?Sized>(
        &self,
        group: &OneOfGroup,
        instance: &D,
    ) -> TieredResult<Arc<ObjectSchema>> {
        let type_name = group.resolve(instance)?;
        self.object(type_name)
    }

    /// Create an empty instance of a registered type.
    pub fn instantiate(&self, name: &str) -> TieredResult<TypedObject> {
        Ok(TypedObject::new(self.object(name)?))
    }
}

fn invalid_property(owner: &str, property: &str, reason: impl Into<String>) -> crate::TieredError {
    ConfigError::InvalidProperty {
        type_name: owner.to_string(),
        property: property.to_string(),
        reason: reason.into(),
    }
    .into()
}

// =============================================================================
// TESTS
// =============================================================================
