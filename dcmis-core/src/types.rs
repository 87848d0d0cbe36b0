//! Type registry
//!
//! Holds the type hierarchy and property definitions. The hierarchy is a
//! forest rooted at the four base types; every other type names a parent
//! that must already be registered. [`TypeRegistryBuilder`] lifts that
//! ordering requirement by collecting definitions first and registering
//! them parent-before-child once the whole forest is known.

use crate::error::{CmisError, Result};
use crate::paging::{ListPage, Paging};
use crate::properties::{cmis_props, Properties, PropertyUpdate, PropertyUpdates};
use crate::value::{PropertyType, Value};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// The four root kinds every type descends from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseType {
    Document,
    Folder,
    Relationship,
    Policy,
}

impl BaseType {
    pub const ALL: [BaseType; 4] = [
        BaseType::Document,
        BaseType::Folder,
        BaseType::Relationship,
        BaseType::Policy,
    ];

    /// Type id of the base type itself
    pub fn id(&self) -> &'static str {
        match self {
            BaseType::Document => "cmis:document",
            BaseType::Folder => "cmis:folder",
            BaseType::Relationship => "cmis:relationship",
            BaseType::Policy => "cmis:policy",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        BaseType::ALL.into_iter().find(|b| b.id() == id)
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    #[default]
    Single,
    Multi,
}

/// When a property may be written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Updatability {
    ReadOnly,
    #[default]
    ReadWrite,
    OnCreate,
    WhenCheckedOut,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentStreamAllowed {
    NotAllowed,
    #[default]
    Allowed,
    Required,
}

/// Definition of one property of a type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub id: String,
    pub property_type: PropertyType,
    #[serde(default)]
    pub cardinality: Cardinality,
    #[serde(default)]
    pub updatability: Updatability,
    #[serde(default)]
    pub required: bool,
    #[serde(default = "default_true")]
    pub queryable: bool,
    #[serde(default = "default_true")]
    pub orderable: bool,
    #[serde(default)]
    pub default_value: Option<Value>,
    /// Set by the registry on definitions copied from a parent type
    #[serde(default)]
    pub inherited: bool,
}

fn default_true() -> bool {
    true
}

impl PropertyDefinition {
    /// Single-valued, read-write, optional property
    pub fn new(id: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            id: id.into(),
            property_type,
            cardinality: Cardinality::Single,
            updatability: Updatability::ReadWrite,
            required: false,
            queryable: true,
            orderable: true,
            default_value: None,
            inherited: false,
        }
    }

    pub fn multi(mut self) -> Self {
        self.cardinality = Cardinality::Multi;
        self.orderable = false;
        self
    }

    pub fn updatability(mut self, updatability: Updatability) -> Self {
        self.updatability = updatability;
        self
    }

    pub fn read_only(self) -> Self {
        self.updatability(Updatability::ReadOnly)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Check a value against type tag and cardinality
    pub fn check_value(&self, value: &Value) -> Result<()> {
        match (self.cardinality, value) {
            (Cardinality::Single, Value::Multi(_)) => {
                return Err(CmisError::constraint(format!(
                    "Property {} is single-valued",
                    self.id
                )));
            }
            (Cardinality::Multi, Value::Single(_)) => {
                return Err(CmisError::constraint(format!(
                    "Property {} is multi-valued",
                    self.id
                )));
            }
            _ => {}
        }
        if let Some(bad) = value.values().find(|v| v.property_type() != self.property_type) {
            return Err(CmisError::constraint(format!(
                "Property {} expects {} values, got {}",
                self.id,
                self.property_type,
                bad.property_type()
            )));
        }
        Ok(())
    }
}

/// A type in the hierarchy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDefinition {
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub base_type: BaseType,
    #[serde(default)]
    pub local_name: String,
    #[serde(default)]
    pub query_name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub creatable: bool,
    #[serde(default = "default_true")]
    pub fileable: bool,
    #[serde(default = "default_true")]
    pub queryable: bool,
    #[serde(default = "default_true")]
    pub controllable_policy: bool,
    #[serde(default = "default_true")]
    pub controllable_acl: bool,
    #[serde(default)]
    pub fulltext_indexed: bool,
    #[serde(default = "default_true")]
    pub included_in_supertype_query: bool,
    #[serde(default)]
    pub versionable: bool,
    #[serde(default)]
    pub content_stream_allowed: ContentStreamAllowed,
    /// Relationship source types; empty means any
    #[serde(default)]
    pub allowed_source_types: Vec<String>,
    /// Relationship target types; empty means any
    #[serde(default)]
    pub allowed_target_types: Vec<String>,
    #[serde(default)]
    pub property_definitions: Vec<PropertyDefinition>,
}

impl TypeDefinition {
    /// A subtype of `parent_id`; flags follow the base type's defaults.
    pub fn subtype(
        id: impl Into<String>,
        parent_id: impl Into<String>,
        base_type: BaseType,
    ) -> Self {
        let id = id.into();
        let mut def = base_type_definition(base_type);
        def.local_name = id.clone();
        def.query_name = id.clone();
        def.display_name = id.clone();
        def.description = String::new();
        def.id = id;
        def.parent_id = Some(parent_id.into());
        def.property_definitions = Vec::new();
        def
    }

    pub fn with_property(mut self, def: PropertyDefinition) -> Self {
        self.property_definitions.push(def);
        self
    }

    pub fn versionable(mut self, versionable: bool) -> Self {
        self.versionable = versionable;
        self
    }

    pub fn content_stream(mut self, allowed: ContentStreamAllowed) -> Self {
        self.content_stream_allowed = allowed;
        self
    }

    pub fn property_definition(&self, id: &str) -> Option<&PropertyDefinition> {
        self.property_definitions.iter().find(|p| p.id == id)
    }

    fn require_property(&self, id: &str) -> Result<&PropertyDefinition> {
        self.property_definition(id).ok_or_else(|| {
            CmisError::constraint(format!("Property {} is not defined for type {}", id, self.id))
        })
    }

    /// Validate caller-supplied properties for object creation.
    ///
    /// System-managed ids that the engine fills in itself (object type id)
    /// are accepted when they are `OnCreate`.
    pub fn validate_for_create(&self, props: &Properties) -> Result<()> {
        for (id, value) in props.iter() {
            let def = self.require_property(id)?;
            if def.updatability == Updatability::ReadOnly {
                return Err(CmisError::constraint(format!(
                    "Property {} is read-only",
                    id
                )));
            }
            def.check_value(value)?;
        }
        for def in &self.property_definitions {
            if def.required && def.default_value.is_none() && !props.contains(&def.id) {
                return Err(CmisError::constraint(format!(
                    "Required property {} missing for type {}",
                    def.id, self.id
                )));
            }
        }
        Ok(())
    }

    /// Validate an update set against the object's current state.
    pub fn validate_update(&self, updates: &PropertyUpdates, is_working_copy: bool) -> Result<()> {
        for (id, change) in updates.iter() {
            let def = self.require_property(id)?;
            let writable = match def.updatability {
                Updatability::ReadWrite => true,
                Updatability::WhenCheckedOut => is_working_copy,
                Updatability::ReadOnly | Updatability::OnCreate => false,
            };
            if !writable {
                return Err(CmisError::constraint(format!(
                    "Property {} is not updatable ({:?})",
                    id, def.updatability
                )));
            }
            match change {
                PropertyUpdate::Set(value) => def.check_value(value)?,
                PropertyUpdate::Unset if def.required => {
                    return Err(CmisError::constraint(format!(
                        "Required property {} cannot be unset",
                        id
                    )));
                }
                PropertyUpdate::Unset => {}
            }
        }
        Ok(())
    }

    /// Fill defaults for properties the caller did not supply
    pub fn apply_defaults(&self, props: &mut Properties) {
        for def in &self.property_definitions {
            if let Some(default) = &def.default_value {
                if !props.contains(&def.id) {
                    props.set(def.id.clone(), default.clone());
                }
            }
        }
    }

    fn without_property_definitions(&self) -> Self {
        let mut def = self.clone();
        def.property_definitions.clear();
        def
    }
}

/// System property definitions shared by every base type
fn common_properties(name_required: bool) -> Vec<PropertyDefinition> {
    let mut name = PropertyDefinition::new(cmis_props::NAME, PropertyType::String);
    if name_required {
        name = name.required();
    }
    vec![
        PropertyDefinition::new(cmis_props::OBJECT_ID, PropertyType::Id).read_only(),
        PropertyDefinition::new(cmis_props::OBJECT_TYPE_ID, PropertyType::Id)
            .updatability(Updatability::OnCreate)
            .required(),
        PropertyDefinition::new(cmis_props::BASE_TYPE_ID, PropertyType::Id).read_only(),
        name,
        PropertyDefinition::new(cmis_props::CREATION_DATE, PropertyType::DateTime).read_only(),
        PropertyDefinition::new(cmis_props::LAST_MODIFICATION_DATE, PropertyType::DateTime)
            .read_only(),
        PropertyDefinition::new(cmis_props::CHANGE_TOKEN, PropertyType::String).read_only(),
    ]
}

/// Definition of one of the four base types
pub fn base_type_definition(base: BaseType) -> TypeDefinition {
    let (local, display) = match base {
        BaseType::Document => ("document", "Document"),
        BaseType::Folder => ("folder", "Folder"),
        BaseType::Relationship => ("relationship", "Relationship"),
        BaseType::Policy => ("policy", "Policy"),
    };
    let mut props = common_properties(base != BaseType::Relationship);
    match base {
        BaseType::Document => {
            for (id, ty) in [
                (cmis_props::IS_IMMUTABLE, PropertyType::Boolean),
                (cmis_props::IS_LATEST_VERSION, PropertyType::Boolean),
                (cmis_props::IS_MAJOR_VERSION, PropertyType::Boolean),
                (cmis_props::IS_LATEST_MAJOR_VERSION, PropertyType::Boolean),
                (cmis_props::VERSION_LABEL, PropertyType::String),
                (cmis_props::VERSION_SERIES_ID, PropertyType::Id),
                (cmis_props::IS_VERSION_SERIES_CHECKED_OUT, PropertyType::Boolean),
                (cmis_props::VERSION_SERIES_CHECKED_OUT_ID, PropertyType::Id),
                (cmis_props::CHECKIN_COMMENT, PropertyType::String),
                (cmis_props::CONTENT_STREAM_LENGTH, PropertyType::Integer),
                (cmis_props::CONTENT_STREAM_MIME_TYPE, PropertyType::String),
                (cmis_props::CONTENT_STREAM_FILE_NAME, PropertyType::String),
            ] {
                props.push(PropertyDefinition::new(id, ty).read_only());
            }
        }
        BaseType::Folder => {
            props.push(
                PropertyDefinition::new(cmis_props::PARENT_ID, PropertyType::Id).read_only(),
            );
            props.push(PropertyDefinition::new(cmis_props::PATH, PropertyType::String).read_only());
            props.push(
                PropertyDefinition::new(cmis_props::ALLOWED_CHILD_OBJECT_TYPE_IDS, PropertyType::Id)
                    .multi(),
            );
        }
        BaseType::Relationship => {
            for id in [cmis_props::SOURCE_ID, cmis_props::TARGET_ID] {
                props.push(
                    PropertyDefinition::new(id, PropertyType::Id)
                        .updatability(Updatability::OnCreate)
                        .required(),
                );
            }
        }
        BaseType::Policy => {
            props.push(PropertyDefinition::new(cmis_props::POLICY_TEXT, PropertyType::String));
        }
    }

    TypeDefinition {
        id: base.id().to_string(),
        parent_id: None,
        base_type: base,
        local_name: local.to_string(),
        query_name: base.id().to_string(),
        display_name: display.to_string(),
        description: format!("{} base type", display),
        creatable: true,
        fileable: base != BaseType::Relationship,
        queryable: true,
        controllable_policy: true,
        controllable_acl: true,
        fulltext_indexed: false,
        included_in_supertype_query: true,
        versionable: base == BaseType::Document,
        content_stream_allowed: if base == BaseType::Document {
            ContentStreamAllowed::Allowed
        } else {
            ContentStreamAllowed::NotAllowed
        },
        allowed_source_types: Vec::new(),
        allowed_target_types: Vec::new(),
        property_definitions: props,
    }
}

/// Registry of types, kept in registration (parent-before-child) order
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: Vec<TypeDefinition>,
    index: HashMap<String, usize>,
    children: HashMap<String, Vec<String>>,
}

impl TypeRegistry {
    /// An empty registry; base types must be added first
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the four base types
    pub fn with_base_types() -> Self {
        let mut registry = Self::new();
        for base in BaseType::ALL {
            // base types have no parent and unique ids
            let def = base_type_definition(base);
            registry.index.insert(def.id.clone(), registry.types.len());
            registry.children.insert(def.id.clone(), Vec::new());
            registry.types.push(def);
        }
        registry
    }

    /// Register a type. The parent must already be registered.
    pub fn add_type(&mut self, mut def: TypeDefinition) -> Result<()> {
        if def.id.is_empty() {
            return Err(CmisError::invalid("Type id cannot be empty"));
        }
        if self.index.contains_key(&def.id) {
            return Err(CmisError::invalid(format!("Type already defined: {}", def.id)));
        }

        let mut own_ids = HashSet::new();
        for p in &def.property_definitions {
            if !own_ids.insert(p.id.clone()) {
                return Err(CmisError::invalid(format!(
                    "Type {} defines property {} twice",
                    def.id, p.id
                )));
            }
        }

        match def.parent_id.clone() {
            None => {
                if BaseType::from_id(&def.id) != Some(def.base_type) {
                    return Err(CmisError::invalid(format!(
                        "Type: {} must have a parent type",
                        def.id
                    )));
                }
            }
            Some(parent_id) => {
                let parent = self.get_type(&parent_id).ok_or_else(|| {
                    CmisError::invalid(format!(
                        "Type: {} refers to unknown parent: {}",
                        def.id, parent_id
                    ))
                })?;
                if parent.base_type != def.base_type {
                    return Err(CmisError::invalid(format!(
                        "Type: {} has base type {} but parent {} has base type {}",
                        def.id, def.base_type, parent_id, parent.base_type
                    )));
                }
                let mut merged: Vec<PropertyDefinition> = Vec::new();
                for p in &parent.property_definitions {
                    if own_ids.contains(&p.id) {
                        return Err(CmisError::invalid(format!(
                            "Type {} redefines inherited property {}",
                            def.id, p.id
                        )));
                    }
                    let mut inherited = p.clone();
                    inherited.inherited = true;
                    merged.push(inherited);
                }
                merged.extend(def.property_definitions.drain(..).map(|mut p| {
                    p.inherited = false;
                    p
                }));
                def.property_definitions = merged;
            }
        }

        if let Some(parent_id) = &def.parent_id {
            self.children
                .entry(parent_id.clone())
                .or_default()
                .push(def.id.clone());
        }
        self.children.insert(def.id.clone(), Vec::new());
        self.index.insert(def.id.clone(), self.types.len());
        tracing::debug!("Registered type {}", def.id);
        self.types.push(def);
        Ok(())
    }

    /// Get a type by id
    pub fn get_type(&self, id: &str) -> Option<&TypeDefinition> {
        self.index.get(id).map(|&i| &self.types[i])
    }

    /// Get a type by id or fail with ObjectNotFound
    pub fn require_type(&self, id: &str) -> Result<&TypeDefinition> {
        self.get_type(id)
            .ok_or_else(|| CmisError::not_found(format!("type {}", id)))
    }

    /// Depth-first pre-order walk of the subtree rooted at `id`.
    ///
    /// `depth` of -1 is unbounded and 0 returns the type alone. With no
    /// `id` every type is returned in registration order and `depth` is
    /// ignored.
    pub fn get_types(
        &self,
        id: Option<&str>,
        depth: i32,
        include_property_definitions: bool,
    ) -> Result<Vec<TypeDefinition>> {
        let project = |t: &TypeDefinition| {
            if include_property_definitions {
                t.clone()
            } else {
                t.without_property_definitions()
            }
        };
        let Some(id) = id else {
            return Ok(self.types.iter().map(project).collect());
        };
        if depth < -1 {
            return Err(CmisError::invalid(format!("Invalid depth: {}", depth)));
        }
        self.require_type(id)?;

        let mut out = Vec::new();
        let mut done = HashSet::new();
        self.collect_subtypes(id, depth, &mut out, &mut done)?;
        Ok(out.into_iter().map(project).collect())
    }

    fn collect_subtypes<'a>(
        &'a self,
        id: &'a str,
        depth: i32,
        out: &mut Vec<&'a TypeDefinition>,
        done: &mut HashSet<&'a str>,
    ) -> Result<()> {
        if !done.insert(id) {
            return Err(CmisError::TypeHierarchyCycle {
                type_id: id.to_string(),
            });
        }
        out.push(self.require_type(id)?);
        if depth == 0 {
            return Ok(());
        }
        if let Some(children) = self.children.get(id) {
            for child in children {
                self.collect_subtypes(child, depth - 1, out, done)?;
            }
        }
        Ok(())
    }

    /// One page of the direct subtypes of `id`, or of the base types.
    pub fn get_type_children(
        &self,
        id: Option<&str>,
        include_property_definitions: bool,
        paging: &Paging,
        default_max_items: usize,
    ) -> Result<ListPage<TypeDefinition>> {
        let ids: Vec<&str> = match id {
            None => self
                .types
                .iter()
                .filter(|t| t.parent_id.is_none())
                .map(|t| t.id.as_str())
                .collect(),
            Some(id) => {
                self.require_type(id)?;
                self.children
                    .get(id)
                    .map(|c| c.iter().map(String::as_str).collect())
                    .unwrap_or_default()
            }
        };
        let defs = ids
            .into_iter()
            .filter_map(|id| self.get_type(id))
            .map(|t| {
                if include_property_definitions {
                    t.clone()
                } else {
                    t.without_property_definitions()
                }
            })
            .collect();
        Ok(ListPage::paginate(defs, paging, default_max_items))
    }

    /// Whether `type_id` is `ancestor_id` or one of its descendants
    pub fn is_subtype_of(&self, type_id: &str, ancestor_id: &str) -> bool {
        let mut current = Some(type_id);
        let mut steps = 0;
        while let Some(id) = current {
            if id == ancestor_id {
                return true;
            }
            // guards a corrupt parent chain
            steps += 1;
            if steps > self.types.len() {
                return false;
            }
            current = self.get_type(id).and_then(|t| t.parent_id.as_deref());
        }
        false
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeDefinition> {
        self.types.iter()
    }
}

/// Two-phase registration: collect definitions in any order, then
/// validate and register the whole forest at once.
#[derive(Debug, Default)]
pub struct TypeRegistryBuilder {
    pending: Vec<TypeDefinition>,
}

impl TypeRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, def: TypeDefinition) -> Self {
        self.pending.push(def);
        self
    }

    pub fn extend(mut self, defs: impl IntoIterator<Item = TypeDefinition>) -> Self {
        self.pending.extend(defs);
        self
    }

    /// Register the base types, then every pending type once its parent is
    /// known.
    pub fn build(self) -> Result<TypeRegistry> {
        let mut registry = TypeRegistry::with_base_types();
        let mut pending = self.pending;

        while !pending.is_empty() {
            let (ready, blocked): (Vec<_>, Vec<_>) = pending.into_iter().partition(|t| {
                t.parent_id
                    .as_deref()
                    .map(|p| registry.get_type(p).is_some())
                    .unwrap_or(true)
            });
            if ready.is_empty() {
                return Err(Self::explain_blocked(&blocked));
            }
            for def in ready {
                registry.add_type(def)?;
            }
            pending = blocked;
        }
        Ok(registry)
    }

    fn explain_blocked(blocked: &[TypeDefinition]) -> CmisError {
        let ids: HashSet<&str> = blocked.iter().map(|t| t.id.as_str()).collect();
        for t in blocked {
            if let Some(parent) = t.parent_id.as_deref() {
                if !ids.contains(parent) {
                    return CmisError::invalid(format!(
                        "Type: {} refers to unknown parent: {}",
                        t.id, parent
                    ));
                }
            }
        }
        // every blocked type waits on another blocked type
        let type_id = blocked.first().map(|t| t.id.clone()).unwrap_or_default();
        CmisError::TypeHierarchyCycle { type_id }
    }
}
