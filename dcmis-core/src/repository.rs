//! Repository and object services
//!
//! [`Repository`] is the entry point of the engine. State lives behind a
//! single `tokio::sync::RwLock`: every mutation validates and applies under
//! the write lock, every read materializes under the read lock, so each
//! call sees one consistent snapshot.
//!
//! Versioning, navigation, ACL and change log operations are implemented
//! in their own modules as further `impl Repository` blocks.

use crate::acl::Ace;
use crate::changelog::ChangeType;
use crate::config::{Capabilities, RepositoryConfig};
use crate::error::{CmisError, Result};
use crate::object::{
    AllowableAction, ChangeToken, ContentStream, ObjectEntry, ObjectId, VersionSeriesId,
    VersioningState,
};
use crate::paging::{Inclusion, ListPage, Paging, PropertyFilter, RelationshipDirection};
use crate::properties::{cmis_props, Properties, PropertyUpdate, PropertyUpdates};
use crate::query::QueryExecutor;
use crate::state::{
    DocumentVersion, Fileable, RepositoryState, SeriesState, StoredAce, StoredObject,
    VersionSeries,
};
use crate::types::{BaseType, ContentStreamAllowed, TypeDefinition, TypeRegistry};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

// ── Requests and results ───────────────────────────────────────────────────

/// Input of `create_document`
#[derive(Debug, Clone, Default)]
pub struct CreateDocument {
    /// Must carry `cmis:objectTypeId` and `cmis:name`
    pub properties: Properties,
    /// Unfiled when absent (requires the unfiling capability)
    pub folder_id: Option<ObjectId>,
    pub content: Option<ContentStream>,
    pub versioning_state: VersioningState,
    pub policies: Vec<ObjectId>,
    pub aces: Vec<Ace>,
}

impl CreateDocument {
    pub fn new(properties: Properties) -> Self {
        Self {
            properties,
            ..Self::default()
        }
    }

    pub fn in_folder(mut self, folder_id: &ObjectId) -> Self {
        self.folder_id = Some(folder_id.clone());
        self
    }

    pub fn with_content(mut self, content: ContentStream) -> Self {
        self.content = Some(content);
        self
    }

    pub fn versioning_state(mut self, state: VersioningState) -> Self {
        self.versioning_state = state;
        self
    }

    pub fn with_policy(mut self, policy_id: &ObjectId) -> Self {
        self.policies.push(policy_id.clone());
        self
    }

    pub fn with_ace(mut self, ace: Ace) -> Self {
        self.aces.push(ace);
        self
    }
}

/// Input of `create_document_from_source`
#[derive(Debug, Clone, Default)]
pub struct CreateDocumentFromSource {
    pub folder_id: Option<ObjectId>,
    /// Applied on top of the source's properties
    pub overrides: PropertyUpdates,
    pub versioning_state: VersioningState,
}

/// Input of `create_folder`
#[derive(Debug, Clone)]
pub struct CreateFolder {
    pub properties: Properties,
    pub parent_id: ObjectId,
    pub policies: Vec<ObjectId>,
    pub aces: Vec<Ace>,
}

impl CreateFolder {
    pub fn new(properties: Properties, parent_id: &ObjectId) -> Self {
        Self {
            properties,
            parent_id: parent_id.clone(),
            policies: Vec::new(),
            aces: Vec::new(),
        }
    }

    pub fn with_ace(mut self, ace: Ace) -> Self {
        self.aces.push(ace);
        self
    }
}

/// Input of `create_relationship`; source and target travel as
/// `cmis:sourceId` / `cmis:targetId` properties
#[derive(Debug, Clone, Default)]
pub struct CreateRelationship {
    pub properties: Properties,
    pub policies: Vec<ObjectId>,
    pub aces: Vec<Ace>,
}

impl CreateRelationship {
    pub fn new(type_id: &str, source: &ObjectId, target: &ObjectId) -> Self {
        let properties = Properties::new()
            .with(cmis_props::OBJECT_TYPE_ID, Value::id(type_id))
            .with(cmis_props::SOURCE_ID, Value::id(source.as_str()))
            .with(cmis_props::TARGET_ID, Value::id(target.as_str()));
        Self {
            properties,
            ..Self::default()
        }
    }
}

/// Input of `create_policy`
#[derive(Debug, Clone, Default)]
pub struct CreatePolicy {
    pub properties: Properties,
    pub folder_id: Option<ObjectId>,
    pub policies: Vec<ObjectId>,
    pub aces: Vec<Ace>,
}

impl CreatePolicy {
    pub fn new(properties: Properties) -> Self {
        Self {
            properties,
            ..Self::default()
        }
    }

    pub fn in_folder(mut self, folder_id: &ObjectId) -> Self {
        self.folder_id = Some(folder_id.clone());
        self
    }
}

/// Identity and token of an object after a successful update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectUpdate {
    pub object_id: ObjectId,
    pub change_token: ChangeToken,
}

/// How `delete_tree` treats non-folder objects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Unfiling {
    /// Unfile everything, delete only folders
    Unfile,
    /// Delete objects filed only inside the tree, unfile the others
    DeleteSingleFiled,
    /// Delete every object, wherever else it is filed
    #[default]
    Delete,
}

/// Result of `delete_tree`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteTreeOutcome {
    /// Objects left in place; empty means full success
    pub failed: Vec<ObjectId>,
}

impl DeleteTreeOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Relationship selection for `get_relationships`
#[derive(Debug, Clone)]
pub struct RelationshipQuery {
    pub type_id: Option<String>,
    pub include_subtypes: bool,
    pub direction: RelationshipDirection,
}

impl Default for RelationshipQuery {
    fn default() -> Self {
        Self {
            type_id: None,
            include_subtypes: true,
            direction: RelationshipDirection::Either,
        }
    }
}

/// Repository description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub root_folder_id: ObjectId,
    pub capabilities: Capabilities,
    pub latest_change_token: Option<ChangeToken>,
    pub product_version: String,
}

// ── Repository ─────────────────────────────────────────────────────────────

/// Typed, versioned, hierarchically filed object repository
pub struct Repository {
    pub(crate) config: Arc<RepositoryConfig>,
    pub(crate) types: Arc<TypeRegistry>,
    pub(crate) state: Arc<RwLock<RepositoryState>>,
    pub(crate) query_executor: Option<Arc<dyn QueryExecutor>>,
    root_id: ObjectId,
}

impl Repository {
    /// Open an empty repository for `config`.
    pub fn open(config: RepositoryConfig) -> Result<Self> {
        config.validate()?;
        let types = Arc::new(config.type_registry()?);
        let config = Arc::new(config);
        let state = RepositoryState::new(Arc::clone(&types), Arc::clone(&config))?;
        let root_id = state.root_id.clone();
        tracing::info!(
            "Opened repository {} with {} types, root folder {}",
            config.repository_id,
            types.len(),
            root_id
        );
        Ok(Self {
            config,
            types,
            state: Arc::new(RwLock::new(state)),
            query_executor: None,
            root_id,
        })
    }

    /// Install the query language implementation
    pub fn with_query_executor(mut self, executor: Arc<dyn QueryExecutor>) -> Self {
        self.query_executor = Some(executor);
        self
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn root_folder_id(&self) -> &ObjectId {
        &self.root_id
    }

    pub async fn get_repository_info(&self) -> RepositoryInfo {
        let state = self.state.read().await;
        RepositoryInfo {
            id: self.config.repository_id.clone(),
            name: self.config.repository_name.clone(),
            description: self.config.description.clone(),
            root_folder_id: self.root_id.clone(),
            capabilities: self.config.capabilities.clone(),
            latest_change_token: state.change_log.latest_token(),
            product_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    // ── Types ──

    pub fn get_type(&self, type_id: &str) -> Result<TypeDefinition> {
        self.types.require_type(type_id).cloned()
    }

    pub fn get_types(
        &self,
        type_id: Option<&str>,
        depth: i32,
        include_property_definitions: bool,
    ) -> Result<Vec<TypeDefinition>> {
        self.types
            .get_types(type_id, depth, include_property_definitions)
    }

    pub fn get_type_children(
        &self,
        type_id: Option<&str>,
        include_property_definitions: bool,
        paging: &Paging,
    ) -> Result<ListPage<TypeDefinition>> {
        self.types.get_type_children(
            type_id,
            include_property_definitions,
            paging,
            self.config.default_max_items,
        )
    }

    // ── Creation ──

    pub async fn create_document(&self, request: CreateDocument) -> Result<ObjectId> {
        let mut state = self.state.write().await;
        state.create_document(request)
    }

    /// Copy a document's properties and content into a new version series.
    pub async fn create_document_from_source(
        &self,
        source_id: &ObjectId,
        request: CreateDocumentFromSource,
    ) -> Result<ObjectId> {
        let mut state = self.state.write().await;
        let source = state.object(source_id)?;
        if source.base_type != BaseType::Document {
            return Err(CmisError::invalid(format!("{} is not a document", source_id)));
        }
        let mut properties = source.properties.clone();
        request.overrides.apply_to(&mut properties);
        let create = CreateDocument {
            properties,
            folder_id: request.folder_id,
            content: source.content.clone(),
            versioning_state: request.versioning_state,
            policies: Vec::new(),
            aces: Vec::new(),
        };
        let id = state.create_document(create)?;
        tracing::debug!("Copied document {} to {}", source_id, id);
        Ok(id)
    }

    pub async fn create_folder(&self, request: CreateFolder) -> Result<ObjectId> {
        let mut state = self.state.write().await;
        let def = state.prepare_create(&request.properties, BaseType::Folder)?;
        let name = object_name(&request.properties);
        state.check_filing(&def, &name, &request.parent_id)?;
        state.check_create_controls(&def, &request.policies, &request.aces)?;
        state.check_allowed_child_types(&request.properties)?;

        let mut props = request.properties;
        def.apply_defaults(&mut props);
        let mut obj = StoredObject::new(ObjectId::generate(), &def, props);
        attach_controls(&mut obj, request.policies, &request.aces);
        let id = state.insert_object(obj);
        state.file_into(Fileable::Object(id.clone()), &request.parent_id);
        tracing::info!("Created folder {} ({}) in {}", id, name, request.parent_id);
        Ok(id)
    }

    pub async fn create_relationship(&self, request: CreateRelationship) -> Result<ObjectId> {
        let mut state = self.state.write().await;
        let def = state.prepare_create(&request.properties, BaseType::Relationship)?;
        for (prop, allowed) in [
            (cmis_props::SOURCE_ID, &def.allowed_source_types),
            (cmis_props::TARGET_ID, &def.allowed_target_types),
        ] {
            let end_id = request
                .properties
                .get_str(prop)
                .map(ObjectId::from)
                .ok_or_else(|| CmisError::constraint(format!("{} is required", prop)))?;
            let end = state.object(&end_id)?;
            if !allowed.is_empty()
                && !allowed.iter().any(|a| self.types.is_subtype_of(&end.type_id, a))
            {
                return Err(CmisError::constraint(format!(
                    "Type {} is not allowed as {} of relationship type {}",
                    end.type_id, prop, def.id
                )));
            }
        }
        state.check_create_controls(&def, &request.policies, &request.aces)?;

        let mut props = request.properties;
        def.apply_defaults(&mut props);
        let mut obj = StoredObject::new(ObjectId::generate(), &def, props);
        attach_controls(&mut obj, request.policies, &request.aces);
        let id = state.insert_object(obj);
        tracing::info!("Created relationship {} of type {}", id, def.id);
        Ok(id)
    }

    pub async fn create_policy(&self, request: CreatePolicy) -> Result<ObjectId> {
        let mut state = self.state.write().await;
        let def = state.prepare_create(&request.properties, BaseType::Policy)?;
        let name = object_name(&request.properties);
        if let Some(folder) = &request.folder_id {
            state.check_filing(&def, &name, folder)?;
        }
        state.check_create_controls(&def, &request.policies, &request.aces)?;

        let mut props = request.properties;
        def.apply_defaults(&mut props);
        let mut obj = StoredObject::new(ObjectId::generate(), &def, props);
        attach_controls(&mut obj, request.policies, &request.aces);
        let id = state.insert_object(obj);
        if let Some(folder) = &request.folder_id {
            state.file_into(Fileable::Object(id.clone()), folder);
        }
        tracing::info!("Created policy {} ({})", id, name);
        Ok(id)
    }

    // ── Reads ──

    pub async fn get_object(
        &self,
        object_id: &ObjectId,
        inclusion: &Inclusion,
    ) -> Result<ObjectEntry> {
        let filter = inclusion.property_filter()?;
        let state = self.state.read().await;
        state.entry(object_id, inclusion, &filter)
    }

    /// Resolve `/a/b/c` by object names from the root folder.
    pub async fn get_object_by_path(
        &self,
        path: &str,
        inclusion: &Inclusion,
    ) -> Result<ObjectEntry> {
        let filter = inclusion.property_filter()?;
        let state = self.state.read().await;
        let id = state.resolve_path(path)?;
        state.entry(&id, inclusion, &filter)
    }

    /// Properties of an object, projected through `filter`
    pub async fn get_properties(
        &self,
        object_id: &ObjectId,
        filter: Option<&str>,
    ) -> Result<Properties> {
        let filter = PropertyFilter::parse(filter)?;
        let state = self.state.read().await;
        let entry = state.entry(object_id, &Inclusion::new(), &filter)?;
        Ok(entry.properties)
    }

    pub async fn get_allowable_actions(
        &self,
        object_id: &ObjectId,
    ) -> Result<BTreeSet<AllowableAction>> {
        let state = self.state.read().await;
        let obj = state.object(object_id)?;
        Ok(state.allowable_actions(obj))
    }

    /// One page of the relationships naming an object, oldest first
    pub async fn get_relationships(
        &self,
        object_id: &ObjectId,
        query: &RelationshipQuery,
        inclusion: &Inclusion,
        paging: &Paging,
    ) -> Result<ListPage<ObjectEntry>> {
        let state = self.state.read().await;
        state.object(object_id)?;
        if let Some(type_id) = &query.type_id {
            let def = self.types.require_type(type_id)?;
            if def.base_type != BaseType::Relationship {
                return Err(CmisError::invalid(format!(
                    "{} is not a relationship type",
                    type_id
                )));
            }
        }
        let ids: Vec<ObjectId> = state
            .relationship_ids(object_id, query.direction)
            .into_iter()
            .filter(|id| match (&query.type_id, state.objects.get(id)) {
                (None, _) => true,
                (Some(t), Some(rel)) if query.include_subtypes => {
                    self.types.is_subtype_of(&rel.type_id, t)
                }
                (Some(t), Some(rel)) => &rel.type_id == t,
                (Some(_), None) => false,
            })
            .collect();
        let page = ListPage::paginate(ids, paging, self.config.default_max_items);
        let items = state.entries(&page.items, inclusion)?;
        Ok(ListPage {
            items,
            has_more_items: page.has_more_items,
            num_items: page.num_items,
        })
    }

    // ── Updates ──

    /// Apply property changes. A supplied change token must match the
    /// object's current one.
    pub async fn update_properties(
        &self,
        object_id: &ObjectId,
        change_token: Option<ChangeToken>,
        updates: PropertyUpdates,
    ) -> Result<ObjectUpdate> {
        let mut state = self.state.write().await;
        let obj = state.object(object_id)?;
        state.check_token(obj, change_token)?;
        state.check_mutable(obj)?;
        let def = state.type_of(obj)?;
        def.validate_update(&updates, state.is_pwc(object_id))?;

        for (id, change) in updates.iter() {
            if let (cmis_props::NAME, PropertyUpdate::Set(value)) = (id.as_str(), change) {
                let name = value
                    .as_single()
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                if obj.base_type != BaseType::Relationship {
                    RepositoryState::validate_name(name)?;
                }
                if let Some(f) = state.fileable_of(obj) {
                    for parent in state.parents_of(&f) {
                        state.check_name_free(parent, name, Some(&f))?;
                    }
                }
            }
        }
        if let Some(PropertyUpdate::Set(value)) = updates
            .iter()
            .find(|(id, _)| id.as_str() == cmis_props::ALLOWED_CHILD_OBJECT_TYPE_IDS)
            .map(|(_, c)| c)
        {
            let props =
                Properties::new().with(cmis_props::ALLOWED_CHILD_OBJECT_TYPE_IDS, value.clone());
            state.check_allowed_child_types(&props)?;
        }

        updates.apply_to(&mut state.object_mut(object_id)?.properties);
        let change_token = state.stamp(object_id, ChangeType::Updated);
        tracing::debug!("Updated properties of {}", object_id);
        Ok(ObjectUpdate {
            object_id: object_id.clone(),
            change_token,
        })
    }

    /// Move an object from `source` to `target`. The source may be omitted
    /// only when the object has exactly one parent.
    pub async fn move_object(
        &self,
        object_id: &ObjectId,
        target_id: &ObjectId,
        source_id: Option<&ObjectId>,
    ) -> Result<ChangeToken> {
        let mut state = self.state.write().await;
        let obj = state.object(object_id)?;
        let Some(f) = state.fileable_of(obj) else {
            return Err(CmisError::constraint(format!("{} is not fileable", object_id)));
        };
        if *object_id == self.root_id {
            return Err(CmisError::constraint("The root folder cannot be moved"));
        }
        state.require_folder(target_id)?;

        let parents = state.parents_of(&f);
        let source = match source_id {
            Some(s) if parents.contains(s) => s.clone(),
            Some(s) => {
                return Err(CmisError::invalid(format!(
                    "{} is not a parent of {}",
                    s, object_id
                )));
            }
            None if parents.len() == 1 => parents[0].clone(),
            None if parents.is_empty() => {
                return Err(CmisError::invalid(format!("{} is unfiled", object_id)));
            }
            None => {
                return Err(CmisError::invalid(format!(
                    "{} is multi-filed; a source folder is required",
                    object_id
                )));
            }
        };
        if source == *target_id {
            return Ok(obj.change_token);
        }
        if obj.base_type == BaseType::Folder && state.is_within(target_id, object_id) {
            return Err(CmisError::constraint(format!(
                "Cannot move folder {} into its own subtree",
                object_id
            )));
        }
        state.check_child_type(target_id, &obj.type_id)?;
        let name = state
            .representative(&f)
            .and_then(|r| state.objects.get(r))
            .map(|o| o.name().to_string())
            .unwrap_or_default();
        state.check_name_free(target_id, &name, Some(&f))?;

        state.unfile_from(&f, &source);
        state.file_into(f, target_id);
        let token = state.stamp(object_id, ChangeType::Updated);
        tracing::info!("Moved {} from {} to {}", object_id, source, target_id);
        Ok(token)
    }

    // ── Content ──

    pub async fn has_content_stream(&self, object_id: &ObjectId) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state.object(object_id)?.content.is_some())
    }

    pub async fn get_content_stream(&self, object_id: &ObjectId) -> Result<ContentStream> {
        let state = self.state.read().await;
        let obj = state.object(object_id)?;
        if obj.base_type != BaseType::Document {
            return Err(CmisError::StreamNotSupported(format!(
                "{} is not a document",
                object_id
            )));
        }
        obj.content
            .clone()
            .ok_or_else(|| CmisError::constraint(format!("{} has no content stream", object_id)))
    }

    /// Set or replace the content stream of a document.
    pub async fn set_content_stream(
        &self,
        object_id: &ObjectId,
        content: ContentStream,
        overwrite: bool,
        change_token: Option<ChangeToken>,
    ) -> Result<ObjectUpdate> {
        let mut state = self.state.write().await;
        let obj = state.object(object_id)?;
        let def = state.type_of(obj)?;
        if obj.base_type != BaseType::Document
            || def.content_stream_allowed == ContentStreamAllowed::NotAllowed
        {
            return Err(CmisError::StreamNotSupported(format!(
                "Type {} does not allow content streams",
                obj.type_id
            )));
        }
        state.check_token(obj, change_token)?;
        state.check_mutable(obj)?;
        if obj.content.is_some() && !overwrite {
            return Err(CmisError::ContentAlreadyExists(object_id.clone()));
        }

        let length = content.length();
        state.object_mut(object_id)?.content = Some(content);
        let change_token = state.stamp(object_id, ChangeType::Updated);
        tracing::debug!("Set content stream of {} ({} bytes)", object_id, length);
        Ok(ObjectUpdate {
            object_id: object_id.clone(),
            change_token,
        })
    }

    pub async fn delete_content_stream(
        &self,
        object_id: &ObjectId,
        change_token: Option<ChangeToken>,
    ) -> Result<ObjectUpdate> {
        let mut state = self.state.write().await;
        let obj = state.object(object_id)?;
        let def = state.type_of(obj)?;
        match def.content_stream_allowed {
            _ if obj.base_type != BaseType::Document => {
                return Err(CmisError::StreamNotSupported(format!(
                    "{} is not a document",
                    object_id
                )));
            }
            ContentStreamAllowed::NotAllowed => {
                return Err(CmisError::StreamNotSupported(format!(
                    "Type {} does not allow content streams",
                    obj.type_id
                )));
            }
            ContentStreamAllowed::Required => {
                return Err(CmisError::constraint(format!(
                    "Type {} requires a content stream",
                    obj.type_id
                )));
            }
            ContentStreamAllowed::Allowed => {}
        }
        state.check_token(obj, change_token)?;
        state.check_mutable(obj)?;

        state.object_mut(object_id)?.content = None;
        let change_token = state.stamp(object_id, ChangeType::Updated);
        Ok(ObjectUpdate {
            object_id: object_id.clone(),
            change_token,
        })
    }

    // ── Deletion ──

    /// Delete an object. Deleting a private working copy cancels the
    /// check-out; `all_versions` deletes a document's whole series.
    pub async fn delete_object(&self, object_id: &ObjectId, all_versions: bool) -> Result<()> {
        let mut state = self.state.write().await;
        let obj = state.object(object_id)?;

        if obj.base_type == BaseType::Document {
            if state.is_pwc(object_id) {
                return state.cancel_checkout_locked(object_id);
            }
            let series_id = obj
                .version
                .as_ref()
                .map(|v| v.series.clone())
                .ok_or_else(|| {
                    CmisError::constraint(format!("{} has no version series", object_id))
                })?;
            if all_versions {
                state.purge_series(&series_id);
                tracing::info!("Deleted all versions of series {}", series_id);
                return Ok(());
            }
            return state.delete_version(object_id, &series_id);
        }

        if let Some(err) = state.delete_blocker(obj) {
            return Err(err);
        }
        match state.fileable_of(obj) {
            Some(f) => state.purge_fileable(&f),
            None => state.purge_object(object_id),
        }
        tracing::info!("Deleted {}", object_id);
        Ok(())
    }

    /// Delete a folder and everything below it.
    ///
    /// Objects that cannot be deleted are left fully intact (never merely
    /// unfiled), so calling again on the same folder is a safe retry. With
    /// `continue_on_failure` every object left behind is reported,
    /// otherwise only the first failure.
    pub async fn delete_tree(
        &self,
        folder_id: &ObjectId,
        unfiling: Unfiling,
        continue_on_failure: bool,
    ) -> Result<DeleteTreeOutcome> {
        let mut state = self.state.write().await;
        state.require_folder(folder_id)?;
        if *folder_id == self.root_id {
            return Err(CmisError::constraint("The root folder cannot be deleted"));
        }
        if unfiling == Unfiling::Unfile && !self.config.capabilities.unfiling {
            return Err(CmisError::constraint("Repository does not support unfiling"));
        }

        let folders = state.folder_subtree(folder_id);
        let in_tree: HashSet<ObjectId> = folders.iter().cloned().collect();

        let mut members: Vec<Fileable> = Vec::new();
        let mut seen = HashSet::new();
        for folder in &folders {
            for child in state.children_of(folder) {
                if matches!(child, Fileable::Object(id) if in_tree.contains(id)) {
                    continue;
                }
                if seen.insert(child.clone()) {
                    members.push(child.clone());
                }
            }
        }
        // policies last: deleting documents may release them
        members.sort_by_key(|f| match f {
            Fileable::Object(id) => state
                .objects
                .get(id)
                .map(|o| o.base_type == BaseType::Policy)
                .unwrap_or(false),
            Fileable::Series(_) => false,
        });

        let mut failed: Vec<ObjectId> = Vec::new();
        let mut removed = 0usize;
        for member in members {
            let filings = state.parents_of(&member).to_vec();
            let filed_outside = filings.iter().any(|p| !in_tree.contains(p));
            let delete = match unfiling {
                Unfiling::Unfile => false,
                Unfiling::DeleteSingleFiled => !filed_outside,
                Unfiling::Delete => true,
            };
            let Some(rep) = state.representative(&member).cloned() else {
                continue;
            };

            if !delete {
                for p in filings.iter().filter(|p| in_tree.contains(*p)) {
                    state.unfile_from(&member, p);
                }
                state.stamp(&rep, ChangeType::Updated);
                continue;
            }
            if let Some(err) = state.fileable_delete_blocker(&member) {
                tracing::warn!("delete_tree: keeping {}: {}", rep, err);
                failed.push(rep);
                continue;
            }
            state.purge_fileable(&member);
            removed += 1;
        }

        for folder in folders.iter().rev() {
            if state.children_of(folder).is_empty() {
                state.purge_fileable(&Fileable::Object(folder.clone()));
                removed += 1;
            } else {
                failed.push(folder.clone());
            }
        }

        if !failed.is_empty() {
            tracing::warn!(
                "delete_tree {}: {} objects removed, {} left in place",
                folder_id,
                removed,
                failed.len()
            );
        } else {
            tracing::info!("delete_tree {}: {} objects removed", folder_id, removed);
        }
        if !continue_on_failure {
            failed.truncate(1);
        }
        Ok(DeleteTreeOutcome { failed })
    }
}

fn object_name(props: &Properties) -> String {
    props.get_str(cmis_props::NAME).unwrap_or_default().to_string()
}

fn attach_controls(obj: &mut StoredObject, policies: Vec<ObjectId>, aces: &[Ace]) {
    obj.policies = policies;
    obj.aces = aces
        .iter()
        .map(|a| StoredAce {
            principal: a.principal.clone(),
            permissions: a.permissions.clone(),
            propagate: false,
        })
        .collect();
}

// ── Creation helpers ───────────────────────────────────────────────────────

impl RepositoryState {
    /// Resolve and check the type named by the creation properties.
    pub(crate) fn prepare_create(
        &self,
        props: &Properties,
        base: BaseType,
    ) -> Result<TypeDefinition> {
        let type_id = props
            .get_str(cmis_props::OBJECT_TYPE_ID)
            .ok_or_else(|| CmisError::constraint("cmis:objectTypeId is required"))?;
        let def = self
            .types
            .get_type(type_id)
            .ok_or_else(|| CmisError::constraint(format!("Unknown type: {}", type_id)))?;
        if def.base_type != base {
            return Err(CmisError::constraint(format!(
                "Type {} is not a {} type",
                type_id, base
            )));
        }
        if !def.creatable {
            return Err(CmisError::constraint(format!("Type {} is not creatable", type_id)));
        }
        def.validate_for_create(props)?;
        if base != BaseType::Relationship {
            RepositoryState::validate_name(props.get_str(cmis_props::NAME).unwrap_or_default())?;
        }
        Ok(def.clone())
    }

    pub(crate) fn check_filing(
        &self,
        def: &TypeDefinition,
        name: &str,
        folder: &ObjectId,
    ) -> Result<()> {
        self.require_folder(folder)?;
        if !def.fileable {
            return Err(CmisError::constraint(format!("Type {} is not fileable", def.id)));
        }
        self.check_child_type(folder, &def.id)?;
        self.check_name_free(folder, name, None)
    }

    pub(crate) fn check_create_controls(
        &self,
        def: &TypeDefinition,
        policies: &[ObjectId],
        aces: &[Ace],
    ) -> Result<()> {
        if !aces.is_empty() {
            if !def.controllable_acl {
                return Err(CmisError::constraint(format!(
                    "Type {} is not ACL-controllable",
                    def.id
                )));
            }
            self.check_permissions(aces)?;
        }
        if !policies.is_empty() && !def.controllable_policy {
            return Err(CmisError::constraint(format!(
                "Type {} is not policy-controllable",
                def.id
            )));
        }
        for policy_id in policies {
            if self.object(policy_id)?.base_type != BaseType::Policy {
                return Err(CmisError::invalid(format!("{} is not a policy", policy_id)));
            }
        }
        Ok(())
    }

    /// Every id in `cmis:allowedChildObjectTypeIds` must name a type.
    pub(crate) fn check_allowed_child_types(&self, props: &Properties) -> Result<()> {
        for type_id in props.get_strs(cmis_props::ALLOWED_CHILD_OBJECT_TYPE_IDS) {
            if self.types.get_type(type_id).is_none() {
                return Err(CmisError::constraint(format!(
                    "Unknown allowed child type: {}",
                    type_id
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn create_document(&mut self, request: CreateDocument) -> Result<ObjectId> {
        let def = self.prepare_create(&request.properties, BaseType::Document)?;
        let name = object_name(&request.properties);
        match (def.content_stream_allowed, &request.content) {
            (ContentStreamAllowed::NotAllowed, Some(_)) => {
                return Err(CmisError::StreamNotSupported(format!(
                    "Type {} does not allow content streams",
                    def.id
                )));
            }
            (ContentStreamAllowed::Required, None) => {
                return Err(CmisError::constraint(format!(
                    "Type {} requires a content stream",
                    def.id
                )));
            }
            _ => {}
        }
        let versioning_state = match (def.versionable, request.versioning_state) {
            (true, VersioningState::None) => VersioningState::Major,
            (false, VersioningState::CheckedOut | VersioningState::Minor) => {
                return Err(CmisError::constraint(format!(
                    "Type {} is not versionable",
                    def.id
                )));
            }
            (_, state) => state,
        };
        match &request.folder_id {
            Some(folder) => self.check_filing(&def, &name, folder)?,
            None if !self.config.capabilities.unfiling => {
                return Err(CmisError::constraint(
                    "Repository does not support unfiled documents",
                ));
            }
            None => {}
        }
        self.check_create_controls(&def, &request.policies, &request.aces)?;

        let series_id = VersionSeriesId::generate();
        let (label, major) = match versioning_state {
            VersioningState::CheckedOut => (crate::versioning::PWC_LABEL.to_string(), false),
            VersioningState::Minor => ("0.1".to_string(), false),
            VersioningState::Major | VersioningState::None => ("1.0".to_string(), true),
        };
        let mut props = request.properties;
        def.apply_defaults(&mut props);
        let mut obj = StoredObject::new(ObjectId::generate(), &def, props);
        obj.content = request.content;
        obj.version = Some(DocumentVersion {
            series: series_id.clone(),
            label,
            major,
            checkin_comment: None,
        });
        attach_controls(&mut obj, request.policies, &request.aces);
        let id = self.insert_object(obj);

        let series_state = if versioning_state == VersioningState::CheckedOut {
            SeriesState::CheckedOut {
                current: None,
                pwc: id.clone(),
            }
        } else {
            SeriesState::CheckedIn { current: id.clone() }
        };
        let versions = match series_state {
            SeriesState::CheckedIn { .. } => vec![id.clone()],
            SeriesState::CheckedOut { .. } => Vec::new(),
        };
        self.series.insert(
            series_id.clone(),
            VersionSeries {
                id: series_id.clone(),
                versions,
                state: series_state,
            },
        );
        if let Some(folder) = &request.folder_id {
            self.file_into(Fileable::Series(series_id), folder);
        }
        tracing::info!("Created document {} ({}) as {:?}", id, name, versioning_state);
        Ok(id)
    }

    /// Follow `/a/b/c` from the root by object names
    pub(crate) fn resolve_path(&self, path: &str) -> Result<ObjectId> {
        if !path.starts_with('/') {
            return Err(CmisError::invalid(format!("Path must be absolute: {}", path)));
        }
        let mut current = self.root_id.clone();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if self.objects.get(&current).map(|o| o.base_type) != Some(BaseType::Folder) {
                return Err(CmisError::not_found(path));
            }
            current = self
                .child_ids(&current)
                .into_iter()
                .find(|id| self.objects.get(id).map(|o| o.name() == segment).unwrap_or(false))
                .ok_or_else(|| CmisError::not_found(path))?;
        }
        Ok(current)
    }

    /// Delete one checked-in version of a series that is not checked out.
    pub(crate) fn delete_version(
        &mut self,
        id: &ObjectId,
        series_id: &VersionSeriesId,
    ) -> Result<()> {
        let series = self.require_series(series_id)?;
        if series.is_checked_out() {
            return Err(CmisError::conflict(id, "version series is checked out"));
        }
        if series.versions.len() <= 1 {
            self.purge_series(series_id);
            tracing::info!("Deleted last version {} of series {}", id, series_id);
            return Ok(());
        }

        if let Some(series) = self.series.get_mut(series_id) {
            series.versions.retain(|v| v != id);
            if let Some(latest) = series.versions.last().cloned() {
                series.state = SeriesState::CheckedIn { current: latest };
            }
        }
        self.purge_object(id);
        tracing::info!("Deleted version {} of series {}", id, series_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn repo() -> Repository {
        Repository::open(RepositoryConfig::default()).unwrap()
    }

    async fn folder(repo: &Repository, parent: &ObjectId, name: &str) -> ObjectId {
        repo.create_folder(CreateFolder::new(Properties::typed("cmis:folder", name), parent))
            .await
            .unwrap()
    }

    async fn document(repo: &Repository, parent: &ObjectId, name: &str) -> ObjectId {
        repo.create_document(
            CreateDocument::new(Properties::typed("cmis:document", name)).in_folder(parent),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_document() {
        let repo = repo();
        let root = repo.root_folder_id().clone();
        let id = repo
            .create_document(
                CreateDocument::new(Properties::typed("cmis:document", "readme"))
                    .in_folder(&root)
                    .with_content(ContentStream::new("hello", "text/plain")),
            )
            .await
            .unwrap();

        let entry = repo.get_object(&id, &Inclusion::new()).await.unwrap();
        assert_eq!(entry.name(), Some("readme"));
        assert_eq!(entry.content.as_ref().unwrap().length, 5);
        assert_eq!(entry.version.as_ref().unwrap().label, "1.0");
        assert_eq!(entry.properties.get_str(cmis_props::BASE_TYPE_ID), Some("cmis:document"));
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let repo = repo();
        let root = repo.root_folder_id().clone();
        document(&repo, &root, "a").await;
        let err = repo
            .create_document(
                CreateDocument::new(Properties::typed("cmis:document", "a")).in_folder(&root),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NameConstraintViolation);
    }

    #[tokio::test]
    async fn test_create_rejects_wrong_base_type() {
        let repo = repo();
        let root = repo.root_folder_id().clone();
        let err = repo
            .create_document(
                CreateDocument::new(Properties::typed("cmis:folder", "x")).in_folder(&root),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    }

    #[tokio::test]
    async fn test_update_properties_token_check() {
        let repo = repo();
        let root = repo.root_folder_id().clone();
        let id = document(&repo, &root, "doc").await;
        let token = repo.get_object(&id, &Inclusion::new()).await.unwrap().change_token;

        let updated = repo
            .update_properties(
                &id,
                Some(token),
                PropertyUpdates::new().set(cmis_props::NAME, Value::string("renamed")),
            )
            .await
            .unwrap();
        assert_ne!(updated.change_token, token);

        let err = repo
            .update_properties(&id, Some(token), PropertyUpdates::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpdateConflict);
    }

    #[tokio::test]
    async fn test_update_read_only_property_fails_atomically() {
        let repo = repo();
        let root = repo.root_folder_id().clone();
        let id = document(&repo, &root, "doc").await;
        let err = repo
            .update_properties(
                &id,
                None,
                PropertyUpdates::new()
                    .set(cmis_props::NAME, Value::string("other"))
                    .set(cmis_props::VERSION_LABEL, Value::string("9.0")),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
        let entry = repo.get_object(&id, &Inclusion::new()).await.unwrap();
        assert_eq!(entry.name(), Some("doc"));
    }

    #[tokio::test]
    async fn test_move_requires_source_when_multifiled() {
        let repo = repo();
        let root = repo.root_folder_id().clone();
        let a = folder(&repo, &root, "a").await;
        let b = folder(&repo, &root, "b").await;
        let c = folder(&repo, &root, "c").await;
        let doc = document(&repo, &a, "doc").await;
        repo.add_object_to_folder(&doc, &b).await.unwrap();

        let err = repo.move_object(&doc, &c, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let err = repo.move_object(&doc, &c, Some(&c)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        repo.move_object(&doc, &c, Some(&a)).await.unwrap();
        let parents = repo.get_object_parents(&doc, &Inclusion::new()).await.unwrap();
        let ids: Vec<_> = parents.iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids, vec![b, c]);
    }

    #[tokio::test]
    async fn test_move_folder_into_own_subtree_fails() {
        let repo = repo();
        let root = repo.root_folder_id().clone();
        let a = folder(&repo, &root, "a").await;
        let b = folder(&repo, &a, "b").await;
        let err = repo.move_object(&a, &b, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    }

    #[tokio::test]
    async fn test_allowed_child_types_enforced() {
        let repo = repo();
        let root = repo.root_folder_id().clone();
        let props = Properties::typed("cmis:folder", "folders-only")
            .with(cmis_props::ALLOWED_CHILD_OBJECT_TYPE_IDS, Value::ids(["cmis:folder"]));
        let only = repo.create_folder(CreateFolder::new(props, &root)).await.unwrap();

        folder(&repo, &only, "sub").await;
        let err = repo
            .create_document(
                CreateDocument::new(Properties::typed("cmis:document", "d")).in_folder(&only),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    }

    #[tokio::test]
    async fn test_content_stream_overwrite_rules() {
        let repo = repo();
        let root = repo.root_folder_id().clone();
        let id = document(&repo, &root, "doc").await;
        assert!(!repo.has_content_stream(&id).await.unwrap());

        repo.set_content_stream(&id, ContentStream::new("a", "text/plain"), false, None)
            .await
            .unwrap();
        let err = repo
            .set_content_stream(&id, ContentStream::new("b", "text/plain"), false, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ContentAlreadyExists);

        repo.set_content_stream(&id, ContentStream::new("bb", "text/plain"), true, None)
            .await
            .unwrap();
        assert_eq!(repo.get_content_stream(&id).await.unwrap().length(), 2);

        repo.delete_content_stream(&id, None).await.unwrap();
        assert!(!repo.has_content_stream(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_folder_content_not_supported() {
        let repo = repo();
        let root = repo.root_folder_id().clone();
        let err = repo
            .set_content_stream(&root, ContentStream::new("x", "text/plain"), true, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StreamNotSupported);
    }

    #[tokio::test]
    async fn test_get_object_by_path() {
        let repo = repo();
        let root = repo.root_folder_id().clone();
        let a = folder(&repo, &root, "a").await;
        let doc = document(&repo, &a, "note").await;

        let entry = repo.get_object_by_path("/a/note", &Inclusion::new()).await.unwrap();
        assert_eq!(entry.id, doc);
        let root_entry = repo.get_object_by_path("/", &Inclusion::new()).await.unwrap();
        assert_eq!(root_entry.id, root);
        let err = repo.get_object_by_path("/a/missing", &Inclusion::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ObjectNotFound);

        let folder_entry = repo.get_object(&a, &Inclusion::new()).await.unwrap();
        assert_eq!(folder_entry.properties.get_str(cmis_props::PATH), Some("/a"));
    }

    #[tokio::test]
    async fn test_delete_root_and_non_empty_folder_fail() {
        let repo = repo();
        let root = repo.root_folder_id().clone();
        let a = folder(&repo, &root, "a").await;
        document(&repo, &a, "d").await;

        assert_eq!(
            repo.delete_object(&root, true).await.unwrap_err().kind(),
            ErrorKind::ConstraintViolation
        );
        assert_eq!(
            repo.delete_object(&a, true).await.unwrap_err().kind(),
            ErrorKind::ConstraintViolation
        );
    }

    #[tokio::test]
    async fn test_relationships_cascade_on_delete() {
        let repo = repo();
        let root = repo.root_folder_id().clone();
        let a = document(&repo, &root, "a").await;
        let b = document(&repo, &root, "b").await;
        let rel = repo
            .create_relationship(CreateRelationship::new("cmis:relationship", &a, &b))
            .await
            .unwrap();

        let page = repo
            .get_relationships(
                &b,
                &RelationshipQuery::default(),
                &Inclusion::new(),
                &Paging::default(),
            )
            .await
            .unwrap();
        assert_eq!(page.items[0].id, rel);

        let from_target = RelationshipQuery {
            direction: RelationshipDirection::Source,
            ..RelationshipQuery::default()
        };
        let none = repo
            .get_relationships(&b, &from_target, &Inclusion::new(), &Paging::default())
            .await
            .unwrap();
        assert!(none.is_empty());

        repo.delete_object(&a, true).await.unwrap();
        let err = repo.get_object(&rel, &Inclusion::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ObjectNotFound);
    }

    #[tokio::test]
    async fn test_allowable_actions_reflect_state() {
        let repo = repo();
        let root = repo.root_folder_id().clone();
        let doc = document(&repo, &root, "d").await;

        let actions = repo.get_allowable_actions(&doc).await.unwrap();
        assert!(actions.contains(&AllowableAction::CanCheckOut));
        assert!(!actions.contains(&AllowableAction::CanCheckIn));

        let root_actions = repo.get_allowable_actions(&root).await.unwrap();
        assert!(root_actions.contains(&AllowableAction::CanGetChildren));
        assert!(!root_actions.contains(&AllowableAction::CanDeleteObject));
        assert!(!root_actions.contains(&AllowableAction::CanGetFolderParent));
    }

    #[tokio::test]
    async fn test_repository_info() {
        let repo = repo();
        let info = repo.get_repository_info().await;
        assert_eq!(info.id, "default");
        assert_eq!(&info.root_folder_id, repo.root_folder_id());
        assert!(info.latest_change_token.is_none());
    }

    #[tokio::test]
    async fn test_create_document_from_source() {
        let repo = repo();
        let root = repo.root_folder_id().clone();
        let src = repo
            .create_document(
                CreateDocument::new(Properties::typed("cmis:document", "src"))
                    .in_folder(&root)
                    .with_content(ContentStream::new("abc", "text/plain")),
            )
            .await
            .unwrap();
        let copy = repo
            .create_document_from_source(
                &src,
                CreateDocumentFromSource {
                    folder_id: Some(root.clone()),
                    overrides: PropertyUpdates::new().set(cmis_props::NAME, Value::string("copy")),
                    versioning_state: VersioningState::Minor,
                },
            )
            .await
            .unwrap();

        let entry = repo.get_object(&copy, &Inclusion::new()).await.unwrap();
        assert_eq!(entry.name(), Some("copy"));
        assert_eq!(entry.content.unwrap().length, 3);
        assert_eq!(entry.version.unwrap().label, "0.1");
    }
}
