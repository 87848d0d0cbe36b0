//! Repository state behind the repository lock
//!
//! Objects, version series, filings and the change log live together so
//! one lock acquisition sees (and mutates) a consistent snapshot. Public
//! operations validate first and only then call the mutating helpers here.

use crate::acl::AclPropagation;
use crate::changelog::{ChangeEvent, ChangeLog, ChangeType};
use crate::config::RepositoryConfig;
use crate::error::{CmisError, Result};
use crate::object::{
    AllowableAction, ChangeToken, ContentStream, ObjectEntry, ObjectId, VersionInfo,
    VersionSeriesId,
};
use crate::paging::{Inclusion, PropertyFilter, RelationshipDirection};
use crate::properties::{cmis_props, Properties};
use crate::types::{BaseType, ContentStreamAllowed, TypeDefinition, TypeRegistry};
use crate::value::Value;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

/// Name given to the root folder
pub(crate) const ROOT_FOLDER_NAME: &str = "";

// ── Stored records ─────────────────────────────────────────────────────────

/// Version metadata of a stored document
#[derive(Debug, Clone)]
pub(crate) struct DocumentVersion {
    pub series: VersionSeriesId,
    pub label: String,
    pub major: bool,
    pub checkin_comment: Option<String>,
}

/// Directly applied ACE as stored on an object
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StoredAce {
    pub principal: String,
    pub permissions: BTreeSet<String>,
    pub propagate: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct StoredObject {
    pub id: ObjectId,
    pub type_id: String,
    pub base_type: BaseType,
    /// Caller-writable properties; system properties are computed on read
    pub properties: Properties,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub change_token: ChangeToken,
    /// Token minted at creation; orders objects by age
    pub seq: ChangeToken,
    pub content: Option<ContentStream>,
    pub version: Option<DocumentVersion>,
    pub aces: Vec<StoredAce>,
    pub policies: Vec<ObjectId>,
}

impl StoredObject {
    pub(crate) fn new(id: ObjectId, def: &TypeDefinition, properties: Properties) -> Self {
        let now = Utc::now();
        Self {
            id,
            type_id: def.id.clone(),
            base_type: def.base_type,
            properties,
            created: now,
            modified: now,
            change_token: ChangeToken::new(0),
            seq: ChangeToken::new(0),
            content: None,
            version: None,
            aces: Vec::new(),
            policies: Vec::new(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        self.properties.get_str(cmis_props::NAME).unwrap_or_default()
    }
}

/// Check-in state of a version series
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SeriesState {
    CheckedIn {
        current: ObjectId,
    },
    /// `current` is absent when the series was created checked out
    CheckedOut {
        current: Option<ObjectId>,
        pwc: ObjectId,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct VersionSeries {
    pub id: VersionSeriesId,
    /// Checked-in versions, oldest first
    pub versions: Vec<ObjectId>,
    pub state: SeriesState,
}

impl VersionSeries {
    pub(crate) fn current(&self) -> Option<&ObjectId> {
        match &self.state {
            SeriesState::CheckedIn { current } => Some(current),
            SeriesState::CheckedOut { current, .. } => current.as_ref(),
        }
    }

    pub(crate) fn pwc(&self) -> Option<&ObjectId> {
        match &self.state {
            SeriesState::CheckedIn { .. } => None,
            SeriesState::CheckedOut { pwc, .. } => Some(pwc),
        }
    }

    pub(crate) fn is_checked_out(&self) -> bool {
        matches!(self.state, SeriesState::CheckedOut { .. })
    }

    /// The object that stands for the series in folder listings
    pub(crate) fn representative(&self) -> Option<&ObjectId> {
        self.current().or_else(|| self.pwc())
    }
}

/// Unit of folder membership. Documents are filed by series so every
/// version shares the same parents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Fileable {
    Object(ObjectId),
    Series(VersionSeriesId),
}

// ── State ──────────────────────────────────────────────────────────────────

pub(crate) struct RepositoryState {
    pub types: Arc<TypeRegistry>,
    pub config: Arc<RepositoryConfig>,
    pub root_id: ObjectId,
    pub objects: HashMap<ObjectId, StoredObject>,
    pub series: HashMap<VersionSeriesId, VersionSeries>,
    /// Folder -> children in filing order
    pub children: HashMap<ObjectId, Vec<Fileable>>,
    /// Fileable -> parent folders in filing order
    pub parents: HashMap<Fileable, Vec<ObjectId>>,
    pub change_log: ChangeLog,
    last_token: u64,
}

impl RepositoryState {
    /// Empty state holding only the root folder
    pub(crate) fn new(types: Arc<TypeRegistry>, config: Arc<RepositoryConfig>) -> Result<Self> {
        let root_def = types.require_type(BaseType::Folder.id())?.clone();
        let root_id = ObjectId::generate();
        let mut state = Self {
            types,
            change_log: ChangeLog::new(config.change_log_capacity),
            config,
            root_id: root_id.clone(),
            objects: HashMap::new(),
            series: HashMap::new(),
            children: HashMap::new(),
            parents: HashMap::new(),
            last_token: 0,
        };

        let props = Properties::typed(root_def.id.clone(), ROOT_FOLDER_NAME);
        let mut root = StoredObject::new(root_id.clone(), &root_def, props);
        let token = state.mint_token();
        root.change_token = token;
        root.seq = token;
        state.children.insert(root_id.clone(), Vec::new());
        state.objects.insert(root_id, root);
        Ok(state)
    }

    // ── Tokens and logging ──

    pub(crate) fn mint_token(&mut self) -> ChangeToken {
        self.last_token += 1;
        ChangeToken::new(self.last_token)
    }

    fn record(&mut self, id: &ObjectId, change_type: ChangeType, token: ChangeToken) {
        let properties = match change_type {
            ChangeType::Created | ChangeType::Updated => {
                self.objects.get(id).map(|o| o.properties.clone())
            }
            ChangeType::Deleted | ChangeType::Security => None,
        };
        self.change_log.append(ChangeEvent {
            token,
            object_id: id.clone(),
            change_type,
            timestamp: Utc::now(),
            properties,
        });
    }

    /// Store a new object, stamp it and log its creation.
    pub(crate) fn insert_object(&mut self, mut obj: StoredObject) -> ObjectId {
        let token = self.mint_token();
        let now = Utc::now();
        obj.change_token = token;
        obj.seq = token;
        obj.created = now;
        obj.modified = now;
        let id = obj.id.clone();
        if obj.base_type == BaseType::Folder {
            self.children.entry(id.clone()).or_default();
        }
        self.objects.insert(id.clone(), obj);
        self.record(&id, ChangeType::Created, token);
        id
    }

    /// Give a mutated object a fresh change token and log the change.
    pub(crate) fn stamp(&mut self, id: &ObjectId, change_type: ChangeType) -> ChangeToken {
        let token = self.mint_token();
        if let Some(obj) = self.objects.get_mut(id) {
            obj.change_token = token;
            obj.modified = Utc::now();
        }
        self.record(id, change_type, token);
        token
    }

    // ── Lookup ──

    pub(crate) fn object(&self, id: &ObjectId) -> Result<&StoredObject> {
        self.objects.get(id).ok_or_else(|| CmisError::not_found(id))
    }

    pub(crate) fn object_mut(&mut self, id: &ObjectId) -> Result<&mut StoredObject> {
        self.objects.get_mut(id).ok_or_else(|| CmisError::not_found(id))
    }

    pub(crate) fn type_of(&self, obj: &StoredObject) -> Result<&TypeDefinition> {
        self.types.require_type(&obj.type_id)
    }

    pub(crate) fn require_folder(&self, id: &ObjectId) -> Result<&StoredObject> {
        let obj = self.object(id)?;
        if obj.base_type != BaseType::Folder {
            return Err(CmisError::invalid(format!("{} is not a folder", id)));
        }
        Ok(obj)
    }

    pub(crate) fn require_series(&self, id: &VersionSeriesId) -> Result<&VersionSeries> {
        self.series
            .get(id)
            .ok_or_else(|| CmisError::not_found(format!("version series {}", id)))
    }

    pub(crate) fn series_of(&self, obj: &StoredObject) -> Option<&VersionSeries> {
        obj.version.as_ref().and_then(|v| self.series.get(&v.series))
    }

    pub(crate) fn is_pwc(&self, id: &ObjectId) -> bool {
        self.objects
            .get(id)
            .and_then(|o| self.series_of(o))
            .and_then(VersionSeries::pwc)
            .map(|pwc| pwc == id)
            .unwrap_or(false)
    }

    pub(crate) fn check_token(
        &self,
        obj: &StoredObject,
        supplied: Option<ChangeToken>,
    ) -> Result<()> {
        match supplied {
            Some(token) if token != obj.change_token => {
                Err(CmisError::stale_token(&obj.id, token, obj.change_token))
            }
            _ => Ok(()),
        }
    }

    /// Whether the object may be changed in place. Historical versions and
    /// the frozen current version of a checked-out series may not.
    pub(crate) fn check_mutable(&self, obj: &StoredObject) -> Result<()> {
        let Some(series) = self.series_of(obj) else {
            return Ok(());
        };
        if series.pwc() == Some(&obj.id) {
            return Ok(());
        }
        if series.current() == Some(&obj.id) {
            if series.is_checked_out() {
                return Err(CmisError::Versioning(format!(
                    "{} is frozen while its version series is checked out",
                    obj.id
                )));
            }
            return Ok(());
        }
        Err(CmisError::Versioning(format!("{} is not the latest version", obj.id)))
    }

    // ── Filing ──

    pub(crate) fn fileable_of(&self, obj: &StoredObject) -> Option<Fileable> {
        match obj.base_type {
            BaseType::Relationship => None,
            BaseType::Document => obj
                .version
                .as_ref()
                .map(|v| Fileable::Series(v.series.clone())),
            BaseType::Folder | BaseType::Policy => Some(Fileable::Object(obj.id.clone())),
        }
    }

    /// The object shown for a fileable in listings
    pub(crate) fn representative(&self, f: &Fileable) -> Option<&ObjectId> {
        match f {
            Fileable::Object(id) => self.objects.get(id).map(|o| &o.id),
            Fileable::Series(s) => self.series.get(s).and_then(VersionSeries::representative),
        }
    }

    pub(crate) fn parents_of(&self, f: &Fileable) -> &[ObjectId] {
        self.parents.get(f).map(Vec::as_slice).unwrap_or_default()
    }

    pub(crate) fn children_of(&self, folder: &ObjectId) -> &[Fileable] {
        self.children.get(folder).map(Vec::as_slice).unwrap_or_default()
    }

    /// Representative ids of a folder's children, in filing order
    pub(crate) fn child_ids(&self, folder: &ObjectId) -> Vec<ObjectId> {
        self.children_of(folder)
            .iter()
            .filter_map(|f| self.representative(f).cloned())
            .collect()
    }

    pub(crate) fn file_into(&mut self, f: Fileable, folder: &ObjectId) {
        let parents = self.parents.entry(f.clone()).or_default();
        if parents.contains(folder) {
            return;
        }
        parents.push(folder.clone());
        self.children.entry(folder.clone()).or_default().push(f);
    }

    pub(crate) fn unfile_from(&mut self, f: &Fileable, folder: &ObjectId) {
        if let Some(children) = self.children.get_mut(folder) {
            children.retain(|c| c != f);
        }
        if let Some(parents) = self.parents.get_mut(f) {
            parents.retain(|p| p != folder);
            if parents.is_empty() {
                self.parents.remove(f);
            }
        }
    }

    pub(crate) fn unfile_everywhere(&mut self, f: &Fileable) {
        for folder in self.parents_of(f).to_vec() {
            self.unfile_from(f, &folder);
        }
    }

    pub(crate) fn folder_parent(&self, folder: &ObjectId) -> Option<&ObjectId> {
        self.parents_of(&Fileable::Object(folder.clone())).first()
    }

    /// Whether `folder` is `ancestor` or lies below it
    pub(crate) fn is_within(&self, folder: &ObjectId, ancestor: &ObjectId) -> bool {
        let mut current = Some(folder);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.folder_parent(id);
        }
        false
    }

    pub(crate) fn path_of(&self, folder: &ObjectId) -> String {
        let mut names = Vec::new();
        let mut current = folder;
        while let Some(parent) = self.folder_parent(current) {
            if let Some(obj) = self.objects.get(current) {
                names.push(obj.name().to_string());
            }
            current = parent;
        }
        names.reverse();
        format!("/{}", names.join("/"))
    }

    /// Folders of the subtree rooted at `folder`, parents before children
    pub(crate) fn folder_subtree(&self, folder: &ObjectId) -> Vec<ObjectId> {
        let mut out = Vec::new();
        let mut stack = vec![folder.clone()];
        while let Some(id) = stack.pop() {
            let subfolders: Vec<ObjectId> = self
                .children_of(&id)
                .iter()
                .filter_map(|f| match f {
                    Fileable::Object(c)
                        if self.objects.get(c).map(|o| o.base_type) == Some(BaseType::Folder) =>
                    {
                        Some(c.clone())
                    }
                    _ => None,
                })
                .collect();
            out.push(id);
            stack.extend(subfolders.into_iter().rev());
        }
        out
    }

    pub(crate) fn validate_name(name: &str) -> Result<()> {
        if name.trim().is_empty() || name.contains('/') {
            return Err(CmisError::NameConstraintViolation(format!(
                "Illegal object name: {:?}",
                name
            )));
        }
        Ok(())
    }

    /// Fail if another child of `folder` already uses `name`.
    pub(crate) fn check_name_free(
        &self,
        folder: &ObjectId,
        name: &str,
        except: Option<&Fileable>,
    ) -> Result<()> {
        for child in self.children_of(folder) {
            if Some(child) == except {
                continue;
            }
            let taken = self
                .representative(child)
                .and_then(|id| self.objects.get(id))
                .map(|o| o.name() == name)
                .unwrap_or(false);
            if taken {
                return Err(CmisError::NameConstraintViolation(format!(
                    "An object named {} already exists in folder {}",
                    name, folder
                )));
            }
        }
        Ok(())
    }

    /// Fail if the folder restricts its children to other types.
    pub(crate) fn check_child_type(&self, folder: &ObjectId, type_id: &str) -> Result<()> {
        let folder_obj = self.require_folder(folder)?;
        let allowed = folder_obj
            .properties
            .get_strs(cmis_props::ALLOWED_CHILD_OBJECT_TYPE_IDS);
        if allowed.is_empty() || allowed.iter().any(|a| self.types.is_subtype_of(type_id, a)) {
            return Ok(());
        }
        Err(CmisError::constraint(format!(
            "Type {} is not allowed as a child of folder {}",
            type_id, folder
        )))
    }

    // ── Versioning helpers ──

    /// Label of the next checked-in version
    pub(crate) fn next_label(&self, series: &VersionSeries, major: bool) -> String {
        let (maj, min) = series
            .current()
            .and_then(|id| self.objects.get(id))
            .and_then(|o| o.version.as_ref())
            .map(|v| parse_label(&v.label))
            .unwrap_or((0, 0));
        if major {
            format!("{}.0", maj + 1)
        } else {
            format!("{}.{}", maj, min + 1)
        }
    }

    pub(crate) fn latest_major<'a>(&self, series: &'a VersionSeries) -> Option<&'a ObjectId> {
        series.versions.iter().rev().find(|id| {
            self.objects
                .get(id)
                .and_then(|o| o.version.as_ref())
                .map(|v| v.major)
                .unwrap_or(false)
        })
    }

    fn version_info(&self, obj: &StoredObject) -> Option<VersionInfo> {
        let version = obj.version.as_ref()?;
        let series = self.series.get(&version.series)?;
        let pwc = series.pwc();
        Some(VersionInfo {
            series_id: series.id.clone(),
            label: version.label.clone(),
            major: version.major,
            latest: series.current() == Some(&obj.id),
            latest_major: self.latest_major(series) == Some(&obj.id),
            private_working_copy: pwc == Some(&obj.id),
            series_checked_out: series.is_checked_out(),
            checked_out_id: pwc.cloned(),
            checkin_comment: version.checkin_comment.clone(),
        })
    }

    // ── Relationships ──

    /// Relationships naming `id`, oldest first
    pub(crate) fn relationship_ids(
        &self,
        id: &ObjectId,
        direction: RelationshipDirection,
    ) -> Vec<ObjectId> {
        let mut rels: Vec<&StoredObject> = self
            .objects
            .values()
            .filter(|o| o.base_type == BaseType::Relationship)
            .filter(|o| {
                let source = o.properties.get_str(cmis_props::SOURCE_ID) == Some(id.as_str());
                let target = o.properties.get_str(cmis_props::TARGET_ID) == Some(id.as_str());
                match direction {
                    RelationshipDirection::Source => source,
                    RelationshipDirection::Target => target,
                    RelationshipDirection::Either => source || target,
                }
            })
            .collect();
        rels.sort_by_key(|o| o.seq);
        rels.into_iter().map(|o| o.id.clone()).collect()
    }

    // ── Materialization ──

    /// Stored properties plus the computed system properties
    pub(crate) fn full_properties(&self, obj: &StoredObject) -> Properties {
        let mut props = obj.properties.clone();
        props.set(cmis_props::OBJECT_ID, Value::id(obj.id.as_str()));
        props.set(cmis_props::OBJECT_TYPE_ID, Value::id(obj.type_id.clone()));
        props.set(cmis_props::BASE_TYPE_ID, Value::id(obj.base_type.id()));
        props.set(cmis_props::CREATION_DATE, Value::datetime(obj.created));
        props.set(cmis_props::LAST_MODIFICATION_DATE, Value::datetime(obj.modified));
        props.set(cmis_props::CHANGE_TOKEN, Value::string(obj.change_token.to_string()));

        match obj.base_type {
            BaseType::Document => {
                props.set(cmis_props::IS_IMMUTABLE, Value::boolean(false));
                if let Some(v) = self.version_info(obj) {
                    props.set(cmis_props::IS_LATEST_VERSION, Value::boolean(v.latest));
                    props.set(cmis_props::IS_MAJOR_VERSION, Value::boolean(v.major));
                    props.set(cmis_props::IS_LATEST_MAJOR_VERSION, Value::boolean(v.latest_major));
                    props.set(cmis_props::VERSION_LABEL, Value::string(v.label));
                    props.set(cmis_props::VERSION_SERIES_ID, Value::id(v.series_id.as_str()));
                    props.set(
                        cmis_props::IS_VERSION_SERIES_CHECKED_OUT,
                        Value::boolean(v.series_checked_out),
                    );
                    if let Some(pwc) = v.checked_out_id {
                        props.set(
                            cmis_props::VERSION_SERIES_CHECKED_OUT_ID,
                            Value::id(pwc.as_str()),
                        );
                    }
                    if let Some(comment) = v.checkin_comment {
                        props.set(cmis_props::CHECKIN_COMMENT, Value::string(comment));
                    }
                }
                if let Some(cs) = &obj.content {
                    props.set(
                        cmis_props::CONTENT_STREAM_LENGTH,
                        Value::integer(cs.length() as i64),
                    );
                    props.set(
                        cmis_props::CONTENT_STREAM_MIME_TYPE,
                        Value::string(cs.mime_type.clone()),
                    );
                    if let Some(name) = &cs.filename {
                        props.set(
                            cmis_props::CONTENT_STREAM_FILE_NAME,
                            Value::string(name.clone()),
                        );
                    }
                }
            }
            BaseType::Folder => {
                if let Some(parent) = self.folder_parent(&obj.id) {
                    props.set(cmis_props::PARENT_ID, Value::id(parent.as_str()));
                }
                props.set(cmis_props::PATH, Value::string(self.path_of(&obj.id)));
            }
            BaseType::Relationship | BaseType::Policy => {}
        }
        props
    }

    /// Materialize an object with the parts `inclusion` asks for.
    pub(crate) fn entry(
        &self,
        id: &ObjectId,
        inclusion: &Inclusion,
        filter: &PropertyFilter,
    ) -> Result<ObjectEntry> {
        let obj = self.object(id)?;
        let mut properties = self.full_properties(obj);
        if let PropertyFilter::Only(ids) = filter {
            properties.retain_ids(ids);
        }

        let relationships = match inclusion.relationships {
            Some(direction) => {
                let plain = Inclusion::new();
                let rels = self
                    .relationship_ids(id, direction)
                    .iter()
                    .map(|r| self.entry(r, &plain, &PropertyFilter::All))
                    .collect::<Result<Vec<_>>>()?;
                Some(rels)
            }
            None => None,
        };

        Ok(ObjectEntry {
            id: obj.id.clone(),
            type_id: obj.type_id.clone(),
            base_type: obj.base_type,
            change_token: obj.change_token,
            properties,
            version: self.version_info(obj),
            content: obj.content.as_ref().map(ContentStream::info),
            allowable_actions: inclusion
                .allowable_actions
                .then(|| self.allowable_actions(obj)),
            policy_ids: inclusion.policies.then(|| obj.policies.clone()),
            acl: inclusion.acls.then(|| self.effective_acl(obj, false)),
            relationships,
        })
    }

    /// Materialize a list of ids, validating the inclusion once.
    pub(crate) fn entries(
        &self,
        ids: &[ObjectId],
        inclusion: &Inclusion,
    ) -> Result<Vec<ObjectEntry>> {
        let filter = inclusion.property_filter()?;
        ids.iter().map(|id| self.entry(id, inclusion, &filter)).collect()
    }

    // ── Allowable actions ──

    pub(crate) fn allowable_actions(&self, obj: &StoredObject) -> BTreeSet<AllowableAction> {
        use AllowableAction::*;
        let mut actions = BTreeSet::new();
        let Ok(def) = self.type_of(obj) else {
            return actions;
        };
        let caps = &self.config.capabilities;
        let mutable = self.check_mutable(obj).is_ok();

        actions.insert(CanGetProperties);
        actions.insert(CanGetObjectRelationships);
        actions.insert(CanGetAppliedPolicies);
        if mutable {
            actions.insert(CanUpdateProperties);
        }
        if self.delete_blocker(obj).is_none() {
            actions.insert(CanDeleteObject);
        }
        if def.controllable_acl {
            actions.insert(CanGetAcl);
            actions.insert(CanApplyAcl);
        }
        if def.controllable_policy {
            actions.insert(CanApplyPolicy);
            if !obj.policies.is_empty() {
                actions.insert(CanRemovePolicy);
            }
        }

        let is_root = obj.id == self.root_id;
        match obj.base_type {
            BaseType::Folder => {
                actions.insert(CanGetChildren);
                actions.insert(CanGetDescendants);
                actions.insert(CanGetFolderTree);
                actions.insert(CanCreateDocument);
                actions.insert(CanCreateFolder);
                if !is_root {
                    actions.insert(CanGetFolderParent);
                    actions.insert(CanMoveObject);
                    actions.insert(CanDeleteTree);
                }
            }
            BaseType::Document | BaseType::Policy => {
                let filings = self
                    .fileable_of(obj)
                    .map(|f| self.parents_of(&f).len())
                    .unwrap_or(0);
                actions.insert(CanGetObjectParents);
                if caps.multifiling {
                    actions.insert(CanAddObjectToFolder);
                }
                if filings > 0 {
                    actions.insert(CanMoveObject);
                    if caps.unfiling || filings > 1 {
                        actions.insert(CanRemoveObjectFromFolder);
                    }
                }
            }
            BaseType::Relationship => {}
        }

        if obj.base_type == BaseType::Document {
            actions.insert(CanGetAllVersions);
            if obj.content.is_some() {
                actions.insert(CanGetContentStream);
            }
            if mutable && def.content_stream_allowed != ContentStreamAllowed::NotAllowed {
                actions.insert(CanSetContentStream);
                if obj.content.is_some()
                    && def.content_stream_allowed != ContentStreamAllowed::Required
                {
                    actions.insert(CanDeleteContentStream);
                }
            }
            if let Some(series) = self.series_of(obj) {
                if series.pwc() == Some(&obj.id) {
                    actions.insert(CanCancelCheckOut);
                    actions.insert(CanCheckIn);
                } else if def.versionable
                    && !series.is_checked_out()
                    && series.current() == Some(&obj.id)
                {
                    actions.insert(CanCheckOut);
                }
            }
        }
        actions
    }

    // ── Deletion ──

    /// Why `obj` cannot be deleted by itself, if it cannot
    pub(crate) fn delete_blocker(&self, obj: &StoredObject) -> Option<CmisError> {
        match obj.base_type {
            BaseType::Folder if obj.id == self.root_id => {
                Some(CmisError::constraint("The root folder cannot be deleted"))
            }
            BaseType::Folder if !self.children_of(&obj.id).is_empty() => Some(
                CmisError::constraint(format!("Folder {} is not empty", obj.id)),
            ),
            BaseType::Policy => {
                let target = self
                    .objects
                    .values()
                    .find(|o| o.policies.contains(&obj.id))?;
                Some(CmisError::constraint(format!(
                    "Policy {} is applied to {}",
                    obj.id, target.id
                )))
            }
            BaseType::Document => {
                let series = self.series_of(obj)?;
                if series.is_checked_out() && series.pwc() != Some(&obj.id) {
                    Some(CmisError::conflict(
                        &obj.id,
                        "version series is checked out",
                    ))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Why a whole fileable cannot be deleted, if it cannot
    pub(crate) fn fileable_delete_blocker(&self, f: &Fileable) -> Option<CmisError> {
        match f {
            Fileable::Series(_) => None,
            Fileable::Object(id) => self.objects.get(id).and_then(|o| self.delete_blocker(o)),
        }
    }

    /// Remove one object record and every relationship naming it, logging
    /// each deletion. Filing and series bookkeeping is the caller's job.
    pub(crate) fn purge_object(&mut self, id: &ObjectId) {
        let mut pending = vec![id.clone()];
        let mut seen = HashSet::new();
        while let Some(next) = pending.pop() {
            if !seen.insert(next.clone()) {
                continue;
            }
            pending.extend(self.relationship_ids(&next, RelationshipDirection::Either));
            if self.objects.remove(&next).is_some() {
                self.children.remove(&next);
                let token = self.mint_token();
                self.record(&next, ChangeType::Deleted, token);
                tracing::debug!("Purged object {}", next);
            }
        }
    }

    /// Remove a whole version series, PWC included, and its filings.
    pub(crate) fn purge_series(&mut self, series_id: &VersionSeriesId) {
        let Some(series) = self.series.remove(series_id) else {
            return;
        };
        self.unfile_everywhere(&Fileable::Series(series_id.clone()));
        let mut ids = series.versions.clone();
        if let Some(pwc) = series.pwc() {
            ids.push(pwc.clone());
        }
        for id in ids.iter().rev() {
            self.purge_object(id);
        }
    }

    /// Remove a fileable: a series with all its versions, or one object.
    pub(crate) fn purge_fileable(&mut self, f: &Fileable) {
        match f {
            Fileable::Series(s) => self.purge_series(s),
            Fileable::Object(id) => {
                self.unfile_everywhere(f);
                self.purge_object(id);
            }
        }
    }

    /// Effective propagation for an ACL change under the configured support
    pub(crate) fn resolve_propagation(&self, requested: AclPropagation) -> Result<bool> {
        use crate::config::AclPropagationSupport as Support;
        match (requested, self.config.capabilities.acl_propagation) {
            (AclPropagation::ObjectOnly, _) => Ok(false),
            (AclPropagation::Propagate, Support::ObjectOnly) => Err(CmisError::constraint(
                "Repository only supports object-only ACL propagation",
            )),
            (AclPropagation::Propagate, _) => Ok(true),
            (AclPropagation::RepositoryDetermined, Support::ObjectOnly) => Ok(false),
            (AclPropagation::RepositoryDetermined, _) => Ok(true),
        }
    }
}

fn parse_label(label: &str) -> (u32, u32) {
    label
        .split_once('.')
        .and_then(|(a, b)| Some((a.parse().ok()?, b.parse().ok()?)))
        .unwrap_or((0, 0))
}
