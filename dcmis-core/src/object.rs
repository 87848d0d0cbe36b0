//! Object model
//!
//! Identifiers, change tokens, content stream handles and the
//! materialized [`ObjectEntry`] returned by every read operation.

use crate::acl::Acl;
use crate::error::{CmisError, Result};
use crate::properties::{cmis_props, Properties};
use crate::types::BaseType;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Unique identifier of a stored object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh random id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ObjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of a version series
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionSeriesId(String);

impl VersionSeriesId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionSeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VersionSeriesId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Per-object version stamp, also used to sequence the change log.
///
/// Tokens are minted from one repository-wide counter, so they are unique
/// and strictly increasing across all objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeToken(u64);

impl ChangeToken {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChangeToken {
    type Err = CmisError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u64>()
            .map(ChangeToken)
            .map_err(|_| CmisError::invalid(format!("Malformed change token: {}", s)))
    }
}

/// Opaque content handle; the engine never looks at the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentStream {
    pub data: Bytes,
    pub mime_type: String,
    pub filename: Option<String>,
}

impl ContentStream {
    pub fn new(data: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
            filename: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn length(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn info(&self) -> ContentStreamInfo {
        ContentStreamInfo {
            length: self.length(),
            mime_type: self.mime_type.clone(),
            filename: self.filename.clone(),
        }
    }
}

/// Content stream metadata attached to entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentStreamInfo {
    pub length: u64,
    pub mime_type: String,
    pub filename: Option<String>,
}

/// Versioning state requested at document creation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VersioningState {
    /// Non-versionable documents; treated as `Major` for versionable types
    #[default]
    None,
    CheckedOut,
    Minor,
    Major,
}

/// Version metadata of a document entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub series_id: VersionSeriesId,
    pub label: String,
    pub major: bool,
    pub latest: bool,
    pub latest_major: bool,
    pub private_working_copy: bool,
    pub series_checked_out: bool,
    pub checked_out_id: Option<ObjectId>,
    pub checkin_comment: Option<String>,
}

/// Operations the repository would accept on an object in its current state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AllowableAction {
    CanGetProperties,
    CanUpdateProperties,
    CanDeleteObject,
    CanMoveObject,
    CanGetObjectParents,
    CanGetFolderParent,
    CanGetChildren,
    CanGetDescendants,
    CanGetFolderTree,
    CanCreateDocument,
    CanCreateFolder,
    CanCreateRelationship,
    CanDeleteTree,
    CanAddObjectToFolder,
    CanRemoveObjectFromFolder,
    CanGetContentStream,
    CanSetContentStream,
    CanDeleteContentStream,
    CanCheckOut,
    CanCancelCheckOut,
    CanCheckIn,
    CanGetAllVersions,
    CanGetObjectRelationships,
    CanApplyPolicy,
    CanRemovePolicy,
    CanGetAppliedPolicies,
    CanGetAcl,
    CanApplyAcl,
}

impl AllowableAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllowableAction::CanGetProperties => "canGetProperties",
            AllowableAction::CanUpdateProperties => "canUpdateProperties",
            AllowableAction::CanDeleteObject => "canDeleteObject",
            AllowableAction::CanMoveObject => "canMoveObject",
            AllowableAction::CanGetObjectParents => "canGetObjectParents",
            AllowableAction::CanGetFolderParent => "canGetFolderParent",
            AllowableAction::CanGetChildren => "canGetChildren",
            AllowableAction::CanGetDescendants => "canGetDescendants",
            AllowableAction::CanGetFolderTree => "canGetFolderTree",
            AllowableAction::CanCreateDocument => "canCreateDocument",
            AllowableAction::CanCreateFolder => "canCreateFolder",
            AllowableAction::CanCreateRelationship => "canCreateRelationship",
            AllowableAction::CanDeleteTree => "canDeleteTree",
            AllowableAction::CanAddObjectToFolder => "canAddObjectToFolder",
            AllowableAction::CanRemoveObjectFromFolder => "canRemoveObjectFromFolder",
            AllowableAction::CanGetContentStream => "canGetContentStream",
            AllowableAction::CanSetContentStream => "canSetContentStream",
            AllowableAction::CanDeleteContentStream => "canDeleteContentStream",
            AllowableAction::CanCheckOut => "canCheckOut",
            AllowableAction::CanCancelCheckOut => "canCancelCheckOut",
            AllowableAction::CanCheckIn => "canCheckIn",
            AllowableAction::CanGetAllVersions => "canGetAllVersions",
            AllowableAction::CanGetObjectRelationships => "canGetObjectRelationships",
            AllowableAction::CanApplyPolicy => "canApplyPolicy",
            AllowableAction::CanRemovePolicy => "canRemovePolicy",
            AllowableAction::CanGetAppliedPolicies => "canGetAppliedPolicies",
            AllowableAction::CanGetAcl => "canGetACL",
            AllowableAction::CanApplyAcl => "canApplyACL",
        }
    }
}

impl fmt::Display for AllowableAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A materialized object as returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub id: ObjectId,
    pub type_id: String,
    pub base_type: BaseType,
    pub change_token: ChangeToken,
    pub properties: Properties,
    /// Present on documents
    pub version: Option<VersionInfo>,
    pub content: Option<ContentStreamInfo>,
    pub allowable_actions: Option<BTreeSet<AllowableAction>>,
    pub policy_ids: Option<Vec<ObjectId>>,
    pub acl: Option<Acl>,
    pub relationships: Option<Vec<ObjectEntry>>,
}

impl ObjectEntry {
    pub fn name(&self) -> Option<&str> {
        self.properties.get_str(cmis_props::NAME)
    }

    pub fn is_document(&self) -> bool {
        self.base_type == BaseType::Document
    }

    pub fn is_folder(&self) -> bool {
        self.base_type == BaseType::Folder
    }

    pub fn is_private_working_copy(&self) -> bool {
        self.version
            .as_ref()
            .map(|v| v.private_working_copy)
            .unwrap_or(false)
    }

    pub fn series_id(&self) -> Option<&VersionSeriesId> {
        self.version.as_ref().map(|v| &v.series_id)
    }

    pub fn can(&self, action: AllowableAction) -> bool {
        self.allowable_actions
            .as_ref()
            .map(|a| a.contains(&action))
            .unwrap_or(false)
    }
}
