//! Object property sets
//!
//! Maps property ids to typed values, plus the update form used by
//! `update_properties` and check-in.

use crate::value::{PropertyValue, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Property set of one object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties {
    values: BTreeMap<String, Value>,
}

impl Properties {
    /// Property set with no values
    pub fn new() -> Self {
        Self::default()
    }

    /// Creation properties carrying the type id and name
    pub fn typed(type_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new()
            .with(cmis_props::OBJECT_TYPE_ID, Value::id(type_id))
            .with(cmis_props::NAME, Value::string(name))
    }

    /// Builder-style insert
    pub fn with(mut self, id: impl Into<String>, value: Value) -> Self {
        self.values.insert(id.into(), value);
        self
    }

    /// Typed value stored under a property id such as `cmis:name`
    pub fn get(&self, id: &str) -> Option<&Value> {
        self.values.get(id)
    }

    /// Replace the whole value of a property, single or multi-valued
    pub fn set(&mut self, id: impl Into<String>, value: Value) {
        self.values.insert(id.into(), value);
    }

    /// Drop a property, returning its last value
    pub fn remove(&mut self, id: &str) -> Option<Value> {
        self.values.remove(id)
    }

    /// Whether a value is present for the id
    pub fn contains(&self, id: &str) -> bool {
        self.values.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Textual value of a single-valued string/id/uri/html property
    pub fn get_str(&self, id: &str) -> Option<&str> {
        self.get(id)?.as_single()?.as_str()
    }

    /// All textual values of a (usually multi-valued) property
    pub fn get_strs(&self, id: &str) -> Vec<&str> {
        self.get(id)
            .map(|v| v.values().filter_map(PropertyValue::as_str).collect())
            .unwrap_or_default()
    }

    /// Keep only the listed property ids
    pub(crate) fn retain_ids(&mut self, ids: &[String]) {
        self.values.retain(|k, _| ids.iter().any(|id| id == k));
    }
}

impl FromIterator<(String, Value)> for Properties {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// A change to one property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyUpdate {
    /// Replace the value (multi-valued properties are replaced wholesale)
    Set(Value),
    /// Remove the property
    Unset,
}

/// Set of property changes; omitted ids are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyUpdates {
    changes: BTreeMap<String, PropertyUpdate>,
}

impl PropertyUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, id: impl Into<String>, value: Value) -> Self {
        self.changes.insert(id.into(), PropertyUpdate::Set(value));
        self
    }

    pub fn unset(mut self, id: impl Into<String>) -> Self {
        self.changes.insert(id.into(), PropertyUpdate::Unset);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyUpdate)> {
        self.changes.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Apply to a property set; validation has already happened.
    pub(crate) fn apply_to(&self, props: &mut Properties) {
        for (id, change) in &self.changes {
            match change {
                PropertyUpdate::Set(v) => props.set(id.clone(), v.clone()),
                PropertyUpdate::Unset => {
                    props.remove(id);
                }
            }
        }
    }
}

/// Standard system property ids
pub mod cmis_props {
    pub const OBJECT_ID: &str = "cmis:objectId";
    pub const OBJECT_TYPE_ID: &str = "cmis:objectTypeId";
    pub const BASE_TYPE_ID: &str = "cmis:baseTypeId";
    pub const NAME: &str = "cmis:name";
    pub const CREATION_DATE: &str = "cmis:creationDate";
    pub const LAST_MODIFICATION_DATE: &str = "cmis:lastModificationDate";
    pub const CHANGE_TOKEN: &str = "cmis:changeToken";

    // Document
    pub const IS_IMMUTABLE: &str = "cmis:isImmutable";
    pub const IS_LATEST_VERSION: &str = "cmis:isLatestVersion";
    pub const IS_MAJOR_VERSION: &str = "cmis:isMajorVersion";
    pub const IS_LATEST_MAJOR_VERSION: &str = "cmis:isLatestMajorVersion";
    pub const VERSION_LABEL: &str = "cmis:versionLabel";
    pub const VERSION_SERIES_ID: &str = "cmis:versionSeriesId";
    pub const IS_VERSION_SERIES_CHECKED_OUT: &str = "cmis:isVersionSeriesCheckedOut";
    pub const VERSION_SERIES_CHECKED_OUT_ID: &str = "cmis:versionSeriesCheckedOutId";
    pub const CHECKIN_COMMENT: &str = "cmis:checkinComment";
    pub const CONTENT_STREAM_LENGTH: &str = "cmis:contentStreamLength";
    pub const CONTENT_STREAM_MIME_TYPE: &str = "cmis:contentStreamMimeType";
    pub const CONTENT_STREAM_FILE_NAME: &str = "cmis:contentStreamFileName";

    // Folder
    pub const PARENT_ID: &str = "cmis:parentId";
    pub const PATH: &str = "cmis:path";
    pub const ALLOWED_CHILD_OBJECT_TYPE_IDS: &str = "cmis:allowedChildObjectTypeIds";

    // Relationship
    pub const SOURCE_ID: &str = "cmis:sourceId";
    pub const TARGET_ID: &str = "cmis:targetId";

    // Policy
    pub const POLICY_TEXT: &str = "cmis:policyText";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_properties_basic_operations() {
        let mut props = Properties::new();
        assert!(props.get("title").is_none());

        props.set("title", Value::string("hello"));
        assert_eq!(props.get_str("title"), Some("hello"));
        assert!(props.contains("title"));

        let removed = props.remove("title");
        assert_eq!(removed, Some(Value::string("hello")));
        assert!(props.is_empty());
    }

    #[test]
    fn test_get_strs_on_multi() {
        let props = Properties::new().with("tags", Value::ids(["a", "b"]));
        assert_eq!(props.get_strs("tags"), vec!["a", "b"]);
        assert!(props.get_strs("missing").is_empty());
    }

    #[test]
    fn test_updates_apply_set_and_unset() {
        let mut props = Properties::new()
            .with("keep", Value::string("k"))
            .with("drop", Value::string("d"))
            .with("tags", Value::ids(["a", "b", "c"]));

        PropertyUpdates::new()
            .unset("drop")
            .set("tags", Value::ids(["z"]))
            .apply_to(&mut props);

        assert_eq!(props.get_str("keep"), Some("k"));
        assert!(!props.contains("drop"));
        assert_eq!(props.get_strs("tags"), vec!["z"]);
    }
}
