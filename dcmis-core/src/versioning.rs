//! Versioning engine
//!
//! A version series is either checked in (one current version) or checked
//! out (a private working copy exists and the current version, if any, is
//! frozen). The state lives on [`VersionSeries`], so a second working copy
//! cannot be represented.

use crate::error::{CmisError, Result};
use crate::object::{ChangeToken, ContentStream, ObjectEntry, ObjectId, VersionSeriesId};
use crate::paging::{Inclusion, PropertyFilter};
use crate::properties::{cmis_props, Properties, PropertyUpdate, PropertyUpdates};
use crate::repository::Repository;
use crate::state::{DocumentVersion, Fileable, RepositoryState, SeriesState, StoredObject};
use crate::types::{BaseType, ContentStreamAllowed};
use serde::{Deserialize, Serialize};

/// Version label carried by private working copies
pub const PWC_LABEL: &str = "pwc";

/// Outcome of `check_out`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutResult {
    pub pwc_id: ObjectId,
    /// Whether the working copy received the source's content stream
    pub content_copied: bool,
}

/// Input of `check_in`
#[derive(Debug, Clone, Default)]
pub struct CheckIn {
    pub major: bool,
    pub properties: PropertyUpdates,
    /// Replaces the working copy's content when present
    pub content: Option<ContentStream>,
    pub comment: Option<String>,
    pub change_token: Option<ChangeToken>,
}

impl CheckIn {
    pub fn major() -> Self {
        Self {
            major: true,
            ..Self::default()
        }
    }

    pub fn minor() -> Self {
        Self::default()
    }

    pub fn with_properties(mut self, properties: PropertyUpdates) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_content(mut self, content: ContentStream) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_change_token(mut self, token: ChangeToken) -> Self {
        self.change_token = Some(token);
        self
    }
}

impl RepositoryState {
    /// Discard a working copy and restore the series' previous state.
    pub(crate) fn cancel_checkout_locked(&mut self, pwc_id: &ObjectId) -> Result<()> {
        if !self.is_pwc(pwc_id) {
            return Err(CmisError::constraint(format!(
                "{} is not a private working copy",
                pwc_id
            )));
        }
        let obj = self.object(pwc_id)?;
        let series = self
            .series_of(obj)
            .ok_or_else(|| CmisError::not_found(pwc_id))?;
        let series_id = series.id.clone();

        match series.state.clone() {
            SeriesState::CheckedOut { current: None, .. } => {
                self.purge_series(&series_id);
                tracing::info!("Cancelled check-out of {}, series {} removed", pwc_id, series_id);
            }
            SeriesState::CheckedOut {
                current: Some(current),
                ..
            } => {
                if let Some(series) = self.series.get_mut(&series_id) {
                    series.state = SeriesState::CheckedIn { current };
                }
                self.purge_object(pwc_id);
                tracing::info!("Cancelled check-out of {}", pwc_id);
            }
            SeriesState::CheckedIn { .. } => {}
        }
        Ok(())
    }

    fn latest_version_id(&self, series_id: &VersionSeriesId, major_only: bool) -> Result<ObjectId> {
        let series = self.require_series(series_id)?;
        let id = if major_only {
            self.latest_major(series).ok_or_else(|| {
                CmisError::not_found(format!("major version of series {}", series_id))
            })?
        } else {
            series
                .representative()
                .ok_or_else(|| CmisError::not_found(format!("version series {}", series_id)))?
        };
        Ok(id.clone())
    }
}

impl Repository {
    /// Check out the current version of a document series.
    pub async fn check_out(&self, document_id: &ObjectId) -> Result<CheckOutResult> {
        let mut state = self.state.write().await;
        let obj = state.object(document_id)?;
        if obj.base_type != BaseType::Document {
            return Err(CmisError::constraint(format!("{} is not a document", document_id)));
        }
        let def = state.type_of(obj)?.clone();
        if !def.versionable {
            return Err(CmisError::constraint(format!("Type {} is not versionable", def.id)));
        }
        let series = state
            .series_of(obj)
            .ok_or_else(|| {
                CmisError::constraint(format!("{} has no version series", document_id))
            })?;
        if series.is_checked_out() {
            return Err(CmisError::conflict(document_id, "version series is already checked out"));
        }
        if series.current() != Some(document_id) {
            return Err(CmisError::Versioning(format!(
                "{} is not the latest version",
                document_id
            )));
        }
        let series_id = series.id.clone();

        let copy = self.config.content_copied_on_checkout
            || def.content_stream_allowed == ContentStreamAllowed::Required;
        let mut pwc = StoredObject::new(ObjectId::generate(), &def, obj.properties.clone());
        pwc.content = if copy { obj.content.clone() } else { None };
        pwc.aces = obj.aces.clone();
        pwc.policies = obj.policies.clone();
        pwc.version = Some(DocumentVersion {
            series: series_id.clone(),
            label: PWC_LABEL.to_string(),
            major: false,
            checkin_comment: None,
        });
        let content_copied = pwc.content.is_some();

        let pwc_id = state.insert_object(pwc);
        if let Some(series) = state.series.get_mut(&series_id) {
            series.state = SeriesState::CheckedOut {
                current: Some(document_id.clone()),
                pwc: pwc_id.clone(),
            };
        }
        tracing::info!("Checked out {} as {}", document_id, pwc_id);
        Ok(CheckOutResult {
            pwc_id,
            content_copied,
        })
    }

    /// Discard a private working copy.
    pub async fn cancel_check_out(&self, pwc_id: &ObjectId) -> Result<()> {
        let mut state = self.state.write().await;
        state.cancel_checkout_locked(pwc_id)
    }

    /// Promote a private working copy to the new current version.
    ///
    /// The new version gets a fresh object id; the working copy id stops
    /// resolving.
    pub async fn check_in(&self, pwc_id: &ObjectId, request: CheckIn) -> Result<ObjectId> {
        let mut state = self.state.write().await;
        if !state.is_pwc(pwc_id) {
            return Err(CmisError::constraint(format!(
                "{} is not a private working copy",
                pwc_id
            )));
        }
        let pwc = state.object(pwc_id)?;
        state.check_token(pwc, request.change_token)?;
        let def = state.type_of(pwc)?.clone();
        def.validate_update(&request.properties, true)?;

        match (def.content_stream_allowed, &request.content) {
            (ContentStreamAllowed::NotAllowed, Some(_)) => {
                return Err(CmisError::StreamNotSupported(format!(
                    "Type {} does not allow content streams",
                    def.id
                )));
            }
            (ContentStreamAllowed::Required, None) if pwc.content.is_none() => {
                return Err(CmisError::constraint(format!(
                    "Type {} requires a content stream",
                    def.id
                )));
            }
            _ => {}
        }

        let series = state
            .series_of(pwc)
            .ok_or_else(|| CmisError::not_found(pwc_id))?;
        let series_id = series.id.clone();
        if let Some((_, PropertyUpdate::Set(value))) = request
            .properties
            .iter()
            .find(|(id, _)| id.as_str() == cmis_props::NAME)
        {
            let name = value.as_single().and_then(|v| v.as_str()).unwrap_or_default();
            RepositoryState::validate_name(name)?;
            let f = Fileable::Series(series_id.clone());
            for parent in state.parents_of(&f) {
                state.check_name_free(parent, name, Some(&f))?;
            }
        }

        let label = state.next_label(series, request.major);
        let mut properties: Properties = pwc.properties.clone();
        request.properties.apply_to(&mut properties);
        let mut version = StoredObject::new(ObjectId::generate(), &def, properties);
        version.content = request.content.or_else(|| pwc.content.clone());
        version.aces = pwc.aces.clone();
        version.policies = pwc.policies.clone();
        version.version = Some(DocumentVersion {
            series: series_id.clone(),
            label: label.clone(),
            major: request.major,
            checkin_comment: request.comment,
        });

        let new_id = state.insert_object(version);
        if let Some(series) = state.series.get_mut(&series_id) {
            series.versions.push(new_id.clone());
            series.state = SeriesState::CheckedIn {
                current: new_id.clone(),
            };
        }
        state.purge_object(pwc_id);
        tracing::info!("Checked in {} as version {} ({})", pwc_id, label, new_id);
        Ok(new_id)
    }

    /// The latest version of a series, or its latest major version.
    ///
    /// A series created checked out has no version yet; its working copy
    /// is returned instead.
    pub async fn get_latest_version(
        &self,
        series_id: &VersionSeriesId,
        major_only: bool,
        inclusion: &Inclusion,
    ) -> Result<ObjectEntry> {
        let filter = inclusion.property_filter()?;
        let state = self.state.read().await;
        let id = state.latest_version_id(series_id, major_only)?;
        state.entry(&id, inclusion, &filter)
    }

    pub async fn get_properties_of_latest_version(
        &self,
        series_id: &VersionSeriesId,
        major_only: bool,
        filter: Option<&str>,
    ) -> Result<Properties> {
        let filter = PropertyFilter::parse(filter)?;
        let state = self.state.read().await;
        let id = state.latest_version_id(series_id, major_only)?;
        Ok(state.entry(&id, &Inclusion::new(), &filter)?.properties)
    }

    /// Every version of a series, working copy included, newest first
    pub async fn get_all_versions(
        &self,
        series_id: &VersionSeriesId,
        inclusion: &Inclusion,
    ) -> Result<Vec<ObjectEntry>> {
        let state = self.state.read().await;
        let series = state.require_series(series_id)?;
        let mut ids: Vec<ObjectId> = series.versions.clone();
        ids.extend(series.pwc().cloned());
        ids.sort_by_key(|id| std::cmp::Reverse(state.objects.get(id).map(|o| o.seq)));
        state.entries(&ids, inclusion)
    }

    /// Delete a series with every version, working copy included.
    ///
    /// A supplied change token must match the series' latest version.
    pub async fn delete_all_versions(
        &self,
        series_id: &VersionSeriesId,
        change_token: Option<ChangeToken>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let series = state.require_series(series_id)?;
        let latest = series
            .representative()
            .cloned()
            .ok_or_else(|| CmisError::not_found(format!("version series {}", series_id)))?;
        let obj = state.object(&latest)?;
        state.check_token(obj, change_token)?;

        state.purge_series(series_id);
        tracing::info!("Deleted all versions of series {}", series_id);
        Ok(())
    }
}
