//! ACL and policy engine
//!
//! Applies ACEs to objects and computes the effective ACL, including ACEs
//! inherited from ancestor folders that were applied with propagation.
//! Permission evaluation against a principal is left to the caller.

use crate::changelog::ChangeType;
use crate::error::{CmisError, Result};
use crate::object::{ChangeToken, ObjectEntry, ObjectId};
use crate::paging::Inclusion;
use crate::repository::Repository;
use crate::state::{RepositoryState, StoredAce, StoredObject};
use crate::types::BaseType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::str::FromStr;

pub const PERMISSION_READ: &str = "cmis:read";
pub const PERMISSION_WRITE: &str = "cmis:write";
pub const PERMISSION_ALL: &str = "cmis:all";

/// Permissions every repository understands
pub const BASIC_PERMISSIONS: [&str; 3] = [PERMISSION_READ, PERMISSION_WRITE, PERMISSION_ALL];

/// Access control entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ace {
    pub principal: String,
    pub permissions: BTreeSet<String>,
    /// False when inherited from an ancestor folder
    pub direct: bool,
}

impl Ace {
    pub fn new<I, S>(principal: impl Into<String>, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            principal: principal.into(),
            permissions: permissions.into_iter().map(Into::into).collect(),
            direct: true,
        }
    }
}

/// Access control list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    pub aces: Vec<Ace>,
    /// True when the list fully describes the effective permissions
    pub exact: bool,
}

impl Acl {
    /// Direct and inherited permissions of one principal
    pub fn permissions_of(&self, principal: &str) -> BTreeSet<&str> {
        self.aces
            .iter()
            .filter(|a| a.principal == principal)
            .flat_map(|a| a.permissions.iter().map(String::as_str))
            .collect()
    }

    pub fn direct_aces(&self) -> impl Iterator<Item = &Ace> {
        self.aces.iter().filter(|a| a.direct)
    }
}

/// How an ACL change reaches descendants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AclPropagation {
    ObjectOnly,
    Propagate,
    RepositoryDetermined,
}

impl FromStr for AclPropagation {
    type Err = CmisError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "objectonly" | "object-only" => Ok(Self::ObjectOnly),
            "propagate" => Ok(Self::Propagate),
            "repositorydetermined" | "repository-determined" => Ok(Self::RepositoryDetermined),
            other => Err(CmisError::constraint(format!(
                "Unrecognized ACL propagation: {}",
                other
            ))),
        }
    }
}

/// Outcome of `apply_acl`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclResult {
    pub acl: Acl,
    pub change_token: ChangeToken,
}

// ── Effective ACL ──────────────────────────────────────────────────────────

impl RepositoryState {
    /// Folders whose propagating ACEs reach `obj`, nearest first
    fn acl_ancestors(&self, obj: &StoredObject) -> Vec<ObjectId> {
        let mut start: Vec<ObjectId> = match obj.base_type {
            BaseType::Folder => self.folder_parent(&obj.id).cloned().into_iter().collect(),
            BaseType::Relationship => Vec::new(),
            BaseType::Document | BaseType::Policy => self
                .fileable_of(obj)
                .map(|f| self.parents_of(&f).to_vec())
                .unwrap_or_default(),
        };
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        while !start.is_empty() {
            let mut next = Vec::new();
            for id in start {
                if seen.insert(id.clone()) {
                    if let Some(parent) = self.folder_parent(&id) {
                        next.push(parent.clone());
                    }
                    out.push(id);
                }
            }
            start = next;
        }
        out
    }

    /// Direct ACEs followed by inherited ones, merged per principal.
    pub(crate) fn effective_acl(&self, obj: &StoredObject, only_basic: bool) -> Acl {
        let mut direct: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
        for ace in &obj.aces {
            direct
                .entry(ace.principal.as_str())
                .or_default()
                .extend(ace.permissions.iter().cloned());
        }

        let mut inherited: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
        for folder in self.acl_ancestors(obj) {
            let Some(folder) = self.objects.get(&folder) else {
                continue;
            };
            for ace in folder.aces.iter().filter(|a| a.propagate) {
                inherited
                    .entry(ace.principal.as_str())
                    .or_default()
                    .extend(ace.permissions.iter().cloned());
            }
        }

        let mut exact = true;
        let mut aces = Vec::new();
        for (map, is_direct) in [(direct, true), (inherited, false)] {
            for (principal, mut permissions) in map {
                if only_basic {
                    let before = permissions.len();
                    permissions.retain(|p| BASIC_PERMISSIONS.contains(&p.as_str()));
                    if permissions.len() != before {
                        exact = false;
                    }
                }
                if permissions.is_empty() {
                    continue;
                }
                aces.push(Ace {
                    principal: principal.to_string(),
                    permissions,
                    direct: is_direct,
                });
            }
        }
        Acl { aces, exact }
    }

    pub(crate) fn check_permissions(&self, aces: &[Ace]) -> Result<()> {
        for ace in aces {
            if ace.principal.trim().is_empty() {
                return Err(CmisError::constraint("ACE principal cannot be empty"));
            }
            for p in &ace.permissions {
                let known = BASIC_PERMISSIONS.contains(&p.as_str())
                    || self.config.extra_permissions.iter().any(|e| e == p);
                if !known {
                    return Err(CmisError::constraint(format!(
                        "Permission {} is not supported for {}",
                        p, ace.principal
                    )));
                }
            }
        }
        Ok(())
    }

    /// Validate an ACL change without applying it; returns the propagate flag.
    pub(crate) fn check_acl_change(
        &self,
        obj: &StoredObject,
        add: &[Ace],
        remove: &[Ace],
        propagation: AclPropagation,
    ) -> Result<bool> {
        if !self.type_of(obj)?.controllable_acl {
            return Err(CmisError::constraint(format!(
                "Type {} is not ACL-controllable",
                obj.type_id
            )));
        }
        let propagate = self.resolve_propagation(propagation)?;
        self.check_permissions(add)?;
        self.check_permissions(remove)?;
        Ok(propagate)
    }

    /// Apply a validated ACL change to the stored ACEs.
    pub(crate) fn apply_aces(
        &mut self,
        id: &ObjectId,
        add: &[Ace],
        remove: &[Ace],
        propagate: bool,
    ) -> Result<()> {
        let obj = self.object_mut(id)?;
        for ace in remove {
            for stored in obj.aces.iter_mut().filter(|s| s.principal == ace.principal) {
                stored.permissions.retain(|p| !ace.permissions.contains(p));
            }
        }
        obj.aces.retain(|s| !s.permissions.is_empty());
        for ace in add {
            match obj
                .aces
                .iter_mut()
                .find(|s| s.principal == ace.principal && s.propagate == propagate)
            {
                Some(stored) => stored.permissions.extend(ace.permissions.iter().cloned()),
                None => obj.aces.push(StoredAce {
                    principal: ace.principal.clone(),
                    permissions: ace.permissions.clone(),
                    propagate,
                }),
            }
        }
        Ok(())
    }

    /// Check that `policy_id` names a policy that may be applied to `obj`.
    pub(crate) fn check_policy_target(
        &self,
        obj: &StoredObject,
        policy_id: &ObjectId,
    ) -> Result<()> {
        if !self.type_of(obj)?.controllable_policy {
            return Err(CmisError::constraint(format!(
                "Type {} is not policy-controllable",
                obj.type_id
            )));
        }
        let policy = self.object(policy_id)?;
        if policy.base_type != BaseType::Policy {
            return Err(CmisError::invalid(format!("{} is not a policy", policy_id)));
        }
        Ok(())
    }
}

// ── Repository operations ──────────────────────────────────────────────────

impl Repository {
    /// Effective ACL of an object. With `only_basic`, repository-specific
    /// permissions are dropped and `exact` reports whether anything was.
    pub async fn get_acl(&self, object_id: &ObjectId, only_basic: bool) -> Result<Acl> {
        let state = self.state.read().await;
        let obj = state.object(object_id)?;
        if !state.type_of(obj)?.controllable_acl {
            return Err(CmisError::constraint(format!(
                "Type {} is not ACL-controllable",
                obj.type_id
            )));
        }
        Ok(state.effective_acl(obj, only_basic))
    }

    /// Add and remove direct ACEs on an object.
    pub async fn apply_acl(
        &self,
        object_id: &ObjectId,
        add: &[Ace],
        remove: &[Ace],
        propagation: AclPropagation,
    ) -> Result<AclResult> {
        let mut state = self.state.write().await;
        let obj = state.object(object_id)?;
        let propagate = state.check_acl_change(obj, add, remove, propagation)?;

        state.apply_aces(object_id, add, remove, propagate)?;
        let change_token = state.stamp(object_id, ChangeType::Security);
        let acl = state.effective_acl(state.object(object_id)?, false);
        tracing::info!(
            "Applied ACL to {}: +{} -{} ACEs (propagate: {})",
            object_id,
            add.len(),
            remove.len(),
            propagate
        );
        Ok(AclResult { acl, change_token })
    }

    /// Attach a policy to an object. Applying it twice is a no-op.
    pub async fn apply_policy(
        &self,
        policy_id: &ObjectId,
        object_id: &ObjectId,
    ) -> Result<ChangeToken> {
        let mut state = self.state.write().await;
        let obj = state.object(object_id)?;
        state.check_policy_target(obj, policy_id)?;
        if obj.policies.contains(policy_id) {
            return Ok(obj.change_token);
        }

        state.object_mut(object_id)?.policies.push(policy_id.clone());
        let token = state.stamp(object_id, ChangeType::Security);
        tracing::info!("Applied policy {} to {}", policy_id, object_id);
        Ok(token)
    }

    /// Detach a policy; the policy object itself is kept.
    pub async fn remove_policy(
        &self,
        policy_id: &ObjectId,
        object_id: &ObjectId,
    ) -> Result<ChangeToken> {
        let mut state = self.state.write().await;
        let obj = state.object(object_id)?;
        state.check_policy_target(obj, policy_id)?;
        if !obj.policies.contains(policy_id) {
            return Err(CmisError::constraint(format!(
                "Policy {} is not applied to {}",
                policy_id, object_id
            )));
        }

        state
            .object_mut(object_id)?
            .policies
            .retain(|p| p != policy_id);
        let token = state.stamp(object_id, ChangeType::Security);
        tracing::info!("Removed policy {} from {}", policy_id, object_id);
        Ok(token)
    }

    /// Policies applied to an object, in application order
    pub async fn get_applied_policies(
        &self,
        object_id: &ObjectId,
        inclusion: &Inclusion,
    ) -> Result<Vec<ObjectEntry>> {
        let state = self.state.read().await;
        let obj = state.object(object_id)?;
        if !state.type_of(obj)?.controllable_policy {
            return Err(CmisError::constraint(format!(
                "Type {} is not policy-controllable",
                obj.type_id
            )));
        }
        let ids = obj.policies.clone();
        state.entries(&ids, inclusion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepositoryConfig;
    use crate::error::ErrorKind;
    use crate::properties::Properties;
    use crate::repository::{CreateDocument, CreateFolder, CreatePolicy};

    fn repo() -> Repository {
        Repository::open(RepositoryConfig::default()).unwrap()
    }

    #[test]
    fn test_acl_propagation_parse() {
        assert_eq!("propagate".parse::<AclPropagation>().unwrap(), AclPropagation::Propagate);
        assert_eq!(
            "objectonly".parse::<AclPropagation>().unwrap(),
            AclPropagation::ObjectOnly
        );
        let err = "sideways".parse::<AclPropagation>().unwrap_err();
        assert!(matches!(err, CmisError::ConstraintViolation(_)));
    }

    #[test]
    fn test_acl_permissions_of() {
        let acl = Acl {
            aces: vec![
                Ace::new("alice", [PERMISSION_READ]),
                Ace {
                    principal: "alice".into(),
                    permissions: [PERMISSION_WRITE.to_string()].into(),
                    direct: false,
                },
            ],
            exact: true,
        };
        let perms = acl.permissions_of("alice");
        assert!(perms.contains(PERMISSION_READ));
        assert!(perms.contains(PERMISSION_WRITE));
        assert_eq!(acl.direct_aces().count(), 1);
    }

    #[tokio::test]
    async fn test_propagated_ace_is_inherited() {
        let repo = repo();
        let root = repo.root_folder_id().clone();
        let folder = repo
            .create_folder(CreateFolder::new(Properties::typed("cmis:folder", "f"), &root))
            .await
            .unwrap();
        let doc = repo
            .create_document(
                CreateDocument::new(Properties::typed("cmis:document", "d")).in_folder(&folder),
            )
            .await
            .unwrap();

        let result = repo
            .apply_acl(
                &folder,
                &[Ace::new("team", [PERMISSION_READ])],
                &[],
                AclPropagation::Propagate,
            )
            .await
            .unwrap();
        assert!(result.acl.permissions_of("team").contains(PERMISSION_READ));

        let inherited = repo.get_acl(&doc, false).await.unwrap();
        let ace = inherited.aces.iter().find(|a| a.principal == "team").unwrap();
        assert!(!ace.direct);

        repo.apply_acl(
            &folder,
            &[],
            &[Ace::new("team", [PERMISSION_READ])],
            AclPropagation::ObjectOnly,
        )
        .await
        .unwrap();
        assert!(repo.get_acl(&doc, false).await.unwrap().aces.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_permission_rejected() {
        let repo = repo();
        let root = repo.root_folder_id().clone();
        let err = repo
            .apply_acl(&root, &[Ace::new("bob", ["cmis:fly"])], &[], AclPropagation::ObjectOnly)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    }

    #[tokio::test]
    async fn test_object_only_support_rejects_propagate() {
        let mut config = RepositoryConfig::default();
        config.capabilities.acl_propagation = crate::config::AclPropagationSupport::ObjectOnly;
        let repo = Repository::open(config).unwrap();
        let root = repo.root_folder_id().clone();
        let err = repo
            .apply_acl(&root, &[Ace::new("bob", [PERMISSION_ALL])], &[], AclPropagation::Propagate)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    }

    #[tokio::test]
    async fn test_apply_and_remove_policy() {
        let repo = repo();
        let root = repo.root_folder_id().clone();
        let policy = repo
            .create_policy(CreatePolicy::new(Properties::typed("cmis:policy", "retention")))
            .await
            .unwrap();
        let doc = repo
            .create_document(
                CreateDocument::new(Properties::typed("cmis:document", "d")).in_folder(&root),
            )
            .await
            .unwrap();

        let first = repo.apply_policy(&policy, &doc).await.unwrap();
        let again = repo.apply_policy(&policy, &doc).await.unwrap();
        assert_eq!(first, again);
        let applied = repo.get_applied_policies(&doc, &Inclusion::new()).await.unwrap();
        assert_eq!(applied[0].id, policy);

        let err = repo.delete_object(&policy, true).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);

        repo.remove_policy(&policy, &doc).await.unwrap();
        assert!(repo.get_applied_policies(&doc, &Inclusion::new()).await.unwrap().is_empty());
        let err = repo.remove_policy(&policy, &doc).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
        repo.delete_object(&policy, true).await.unwrap();
    }
}
