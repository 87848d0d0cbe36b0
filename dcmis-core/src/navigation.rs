//! Filing and navigation
//!
//! Folders form a single-parent tree. Documents are filed by version
//! series and policies by object, each possibly in several folders.
//! Children come back in filing order unless an `orderBy` clause says
//! otherwise; sorting is stable, so equal keys keep filing order.

use crate::changelog::ChangeType;
use crate::error::{CmisError, Result};
use crate::object::{ObjectEntry, ObjectId};
use crate::paging::{Inclusion, ListPage, Paging, PropertyFilter, Tree};
use crate::properties::Properties;
use crate::repository::Repository;
use crate::state::{Fileable, RepositoryState};
use crate::types::{BaseType, TypeRegistry};
use std::cmp::Ordering;

/// One `<property> [ASC|DESC]` term of an orderBy clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SortKey {
    property: String,
    descending: bool,
}

/// Parse a comma-separated orderBy clause. Every property must be
/// orderable in at least one registered type.
pub(crate) fn parse_order_by(clause: Option<&str>, types: &TypeRegistry) -> Result<Vec<SortKey>> {
    let Some(clause) = clause.map(str::trim).filter(|c| !c.is_empty()) else {
        return Ok(Vec::new());
    };
    let mut keys = Vec::new();
    for term in clause.split(',') {
        let mut parts = term.split_whitespace();
        let property = parts
            .next()
            .ok_or_else(|| CmisError::invalid(format!("Empty orderBy term in {:?}", clause)))?;
        let descending = match parts.next() {
            None => false,
            Some(dir) if dir.eq_ignore_ascii_case("asc") => false,
            Some(dir) if dir.eq_ignore_ascii_case("desc") => true,
            Some(dir) => {
                return Err(CmisError::invalid(format!("Unknown sort direction: {}", dir)));
            }
        };
        if parts.next().is_some() {
            return Err(CmisError::invalid(format!("Malformed orderBy term: {:?}", term)));
        }
        let orderable = types.iter().any(|t| {
            t.property_definition(property)
                .map(|d| d.orderable)
                .unwrap_or(false)
        });
        if !orderable {
            return Err(CmisError::invalid(format!(
                "Property {} is not orderable",
                property
            )));
        }
        keys.push(SortKey {
            property: property.to_string(),
            descending,
        });
    }
    Ok(keys)
}

impl RepositoryState {
    /// Stable sort of object ids by their materialized properties;
    /// missing values go last in either direction.
    fn sort_ids(&self, ids: &mut [ObjectId], keys: &[SortKey]) {
        if keys.is_empty() {
            return;
        }
        let mut keyed: Vec<(ObjectId, Properties)> = ids
            .iter()
            .map(|id| {
                let props = self
                    .objects
                    .get(id)
                    .map(|o| self.full_properties(o))
                    .unwrap_or_default();
                (id.clone(), props)
            })
            .collect();
        keyed.sort_by(|(_, a), (_, b)| {
            for key in keys {
                let va = a.get(&key.property).and_then(|v| v.as_single());
                let vb = b.get(&key.property).and_then(|v| v.as_single());
                let ord = match (va, vb) {
                    (Some(x), Some(y)) if key.descending => y.sort_cmp(x),
                    (Some(x), Some(y)) => x.sort_cmp(y),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
        for (slot, (id, _)) in ids.iter_mut().zip(keyed) {
            *slot = id;
        }
    }

    fn descendants(
        &self,
        folder: &ObjectId,
        depth: i32,
        folders_only: bool,
        keys: &[SortKey],
        inclusion: &Inclusion,
        filter: &PropertyFilter,
    ) -> Result<Vec<Tree<ObjectEntry>>> {
        let mut ids = self.child_ids(folder);
        self.sort_ids(&mut ids, keys);
        let mut out = Vec::new();
        for id in ids {
            let is_folder = self.objects.get(&id).map(|o| o.base_type) == Some(BaseType::Folder);
            if folders_only && !is_folder {
                continue;
            }
            let mut node = Tree::leaf(self.entry(&id, inclusion, filter)?);
            if is_folder && (depth == -1 || depth > 1) {
                let next = if depth == -1 { -1 } else { depth - 1 };
                node.children = self.descendants(&id, next, folders_only, keys, inclusion, filter)?;
            }
            out.push(node);
        }
        Ok(out)
    }
}

fn check_depth(depth: i32) -> Result<()> {
    if depth == 0 || depth < -1 {
        return Err(CmisError::invalid(format!(
            "Depth must be -1 or at least 1, got {}",
            depth
        )));
    }
    Ok(())
}

impl Repository {
    /// One page of a folder's direct children.
    pub async fn get_children(
        &self,
        folder_id: &ObjectId,
        inclusion: &Inclusion,
        order_by: Option<&str>,
        paging: &Paging,
    ) -> Result<ListPage<ObjectEntry>> {
        let keys = parse_order_by(order_by, &self.types)?;
        let state = self.state.read().await;
        state.require_folder(folder_id)?;
        let mut ids = state.child_ids(folder_id);
        state.sort_ids(&mut ids, &keys);

        let page = ListPage::paginate(ids, paging, self.config.default_max_items);
        let items = state.entries(&page.items, inclusion)?;
        tracing::debug!(
            "get_children {}: {} items, more: {}",
            folder_id,
            items.len(),
            page.has_more_items
        );
        Ok(ListPage {
            items,
            has_more_items: page.has_more_items,
            num_items: page.num_items,
        })
    }

    /// Every fileable descendant, one tree per direct child.
    pub async fn get_descendants(
        &self,
        folder_id: &ObjectId,
        depth: i32,
        order_by: Option<&str>,
        inclusion: &Inclusion,
    ) -> Result<Vec<Tree<ObjectEntry>>> {
        check_depth(depth)?;
        let keys = parse_order_by(order_by, &self.types)?;
        let filter = inclusion.property_filter()?;
        let state = self.state.read().await;
        state.require_folder(folder_id)?;
        state.descendants(folder_id, depth, false, &keys, inclusion, &filter)
    }

    /// Folder descendants only, one tree per direct subfolder.
    pub async fn get_folder_tree(
        &self,
        folder_id: &ObjectId,
        depth: i32,
        inclusion: &Inclusion,
    ) -> Result<Vec<Tree<ObjectEntry>>> {
        check_depth(depth)?;
        let filter = inclusion.property_filter()?;
        let state = self.state.read().await;
        state.require_folder(folder_id)?;
        state.descendants(folder_id, depth, true, &[], inclusion, &filter)
    }

    pub async fn get_folder_parent(
        &self,
        folder_id: &ObjectId,
        inclusion: &Inclusion,
    ) -> Result<ObjectEntry> {
        let filter = inclusion.property_filter()?;
        let state = self.state.read().await;
        state.require_folder(folder_id)?;
        let parent = state
            .folder_parent(folder_id)
            .ok_or_else(|| CmisError::invalid("The root folder has no parent"))?;
        state.entry(parent, inclusion, &filter)
    }

    /// Folders a non-folder object is filed in, in filing order
    pub async fn get_object_parents(
        &self,
        object_id: &ObjectId,
        inclusion: &Inclusion,
    ) -> Result<Vec<ObjectEntry>> {
        let state = self.state.read().await;
        let obj = state.object(object_id)?;
        if obj.base_type == BaseType::Folder {
            return Err(CmisError::invalid(format!(
                "{} is a folder; use get_folder_parent",
                object_id
            )));
        }
        let f = state
            .fileable_of(obj)
            .ok_or_else(|| CmisError::constraint(format!("{} is not fileable", object_id)))?;
        state.entries(state.parents_of(&f), inclusion)
    }

    /// Private working copies, optionally only those filed in `folder_id`.
    pub async fn get_checked_out_documents(
        &self,
        folder_id: Option<&ObjectId>,
        inclusion: &Inclusion,
        order_by: Option<&str>,
        paging: &Paging,
    ) -> Result<ListPage<ObjectEntry>> {
        let keys = parse_order_by(order_by, &self.types)?;
        let state = self.state.read().await;
        if let Some(folder) = folder_id {
            state.require_folder(folder)?;
        }
        let mut pwcs: Vec<(ObjectId, _)> = state
            .series
            .values()
            .filter(|s| match folder_id {
                Some(folder) => state
                    .parents_of(&Fileable::Series(s.id.clone()))
                    .contains(folder),
                None => true,
            })
            .filter_map(|s| s.pwc())
            .filter_map(|id| state.objects.get(id).map(|o| (id.clone(), o.seq)))
            .collect();
        pwcs.sort_by_key(|(_, seq)| *seq);
        let mut ids: Vec<ObjectId> = pwcs.into_iter().map(|(id, _)| id).collect();
        state.sort_ids(&mut ids, &keys);

        let page = ListPage::paginate(ids, paging, self.config.default_max_items);
        let items = state.entries(&page.items, inclusion)?;
        Ok(ListPage {
            items,
            has_more_items: page.has_more_items,
            num_items: page.num_items,
        })
    }

    /// File an object into one more folder.
    pub async fn add_object_to_folder(
        &self,
        object_id: &ObjectId,
        folder_id: &ObjectId,
    ) -> Result<()> {
        if !self.config.capabilities.multifiling {
            return Err(CmisError::NotSupported("multi-filing".to_string()));
        }
        let mut state = self.state.write().await;
        let obj = state.object(object_id)?;
        if obj.base_type == BaseType::Folder {
            return Err(CmisError::constraint(format!(
                "Folder {} cannot be multi-filed",
                object_id
            )));
        }
        let f = state
            .fileable_of(obj)
            .ok_or_else(|| CmisError::constraint(format!("{} is not fileable", object_id)))?;
        state.require_folder(folder_id)?;
        if state.parents_of(&f).contains(folder_id) {
            return Ok(());
        }
        state.check_child_type(folder_id, &obj.type_id)?;
        let name = obj.name().to_string();
        state.check_name_free(folder_id, &name, Some(&f))?;

        state.file_into(f, folder_id);
        state.stamp(object_id, ChangeType::Updated);
        tracing::debug!("Filed {} into {}", object_id, folder_id);
        Ok(())
    }

    /// Unfile an object from one folder, or from all when `folder_id` is
    /// absent.
    pub async fn remove_object_from_folder(
        &self,
        object_id: &ObjectId,
        folder_id: Option<&ObjectId>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let obj = state.object(object_id)?;
        if obj.base_type == BaseType::Folder {
            return Err(CmisError::constraint(format!(
                "Folder {} cannot be unfiled",
                object_id
            )));
        }
        let base_type = obj.base_type;
        let f = state
            .fileable_of(obj)
            .ok_or_else(|| CmisError::constraint(format!("{} is not fileable", object_id)))?;
        let parents = state.parents_of(&f).to_vec();
        let targets = match folder_id {
            Some(folder) if parents.contains(folder) => vec![folder.clone()],
            Some(folder) => {
                return Err(CmisError::invalid(format!(
                    "{} is not filed in {}",
                    object_id, folder
                )));
            }
            None => parents.clone(),
        };
        let orphaned = parents.len() == targets.len();
        if orphaned && base_type == BaseType::Document && !self.config.capabilities.unfiling {
            return Err(CmisError::constraint(format!(
                "Removing {} from its last folder would leave it unfiled",
                object_id
            )));
        }

        for folder in &targets {
            state.unfile_from(&f, folder);
        }
        state.stamp(object_id, ChangeType::Updated);
        tracing::debug!("Unfiled {} from {} folders", object_id, targets.len());
        Ok(())
    }
}
