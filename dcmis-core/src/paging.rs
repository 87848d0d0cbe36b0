//! Paging, trees and result projection
//!
//! `Paging` and `ListPage` carry the skip/max contract of list operations,
//! `Tree` carries descendant results, and `Inclusion` says which optional
//! parts of an entry a caller wants materialized.

use crate::error::{CmisError, Result};
use serde::{Deserialize, Serialize};

/// Paging request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Paging {
    /// Maximum items per page; 0 means the repository default
    pub max_items: usize,
    /// Number of leading items to skip
    pub skip_count: usize,
}

impl Paging {
    pub fn new(max_items: usize, skip_count: usize) -> Self {
        Self {
            max_items,
            skip_count,
        }
    }

    /// Paging for the page that follows `page`
    pub fn next<T>(&self, page: &ListPage<T>) -> Self {
        Self {
            max_items: self.max_items,
            skip_count: self.skip_count + page.items.len(),
        }
    }
}

/// One page of an ordered result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListPage<T> {
    pub items: Vec<T>,
    pub has_more_items: bool,
    /// Total number of items across all pages, when known
    pub num_items: Option<usize>,
}

impl<T> ListPage<T> {
    /// Cut one page out of a fully materialized, already ordered result.
    pub fn paginate(all: Vec<T>, paging: &Paging, default_max_items: usize) -> Self {
        let total = all.len();
        let skip = paging.skip_count.min(total);
        let max = if paging.max_items == 0 {
            default_max_items.max(1)
        } else {
            paging.max_items
        };
        let items: Vec<T> = all.into_iter().skip(skip).take(max).collect();
        let has_more_items = skip + items.len() < total;
        Self {
            items,
            has_more_items,
            num_items: Some(total),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T> IntoIterator for ListPage<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// A node value with ordered children
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree<T> {
    pub value: T,
    pub children: Vec<Tree<T>>,
}

impl<T> Tree<T> {
    pub fn leaf(value: T) -> Self {
        Self {
            value,
            children: Vec::new(),
        }
    }

    /// Number of nodes in this tree
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(Tree::size).sum::<usize>()
    }

    /// Number of levels in this tree (a leaf has depth 1)
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(Tree::depth).max().unwrap_or(0)
    }

    /// Pre-order walk over the node values
    pub fn values(&self) -> Vec<&T> {
        let mut out = Vec::with_capacity(self.size());
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(&node.value);
            for child in node.children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }
}

/// Which relationships to attach to returned entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipDirection {
    Source,
    Target,
    Either,
}

/// Rendition filter meaning "no renditions"
pub const RENDITION_FILTER_NONE: &str = "cmis:none";

/// Projection descriptor for returned entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inclusion {
    /// Comma-separated property ids, `*` or `None` for all
    pub properties: Option<String>,
    /// `*`, `cmis:none`, or comma-separated kinds / mime types
    pub renditions: Option<String>,
    pub relationships: Option<RelationshipDirection>,
    pub allowable_actions: bool,
    pub policies: bool,
    pub acls: bool,
}

impl Inclusion {
    /// All properties and nothing else
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything the repository can attach
    pub fn all() -> Self {
        Self {
            properties: None,
            renditions: None,
            relationships: Some(RelationshipDirection::Either),
            allowable_actions: true,
            policies: true,
            acls: true,
        }
    }

    pub fn with_properties(mut self, filter: impl Into<String>) -> Self {
        self.properties = Some(filter.into());
        self
    }

    pub fn with_renditions(mut self, filter: impl Into<String>) -> Self {
        self.renditions = Some(filter.into());
        self
    }

    pub fn with_relationships(mut self, direction: RelationshipDirection) -> Self {
        self.relationships = Some(direction);
        self
    }

    pub fn with_allowable_actions(mut self) -> Self {
        self.allowable_actions = true;
        self
    }

    pub fn with_policies(mut self) -> Self {
        self.policies = true;
        self
    }

    pub fn with_acls(mut self) -> Self {
        self.acls = true;
        self
    }

    /// Validate both filters and return the parsed property filter.
    pub fn property_filter(&self) -> Result<PropertyFilter> {
        if let Some(r) = &self.renditions {
            validate_rendition_filter(r)?;
        }
        PropertyFilter::parse(self.properties.as_deref())
    }
}

/// Parsed property filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyFilter {
    All,
    Only(Vec<String>),
}

impl PropertyFilter {
    pub fn parse(filter: Option<&str>) -> Result<Self> {
        let filter = match filter.map(str::trim) {
            None | Some("*") => return Ok(PropertyFilter::All),
            Some(f) => f,
        };
        let mut ids = Vec::new();
        for token in filter.split(',') {
            let token = token.trim();
            if token.is_empty() || token == "*" || !token.chars().all(is_filter_char) {
                return Err(CmisError::FilterNotValid(format!(
                    "bad property filter: {}",
                    filter
                )));
            }
            ids.push(token.to_string());
        }
        Ok(PropertyFilter::Only(ids))
    }

    pub fn includes(&self, id: &str) -> bool {
        match self {
            PropertyFilter::All => true,
            PropertyFilter::Only(ids) => ids.iter().any(|i| i == id),
        }
    }
}

fn is_filter_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, ':' | '_' | '.' | '-')
}

fn validate_rendition_filter(filter: &str) -> Result<()> {
    let filter = filter.trim();
    if filter == "*" || filter == RENDITION_FILTER_NONE {
        return Ok(());
    }
    for token in filter.split(',') {
        let token = token.trim();
        let valid = match token.split_once('/') {
            // mime type, subtype may be `*`
            Some((ty, sub)) => {
                !ty.is_empty()
                    && !sub.is_empty()
                    && ty.chars().all(is_filter_char)
                    && (sub == "*" || sub.chars().all(|c| is_filter_char(c) || c == '+'))
            }
            // rendition kind
            None => !token.is_empty() && token.chars().all(is_filter_char),
        };
        if !valid {
            return Err(CmisError::FilterNotValid(format!(
                "bad rendition filter: {}",
                filter
            )));
        }
    }
    Ok(())
}
