//! Query entry point
//!
//! The repository gathers candidate entries under one snapshot and hands
//! them to an installed [`QueryExecutor`]; evaluating the statement is the
//! executor's business.

use crate::error::{CmisError, Result};
use crate::object::{ObjectEntry, ObjectId};
use crate::paging::{Inclusion, ListPage, Paging};
use crate::repository::Repository;
use crate::types::BaseType;
use async_trait::async_trait;

/// Input handed to a query executor
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub statement: String,
    /// Entries of queryable types, oldest first
    pub candidates: Vec<ObjectEntry>,
    pub search_all_versions: bool,
    pub paging: Paging,
    pub default_max_items: usize,
}

/// Query language implementation
///
/// Implementations must be shareable across tasks.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Evaluate the statement over the candidates and return one page
    async fn execute(&self, request: QueryRequest) -> Result<ListPage<ObjectEntry>>;
}

impl Repository {
    /// Run a query through the installed executor.
    ///
    /// Candidates are the latest checked-in versions of queryable types,
    /// or every version (working copies included) with
    /// `search_all_versions`.
    pub async fn query(
        &self,
        statement: &str,
        search_all_versions: bool,
        inclusion: &Inclusion,
        paging: &Paging,
    ) -> Result<ListPage<ObjectEntry>> {
        let Some(executor) = self.query_executor.clone() else {
            return Err(CmisError::NotSupported("query".to_string()));
        };

        let candidates = {
            let state = self.state.read().await;
            let mut objects: Vec<_> = state
                .objects
                .values()
                .filter(|o| {
                    state
                        .type_of(o)
                        .map(|t| t.queryable)
                        .unwrap_or(false)
                })
                .filter(|o| {
                    if search_all_versions || o.base_type != BaseType::Document {
                        return true;
                    }
                    state
                        .series_of(o)
                        .and_then(|s| s.current())
                        .map(|c| c == &o.id)
                        .unwrap_or(false)
                })
                .collect();
            objects.sort_by_key(|o| o.seq);
            let ids: Vec<ObjectId> = objects.into_iter().map(|o| o.id.clone()).collect();
            state.entries(&ids, inclusion)?
        };

        tracing::debug!(
            "Query over {} candidates: {}",
            candidates.len(),
            statement
        );
        executor
            .execute(QueryRequest {
                statement: statement.to_string(),
                candidates,
                search_all_versions,
                paging: *paging,
                default_max_items: self.config.default_max_items,
            })
            .await
    }
}
