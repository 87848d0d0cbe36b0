//! Change log
//!
//! Append-only, token-ordered record of every successful mutation. Tokens
//! come from the repository-wide counter that also stamps objects, so a
//! caller can persist the last token it saw and resume from it later.

use crate::error::{CmisError, Result};
use crate::object::{ChangeToken, ObjectId};
use crate::paging::{ListPage, Paging};
use crate::properties::Properties;
use crate::repository::Repository;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Kind of mutation recorded by a change event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Created,
    Updated,
    Deleted,
    Security,
}

/// One change log record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub token: ChangeToken,
    pub object_id: ObjectId,
    pub change_type: ChangeType,
    pub timestamp: DateTime<Utc>,
    /// Property snapshot, only returned when requested
    pub properties: Option<Properties>,
}

/// One page of change events plus the token to resume from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogPage {
    pub events: ListPage<ChangeEvent>,
    /// Token of the last event returned, or the `since` token when the page
    /// is empty
    pub latest_token: Option<ChangeToken>,
}

/// In-memory change log with optional bounded retention
#[derive(Debug)]
pub(crate) struct ChangeLog {
    events: VecDeque<ChangeEvent>,
    /// 0 keeps everything
    capacity: usize,
    /// Token of the newest purged event
    horizon: Option<ChangeToken>,
}

impl ChangeLog {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            capacity,
            horizon: None,
        }
    }

    /// Append an event; tokens must arrive in increasing order.
    pub(crate) fn append(&mut self, event: ChangeEvent) {
        debug_assert!(self.latest_token().map(|t| t < event.token).unwrap_or(true));
        self.events.push_back(event);
        if self.capacity > 0 && self.events.len() > self.capacity {
            let excess = self.events.len() - self.capacity;
            if let Some(last) = self.events.get(excess - 1) {
                let through = last.token;
                let purged = self.cleanup_through(through);
                tracing::warn!(
                    "Change log over capacity, purged {} events through token {}",
                    purged,
                    through
                );
            }
        }
    }

    /// Events with a token greater than `since`, oldest first.
    pub(crate) fn query(
        &self,
        since: Option<ChangeToken>,
        include_properties: bool,
        paging: &Paging,
        default_max_items: usize,
    ) -> Result<ChangeLogPage> {
        if let (Some(since), Some(horizon)) = (since, self.horizon) {
            if since <= horizon {
                return Err(CmisError::constraint(format!(
                    "Change token {} has been purged from the change log (horizon {})",
                    since, horizon
                )));
            }
        }

        let matching: Vec<ChangeEvent> = self
            .events
            .iter()
            .filter(|e| since.map(|s| e.token > s).unwrap_or(true))
            .map(|e| {
                let mut e = e.clone();
                if !include_properties {
                    e.properties = None;
                }
                e
            })
            .collect();

        let events = ListPage::paginate(matching, paging, default_max_items);
        let latest_token = events.items.last().map(|e| e.token).or(since);
        Ok(ChangeLogPage {
            events,
            latest_token,
        })
    }

    /// Token of the newest recorded event
    pub(crate) fn latest_token(&self) -> Option<ChangeToken> {
        self.events.back().map(|e| e.token)
    }

    /// Drop every event with a token at or below `token`.
    pub(crate) fn cleanup_through(&mut self, token: ChangeToken) -> usize {
        let mut removed = 0;
        while self.events.front().map(|e| e.token <= token).unwrap_or(false) {
            self.events.pop_front();
            removed += 1;
        }
        if removed > 0 {
            self.horizon = Some(self.horizon.map_or(token, |h| h.max(token)));
        }
        removed
    }

    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }
}

impl Repository {
    /// Change events after `since` (the whole retained log when absent).
    ///
    /// Fails with ConstraintViolation when `since` falls inside the purged
    /// part of the log.
    pub async fn get_change_log(
        &self,
        since: Option<ChangeToken>,
        include_properties: bool,
        paging: &Paging,
    ) -> Result<ChangeLogPage> {
        let state = self.state.read().await;
        let page = state.change_log.query(
            since,
            include_properties,
            paging,
            self.config.default_max_items,
        )?;
        tracing::debug!(
            "Change log since {:?}: {} events",
            since.map(|t| t.value()),
            page.events.len()
        );
        Ok(page)
    }

    /// Token of the newest change event
    pub async fn latest_change_token(&self) -> Option<ChangeToken> {
        self.state.read().await.change_log.latest_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(token: u64) -> ChangeEvent {
        ChangeEvent {
            token: ChangeToken::new(token),
            object_id: ObjectId::from(format!("obj-{}", token)),
            change_type: ChangeType::Created,
            timestamp: Utc::now(),
            properties: Some(Properties::new()),
        }
    }

    #[test]
    fn test_query_since_and_resume() {
        let mut log = ChangeLog::new(0);
        for t in 1..=5 {
            log.append(event(t));
        }

        let first = log.query(None, false, &Paging::new(2, 0), 100).unwrap();
        assert_eq!(first.events.len(), 2);
        assert!(first.events.has_more_items);
        assert_eq!(first.latest_token, Some(ChangeToken::new(2)));
        assert!(first.events.items[0].properties.is_none());

        let rest = log
            .query(first.latest_token, true, &Paging::default(), 100)
            .unwrap();
        let tokens: Vec<u64> = rest.events.iter().map(|e| e.token.value()).collect();
        assert_eq!(tokens, vec![3, 4, 5]);
        assert!(rest.events.items[0].properties.is_some());
    }

    #[test]
    fn test_empty_page_keeps_since_token() {
        let mut log = ChangeLog::new(0);
        log.append(event(1));
        let page = log
            .query(Some(ChangeToken::new(1)), false, &Paging::default(), 100)
            .unwrap();
        assert!(page.events.is_empty());
        assert!(!page.events.has_more_items);
        assert_eq!(page.latest_token, Some(ChangeToken::new(1)));
    }

    #[test]
    fn test_capacity_purges_and_rejects_stale_since() {
        let mut log = ChangeLog::new(3);
        for t in 1..=5 {
            log.append(event(t));
        }
        assert_eq!(log.len(), 3);

        let err = log
            .query(Some(ChangeToken::new(1)), false, &Paging::default(), 100)
            .unwrap_err();
        assert!(matches!(err, CmisError::ConstraintViolation(_)));

        let ok = log
            .query(Some(ChangeToken::new(3)), false, &Paging::default(), 100)
            .unwrap();
        assert_eq!(ok.events.len(), 2);
    }

    #[test]
    fn test_cleanup_through() {
        let mut log = ChangeLog::new(0);
        for t in 1..=4 {
            log.append(event(t));
        }
        assert_eq!(log.cleanup_through(ChangeToken::new(2)), 2);
        assert_eq!(log.latest_token(), Some(ChangeToken::new(4)));
        assert!(log.query(Some(ChangeToken::new(2)), false, &Paging::default(), 100).is_err());
    }
}
