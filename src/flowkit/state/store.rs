// SPDX-License-Identifier: MIT

//! The `FlowStateStore` trait and query evaluation shared by its backends

use async_trait::async_trait;

use super::schema::{ExpectedVersion, FlowState, FlowStatePage, FlowStateQuery, Versioned};
use crate::adk::error::StoreError;

/// Keyed persistence for flow execution snapshots.
///
/// ## Contract
///
/// - `save` is an upsert that replaces the previous snapshot wholesale.
/// - `load` returns `Ok(None)` for unknown ids; `Err` is reserved for I/O
///   failure (`Persistence`) and corrupt data (`Deserialization`).
/// - `list` returns states ordered by id ascending, filtered by the query's
///   name and status, paginated by `limit` and an opaque `cursor`.
/// - Each operation is atomic from the caller's point of view: a concurrent
///   `load` never observes a half-written `save`.
///
/// Concurrent `save`s to one id are last-writer-wins. Callers that must not
/// lose updates use `save_if` with the version they last observed.
///
/// The store never validates status transitions; it only checks shape.
#[async_trait]
pub trait FlowStateStore: Send + Sync {
    /// Load the current snapshot for `id` along with its version
    async fn load_versioned(&self, id: &str) -> Result<Option<Versioned<FlowState>>, StoreError>;

    /// Store `state` for `id` if the stored version satisfies `expected`.
    ///
    /// Returns the new version. A failed precondition returns
    /// `StoreError::VersionConflict` and leaves the stored value untouched.
    async fn save_if(
        &self,
        id: &str,
        state: &FlowState,
        expected: ExpectedVersion,
    ) -> Result<u64, StoreError>;

    /// List stored states matching `query`, or all states when `None`
    async fn list(&self, query: Option<&FlowStateQuery>) -> Result<FlowStatePage, StoreError>;

    /// Store `state` as the current snapshot for `id`, overwriting any prior one
    async fn save(&self, id: &str, state: &FlowState) -> Result<(), StoreError> {
        self.save_if(id, state, ExpectedVersion::Any).await?;
        Ok(())
    }

    /// Load the current snapshot for `id`
    async fn load(&self, id: &str) -> Result<Option<FlowState>, StoreError> {
        Ok(self.load_versioned(id).await?.map(|v| v.value))
    }
}

/// Reject a caller-supplied state before anything is written
pub(crate) fn validate_for_save(id: &str, state: &FlowState) -> Result<(), StoreError> {
    if id.is_empty() {
        return Err(StoreError::validation(id, "id must not be empty"));
    }
    if state.id != id {
        return Err(StoreError::validation(
            id,
            format!("state id '{}' does not match key", state.id),
        ));
    }
    state
        .validate()
        .map_err(|reason| StoreError::validation(id, reason))
}

/// Apply filters, ordering and pagination to a full set of states.
///
/// The cursor is the id of the last state on the previous page; the next page
/// starts strictly after it, so deleting or adding states between calls never
/// repeats a state.
pub(crate) fn paginate(
    states: impl IntoIterator<Item = FlowState>,
    query: Option<&FlowStateQuery>,
) -> FlowStatePage {
    let default_query = FlowStateQuery::default();
    let query = query.unwrap_or(&default_query);

    let mut matching: Vec<FlowState> = states
        .into_iter()
        .filter(|s| query.matches(s))
        .filter(|s| match &query.cursor {
            Some(cursor) => s.id.as_str() > cursor.as_str(),
            None => true,
        })
        .collect();
    matching.sort_by(|a, b| a.id.cmp(&b.id));

    let next_cursor = match query.limit {
        Some(limit) if matching.len() > limit => {
            matching.truncate(limit);
            matching.last().map(|s| s.id.clone())
        }
        _ => None,
    };

    FlowStatePage {
        states: matching,
        next_cursor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flowkit::state::FlowStatus;

    fn states(ids: &[(&str, &str)]) -> Vec<FlowState> {
        ids.iter()
            .map(|(id, name)| FlowState::new(*id, *name))
            .collect()
    }

    #[test]
    fn test_paginate_orders_by_id() {
        let page = paginate(states(&[("c", "x"), ("a", "x"), ("b", "x")]), None);
        let ids: Vec<&str> = page.states.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn test_paginate_walks_all_pages() {
        let all = states(&[("a", "x"), ("b", "x"), ("c", "x"), ("d", "x"), ("e", "x")]);
        let mut seen = Vec::new();
        let mut query = FlowStateQuery::new().limit(2);

        loop {
            let page = paginate(all.clone(), Some(&query));
            assert!(page.states.len() <= 2);
            seen.extend(page.states.iter().map(|s| s.id.clone()));
            match page.next_cursor {
                Some(cursor) => query = query.cursor(cursor),
                None => break,
            }
        }

        assert_eq!(seen, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_paginate_exact_limit_has_no_cursor() {
        let page = paginate(
            states(&[("a", "x"), ("b", "x")]),
            Some(&FlowStateQuery::new().limit(2)),
        );
        assert_eq!(page.states.len(), 2);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn test_paginate_filters_before_limit() {
        let mut all = states(&[("a", "jokeFlow"), ("b", "other"), ("c", "jokeFlow")]);
        all[2].status = FlowStatus::Failed;

        let page = paginate(all.clone(), Some(&FlowStateQuery::new().name("jokeFlow").limit(1)));
        assert_eq!(page.states[0].id, "a");
        assert_eq!(page.next_cursor.as_deref(), Some("a"));

        let failed = paginate(all, Some(&FlowStateQuery::new().status(FlowStatus::Failed)));
        assert_eq!(failed.states.len(), 1);
        assert_eq!(failed.states[0].id, "c");
    }

    #[test]
    fn test_validate_for_save() {
        assert!(validate_for_save("f1", &FlowState::new("f1", "jokeFlow")).is_ok());
        assert!(matches!(
            validate_for_save("f1", &FlowState::new("f2", "jokeFlow")),
            Err(StoreError::Validation { .. })
        ));
        assert!(matches!(
            validate_for_save("", &FlowState::new("", "jokeFlow")),
            Err(StoreError::Validation { .. })
        ));
        assert!(matches!(
            validate_for_save("f1", &FlowState::new("f1", "")),
            Err(StoreError::Validation { .. })
        ));
    }
}
