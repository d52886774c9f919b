//! Paginated entity listing with a per-handler cache.
//!
//! List endpoints answer either with a bare array or with a page object
//! carrying the records under the entity key and a `_links.next` link. The
//! cache keeps the complete list for the link it was fetched from until it
//! is invalidated, and never stores a partial list.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::api::Transport;
use crate::config::{API_LINK_PREFIX, PAGE_SIZE_HINT};

/// Kinds of entities listed through pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Projects,
    Suites,
    Sections,
    Cases,
    Tests,
    CaseFields,
}

impl EntityKind {
    /// Key holding the records in a page object.
    pub fn key(self) -> &'static str {
        match self {
            EntityKind::Projects => "projects",
            EntityKind::Suites => "suites",
            EntityKind::Sections => "sections",
            EntityKind::Cases => "cases",
            EntityKind::Tests => "tests",
            EntityKind::CaseFields => "case_fields",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Listing entities failed.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct EntityError {
    pub kind: EntityKind,
    pub message: String,
}

impl EntityError {
    fn new(kind: EntityKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Fetch every record of `kind` starting at `link`, following pagination.
///
/// A `next` link that was already fetched is an error.
pub async fn fetch_all(
    transport: &dyn Transport,
    kind: EntityKind,
    link: &str,
) -> Result<Vec<Value>, EntityError> {
    let mut entities = Vec::new();
    let mut visited = HashSet::new();
    let mut next = Some(link.to_string());

    while let Some(link) = next.take() {
        if !visited.insert(link.clone()) {
            return Err(EntityError::new(
                kind,
                format!("Pagination of {kind} loops back to '{link}'"),
            ));
        }
        let response = transport.get(&link).await;
        let body = response
            .into_result()
            .map_err(|e| EntityError::new(kind, e.to_string()))?;

        match body {
            Value::Array(items) => {
                entities.extend(items);
            }
            Value::Object(mut page) => {
                match page.remove(kind.key()) {
                    Some(Value::Array(items)) => entities.extend(items),
                    _ => {
                        return Err(EntityError::new(
                            kind,
                            format!("Response for {kind} has no `{}` list", kind.key()),
                        ))
                    }
                }
                next = page
                    .get("_links")
                    .and_then(|links| links.get("next"))
                    .and_then(Value::as_str)
                    .filter(|n| !n.is_empty())
                    .map(normalize_next_link);
            }
            other => {
                return Err(EntityError::new(
                    kind,
                    format!("Unexpected response for {kind}: {other}"),
                ))
            }
        }
    }

    debug!(kind = %kind, count = entities.len(), "fetched entities");
    Ok(entities)
}

/// Make a pagination link usable as a relative request URI.
///
/// `limit=0` becomes the page size hint and the API prefix is stripped.
pub fn normalize_next_link(link: &str) -> String {
    let link = link.replace("limit=0", &format!("limit={PAGE_SIZE_HINT}"));
    match link.strip_prefix(API_LINK_PREFIX) {
        Some(stripped) => stripped.to_string(),
        None => link,
    }
}

struct Cached<T> {
    link: String,
    items: Arc<Vec<T>>,
}

/// Complete list of one entity kind, fetched on first use.
pub struct EntityCache<T> {
    kind: EntityKind,
    state: Mutex<Option<Cached<T>>>,
}

impl<T: DeserializeOwned + Send + Sync> EntityCache<T> {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            state: Mutex::new(None),
        }
    }

    /// Records for `link`, fetched once and then served from the cache.
    ///
    /// A request for a different link replaces the cached list. On error
    /// the cache is left empty.
    pub async fn entities(
        &self,
        transport: &dyn Transport,
        link: &str,
    ) -> Result<Arc<Vec<T>>, EntityError> {
        let mut state = self.state.lock().await;
        if let Some(cached) = state.as_ref() {
            if cached.link == link {
                return Ok(Arc::clone(&cached.items));
            }
        }
        *state = None;

        let raw = fetch_all(transport, self.kind, link).await?;
        let items = raw
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()
            .map_err(|e| EntityError::new(self.kind, format!("Invalid {} record: {e}", self.kind)))?;
        let items = Arc::new(items);

        *state = Some(Cached {
            link: link.to_string(),
            items: Arc::clone(&items),
        });
        Ok(items)
    }

    /// Drop the cached list so the next call fetches again.
    pub async fn invalidate(&self) {
        *self.state.lock().await = None;
    }
}
