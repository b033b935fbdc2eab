//! PROPFIND: traverse, filter properties by cost, and assemble a multi-status.

use crate::traversal::{resolve, Traversal};
use davis_core::error::{DavError, DavResult};
use davis_core::{Depth, EntryResponse, MultiStatus, PropStat, PropertyName, ResourcePath};
use davis_store::{EntryRef, Host, ResourceStore};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Retrieval cost `allprop` returns without being asked by name.
const ALLOWED_COST: u32 = 0;

/// One item of a PROPFIND request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "props")]
pub enum PropFindItem {
    AllProp,
    /// Names forced into an `allprop` response regardless of cost.
    Include(Vec<PropertyName>),
    /// Any other body element (`prop`, `propname`, extensions), by local name.
    Other(String),
}

/// Parsed PROPFIND body. A missing body behaves like `allprop`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropFindRequest {
    pub items: Vec<PropFindItem>,
}

impl PropFindRequest {
    pub fn all_prop() -> Self {
        Self {
            items: vec![PropFindItem::AllProp],
        }
    }

    pub fn with_include(mut self, names: Vec<PropertyName>) -> Self {
        self.items.push(PropFindItem::Include(names));
        self
    }

    /// The force-include set of an `allprop` request.
    ///
    /// Only `allprop` (optionally followed by `include`) is supported; any
    /// other leading item is rejected.
    pub fn include_set(&self) -> DavResult<HashSet<PropertyName>> {
        match self.items.first() {
            None | Some(PropFindItem::AllProp) => {}
            Some(PropFindItem::Include(_)) => {
                return Err(DavError::UnsupportedQueryShape(
                    "include without allprop".into(),
                ))
            }
            Some(PropFindItem::Other(kind)) => {
                return Err(DavError::UnsupportedQueryShape(kind.clone()))
            }
        }

        Ok(self
            .items
            .iter()
            .filter_map(|item| match item {
                PropFindItem::Include(names) => Some(names.iter().cloned()),
                _ => None,
            })
            .flatten()
            .collect())
    }
}

pub struct PropFindHandler {
    store: Arc<dyn ResourceStore>,
    host: Arc<dyn Host>,
}

impl PropFindHandler {
    pub fn new(store: Arc<dyn ResourceStore>, host: Arc<dyn Host>) -> Self {
        Self { store, host }
    }

    /// Answers a PROPFIND on `path`.
    ///
    /// `Depth: infinity` is refused before the store is touched. A failure
    /// reading any property aborts the whole query.
    pub async fn handle(
        &self,
        path: &ResourcePath,
        request: Option<&PropFindRequest>,
        depth: Depth,
    ) -> DavResult<MultiStatus> {
        let Some(limit) = depth.limit() else {
            tracing::debug!(path = %path, "refusing PROPFIND with Depth: infinity");
            return Err(DavError::UnsupportedDepth);
        };

        let root = resolve(self.store.as_ref(), path).await?;
        let include = match request {
            Some(request) => request.include_set()?,
            None => HashSet::new(),
        };

        let mut traversal = Traversal::new(root, limit);
        let mut multistatus = MultiStatus::new();
        while let Some(entry) = traversal.next().await? {
            multistatus.push(self.entry_response(&entry, &include).await?);
        }

        tracing::info!(
            path = %path,
            depth = %depth,
            entries = multistatus.len(),
            "PROPFIND complete"
        );
        Ok(multistatus)
    }

    async fn entry_response(
        &self,
        entry: &EntryRef,
        include: &HashSet<PropertyName>,
    ) -> DavResult<EntryResponse> {
        let mut props = Vec::new();
        for property in entry.properties() {
            let Some(readable) = property.as_readable() else {
                continue;
            };
            if property.cost() > ALLOWED_COST && !include.contains(property.name()) {
                continue;
            }
            props.push(readable.get_wire_value().await?);
        }

        Ok(EntryResponse {
            href: self.href(entry.path())?,
            propstat: PropStat::ok(self.host.protocol(), props),
        })
    }

    /// Absolute, escaped reference to `path` under the host's base URL.
    fn href(&self, path: &ResourcePath) -> DavResult<String> {
        // `./` keeps a first segment containing `:` from parsing as a scheme.
        self.host
            .base_url()
            .join(&format!("./{}", path.relative()))
            .map(String::from)
            .map_err(|e| DavError::Internal(format!("cannot build href for {path}: {e}")))
    }
}
