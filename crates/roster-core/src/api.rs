//! Remote collaborator seams.
//!
//! The core never talks HTTP directly; it consumes these traits. The
//! `transport::http` module (feature `http`) implements them over REST and
//! the simulator implements them in memory.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::bulk::Mutation;
use crate::error::ApiError;
use crate::model::{EmployeeId, Keyed, PoolKind, ReferenceId};
use crate::query::CanonicalQuery;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub count: u64,
    pub total_pages: u32,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub results: Vec<T>,
    pub pagination: PageInfo,
}

/// Server acknowledgement of a mutation, with an optional message to show.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationAck {
    #[serde(default)]
    pub message: Option<String>,
}

/// Fetch one page of a collection.
#[async_trait]
pub trait CollectionSource: Send + Sync + 'static {
    type Row: Keyed + Clone + Send + Sync + 'static;

    async fn fetch_page(&self, query: &CanonicalQuery) -> Result<Page<Self::Row>, ApiError>;
}

/// Fetch a lookup list, scoped to `parent` for dependent pools.
#[async_trait]
pub trait ReferenceSource: Send + Sync {
    async fn fetch_pool(
        &self,
        kind: PoolKind,
        parent: Option<ReferenceId>,
    ) -> Result<Vec<crate::model::ReferenceNode>, ApiError>;
}

/// Issue a single bulk mutation over a set of employees.
#[async_trait]
pub trait MutationSink: Send + Sync {
    async fn apply(
        &self,
        mutation: &Mutation,
        employee_ids: &[EmployeeId],
    ) -> Result<MutationAck, ApiError>;
}
