//! In-memory HR backend implementing every collaborator seam.
//!
//! Enforces the server rule the tag-replace plan exists for: an employee
//! holds at most one tag, and adding a tag to someone already holding a
//! different one is rejected with 409.

use std::cmp::Ordering;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use roster_core::api::{
    CollectionSource, MutationAck, MutationSink, Page, PageInfo, ReferenceSource,
};
use roster_core::bulk::Mutation;
use roster_core::error::ApiError;
use roster_core::model::{Employee, EmployeeId, PoolKind, ReferenceId, ReferenceNode, TagId};
use roster_core::query::CanonicalQuery;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::faults::FaultInjector;
use crate::rng::DeterministicRng;

const FIRST_NAMES: [&str; 8] = ["Aysel", "Bruno", "Chen", "Dara", "Elif", "Farid", "Gita", "Hugo"];
const LAST_NAMES: [&str; 8] = [
    "Aliyev", "Brandt", "Costa", "Dimitrov", "Evans", "Fischer", "Guliyev", "Haddad",
];

/// Tags seeded onto employees; bulk targets are drawn from the same range.
pub const TAG_IDS: [u64; 4] = [1, 2, 3, 4];
pub const BUSINESS_FUNCTIONS: [u64; 3] = [1, 2, 3];

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One mutation call as the backend saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub mutation: Mutation,
    pub employee_ids: Vec<EmployeeId>,
    pub started: Instant,
    pub finished: Instant,
    pub outcome: Result<(), ApiError>,
}

impl MutationRecord {
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self.outcome, Err(ApiError::Rejected { status: 409, .. }))
    }
}

#[derive(Debug, Default)]
struct Store {
    active: Vec<Employee>,
    archived: Vec<Employee>,
}

#[derive(Debug, Default)]
struct CallLog {
    fetches: Vec<CanonicalQuery>,
    pools: Vec<(PoolKind, Option<ReferenceId>)>,
    mutations: Vec<MutationRecord>,
}

pub struct SimBackend {
    store: Mutex<Store>,
    log: Mutex<CallLog>,
    faults: FaultInjector,
}

impl SimBackend {
    /// Seed `count` employees spread across business functions, departments
    /// and tags (some untagged).
    #[must_use]
    pub fn seeded(count: u64, rng: &mut DeterministicRng, faults: FaultInjector) -> Self {
        let active = (1..=count)
            .map(|id| {
                let first = rng.pick(&FIRST_NAMES).copied().unwrap_or("Anon");
                let last = rng.pick(&LAST_NAMES).copied().unwrap_or("Person");
                let bf = rng.between(1, 3);
                let department = bf * 10 + rng.between(1, 2);
                let tag = match rng.next_bounded(TAG_IDS.len() as u64 + 1) {
                    0 => None,
                    n => Some(TagId(n)),
                };
                Employee {
                    id: EmployeeId(id),
                    first_name: first.to_string(),
                    last_name: format!("{last}{id}"),
                    email: format!("{}.{id}@corp.example", first.to_ascii_lowercase()),
                    business_function: Some(ReferenceId(bf)),
                    department: Some(ReferenceId(department)),
                    unit: Some(ReferenceId(department * 10 + rng.between(1, 2))),
                    job_function: None,
                    position_group: None,
                    status: Some(ReferenceId(100)),
                    tag,
                    line_manager: None,
                }
            })
            .collect();
        Self {
            store: Mutex::new(Store {
                active,
                archived: Vec::new(),
            }),
            log: Mutex::new(CallLog::default()),
            faults,
        }
    }

    #[must_use]
    pub const fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    #[must_use]
    pub fn employee(&self, id: EmployeeId) -> Option<Employee> {
        lock(&self.store).active.iter().find(|e| e.id == id).cloned()
    }

    #[must_use]
    pub fn fetches(&self) -> Vec<CanonicalQuery> {
        lock(&self.log).fetches.clone()
    }

    #[must_use]
    pub fn fetch_count(&self) -> usize {
        lock(&self.log).fetches.len()
    }

    #[must_use]
    pub fn pool_calls(&self) -> Vec<(PoolKind, Option<ReferenceId>)> {
        lock(&self.log).pools.clone()
    }

    #[must_use]
    pub fn mutations(&self) -> Vec<MutationRecord> {
        lock(&self.log).mutations.clone()
    }

    /// The page the server would return for `query` right now.
    #[must_use]
    pub fn evaluate(&self, query: &CanonicalQuery) -> Page<Employee> {
        let store = lock(&self.store);
        let needle = query.search().map(str::to_ascii_lowercase);
        let mut rows: Vec<Employee> = store
            .active
            .iter()
            .filter(|e| {
                needle
                    .as_deref()
                    .is_none_or(|n| e.full_name().to_ascii_lowercase().contains(n))
            })
            .filter(|e| {
                query
                    .filters()
                    .iter()
                    .all(|(key, values)| field_matches(e, key, values))
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| compare(a, b, query.ordering()));

        let count = rows.len() as u64;
        let size = u64::from(query.page_size());
        let skip = u64::from(query.page() - 1) * size;
        let results = rows
            .into_iter()
            .skip(usize::try_from(skip).unwrap_or(usize::MAX))
            .take(usize::try_from(size).unwrap_or(usize::MAX))
            .collect();
        Page {
            results,
            pagination: PageInfo {
                count,
                total_pages: u32::try_from(count.div_ceil(size).max(1)).unwrap_or(u32::MAX),
                page: query.page(),
                page_size: query.page_size(),
            },
        }
    }

    fn unavailable(what: &str) -> ApiError {
        ApiError::Rejected {
            status: 503,
            message: format!("{what} temporarily unavailable"),
        }
    }

    fn mutate(&self, mutation: Mutation, ids: &[EmployeeId]) -> Result<(), ApiError> {
        let mut store = lock(&self.store);
        match mutation {
            Mutation::AddTag { tag } => {
                if let Some(holder) = store
                    .active
                    .iter()
                    .find(|e| ids.contains(&e.id) && e.tag.is_some_and(|t| t != tag))
                {
                    return Err(ApiError::Rejected {
                        status: 409,
                        message: format!("employee {} already has a tag", holder.id),
                    });
                }
                for e in store.active.iter_mut().filter(|e| ids.contains(&e.id)) {
                    e.tag = Some(tag);
                }
            }
            Mutation::RemoveTag { tag } => {
                for e in store
                    .active
                    .iter_mut()
                    .filter(|e| ids.contains(&e.id) && e.tag == Some(tag))
                {
                    e.tag = None;
                }
            }
            Mutation::SetStatus { status } => {
                for e in store.active.iter_mut().filter(|e| ids.contains(&e.id)) {
                    e.status = Some(status);
                }
            }
            Mutation::AssignLineManager { manager } => {
                for e in store.active.iter_mut().filter(|e| ids.contains(&e.id)) {
                    e.line_manager = Some(manager);
                }
            }
            Mutation::SoftDelete => {
                let (moved, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut store.active)
                    .into_iter()
                    .partition(|e| ids.contains(&e.id));
                store.active = kept;
                store.archived.extend(moved);
            }
            Mutation::HardDelete => store.archived.retain(|e| !ids.contains(&e.id)),
            Mutation::Restore => {
                let (moved, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut store.archived)
                    .into_iter()
                    .partition(|e| ids.contains(&e.id));
                store.archived = kept;
                store.active.extend(moved);
                store.active.sort_by_key(|e| e.id);
            }
        }
        Ok(())
    }
}

fn field_matches(employee: &Employee, key: &str, values: &[String]) -> bool {
    let actual = match key {
        "tag" => employee.tag.map(|t| t.0),
        "business_function" => employee.business_function.map(|r| r.0),
        "department" => employee.department.map(|r| r.0),
        "unit" => employee.unit.map(|r| r.0),
        "status" => employee.status.map(|r| r.0),
        _ => return true,
    };
    actual.is_some_and(|v| values.iter().any(|s| *s == v.to_string()))
}

fn compare(a: &Employee, b: &Employee, ordering: &[String]) -> Ordering {
    for token in ordering {
        let (field, descending) = token
            .strip_prefix('-')
            .map_or((token.as_str(), false), |f| (f, true));
        let ord = match field {
            "first_name" => a.first_name.cmp(&b.first_name),
            "last_name" => a.last_name.cmp(&b.last_name),
            "email" => a.email.cmp(&b.email),
            "id" => a.id.cmp(&b.id),
            _ => Ordering::Equal,
        };
        let ord = if descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.id.cmp(&b.id)
}

fn node(id: u64, parent: Option<u64>) -> ReferenceNode {
    ReferenceNode {
        id: ReferenceId(id),
        parent_id: parent.map(ReferenceId),
        name: format!("ref-{id}"),
        is_active: id % 7 != 0,
    }
}

#[async_trait]
impl CollectionSource for SimBackend {
    type Row = Employee;

    async fn fetch_page(&self, query: &CanonicalQuery) -> Result<Page<Employee>, ApiError> {
        lock(&self.log).fetches.push(query.clone());
        let fails = self.faults.fetch_fails();
        let latency = self.faults.latency();
        trace!(query = %query.serialized(), ?latency, fails, "page fetch");
        tokio::time::sleep(latency).await;
        if fails {
            return Err(Self::unavailable("employee list"));
        }
        Ok(self.evaluate(query))
    }
}

#[async_trait]
impl ReferenceSource for SimBackend {
    async fn fetch_pool(
        &self,
        kind: PoolKind,
        parent: Option<ReferenceId>,
    ) -> Result<Vec<ReferenceNode>, ApiError> {
        lock(&self.log).pools.push((kind, parent));
        let fails = self.faults.fetch_fails();
        let latency = self.faults.latency();
        trace!(pool = %kind, ?parent, ?latency, fails, "lookup fetch");
        tokio::time::sleep(latency).await;
        if fails {
            return Err(Self::unavailable("lookup"));
        }
        Ok(match (kind, parent) {
            (PoolKind::BusinessFunction, _) => {
                BUSINESS_FUNCTIONS.iter().map(|id| node(*id, None)).collect()
            }
            (PoolKind::Department | PoolKind::Unit, Some(p)) => {
                (1..=2).map(|n| node(p.0 * 10 + n, Some(p.0))).collect()
            }
            (PoolKind::EmployeeTag, None) => TAG_IDS.iter().map(|id| node(*id, None)).collect(),
            (_, None) => (100..=102).map(|id| node(id, None)).collect(),
            _ => Vec::new(),
        })
    }
}

#[async_trait]
impl MutationSink for SimBackend {
    async fn apply(
        &self,
        mutation: &Mutation,
        employee_ids: &[EmployeeId],
    ) -> Result<MutationAck, ApiError> {
        let started = Instant::now();
        let index = lock(&self.log).mutations.len();
        let fails = self.faults.mutation_fails(index);
        tokio::time::sleep(self.faults.latency()).await;

        let outcome = if fails {
            Err(Self::unavailable("mutation service"))
        } else {
            self.mutate(*mutation, employee_ids)
        };
        debug!(%mutation, targets = employee_ids.len(), ok = outcome.is_ok(), "mutation");
        lock(&self.log).mutations.push(MutationRecord {
            mutation: *mutation,
            employee_ids: employee_ids.to_vec(),
            started,
            finished: Instant::now(),
            outcome: outcome.clone(),
        });
        outcome.map(|()| MutationAck {
            message: Some(format!("{mutation}: {} employees", employee_ids.len())),
        })
    }
}
