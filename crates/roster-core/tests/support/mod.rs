//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use roster_core::api::{
    CollectionSource, MutationAck, MutationSink, Page, PageInfo, ReferenceSource,
};
use roster_core::bulk::Mutation;
use roster_core::error::ApiError;
use roster_core::model::{Employee, EmployeeId, PoolKind, ReferenceId, ReferenceNode, TagId};
use roster_core::query::CanonicalQuery;
use tokio::time::Instant;

pub const DEFAULT_LATENCY: Duration = Duration::from_millis(10);

pub fn employee(id: u64, tag: Option<u64>) -> Employee {
    Employee {
        id: EmployeeId(id),
        first_name: format!("First{id}"),
        last_name: format!("Last{id}"),
        email: format!("e{id}@example.com"),
        business_function: None,
        department: None,
        unit: None,
        job_function: None,
        position_group: None,
        status: None,
        tag: tag.map(TagId),
        line_manager: None,
    }
}

/// Employee directory serving pages and applying tag mutations.
pub struct Directory {
    employees: Mutex<Vec<Employee>>,
    fetches: Mutex<Vec<CanonicalQuery>>,
    latencies: Mutex<VecDeque<Duration>>,
    mutations: Mutex<Vec<(Mutation, Vec<EmployeeId>, Instant)>>,
    fail_mutation_at: Mutex<Option<usize>>,
}

impl Directory {
    pub fn new(count: u64, tag_of: impl Fn(u64) -> Option<u64>) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            employees: Mutex::new((1..=count).map(|id| employee(id, tag_of(id))).collect()),
            fetches: Mutex::new(Vec::new()),
            latencies: Mutex::new(VecDeque::new()),
            mutations: Mutex::new(Vec::new()),
            fail_mutation_at: Mutex::new(None),
        })
    }

    /// Latencies for the next fetches, in call order.
    pub fn queue_latencies(&self, millis: &[u64]) {
        self.latencies
            .lock()
            .expect("lock")
            .extend(millis.iter().map(|ms| Duration::from_millis(*ms)));
    }

    pub fn fail_mutation_at(&self, index: usize) {
        *self.fail_mutation_at.lock().expect("lock") = Some(index);
    }

    pub fn fetches(&self) -> Vec<CanonicalQuery> {
        self.fetches.lock().expect("lock").clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().expect("lock").len()
    }

    pub fn mutations(&self) -> Vec<(Mutation, Vec<EmployeeId>)> {
        self.mutations
            .lock()
            .expect("lock")
            .iter()
            .map(|(m, ids, _)| (*m, ids.clone()))
            .collect()
    }

    pub fn mutation_times(&self) -> Vec<Instant> {
        self.mutations
            .lock()
            .expect("lock")
            .iter()
            .map(|(_, _, at)| *at)
            .collect()
    }

    pub fn tag_of(&self, id: u64) -> Option<TagId> {
        self.employees
            .lock()
            .expect("lock")
            .iter()
            .find(|e| e.id == EmployeeId(id))
            .and_then(|e| e.tag)
    }

    fn evaluate(&self, query: &CanonicalQuery) -> Page<Employee> {
        let employees = self.employees.lock().expect("lock");
        let needle = query.search().map(str::to_ascii_lowercase);
        let tags: Option<Vec<String>> = query.filter("tag").map(<[String]>::to_vec);

        let mut rows: Vec<Employee> = employees
            .iter()
            .filter(|e| {
                needle
                    .as_deref()
                    .is_none_or(|n| e.full_name().to_ascii_lowercase().contains(n))
            })
            .filter(|e| {
                tags.as_ref().is_none_or(|tags| {
                    e.tag.is_some_and(|t| tags.iter().any(|v| *v == t.to_string()))
                })
            })
            .cloned()
            .collect();
        if query.ordering().first().is_some_and(|token| token.starts_with('-')) {
            rows.reverse();
        }

        let count = rows.len() as u64;
        let size = query.page_size() as usize;
        let start = (query.page() as usize - 1) * size;
        let results: Vec<Employee> = rows.into_iter().skip(start).take(size).collect();
        Page {
            results,
            pagination: PageInfo {
                count,
                total_pages: u32::try_from(count.div_ceil(size as u64).max(1)).unwrap_or(1),
                page: query.page(),
                page_size: query.page_size(),
            },
        }
    }
}

#[async_trait]
impl CollectionSource for Directory {
    type Row = Employee;

    async fn fetch_page(&self, query: &CanonicalQuery) -> Result<Page<Employee>, ApiError> {
        self.fetches.lock().expect("lock").push(query.clone());
        let latency = self
            .latencies
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or(DEFAULT_LATENCY);
        tokio::time::sleep(latency).await;
        Ok(self.evaluate(query))
    }
}

#[async_trait]
impl MutationSink for Directory {
    async fn apply(
        &self,
        mutation: &Mutation,
        employee_ids: &[EmployeeId],
    ) -> Result<MutationAck, ApiError> {
        let index = {
            let mut log = self.mutations.lock().expect("lock");
            log.push((*mutation, employee_ids.to_vec(), Instant::now()));
            log.len() - 1
        };
        tokio::time::sleep(DEFAULT_LATENCY).await;
        if *self.fail_mutation_at.lock().expect("lock") == Some(index) {
            return Err(ApiError::Rejected {
                status: 503,
                message: "tag service unavailable".into(),
            });
        }

        let mut employees = self.employees.lock().expect("lock");
        for employee in employees.iter_mut().filter(|e| employee_ids.contains(&e.id)) {
            match *mutation {
                Mutation::AddTag { tag } => employee.tag = Some(tag),
                Mutation::RemoveTag { tag } if employee.tag == Some(tag) => employee.tag = None,
                _ => {}
            }
        }
        Ok(MutationAck::default())
    }
}

/// Lookup lists: business functions 1..=3, departments `bf*10 + 1..=2`,
/// units `dept*10 + 1..=2`. Latency is configurable per parent id.
pub struct Lookups {
    latency_by_parent: Mutex<BTreeMap<u64, Duration>>,
    calls: Mutex<Vec<(PoolKind, Option<ReferenceId>)>>,
}

impl Lookups {
    pub fn new() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            latency_by_parent: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn set_latency(&self, parent: u64, millis: u64) {
        self.latency_by_parent
            .lock()
            .expect("lock")
            .insert(parent, Duration::from_millis(millis));
    }

    pub fn calls(&self) -> Vec<(PoolKind, Option<ReferenceId>)> {
        self.calls.lock().expect("lock").clone()
    }
}

fn lookup_node(id: u64, parent: Option<u64>) -> ReferenceNode {
    ReferenceNode {
        id: ReferenceId(id),
        parent_id: parent.map(ReferenceId),
        name: format!("ref-{id}"),
        is_active: true,
    }
}

#[async_trait]
impl ReferenceSource for Lookups {
    async fn fetch_pool(
        &self,
        kind: PoolKind,
        parent: Option<ReferenceId>,
    ) -> Result<Vec<ReferenceNode>, ApiError> {
        self.calls.lock().expect("lock").push((kind, parent));
        let latency = parent
            .and_then(|p| self.latency_by_parent.lock().expect("lock").get(&p.0).copied())
            .unwrap_or(DEFAULT_LATENCY);
        tokio::time::sleep(latency).await;

        Ok(match (kind, parent) {
            (PoolKind::BusinessFunction, _) => (1..=3).map(|id| lookup_node(id, None)).collect(),
            (PoolKind::Department | PoolKind::Unit, Some(p)) => (1..=2)
                .map(|n| lookup_node(p.0 * 10 + n, Some(p.0)))
                .collect(),
            (_, None) => vec![lookup_node(100, None), lookup_node(101, None)],
            _ => Vec::new(),
        })
    }
}
