//! Per-tenant job dependencies
//!
//! A job type may only run for a tenant once the tenant's most recent record
//! of every prerequisite type has completed. The default graph:
//!
//! ```text
//! primary_feed ◀── enrichment_feed
//!      ▲
//!      └────────── detail_scrape ◀── link_shorten
//! ```
//!
//! Readiness is evaluated against the store on every pass and never cached,
//! so a prerequisite that completes between runs unblocks its dependents on
//! the next run.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;

use super::error::SchedulerResult;
use crate::models::{JobRecord, JobStatus, JobType};
use crate::storage::JobStore;

/// Default `(dependent, prerequisite)` edges
pub const DEFAULT_EDGES: &[(JobType, JobType)] = &[
    (JobType::EnrichmentFeed, JobType::PrimaryFeed),
    (JobType::DetailScrape, JobType::PrimaryFeed),
    (JobType::LinkShorten, JobType::DetailScrape),
];

// ============================================================================
// Graph
// ============================================================================

/// Static view of the dependency graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyGraph {
    /// Every job type mentioned by an edge, sorted
    pub nodes: Vec<JobType>,

    /// `(dependent, prerequisite)` pairs
    pub edges: Vec<(JobType, JobType)>,

    /// Each detected cycle, listed once starting at its smallest member
    pub cycles: Vec<Vec<JobType>>,
}

impl DependencyGraph {
    pub fn has_cycles(&self) -> bool {
        !self.cycles.is_empty()
    }

    /// Whether `job_type` sits on any cycle
    pub fn in_cycle(&self, job_type: JobType) -> bool {
        self.cycles.iter().any(|c| c.contains(&job_type))
    }

    /// Human-readable rendering for the CLI
    pub fn display(&self) -> String {
        let mut output = String::new();
        output.push_str("Nodes:\n");
        for node in &self.nodes {
            output.push_str(&format!("  {}\n", node));
        }
        output.push_str("Edges (dependent -> prerequisite):\n");
        for (dependent, prerequisite) in &self.edges {
            output.push_str(&format!("  {} -> {}\n", dependent, prerequisite));
        }
        if self.cycles.is_empty() {
            output.push_str("Cycles: none\n");
        } else {
            output.push_str("Cycles:\n");
            for cycle in &self.cycles {
                let names: Vec<&str> = cycle.iter().map(|t| t.as_str()).collect();
                output.push_str(&format!("  {} -> {}\n", names.join(" -> "), names[0]));
            }
        }
        output
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Gates job types on the completion of their prerequisites
#[derive(Debug, Clone)]
pub struct DependencyResolver {
    prerequisites: BTreeMap<JobType, Vec<JobType>>,
    graph: DependencyGraph,
}

impl Default for DependencyResolver {
    fn default() -> Self {
        Self::with_edges(DEFAULT_EDGES.iter().copied())
    }
}

impl DependencyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a resolver from `(dependent, prerequisite)` edges
    pub fn with_edges(edges: impl IntoIterator<Item = (JobType, JobType)>) -> Self {
        let mut prerequisites: BTreeMap<JobType, Vec<JobType>> = BTreeMap::new();
        for (dependent, prerequisite) in edges {
            let entry = prerequisites.entry(dependent).or_default();
            if !entry.contains(&prerequisite) {
                entry.push(prerequisite);
            }
        }

        let mut resolver = Self {
            prerequisites,
            graph: DependencyGraph::default(),
        };
        resolver.graph = resolver.build_graph();

        if resolver.graph.has_cycles() {
            tracing::warn!(
                cycles = ?resolver.graph.cycles,
                "Dependency graph contains cycles; affected job types will never run"
            );
        }

        resolver
    }

    /// Graph computed at construction time
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Direct prerequisites of a job type
    pub fn prerequisites(&self, job_type: JobType) -> &[JobType] {
        self.prerequisites
            .get(&job_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Walk the edges and report nodes, edges and cycles.
    ///
    /// Depth-first search keeping the current path as a recursion stack; a
    /// back edge into the stack closes a cycle.
    pub fn build_graph(&self) -> DependencyGraph {
        let mut nodes = BTreeSet::new();
        let mut edges = Vec::new();
        for (dependent, prereqs) in &self.prerequisites {
            nodes.insert(*dependent);
            for prerequisite in prereqs {
                nodes.insert(*prerequisite);
                edges.push((*dependent, *prerequisite));
            }
        }

        let mut visited = HashSet::new();
        let mut stack = Vec::new();
        let mut cycles = BTreeSet::new();
        for node in &nodes {
            self.visit(*node, &mut visited, &mut stack, &mut cycles);
        }

        DependencyGraph {
            nodes: nodes.into_iter().collect(),
            edges,
            cycles: cycles.into_iter().collect(),
        }
    }

    fn visit(
        &self,
        node: JobType,
        visited: &mut HashSet<JobType>,
        stack: &mut Vec<JobType>,
        cycles: &mut BTreeSet<Vec<JobType>>,
    ) {
        if let Some(pos) = stack.iter().position(|n| *n == node) {
            cycles.insert(normalize_cycle(&stack[pos..]));
            return;
        }
        if !visited.insert(node) {
            return;
        }

        stack.push(node);
        for prerequisite in self.prerequisites(node) {
            self.visit(*prerequisite, visited, stack, cycles);
        }
        stack.pop();
    }

    /// Whether `job` may run now.
    ///
    /// Job types on a cycle are never ready. Otherwise every prerequisite's
    /// latest record for the tenant must exist and be completed.
    pub async fn is_ready(&self, job: &JobRecord, store: &dyn JobStore) -> SchedulerResult<bool> {
        if self.graph.in_cycle(job.job_type) {
            return Ok(false);
        }
        Ok(self.blocking_prerequisites(job, store).await?.is_empty())
    }

    /// Prerequisites whose latest record for the tenant is missing or not
    /// completed
    pub async fn blocking_prerequisites(
        &self,
        job: &JobRecord,
        store: &dyn JobStore,
    ) -> SchedulerResult<Vec<JobType>> {
        let mut blocking = Vec::new();

        for prerequisite in self.prerequisites(job.job_type) {
            let latest = store.latest_for(&job.tenant_id, *prerequisite).await?;
            let satisfied = matches!(&latest, Some(record) if record.status == JobStatus::Completed);
            if !satisfied {
                blocking.push(*prerequisite);
            }
        }

        Ok(blocking)
    }
}

/// Rotate a cycle so it starts at its smallest member
fn normalize_cycle(cycle: &[JobType]) -> Vec<JobType> {
    let start = cycle
        .iter()
        .enumerate()
        .min_by_key(|(_, t)| **t)
        .map(|(i, _)| i)
        .unwrap_or(0);
    cycle[start..].iter().chain(&cycle[..start]).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryJobStore;
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn job(tenant: &str, job_type: JobType, status: JobStatus) -> JobRecord {
        let mut job = JobRecord::new(tenant, job_type, json!({}), 3);
        job.status = status;
        job
    }

    #[test]
    fn test_default_graph() {
        let graph = DependencyResolver::new().build_graph();

        assert_eq!(graph.nodes.len(), 4);
        assert_eq!(graph.edges.len(), 3);
        assert!(!graph.has_cycles());
        assert!(graph
            .edges
            .contains(&(JobType::LinkShorten, JobType::DetailScrape)));
    }

    #[test]
    fn test_cycle_detected() {
        let resolver = DependencyResolver::with_edges([
            (JobType::PrimaryFeed, JobType::LinkShorten),
            (JobType::LinkShorten, JobType::DetailScrape),
            (JobType::DetailScrape, JobType::PrimaryFeed),
            (JobType::EnrichmentFeed, JobType::PrimaryFeed),
        ]);

        let graph = resolver.graph();
        assert_eq!(graph.cycles.len(), 1);
        assert_eq!(graph.cycles[0].len(), 3);
        assert_eq!(graph.cycles[0][0], JobType::PrimaryFeed);
        assert!(graph.in_cycle(JobType::DetailScrape));
        assert!(!graph.in_cycle(JobType::EnrichmentFeed));
    }

    #[test]
    fn test_self_loop() {
        let resolver = DependencyResolver::with_edges([(JobType::PrimaryFeed, JobType::PrimaryFeed)]);
        assert_eq!(resolver.graph().cycles, vec![vec![JobType::PrimaryFeed]]);
    }

    #[test]
    fn test_display() {
        let output = DependencyResolver::new().graph().display();
        assert!(output.contains("link_shorten -> detail_scrape"));
        assert!(output.contains("Cycles: none"));
    }

    #[tokio::test]
    async fn test_no_prerequisites_is_ready() {
        let store = MemoryJobStore::new();
        let resolver = DependencyResolver::new();

        let primary = job("dealer-1", JobType::PrimaryFeed, JobStatus::Pending);
        assert!(resolver.is_ready(&primary, &store).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_prerequisite_blocks() {
        let store = MemoryJobStore::new();
        let resolver = DependencyResolver::new();

        let scrape = job("dealer-1", JobType::DetailScrape, JobStatus::Pending);
        assert!(!resolver.is_ready(&scrape, &store).await.unwrap());
        assert_eq!(
            resolver.blocking_prerequisites(&scrape, &store).await.unwrap(),
            vec![JobType::PrimaryFeed]
        );
    }

    #[tokio::test]
    async fn test_latest_prerequisite_decides() {
        let now = Utc::now();
        let old = job("dealer-1", JobType::PrimaryFeed, JobStatus::Completed)
            .created(now - Duration::hours(24));
        let new = job("dealer-1", JobType::PrimaryFeed, JobStatus::Failed).created(now);
        let store = MemoryJobStore::with_jobs([old, new]);
        let resolver = DependencyResolver::new();

        let enrichment = job("dealer-1", JobType::EnrichmentFeed, JobStatus::Pending);
        assert!(!resolver.is_ready(&enrichment, &store).await.unwrap());
    }

    #[tokio::test]
    async fn test_prerequisites_are_per_tenant() {
        let store = MemoryJobStore::with_jobs([job(
            "dealer-2",
            JobType::PrimaryFeed,
            JobStatus::Completed,
        )]);
        let resolver = DependencyResolver::new();

        let scrape_1 = job("dealer-1", JobType::DetailScrape, JobStatus::Pending);
        let scrape_2 = job("dealer-2", JobType::DetailScrape, JobStatus::Pending);
        assert!(!resolver.is_ready(&scrape_1, &store).await.unwrap());
        assert!(resolver.is_ready(&scrape_2, &store).await.unwrap());
    }

    #[tokio::test]
    async fn test_cycle_member_never_ready() {
        let store = MemoryJobStore::with_jobs([
            job("dealer-1", JobType::PrimaryFeed, JobStatus::Completed),
            job("dealer-1", JobType::DetailScrape, JobStatus::Completed),
        ]);
        let resolver = DependencyResolver::with_edges([
            (JobType::PrimaryFeed, JobType::DetailScrape),
            (JobType::DetailScrape, JobType::PrimaryFeed),
        ]);

        let primary = job("dealer-1", JobType::PrimaryFeed, JobStatus::Pending);
        assert!(!resolver.is_ready(&primary, &store).await.unwrap());
    }
}
