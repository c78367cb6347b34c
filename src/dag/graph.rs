// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{JobSpec, PREREQ_ALL};
use crate::errors::{SpecError, SpecErrors};

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone, Default)]
struct DagNode {
    /// Direct prereqs: jobs that must be terminal before this one runs.
    deps: Vec<String>,
    /// Direct dependents: jobs that list this one as a prereq.
    dependents: Vec<String>,
}

/// Prereq graph keyed by job name. Edges point prereq -> dependent.
///
/// Construction checks that every edge names a known job; acyclicity is a
/// separate query ([`DependencyGraph::detect_cycles`]) so that validation
/// can report it alongside every other problem.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: BTreeMap<String, DagNode>,
}

impl DependencyGraph {
    /// Build the graph from job specs, collecting every structural error.
    ///
    /// `prereq = ["ALL"]` expands to every other job in the set. At most
    /// one job may use it; a job that lists the `ALL` job as a prereq ends
    /// up on a cycle.
    pub fn build(specs: &[JobSpec]) -> Result<Self, SpecErrors> {
        let mut errors = SpecErrors::new();
        let mut nodes: BTreeMap<String, DagNode> = BTreeMap::new();

        for spec in specs {
            if nodes.contains_key(&spec.name) {
                errors.push(SpecError::DuplicateName(spec.name.clone()));
                continue;
            }
            nodes.insert(spec.name.clone(), DagNode::default());
        }

        if nodes.contains_key(PREREQ_ALL) {
            if let Some(user) = specs.iter().find(|s| s.depends_on_all()) {
                errors.push(SpecError::ReservedAllName(user.name.clone()));
            }
        }

        let all_dependents: BTreeSet<&str> = specs
            .iter()
            .filter(|s| s.depends_on_all())
            .map(|s| s.name.as_str())
            .collect();
        if all_dependents.len() > 1 {
            errors.push(SpecError::MultiplePrereqAll(
                all_dependents.iter().map(|n| n.to_string()).collect(),
            ));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for spec in specs {
            // Only the first spec with a given name owns the node.
            if !seen.insert(spec.name.as_str()) {
                continue;
            }

            let mut deps: Vec<String> = Vec::new();
            if spec.depends_on_all() {
                deps.extend(
                    nodes
                        .keys()
                        .filter(|n| *n != &spec.name)
                        .cloned(),
                );
            }

            for prereq in spec.prereq.iter().filter(|p| *p != PREREQ_ALL) {
                if prereq == &spec.name {
                    errors.push(SpecError::SelfPrereq(spec.name.clone()));
                } else if !nodes.contains_key(prereq) {
                    errors.push(SpecError::UnknownPrereq {
                        job: spec.name.clone(),
                        prereq: prereq.clone(),
                    });
                } else if !deps.contains(prereq) {
                    deps.push(prereq.clone());
                }
            }

            if let Some(node) = nodes.get_mut(&spec.name) {
                node.deps = deps;
            }
        }

        // Second pass: populate dependents based on deps.
        let edges: Vec<(String, String)> = nodes
            .iter()
            .flat_map(|(name, node)| node.deps.iter().map(move |d| (d.clone(), name.clone())))
            .collect();
        for (dep, dependent) in edges {
            if let Some(dep_node) = nodes.get_mut(&dep) {
                dep_node.dependents.push(dependent);
            }
        }

        errors.into_result()?;
        Ok(Self { nodes })
    }

    /// All job names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Immediate prereqs of a job.
    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a job (jobs that list this one as a prereq).
    pub fn dependents_of(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Every job that lies on a cycle, sorted. Empty for an acyclic graph.
    ///
    /// For each node, walk its dependents transitively; a node that reaches
    /// itself is on a cycle.
    pub fn detect_cycles(&self) -> Vec<String> {
        let mut implicated: BTreeSet<&str> = BTreeSet::new();

        for start in self.nodes.keys() {
            let mut visited: HashSet<&str> = HashSet::new();
            let mut queue: VecDeque<&str> = self
                .dependents_of(start)
                .iter()
                .map(|s| s.as_str())
                .collect();

            while let Some(name) = queue.pop_front() {
                if name == start {
                    implicated.insert(start.as_str());
                    break;
                }
                if !visited.insert(name) {
                    continue;
                }
                queue.extend(self.dependents_of(name).iter().map(|s| s.as_str()));
            }
        }

        implicated.into_iter().map(str::to_string).collect()
    }

    /// Jobs not yet in `completed` whose prereqs all are.
    ///
    /// Non-incremental; the scheduler uses [`ReadyTracker`] instead.
    pub fn ready(&self, completed: &HashSet<String>) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|(name, node)| {
                !completed.contains(*name) && node.deps.iter().all(|d| completed.contains(d))
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Deterministic prereq-respecting order, or `None` if the graph has a
    /// cycle.
    pub fn topological_order(&self) -> Option<Vec<String>> {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for name in self.nodes.keys() {
            graph.add_node(name.as_str());
        }
        for (name, node) in &self.nodes {
            for dep in &node.deps {
                graph.add_edge(dep.as_str(), name.as_str(), ());
            }
        }

        toposort(&graph, None)
            .ok()
            .map(|order| order.into_iter().map(str::to_string).collect())
    }

    /// Fresh incremental readiness tracker for one run.
    pub fn ready_tracker(&self) -> ReadyTracker {
        let remaining = self
            .nodes
            .iter()
            .map(|(name, node)| (name.clone(), node.deps.len()))
            .collect();
        ReadyTracker {
            remaining,
            terminal: HashSet::new(),
        }
    }
}

/// Counts unresolved prereqs per job so each terminal transition only
/// touches the finished job's direct dependents.
#[derive(Debug, Clone)]
pub struct ReadyTracker {
    remaining: HashMap<String, usize>,
    terminal: HashSet<String>,
}

impl ReadyTracker {
    /// Jobs with no prereqs, sorted.
    pub fn initially_ready(&self) -> Vec<String> {
        let mut ready: Vec<String> = self
            .remaining
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(name, _)| name.clone())
            .collect();
        ready.sort();
        ready
    }

    /// Record that `name` is terminal and return the direct dependents whose
    /// last prereq this was. Marking the same job twice is a no-op.
    pub fn mark_terminal(&mut self, graph: &DependencyGraph, name: &str) -> Vec<String> {
        if !self.terminal.insert(name.to_string()) {
            return Vec::new();
        }

        let mut ready = Vec::new();
        for dependent in graph.dependents_of(name) {
            if let Some(count) = self.remaining.get_mut(dependent) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    ready.push(dependent.clone());
                }
            }
        }
        ready
    }

    /// Whether every prereq of `name` is terminal.
    pub fn is_ready(&self, name: &str) -> bool {
        self.remaining.get(name).is_some_and(|n| *n == 0)
    }

    pub fn is_terminal(&self, name: &str) -> bool {
        self.terminal.contains(name)
    }
}
