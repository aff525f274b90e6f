use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use super::{AnalysisOptions, AnalysisStatus, Mechanism, ParsedRecord, SpfAnalysis, analyze_with_source};
use crate::upstream::SpfSource;

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "with-serde", serde(tag = "state", rename_all = "kebab-case"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeState {
    /// Children have not been requested yet.
    Unexpanded,
    Expanded,
    /// The domain resolved but publishes no mechanisms.
    Empty,
    Failed { message: String },
    /// The domain already appears between the root and this node.
    Cycle,
    DepthLimit,
}

impl NodeState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Unexpanded)
    }
}

/// One domain reached through `include:` or `redirect=`.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeTreeNode {
    pub domain: String,
    /// Mechanism in the parent record that points here; `None` for the root.
    pub mechanism: Option<Mechanism>,
    /// Lookups charged for reaching and evaluating this domain, nested ones included.
    pub lookups: u32,
    /// Lookups of this domain's own record that do not delegate further.
    pub direct_lookups: u32,
    pub children: Vec<IncludeTreeNode>,
    pub depth: usize,
    pub state: NodeState,
    #[cfg_attr(feature = "with-serde", serde(skip))]
    path: Vec<String>,
}

impl IncludeTreeNode {
    /// Lookups as observed in the expanded subtree. Unexpanded nodes fall
    /// back to their reported `lookups`.
    pub fn total_lookups(&self) -> u32 {
        if self.state != NodeState::Expanded {
            return self.lookups;
        }
        self.hop_cost()
            + self.direct_lookups
            + self.children.iter().map(Self::total_lookups).sum::<u32>()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Domains from the root down to this node, inclusive.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Depth-first search for the first node resolving `domain`.
    pub fn find(&self, domain: &str) -> Option<&IncludeTreeNode> {
        if self.domain == domain {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(domain))
    }

    fn hop_cost(&self) -> u32 {
        self.mechanism
            .as_ref()
            .map(|mechanism| u32::from(mechanism.lookup_cost))
            .unwrap_or(0)
    }

    fn with_state(&self, state: NodeState) -> Self {
        Self {
            state,
            ..self.clone()
        }
    }
}

/// Lazily expands include/redirect chains for one analysis view.
///
/// Successful analyses are memoised by domain for the lifetime of the tree,
/// so expanding a node twice, or reaching the same provider from two
/// branches, costs a single upstream call. Failures are not cached and a
/// later expansion retries them.
pub struct IncludeTree<'s, S: ?Sized> {
    source: &'s S,
    options: AnalysisOptions,
    cache: Mutex<HashMap<String, Arc<SpfAnalysis>>>,
}

impl<'s, S> IncludeTree<'s, S>
where
    S: SpfSource + Sync + ?Sized,
{
    pub fn new(source: &'s S, options: AnalysisOptions) -> Self {
        Self {
            source,
            options,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Analyses `domain` and returns its root node with one level of children.
    pub fn resolve(&self, domain: &str) -> IncludeTreeNode {
        let analysis = self.fetch(&normalize(domain));
        self.root(&analysis)
    }

    /// Builds the root node from an analysis the caller already holds.
    pub fn root(&self, analysis: &SpfAnalysis) -> IncludeTreeNode {
        let domain = normalize(&analysis.domain);
        if analysis.status != AnalysisStatus::Error {
            self.lock()
                .entry(domain.clone())
                .or_insert_with(|| Arc::new(analysis.clone()));
        }
        let root = IncludeTreeNode {
            path: vec![domain.clone()],
            domain,
            mechanism: None,
            lookups: 0,
            direct_lookups: 0,
            children: Vec::new(),
            depth: 0,
            state: NodeState::Unexpanded,
        };
        self.attach(&root, analysis)
    }

    /// Fetches the node's domain and fills in its children. Nodes that are
    /// already expanded (or terminal) are returned unchanged.
    pub fn expand(&self, node: &IncludeTreeNode) -> IncludeTreeNode {
        if node.state.is_terminal() {
            return node.clone();
        }
        if node.depth >= self.options.max_depth() {
            return node.with_state(NodeState::DepthLimit);
        }
        let analysis = self.fetch(&node.domain);
        self.attach(node, &analysis)
    }

    /// Expands `node` and up to `depth` further levels below it. Sibling
    /// domains are prefetched concurrently when parallel expansion is on.
    pub fn expand_all(&self, node: &IncludeTreeNode, depth: usize) -> IncludeTreeNode {
        let node = self.expand(node);
        if depth == 0 || node.children.is_empty() {
            return node;
        }
        self.prefetch(&node.children);
        let children = node
            .children
            .iter()
            .map(|child| self.expand_all(child, depth - 1))
            .collect();
        IncludeTreeNode { children, ..node }
    }

    /// Number of domains memoised so far.
    pub fn cached_domains(&self) -> usize {
        self.lock().len()
    }

    fn attach(&self, node: &IncludeTreeNode, analysis: &SpfAnalysis) -> IncludeTreeNode {
        if analysis.status == AnalysisStatus::Error {
            let message = analysis
                .checks
                .iter()
                .find_map(|check| check.details.clone())
                .unwrap_or_else(|| "failed to load".to_string());
            return node.with_state(NodeState::Failed { message });
        }
        let Some(parsed) = analysis.parsed.as_ref().filter(|p| !p.mechanisms.is_empty()) else {
            return node.with_state(NodeState::Empty);
        };

        let children = self.children_of(node, parsed);
        let delegated: u32 = parsed
            .mechanisms
            .iter()
            .filter(|mechanism| mechanism.kind.is_delegation())
            .map(|mechanism| u32::from(mechanism.lookup_cost))
            .sum();
        IncludeTreeNode {
            lookups: node.hop_cost() + parsed.total_lookups(),
            direct_lookups: parsed.lookup_count.saturating_sub(delegated),
            children,
            state: NodeState::Expanded,
            ..node.clone()
        }
    }

    fn children_of(&self, parent: &IncludeTreeNode, parsed: &ParsedRecord) -> Vec<IncludeTreeNode> {
        let cache = self.lock();
        parsed
            .mechanisms
            .iter()
            .filter(|mechanism| mechanism.kind.is_delegation() && !mechanism.target().is_empty())
            .map(|mechanism| {
                let domain = normalize(mechanism.target());
                let cost = u32::from(mechanism.lookup_cost);
                let lookups = cache
                    .get(&domain)
                    .and_then(|known| known.parsed.as_ref())
                    .map(|known| cost + known.total_lookups())
                    .unwrap_or(1);
                let state = if parent.path.contains(&domain) {
                    #[cfg(feature = "with-tracing")]
                    tracing::debug!(domain = %domain, parent = %parent.domain, "include cycle");
                    NodeState::Cycle
                } else {
                    NodeState::Unexpanded
                };
                let mut path = parent.path.clone();
                path.push(domain.clone());
                IncludeTreeNode {
                    domain,
                    mechanism: Some(mechanism.clone()),
                    lookups,
                    direct_lookups: 0,
                    children: Vec::new(),
                    depth: parent.depth + 1,
                    state,
                    path,
                }
            })
            .collect()
    }

    fn prefetch(&self, nodes: &[IncludeTreeNode]) {
        if !self.options.expands_in_parallel() {
            return;
        }
        let mut pending: Vec<&str> = nodes
            .iter()
            .filter(|node| node.state == NodeState::Unexpanded && node.depth < self.options.max_depth())
            .map(|node| node.domain.as_str())
            .collect();
        pending.sort_unstable();
        pending.dedup();
        {
            let cache = self.lock();
            pending.retain(|domain| !cache.contains_key(*domain));
        }
        if pending.len() < 2 {
            return;
        }

        #[cfg(feature = "with-tracing")]
        tracing::debug!(count = pending.len(), "prefetching sibling includes");

        thread::scope(|scope| {
            for domain in pending {
                scope.spawn(move || {
                    self.fetch(domain);
                });
            }
        });
    }

    fn fetch(&self, domain: &str) -> Arc<SpfAnalysis> {
        if let Some(hit) = self.lock().get(domain) {
            #[cfg(feature = "with-tracing")]
            tracing::debug!(domain, "include tree cache hit");
            return Arc::clone(hit);
        }
        let analysis = Arc::new(analyze_with_source(self.source, domain));
        if analysis.status != AnalysisStatus::Error {
            self.lock()
                .entry(domain.to_string())
                .or_insert_with(|| Arc::clone(&analysis));
        }
        analysis
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<SpfAnalysis>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn normalize(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_ascii_lowercase()
}
