/// Knobs shared by the DNS-backed resolver and the include tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisOptions {
    max_depth: usize,
    parallel_expansion: bool,
    count_nested_lookups: bool,
    check_legacy_rr: bool,
}

impl AnalysisOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deepest include/redirect hop followed, both when counting nested
    /// lookups and when expanding the tree.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn parallel_expansion(mut self, value: bool) -> Self {
        self.parallel_expansion = value;
        self
    }

    pub fn count_nested_lookups(mut self, value: bool) -> Self {
        self.count_nested_lookups = value;
        self
    }

    pub fn check_legacy_rr(mut self, value: bool) -> Self {
        self.check_legacy_rr = value;
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn expands_in_parallel(&self) -> bool {
        self.parallel_expansion
    }

    pub fn counts_nested_lookups(&self) -> bool {
        self.count_nested_lookups
    }

    pub fn checks_legacy_rr(&self) -> bool {
        self.check_legacy_rr
    }
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            max_depth: 10,
            parallel_expansion: true,
            count_nested_lookups: true,
            check_legacy_rr: true,
        }
    }
}
