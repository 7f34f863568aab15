//! Configuration for the matching engine

/// What happens when a template application fails at match time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BranchErrorPolicy {
    /// Return the error to the caller
    #[default]
    Abort,
    /// Drop the failing subtree, log a warning and keep going
    Skip,
}

/// Configuration options for a match run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchConfig {
    /// Maximum number of tiles a single tiling run may produce
    pub max_tiles: usize,

    /// Maximum nesting depth of the template tree
    pub max_depth: usize,

    /// Maximum number of areas in the resolved tree, root included
    pub max_areas: usize,

    pub branch_errors: BranchErrorPolicy,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            max_tiles: 10_000,
            max_depth: 32,
            max_areas: 100_000,
            branch_errors: BranchErrorPolicy::Abort,
        }
    }
}

impl MatchConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tile-count ceiling of a tiling run
    pub fn with_max_tiles(mut self, max_tiles: usize) -> Self {
        self.max_tiles = max_tiles;
        self
    }

    /// Set the maximum template nesting depth
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the maximum number of resolved areas
    pub fn with_max_areas(mut self, max_areas: usize) -> Self {
        self.max_areas = max_areas;
        self
    }

    pub fn with_branch_errors(mut self, policy: BranchErrorPolicy) -> Self {
        self.branch_errors = policy;
        self
    }
}
