//! Engine configuration.
//!
//! All limits and policies of a [`Vm`](crate::Vm) live here. The struct is
//! serde-enabled so hosts can load it from JSON; missing fields take their
//! defaults.

use serde::{Deserialize, Serialize};

/// What happens when a definition collides with an incompatible permanent
/// property (e.g. redeclaring a `const`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedeclarationPolicy {
    /// Log a warning and keep the existing property
    Warn,
    /// Raise a type fault
    #[default]
    Error,
}

/// Engine configuration.
///
/// # Examples
///
/// ```
/// use interpreter::EngineConfig;
///
/// let config = EngineConfig::default().with_max_call_depth(100).with_property_cache(false);
/// assert_eq!(config.max_call_depth, 100);
/// assert!(!config.property_cache);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Enables the property cache. Disabling it never changes results.
    pub property_cache: bool,
    /// Number of property cache entries, rounded up to a power of two
    pub property_cache_size: usize,
    /// Capacity of a freshly allocated operand-stack segment
    pub stack_segment_values: usize,
    /// Total operand-stack capacity; exceeding it is a fatal stack overflow
    pub max_stack_values: usize,
    /// Maximum number of live frames
    pub max_call_depth: usize,
    /// Maximum number of actual arguments in one call
    pub max_arguments: usize,
    /// Operations between two operation-callback checks
    pub operation_budget: u32,
    /// Policy for rejected redefinitions
    pub redeclaration: RedeclarationPolicy,
    /// Assignment to an unresolved name is a reference fault
    pub strict: bool,
    /// Allocations between automatic collections
    pub gc_threshold: usize,
    /// Live-object ceiling; allocating past it is a catchable
    /// out-of-memory fault
    pub heap_limit: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            property_cache: true,
            property_cache_size: 4096,
            stack_segment_values: 16 * 1024,
            max_stack_values: 4 * 1024 * 1024,
            max_call_depth: 3000,
            max_arguments: 65535,
            operation_budget: 4096,
            redeclaration: RedeclarationPolicy::Error,
            strict: false,
            gc_threshold: 8192,
            heap_limit: None,
        }
    }
}

impl EngineConfig {
    /// Parses a configuration from JSON; absent fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Enables or disables the property cache.
    pub fn with_property_cache(mut self, enabled: bool) -> Self {
        self.property_cache = enabled;
        self
    }

    /// Sets the property cache size.
    pub fn with_property_cache_size(mut self, size: usize) -> Self {
        self.property_cache_size = size;
        self
    }

    /// Sets the capacity of new stack segments.
    pub fn with_stack_segment_values(mut self, values: usize) -> Self {
        self.stack_segment_values = values;
        self
    }

    /// Sets the total operand-stack ceiling.
    pub fn with_max_stack_values(mut self, values: usize) -> Self {
        self.max_stack_values = values;
        self
    }

    /// Sets the recursion limit.
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Sets the argument-count limit.
    pub fn with_max_arguments(mut self, count: usize) -> Self {
        self.max_arguments = count;
        self
    }

    /// Sets the operation budget between callback checks.
    pub fn with_operation_budget(mut self, budget: u32) -> Self {
        self.operation_budget = budget.max(1);
        self
    }

    /// Sets the redeclaration policy.
    pub fn with_redeclaration(mut self, policy: RedeclarationPolicy) -> Self {
        self.redeclaration = policy;
        self
    }

    /// Makes unresolved assignments fault.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Sets the automatic collection threshold.
    pub fn with_gc_threshold(mut self, allocations: usize) -> Self {
        self.gc_threshold = allocations;
        self
    }

    /// Caps the number of live objects.
    pub fn with_heap_limit(mut self, objects: usize) -> Self {
        self.heap_limit = Some(objects);
        self
    }
}
