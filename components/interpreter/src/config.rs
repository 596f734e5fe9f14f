//! VM configuration

/// Tunables for a [`crate::Vm`]
///
/// # Example
///
/// ```
/// use interpreter::VmConfig;
///
/// let config = VmConfig::default().with_gc_threshold(64);
/// assert_eq!(config.gc_threshold, 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    /// Maximum number of script frames
    pub max_call_depth: usize,
    /// Maximum nesting of native entry points
    pub max_native_depth: usize,
    /// Allocations between automatic collections
    pub gc_threshold: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 1000,
            max_native_depth: 64,
            gc_threshold: 10_000,
        }
    }
}

impl VmConfig {
    /// Set the script frame limit
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Set the native nesting limit
    pub fn with_max_native_depth(mut self, depth: usize) -> Self {
        self.max_native_depth = depth;
        self
    }

    /// Set the automatic collection threshold
    pub fn with_gc_threshold(mut self, threshold: usize) -> Self {
        self.gc_threshold = threshold;
        self
    }
}
