//! Scheduler configuration
//!
//! Library defaults with runtime environment overrides.
//!
//! # Example
//!
//! ```rust,ignore
//! use cotask_runtime::config::SchedulerConfig;
//!
//! // Defaults with env overrides
//! let config = SchedulerConfig::from_env();
//!
//! // Or customize programmatically
//! let config = SchedulerConfig::new()
//!     .max_tasks(8)
//!     .num_stacks(8)
//!     .guard_page(false);
//! ```

use cotask_core::constants::{MAX_TASKS, MIN_STACK_SIZE, STACK_SIZE};
use cotask_core::env::{env_get, env_get_bool};
use cotask_core::error::SchedError;
use cotask_core::kinfo;

/// Largest stack the config accepts (1 GB)
const MAX_STACK_SIZE: usize = 1 << 30;

/// Scheduler configuration with builder pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Task table slots
    pub max_tasks: usize,
    /// Stacks in the pool
    pub num_stacks: usize,
    /// Usable bytes per stack
    pub stack_size: usize,
    /// Put an inaccessible page below each stack (mmap backend only)
    pub guard_page: bool,
    /// Zero a stack before handing it to a new task
    pub zero_stacks: bool,
    /// Yield the OS thread after a dispatch pass that ran nothing
    pub idle_yield: bool,
    /// Log every create and retire at debug level
    pub debug_logging: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl SchedulerConfig {
    /// Create config from defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `COTASK_MAX_TASKS` - Task table slots
    /// - `COTASK_NUM_STACKS` - Stacks in the pool
    /// - `COTASK_STACK_SIZE` - Bytes per stack
    /// - `COTASK_GUARD_PAGE` - Guard page below each stack (0/1)
    /// - `COTASK_ZERO_STACKS` - Zero stacks on create (0/1)
    /// - `COTASK_IDLE_YIELD` - Yield after an empty pass (0/1)
    /// - `COTASK_DEBUG` - Debug logging of task lifecycle (0/1)
    pub fn from_env() -> Self {
        let base = Self::new();
        Self {
            max_tasks: env_get("COTASK_MAX_TASKS", base.max_tasks),
            num_stacks: env_get("COTASK_NUM_STACKS", base.num_stacks),
            stack_size: env_get("COTASK_STACK_SIZE", base.stack_size),
            guard_page: env_get_bool("COTASK_GUARD_PAGE", base.guard_page),
            zero_stacks: env_get_bool("COTASK_ZERO_STACKS", base.zero_stacks),
            idle_yield: env_get_bool("COTASK_IDLE_YIELD", base.idle_yield),
            debug_logging: env_get_bool("COTASK_DEBUG", base.debug_logging),
        }
    }

    /// Create config with explicit defaults (no env override).
    /// Useful for testing or when you want full control.
    pub fn new() -> Self {
        Self {
            max_tasks: MAX_TASKS,
            num_stacks: MAX_TASKS,
            stack_size: STACK_SIZE,
            guard_page: true,
            zero_stacks: true,
            idle_yield: true,
            debug_logging: false,
        }
    }

    /// Table slots and stacks both set to `n`
    pub fn capacity(mut self, n: usize) -> Self {
        self.max_tasks = n;
        self.num_stacks = n;
        self
    }

    pub fn max_tasks(mut self, n: usize) -> Self {
        self.max_tasks = n;
        self
    }

    pub fn num_stacks(mut self, n: usize) -> Self {
        self.num_stacks = n;
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }

    pub fn guard_page(mut self, enable: bool) -> Self {
        self.guard_page = enable;
        self
    }

    pub fn zero_stacks(mut self, enable: bool) -> Self {
        self.zero_stacks = enable;
        self
    }

    pub fn idle_yield(mut self, enable: bool) -> Self {
        self.idle_yield = enable;
        self
    }

    pub fn debug_logging(mut self, enable: bool) -> Self {
        self.debug_logging = enable;
        self
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tasks == 0 {
            return Err(ConfigError::InvalidValue("max_tasks must be > 0"));
        }
        if self.max_tasks >= u32::MAX as usize {
            return Err(ConfigError::InvalidValue("max_tasks must fit a task handle"));
        }
        if self.num_stacks == 0 {
            return Err(ConfigError::InvalidValue("num_stacks must be > 0"));
        }
        if self.num_stacks > u32::MAX as usize {
            return Err(ConfigError::InvalidValue("num_stacks must fit a stack index"));
        }
        if self.stack_size < MIN_STACK_SIZE {
            return Err(ConfigError::InvalidValue("stack_size must be >= 4KB"));
        }
        if self.stack_size > MAX_STACK_SIZE {
            return Err(ConfigError::InvalidValue("stack_size must be <= 1GB"));
        }
        Ok(())
    }

    /// Log configuration at info level
    pub fn log_summary(&self) {
        kinfo!("cotask configuration:");
        kinfo!("  max_tasks:      {}", self.max_tasks);
        kinfo!("  num_stacks:     {}", self.num_stacks);
        kinfo!("  stack_size:     {}", self.stack_size);
        kinfo!("  guard_page:     {}", self.guard_page);
        kinfo!("  zero_stacks:    {}", self.zero_stacks);
        kinfo!("  idle_yield:     {}", self.idle_yield);
        kinfo!("  debug_logging:  {}", self.debug_logging);
    }
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for SchedError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::InvalidValue(msg) => SchedError::InvalidConfig(msg),
        }
    }
}
