//! Configuration options for the Lua modules.

use std::time::Duration;

/// Default per-client operation timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration options used when registering the modules in a Lua state.
#[derive(Debug, Clone)]
pub struct Options {
    /// Initial operation timeout for every client created by scripts.
    /// Scripts may change it per client with `client:set_timeout(ms)`.
    /// Default: 10 seconds
    pub timeout: Duration,

    /// Number of worker threads of the async runtime driving the backend.
    /// Default: 1
    pub worker_threads: usize,

    /// Name under which the database module is preloaded.
    /// Default: "mongo"
    pub module_name: String,

    /// Name under which the standalone scalar module is preloaded.
    /// Default: "bson"
    pub bson_module_name: String,

    /// Value exposed to scripts as the module's `_DEBUG` field.
    /// Default: false
    pub debug: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            worker_threads: 1,
            module_name: "mongo".to_string(),
            bson_module_name: "bson".to_string(),
            debug: false,
        }
    }
}

impl Options {
    /// Sets the initial client timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the runtime worker thread count (at least one thread is used).
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads.max(1);
        self
    }

    /// Sets the database module name.
    pub fn with_module_name(mut self, name: impl Into<String>) -> Self {
        self.module_name = name.into();
        self
    }

    /// Sets the scalar module name.
    pub fn with_bson_module_name(mut self, name: impl Into<String>) -> Self {
        self.bson_module_name = name.into();
        self
    }

    /// Sets the `_DEBUG` flag.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}
