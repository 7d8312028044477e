//! Host-test registry.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::builtin::{DefaultAuto, Echo, HelloAuto};
use super::host_test::HostTest;

/// Factory producing a fresh host-test instance per run.
pub type HostTestFactory = Box<dyn Fn() -> Box<dyn HostTest> + Send + Sync>;

/// Maps host-test names to factories.
///
/// Each candidate registers independently, so one bad registration never
/// poisons the rest. Duplicate registration keeps the first entry.
pub struct HostTestRegistry {
    tests: BTreeMap<String, HostTestFactory>,
}

impl HostTestRegistry {
    /// Empty registry, no built-ins.
    pub fn empty() -> Self {
        Self {
            tests: BTreeMap::new(),
        }
    }

    /// Registry pre-populated with the built-in host tests.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("default_auto", Box::new(|| Box::new(DefaultAuto)));
        registry.register("hello_auto", Box::new(|| Box::new(HelloAuto::new())));
        registry.register("echo", Box::new(|| Box::new(Echo::new())));
        registry
    }

    /// Register a host test by name; the first registration wins.
    pub fn register(&mut self, name: impl Into<String>, factory: HostTestFactory) -> bool {
        let name = name.into();
        if self.tests.contains_key(&name) {
            warn!(name = %name, "host test already registered, keeping first");
            return false;
        }
        debug!(name = %name, "host test registered");
        self.tests.insert(name, factory);
        true
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.tests.remove(name).is_some()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.tests.contains_key(name)
    }

    /// Instantiate the named host test.
    pub fn get(&self, name: &str) -> Option<Box<dyn HostTest>> {
        self.tests.get(name).map(|factory| factory())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.tests.keys().map(String::as_str).collect()
    }
}

impl Default for HostTestRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
