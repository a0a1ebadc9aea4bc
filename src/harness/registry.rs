use crate::collector::logs::{LogsCollector, LOGS_COLLECTOR_NAME};
use crate::harness::{Collector, CollectorContext, CollectorError, HarnessError};

/// Builds a collector from the shared context.
pub type CollectorBuilder = fn(&CollectorContext) -> Result<Box<dyn Collector>, CollectorError>;

/// Selector that picks every registered collector
pub const ALL_COLLECTORS: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inclusion {
    /// Always run, whether requested or not
    Required,
    /// Run only when requested
    Optional,
}

struct Entry {
    name: String,
    builder: CollectorBuilder,
    inclusion: Inclusion,
}

/// Explicit table of available collectors, in registration order.
#[derive(Default)]
pub struct CollectorRegistry {
    entries: Vec<Entry>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        builder: CollectorBuilder,
        inclusion: Inclusion,
    ) -> Result<(), HarnessError> {
        let name = name.into();
        if self.entries.iter().any(|entry| entry.name == name) {
            return Err(HarnessError::DuplicateCollector(name));
        }
        self.entries.push(Entry {
            name,
            builder,
            inclusion,
        });
        Ok(())
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.name.as_str()).collect()
    }

    pub fn required(&self) -> Vec<&str> {
        self.with_inclusion(Inclusion::Required)
    }

    pub fn optional(&self) -> Vec<&str> {
        self.with_inclusion(Inclusion::Optional)
    }

    fn with_inclusion(&self, inclusion: Inclusion) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|entry| entry.inclusion == inclusion)
            .map(|entry| entry.name.as_str())
            .collect()
    }

    /// Resolve requested names to the collectors to run: every required
    /// collector plus the requested ones, in registration order.
    pub fn select(&self, requested: &[String]) -> Result<Vec<String>, HarnessError> {
        if requested.iter().any(|name| name == ALL_COLLECTORS) {
            return Ok(self.names().into_iter().map(str::to_string).collect());
        }

        if let Some(unknown) = requested
            .iter()
            .find(|name| !self.entries.iter().any(|entry| &entry.name == *name))
        {
            return Err(HarnessError::UnknownCollector(unknown.clone()));
        }

        Ok(self
            .entries
            .iter()
            .filter(|entry| {
                entry.inclusion == Inclusion::Required || requested.contains(&entry.name)
            })
            .map(|entry| entry.name.clone())
            .collect())
    }

    pub fn build(
        &self,
        name: &str,
        context: &CollectorContext,
    ) -> Result<Box<dyn Collector>, HarnessError> {
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.name == name)
            .ok_or_else(|| HarnessError::UnknownCollector(name.to_string()))?;

        (entry.builder)(context).map_err(|source| HarnessError::Build {
            name: name.to_string(),
            source,
        })
    }
}

/// Registry holding every collector this crate provides.
pub fn builtin_registry() -> CollectorRegistry {
    let mut registry = CollectorRegistry::new();
    registry.entries.push(Entry {
        name: LOGS_COLLECTOR_NAME.to_string(),
        builder: LogsCollector::build,
        inclusion: Inclusion::Optional,
    });
    registry
}
