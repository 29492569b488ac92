//! Task binding: turns an agent's task reference into the callable it runs.
//!
//! The scheduler only sees [`TaskBinding`]; how a reference is resolved is
//! left to a [`TaskResolver`]. Two resolvers ship with the crate:
//!
//! | Resolver              | Lookup                                                  |
//! |-----------------------|---------------------------------------------------------|
//! | `NamedTaskResolver`   | tasks registered directly under a name                  |
//! | `MarkedUnitResolver`  | units exposing several operations, some marked as tasks |

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::error::{AgentError, Result};

/// A unit of recurring work. Errors are reported to the agent, which logs them.
pub trait Task: Send + Sync {
    fn execute(&self) -> anyhow::Result<()>;
}

impl<F> Task for F
where
    F: Fn() -> anyhow::Result<()> + Send + Sync,
{
    fn execute(&self) -> anyhow::Result<()> {
        self()
    }
}

/// Resolves a task reference to every candidate task it could mean.
///
/// An empty result is not an error here; [`TaskBinding::bind`] decides what
/// zero or several candidates mean. Instantiation failures are errors.
pub trait TaskResolver: Send + Sync {
    fn candidates(&self, task_ref: &str) -> Result<Vec<Arc<dyn Task>>>;
}

type TaskFactory = Arc<dyn Fn() -> anyhow::Result<Arc<dyn Task>> + Send + Sync>;

/// Resolve by registered name.
///
/// Registering the same name twice is allowed and makes the reference
/// ambiguous, which binding then rejects.
#[derive(Default)]
pub struct NamedTaskResolver {
    tasks: RwLock<HashMap<String, Vec<TaskFactory>>>,
}

impl NamedTaskResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a closure shared by every agent bound to `name`.
    pub fn register<F>(&self, name: impl Into<String>, task: F)
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register_task(name, Arc::new(task));
    }

    /// Register a ready-made task shared by every agent bound to `name`.
    pub fn register_task(&self, name: impl Into<String>, task: Arc<dyn Task>) {
        self.register_factory(name, move || Ok(Arc::clone(&task)));
    }

    /// Register a constructor invoked once per binding, so each agent gets
    /// its own task instance.
    pub fn register_factory<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> anyhow::Result<Arc<dyn Task>> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(task = %name, "task registered");
        self.tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name)
            .or_default()
            .push(Arc::new(factory));
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl TaskResolver for NamedTaskResolver {
    fn candidates(&self, task_ref: &str) -> Result<Vec<Arc<dyn Task>>> {
        let factories: Vec<TaskFactory> = self
            .tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(task_ref)
            .cloned()
            .unwrap_or_default();

        factories
            .iter()
            .map(|factory| {
                factory().map_err(|e| {
                    AgentError::Configuration(format!("cannot instantiate task '{task_ref}': {e}"))
                })
            })
            .collect()
    }
}

/// One named operation of a [`TaskUnit`].
pub struct Operation {
    name: String,
    marked: bool,
    task: Arc<dyn Task>,
}

impl Operation {
    /// An operation carrying the task marker.
    pub fn task<F>(name: impl Into<String>, task: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            marked: true,
            task: Arc::new(task),
        }
    }

    /// A helper operation that is never bound.
    pub fn helper<F>(name: impl Into<String>, task: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            marked: false,
            task: Arc::new(task),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A group of operations from which exactly one marked operation is bound.
pub struct TaskUnit {
    operations: Vec<Operation>,
}

impl TaskUnit {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self { operations }
    }

    fn marked(self) -> impl Iterator<Item = Operation> {
        self.operations.into_iter().filter(|op| op.marked)
    }
}

type UnitFactory = Arc<dyn Fn() -> anyhow::Result<TaskUnit> + Send + Sync>;

/// Resolve by scanning a registered unit for operations carrying the marker.
#[derive(Default)]
pub struct MarkedUnitResolver {
    units: RwLock<HashMap<String, UnitFactory>>,
}

impl MarkedUnitResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the constructor for unit `name`. Re-registering replaces it.
    pub fn register_unit<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> anyhow::Result<TaskUnit> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(unit = %name, "task unit registered");
        self.units
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, Arc::new(factory));
    }
}

impl TaskResolver for MarkedUnitResolver {
    fn candidates(&self, task_ref: &str) -> Result<Vec<Arc<dyn Task>>> {
        let factory = self
            .units
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(task_ref)
            .cloned();
        let Some(factory) = factory else {
            return Ok(Vec::new());
        };

        let unit = factory().map_err(|e| {
            AgentError::Configuration(format!("cannot instantiate task unit '{task_ref}': {e}"))
        })?;
        Ok(unit
            .marked()
            .inspect(|op| debug!(unit = %task_ref, operation = %op.name, "marked operation found"))
            .map(|op| op.task)
            .collect())
    }
}

/// Consults several resolvers in order and unions their candidates.
#[derive(Default)]
pub struct CompositeTaskResolver {
    resolvers: Vec<Arc<dyn TaskResolver>>,
}

impl CompositeTaskResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, resolver: Arc<dyn TaskResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }
}

impl TaskResolver for CompositeTaskResolver {
    fn candidates(&self, task_ref: &str) -> Result<Vec<Arc<dyn Task>>> {
        let mut all = Vec::new();
        for resolver in &self.resolvers {
            all.extend(resolver.candidates(task_ref)?);
        }
        Ok(all)
    }
}

/// The single callable an agent invokes on every run.
#[derive(Clone)]
pub struct TaskBinding {
    task_ref: String,
    task: Arc<dyn Task>,
}

impl TaskBinding {
    /// Bind `task_ref` through `resolver`; exactly one candidate must exist.
    pub fn bind(task_ref: &str, resolver: &dyn TaskResolver) -> Result<Self> {
        let mut candidates = resolver.candidates(task_ref)?;
        match candidates.len() {
            0 => Err(AgentError::Configuration(format!(
                "no task found for reference '{task_ref}'"
            ))),
            1 => Ok(Self {
                task_ref: task_ref.to_string(),
                task: candidates.remove(0),
            }),
            n => Err(AgentError::Configuration(format!(
                "task reference '{task_ref}' is ambiguous: {n} candidates"
            ))),
        }
    }

    pub fn task_ref(&self) -> &str {
        &self.task_ref
    }

    /// Run the bound task, propagating its error to the caller.
    pub fn invoke(&self) -> anyhow::Result<()> {
        self.task.execute()
    }
}

impl fmt::Debug for TaskBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskBinding")
            .field("task_ref", &self.task_ref)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn binds_single_named_task() {
        let resolver = NamedTaskResolver::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        resolver.register("count", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let binding = TaskBinding::bind("count", &resolver).unwrap();
        binding.invoke().unwrap();
        binding.invoke().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(binding.task_ref(), "count");
    }

    #[test]
    fn rejects_missing_and_ambiguous_references() {
        let resolver = NamedTaskResolver::new();
        resolver.register("dup", || Ok(()));
        resolver.register("dup", || Ok(()));

        let err = TaskBinding::bind("missing", &resolver).unwrap_err();
        assert!(err.to_string().contains("no task found"));

        let err = TaskBinding::bind("dup", &resolver).unwrap_err();
        assert!(err.to_string().contains("2 candidates"));
    }

    #[test]
    fn factory_failure_is_a_configuration_error() {
        let resolver = NamedTaskResolver::new();
        resolver.register_factory("broken", || anyhow::bail!("no database"));
        let err = TaskBinding::bind("broken", &resolver).unwrap_err();
        assert!(matches!(err, AgentError::Configuration(ref m) if m.contains("no database")));
    }

    #[test]
    fn invoke_propagates_task_errors() {
        let resolver = NamedTaskResolver::new();
        resolver.register("fail", || anyhow::bail!("boom"));
        let binding = TaskBinding::bind("fail", &resolver).unwrap();
        assert_eq!(binding.invoke().unwrap_err().to_string(), "boom");
    }

    #[test]
    fn marked_unit_binds_only_marked_operation() {
        let resolver = MarkedUnitResolver::new();
        resolver.register_unit("cleanup", || {
            Ok(TaskUnit::new(vec![
                Operation::helper("prepare", || anyhow::bail!("helper must not run")),
                Operation::task("sweep", || Ok(())),
            ]))
        });
        resolver.register_unit("twice", || {
            Ok(TaskUnit::new(vec![
                Operation::task("a", || Ok(())),
                Operation::task("b", || Ok(())),
            ]))
        });
        resolver.register_unit("none", || {
            Ok(TaskUnit::new(vec![Operation::helper("a", || Ok(()))]))
        });

        let binding = TaskBinding::bind("cleanup", &resolver).unwrap();
        assert!(binding.invoke().is_ok());
        assert!(TaskBinding::bind("twice", &resolver).is_err());
        assert!(TaskBinding::bind("none", &resolver).is_err());
    }

    #[test]
    fn composite_unions_candidates() {
        let named = Arc::new(NamedTaskResolver::new());
        named.register("shared", || Ok(()));
        let units = Arc::new(MarkedUnitResolver::new());
        units.register_unit("shared", || {
            Ok(TaskUnit::new(vec![Operation::task("run", || Ok(()))]))
        });
        units.register_unit("only-unit", || {
            Ok(TaskUnit::new(vec![Operation::task("run", || Ok(()))]))
        });

        let composite = CompositeTaskResolver::new().with(named).with(units);
        assert!(TaskBinding::bind("only-unit", &composite).is_ok());
        assert!(TaskBinding::bind("shared", &composite).is_err());
    }
}
