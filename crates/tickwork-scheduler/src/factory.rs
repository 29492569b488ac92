use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tickwork_core::{AgentConfiguration, CRON_TYPE, TIMER_TYPE};
use tracing::debug;

use crate::agent::Agent;
use crate::cron_scheduler::build_cron_agent;
use crate::error::{AgentError, Result};
use crate::task::TaskResolver;
use crate::timer::build_timer_agent;

/// Builds an agent of one type from its configuration.
pub type AgentConstructor =
    Arc<dyn Fn(AgentConfiguration, &dyn TaskResolver) -> Result<Arc<Agent>> + Send + Sync>;

/// Maps a type discriminator to the constructor for that agent type.
///
/// `timer` and `cron` are registered by [`AgentFactory::new`]; further types
/// register themselves with [`AgentFactory::register`].
pub struct AgentFactory {
    constructors: RwLock<HashMap<String, AgentConstructor>>,
    resolver: Arc<dyn TaskResolver>,
}

impl AgentFactory {
    pub fn new(resolver: Arc<dyn TaskResolver>) -> Self {
        let factory = Self {
            constructors: RwLock::new(HashMap::new()),
            resolver,
        };
        factory.register(TIMER_TYPE, build_timer_agent);
        factory.register(CRON_TYPE, build_cron_agent);
        factory
    }

    /// Register (or replace) the constructor for `kind`.
    pub fn register<F>(&self, kind: &str, constructor: F)
    where
        F: Fn(AgentConfiguration, &dyn TaskResolver) -> Result<Arc<Agent>> + Send + Sync + 'static,
    {
        let kind = kind.to_ascii_lowercase();
        debug!(%kind, "agent type registered");
        self.constructors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, Arc::new(constructor));
    }

    /// Registered type discriminators, sorted.
    pub fn types(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self
            .constructors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        kinds.sort();
        kinds
    }

    pub fn create(&self, config: AgentConfiguration) -> Result<Arc<Agent>> {
        let constructor = self
            .constructors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(config.kind())
            .cloned()
            .ok_or_else(|| AgentError::UnknownAgentType {
                kind: config.kind().to_string(),
            })?;
        constructor(config, self.resolver.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::TimeInterval;
    use crate::task::{NamedTaskResolver, TaskBinding};
    use crate::timer::FixedIntervalScheduler;
    use tickwork_core::AgentState;

    fn resolver() -> Arc<NamedTaskResolver> {
        let resolver = Arc::new(NamedTaskResolver::new());
        resolver.register("noop", || Ok(()));
        resolver
    }

    #[test]
    fn builds_builtin_types() {
        let factory = AgentFactory::new(resolver());
        assert_eq!(factory.types(), vec!["cron".to_string(), "timer".to_string()]);

        let timer = AgentConfiguration::builder("t", "timer")
            .task("noop")
            .schedule("30 seconds")
            .build()
            .unwrap();
        let agent = factory.create(timer).unwrap();
        assert_eq!(agent.kind(), "timer");
        assert_eq!(agent.state(), AgentState::Set);
        assert_eq!(agent.schedule_description(), "30 second(s)");

        let cron = AgentConfiguration::builder("c", "cron")
            .task("noop")
            .schedule("0 0 * * 0")
            .build()
            .unwrap();
        let agent = factory.create(cron).unwrap();
        assert_eq!(agent.schedule_description(), "0 0 * * 0 (at 00:00, on Sunday)");
    }

    #[test]
    fn unknown_type_is_rejected() {
        let factory = AgentFactory::new(resolver());
        let config = AgentConfiguration::builder("x", "webhook")
            .task("noop")
            .schedule("on push")
            .build()
            .unwrap();
        assert!(matches!(
            factory.create(config),
            Err(AgentError::UnknownAgentType { ref kind }) if kind == "webhook"
        ));
    }

    #[test]
    fn binding_failures_surface_as_configuration_errors() {
        let factory = AgentFactory::new(resolver());
        let config = AgentConfiguration::builder("x", "timer")
            .task("missing")
            .build()
            .unwrap();
        assert!(matches!(
            factory.create(config),
            Err(AgentError::Configuration(_))
        ));
    }

    #[test]
    fn custom_types_register_without_touching_dispatch() {
        let factory = AgentFactory::new(resolver());
        factory.register("fast", |config: AgentConfiguration, resolver: &dyn TaskResolver| {
            let task = TaskBinding::bind(config.task(), resolver)?;
            let interval = TimeInterval::parse("1 second")?;
            Ok(Agent::new(config, task, Box::new(FixedIntervalScheduler::new(interval))))
        });
        let config = AgentConfiguration::builder("f", "fast")
            .task("noop")
            .schedule("ignored")
            .build()
            .unwrap();
        assert_eq!(factory.create(config).unwrap().schedule_description(), "1 second(s)");
    }
}
