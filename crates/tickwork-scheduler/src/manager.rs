use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tickwork_core::AgentConfiguration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::agent::Agent;
use crate::error::{AgentError, Result};
use crate::factory::AgentFactory;
use crate::provider::ConfigurationProvider;
use crate::report::{AgentSummary, StatusReport};

/// Registry of live agents, keyed by name.
///
/// Lookups and per-agent operations go straight to the concurrent map;
/// inserts, removals and resets additionally take the manager's mutation
/// lock so a check-then-replace sequence is never interleaved with another.
/// Listings are sorted by name.
pub struct AgentManager {
    agents: DashMap<String, Arc<Agent>>,
    factory: AgentFactory,
    mutation: Mutex<()>,
}

impl AgentManager {
    pub fn new(factory: AgentFactory) -> Self {
        Self {
            agents: DashMap::new(),
            factory,
            mutation: Mutex::new(()),
        }
    }

    pub fn factory(&self) -> &AgentFactory {
        &self.factory
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Build and register one agent per configuration.
    ///
    /// A configuration that fails to build, or whose name is already taken,
    /// is logged and skipped. Returns the number of agents registered.
    pub fn load_agents(&self, configs: impl IntoIterator<Item = AgentConfiguration>) -> usize {
        let mut loaded = 0;
        for config in configs {
            let name = config.name().to_string();
            let agent = match self.factory.create(config) {
                Ok(agent) => agent,
                Err(e) => {
                    error!(agent = %name, error = %e, code = e.code(), "failed to load agent");
                    continue;
                }
            };
            match self.add_agent(agent) {
                Ok(()) => loaded += 1,
                Err(e) => warn!(agent = %name, error = %e, "agent skipped"),
            }
        }
        info!(loaded, total = self.agents.len(), "agents loaded");
        loaded
    }

    /// Pull configurations from `provider`, then [`load_agents`](Self::load_agents).
    pub fn load_from(&self, provider: &dyn ConfigurationProvider) -> Result<usize> {
        let configs = provider.list_configurations()?;
        Ok(self.load_agents(configs))
    }

    /// Register an already-built agent under its name.
    pub fn add_agent(&self, agent: Arc<Agent>) -> Result<()> {
        let _guard = self.lock_mutation();
        match self.agents.entry(agent.name().to_string()) {
            Entry::Occupied(entry) => Err(AgentError::AgentExists {
                name: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                info!(agent = %agent.name(), kind = %agent.kind(), "agent registered");
                entry.insert(agent);
                Ok(())
            }
        }
    }

    pub fn find_by_name(&self, name: &str) -> Result<Arc<Agent>> {
        self.agents
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| AgentError::UnknownAgent {
                name: name.to_string(),
            })
    }

    pub async fn start_agent(&self, name: &str) -> Result<()> {
        self.find_by_name(name)?.start().await
    }

    pub async fn stop_agent(&self, name: &str) -> Result<()> {
        self.find_by_name(name)?.stop().await
    }

    /// Execute the agent's task once, outside its schedule, on the blocking
    /// pool. Resolves once the run has finished.
    pub async fn run_now(&self, name: &str) -> Result<()> {
        let agent = self.find_by_name(name)?;
        info!(agent = %name, "manual run requested");
        tokio::task::spawn_blocking(move || agent.run(true))
            .await
            .map_err(|e| AgentError::IllegalState {
                name: name.to_string(),
                reason: format!("manual run aborted: {e}"),
            })?
    }

    /// Unregister an agent that is neither started nor running.
    pub fn remove_agent(&self, name: &str) -> Result<()> {
        let _guard = self.lock_mutation();
        let agent = self.find_by_name(name)?;
        ensure_idle(&agent)?;
        self.agents.remove(name);
        info!(agent = %name, "agent removed");
        Ok(())
    }

    /// Replace an idle agent with a fresh instance built from its original
    /// configuration, discarding its runtime history.
    pub fn reset_agent(&self, name: &str) -> Result<Arc<Agent>> {
        let _guard = self.lock_mutation();
        let agent = self.find_by_name(name)?;
        ensure_idle(&agent)?;
        let fresh = self.factory.create(agent.configuration().clone())?;
        self.agents.insert(name.to_string(), Arc::clone(&fresh));
        info!(agent = %name, "agent reset");
        Ok(fresh)
    }

    /// Start every agent flagged `auto_start` that has not been started yet.
    /// Returns the number of agents started.
    pub async fn start_auto_agents(&self) -> usize {
        let mut started = 0;
        for agent in self.sorted_agents() {
            if !agent.configuration().auto_start() || agent.is_started() {
                continue;
            }
            match agent.start().await {
                Ok(()) => started += 1,
                Err(e) => error!(agent = %agent.name(), error = %e, "auto-start failed"),
            }
        }
        started
    }

    /// Stop every started or running agent concurrently, waiting for each to
    /// finish or time out. Failures are logged.
    pub async fn stop_all(&self) {
        let mut stops = JoinSet::new();
        for agent in self.sorted_agents() {
            if !(agent.is_started() || agent.is_running()) {
                continue;
            }
            stops.spawn(async move {
                let result = agent.stop().await;
                (agent, result)
            });
        }

        while let Some(joined) = stops.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((agent, Err(e))) => {
                    warn!(agent = %agent.name(), error = %e, "agent did not stop cleanly")
                }
                Err(e) => error!(error = %e, "stop task failed"),
            }
        }
        info!("all agents stopped");
    }

    /// Names of agents that are not hidden.
    pub fn public_agent_names(&self) -> Vec<String> {
        self.sorted_agents()
            .into_iter()
            .filter(|a| !a.hidden())
            .map(|a| a.name().to_string())
            .collect()
    }

    /// Summary of every registered agent, hidden ones included.
    pub fn agent_summaries(&self) -> Vec<AgentSummary> {
        self.list_agents(true)
    }

    pub fn list_agents(&self, include_hidden: bool) -> Vec<AgentSummary> {
        self.sorted_agents()
            .iter()
            .filter(|a| include_hidden || !a.hidden())
            .map(|a| AgentSummary::of(a))
            .collect()
    }

    pub fn status_report(&self, name: &str) -> Result<StatusReport> {
        let agent = self.find_by_name(name)?;
        Ok(StatusReport::of(&agent))
    }

    fn sorted_agents(&self) -> Vec<Arc<Agent>> {
        let mut agents: Vec<Arc<Agent>> = self
            .agents
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        agents.sort_by(|a, b| a.name().cmp(b.name()));
        agents
    }

    fn lock_mutation(&self) -> MutexGuard<'_, ()> {
        self.mutation.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn ensure_idle(agent: &Agent) -> Result<()> {
    let reason = if agent.is_running() {
        "running; wait for the run to finish and stop it first"
    } else if agent.is_started() {
        "started; stop it first"
    } else {
        return Ok(());
    };
    Err(AgentError::IllegalState {
        name: agent.name().to_string(),
        reason: reason.to_string(),
    })
}
