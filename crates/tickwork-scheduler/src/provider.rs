use std::collections::HashMap;
use std::path::PathBuf;

use tickwork_core::{AgentConfiguration, DescriptorFile};
use tracing::{debug, info};

use crate::error::Result;

/// Source of agent configurations for [`AgentManager::load_from`].
///
/// [`AgentManager::load_from`]: crate::manager::AgentManager::load_from
pub trait ConfigurationProvider: Send + Sync {
    fn list_configurations(&self) -> Result<Vec<AgentConfiguration>>;
}

impl ConfigurationProvider for Vec<AgentConfiguration> {
    fn list_configurations(&self) -> Result<Vec<AgentConfiguration>> {
        Ok(self.clone())
    }
}

/// Agents declared in code, optionally overridden by a descriptor file.
pub struct MergedConfigurationProvider {
    declared: Vec<AgentConfiguration>,
    descriptor: Option<PathBuf>,
}

impl MergedConfigurationProvider {
    pub fn new(declared: Vec<AgentConfiguration>) -> Self {
        Self {
            declared,
            descriptor: None,
        }
    }

    pub fn with_descriptor(mut self, path: impl Into<PathBuf>) -> Self {
        self.descriptor = Some(path.into());
        self
    }
}

impl ConfigurationProvider for MergedConfigurationProvider {
    fn list_configurations(&self) -> Result<Vec<AgentConfiguration>> {
        let external = match &self.descriptor {
            Some(path) => {
                let file = DescriptorFile::load(&path.to_string_lossy())?;
                info!(path = %path.display(), agents = file.agents.len(), "descriptor loaded");
                file.agents
            }
            None => Vec::new(),
        };
        Ok(merge(self.declared.clone(), external))
    }
}

/// Merge declared and descriptor configurations.
///
/// A descriptor entry replaces every declared entry bound to the same task
/// reference as a whole; no per-field merging happens. The result is sorted
/// by agent name.
pub fn merge(
    declared: Vec<AgentConfiguration>,
    external: Vec<AgentConfiguration>,
) -> Vec<AgentConfiguration> {
    let overridden: HashMap<&str, &str> = external
        .iter()
        .map(|c| (c.task(), c.name()))
        .collect();

    let mut merged: Vec<AgentConfiguration> = declared
        .into_iter()
        .filter(|c| match overridden.get(c.task()) {
            Some(by) => {
                debug!(
                    agent = %c.name(),
                    task = %c.task(),
                    overridden_by = %by,
                    "declared agent overridden"
                );
                false
            }
            None => true,
        })
        .collect();
    merged.extend(external.iter().cloned());
    merged.sort_by(|a, b| a.name().cmp(b.name()));
    merged
}
