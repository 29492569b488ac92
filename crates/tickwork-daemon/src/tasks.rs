use tickwork_core::{runtime, AgentConfiguration, TIMER_TYPE};
use tickwork_scheduler::NamedTaskResolver;
use tracing::info;

pub const HEARTBEAT: &str = "heartbeat";

/// Register the tasks the daemon ships with.
pub fn register_builtin(resolver: &NamedTaskResolver) {
    resolver.register(HEARTBEAT, || {
        info!(
            uptime_secs = runtime::uptime().as_secs(),
            version = runtime::version(),
            "heartbeat"
        );
        Ok(())
    });
}

/// Agents declared in code. A descriptor entry bound to the same task
/// replaces the matching one here.
pub fn declared_agents() -> anyhow::Result<Vec<AgentConfiguration>> {
    let heartbeat = AgentConfiguration::builder(HEARTBEAT, TIMER_TYPE)
        .task(HEARTBEAT)
        .schedule("1 minute")
        .hidden(true)
        .description("Logs daemon uptime")
        .build()?;
    Ok(vec![heartbeat])
}
