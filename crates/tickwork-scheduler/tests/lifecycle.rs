// Agent state machine behaviour observed through the public API.
// Blocking tasks run on the blocking pool, so these tests use the
// multi-threaded runtime.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tickwork_core::{AgentConfiguration, AgentState};
use tickwork_scheduler::{
    Agent, AgentError, NamedTaskResolver, Result, Scheduler, TaskBinding,
};

/// Never fires on its own; runs are driven by the test.
struct Idle;

impl Scheduler for Idle {
    fn arm(&self, _agent: &Arc<Agent>) -> Result<()> {
        Ok(())
    }

    fn disarm(&self) {}

    fn describe(&self) -> String {
        "idle".to_string()
    }
}

/// A task that blocks until released, counting its executions.
#[derive(Clone, Default)]
struct Gate {
    released: Arc<AtomicBool>,
    runs: Arc<AtomicUsize>,
}

impl Gate {
    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }

    fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

fn agent(
    stop_timeout_secs: i64,
    task: impl Fn() -> anyhow::Result<()> + Send + Sync + 'static,
) -> Arc<Agent> {
    let resolver = NamedTaskResolver::new();
    resolver.register("work", task);
    let config = AgentConfiguration::builder("worker", "idle")
        .task("work")
        .schedule("never")
        .stop_timeout_secs(stop_timeout_secs)
        .build()
        .unwrap();
    let binding = TaskBinding::bind("work", &resolver).unwrap();
    Agent::new(config, binding, Box::new(Idle))
}

fn gated_agent(stop_timeout_secs: i64) -> (Arc<Agent>, Gate) {
    let gate = Gate::default();
    let inner = gate.clone();
    let agent = agent(stop_timeout_secs, move || {
        inner.runs.fetch_add(1, Ordering::SeqCst);
        while !inner.released.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(10));
        }
        Ok(())
    });
    (agent, gate)
}

/// Start a run on the blocking pool and wait until the agent reports it.
async fn begin_run(agent: &Arc<Agent>, manual: bool) -> tokio::task::JoinHandle<Result<()>> {
    let runner = Arc::clone(agent);
    let handle = tokio::task::spawn_blocking(move || runner.run(manual));
    while !agent.is_running() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    handle
}

#[tokio::test]
async fn start_rejects_started_and_stopped_agents() {
    let agent = agent(0, || Ok(()));
    assert_eq!(agent.state(), AgentState::Set);
    assert!(agent.snapshot().start_date.is_none());

    agent.start().await.unwrap();
    assert_eq!(agent.state(), AgentState::Started);
    assert!(agent.snapshot().start_date.is_some());
    assert!(matches!(agent.start().await, Err(AgentError::AlreadyStarted { .. })));

    agent.stop().await.unwrap();
    assert_eq!(agent.state(), AgentState::Stopped);
    assert!(agent.snapshot().start_date.is_none());

    let err = agent.start().await.unwrap_err();
    assert!(matches!(
        err,
        AgentError::IllegalState { ref reason, .. } if reason.contains("reset required")
    ));
    assert!(matches!(agent.stop().await, Err(AgentError::AlreadyStopped { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_rejects_agent_running_from_started() {
    let (agent, gate) = gated_agent(10);
    agent.start().await.unwrap();

    let run = begin_run(&agent, false).await;
    assert_eq!(agent.state(), AgentState::Running);
    assert!(agent.is_started());
    assert!(matches!(agent.start().await, Err(AgentError::AlreadyStarted { .. })));

    gate.release();
    run.await.unwrap().unwrap();
    assert_eq!(agent.state(), AgentState::Started);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn overlapping_runs_are_rejected_or_skipped() {
    let (agent, gate) = gated_agent(10);
    let run = begin_run(&agent, true).await;

    assert!(matches!(agent.run(true), Err(AgentError::AlreadyRunning { .. })));
    assert!(agent.run(false).is_ok());
    assert_eq!(agent.state(), AgentState::Running);

    gate.release();
    run.await.unwrap().unwrap();
    assert_eq!(gate.runs(), 1);
    assert_eq!(agent.snapshot().execution_count, 1);
}

#[tokio::test]
async fn run_restores_previous_state() {
    let failing = agent(0, || anyhow::bail!("disk full"));
    failing.run(true).unwrap();
    assert_eq!(failing.state(), AgentState::Set);

    failing.start().await.unwrap();
    failing.run(false).unwrap();
    assert_eq!(failing.state(), AgentState::Started);

    let snap = failing.snapshot();
    assert_eq!(snap.execution_count, 2);
    assert_eq!(snap.failure_count, 2);
    assert!(snap.last_execution_duration.is_some());
    assert!(snap.last_execution_date.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_waits_for_run_finishing_within_timeout() {
    let (agent, gate) = gated_agent(10);
    agent.start().await.unwrap();
    let run = begin_run(&agent, false).await;

    let releaser = gate.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        releaser.release();
    });

    agent.stop().await.unwrap();
    assert_eq!(agent.state(), AgentState::Stopped);
    assert!(agent.snapshot().start_date.is_none());
    run.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_with_negative_timeout_waits_past_first_poll() {
    let (agent, gate) = gated_agent(-1);
    agent.start().await.unwrap();
    let run = begin_run(&agent, false).await;

    let releaser = gate.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2500)).await;
        releaser.release();
    });

    agent.stop().await.unwrap();
    assert_eq!(agent.state(), AgentState::Stopped);
    assert_eq!(gate.runs(), 1);
    run.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_times_out_and_manual_run_bypasses_stop_request() {
    let (agent, gate) = gated_agent(2);
    agent.start().await.unwrap();
    let run = begin_run(&agent, false).await;

    let err = agent.stop().await.unwrap_err();
    assert!(matches!(err, AgentError::Timeout { secs: 2, .. }));
    assert_eq!(agent.state(), AgentState::Running);
    assert!(agent.stop_requested());

    gate.release();
    run.await.unwrap().unwrap();
    assert_eq!(agent.state(), AgentState::Started);
    assert_eq!(gate.runs(), 1);

    // Stop was requested but has not completed: automatic runs are
    // suppressed, manual runs still execute.
    agent.run(false).unwrap();
    assert_eq!(gate.runs(), 1);
    agent.run(true).unwrap();
    assert_eq!(gate.runs(), 2);

    agent.stop().await.unwrap();
    assert_eq!(agent.state(), AgentState::Stopped);
}

#[tokio::test]
async fn counts_every_run_in_history() {
    let agent = agent(0, || Ok(()));
    for _ in 0..1441 {
        agent.run(false).unwrap();
    }
    let snap = agent.snapshot();
    assert_eq!(snap.execution_count, 1441);
    assert_eq!(snap.history_len, 1440);
    assert_eq!(snap.failure_count, 0);
    assert_eq!(snap.state, AgentState::Set);
}
