// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use ema_core::Agent;

/// A named unit of work bound to an agent.  Unbound tasks run on a fresh
/// agent from the scheduler's factory.
pub struct AgentTask {
    pub name: String,
    pub agent: Option<Arc<Agent>>,
}

impl AgentTask {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            agent: None,
        }
    }

    pub fn bound(name: impl Into<String>, agent: Arc<Agent>) -> Self {
        Self {
            name: name.into(),
            agent: Some(agent),
        }
    }
}

/// Runs agent tasks and provides the idle-wait primitive.
pub struct AgentTaskScheduler {
    factory: Box<dyn Fn() -> Arc<Agent> + Send + Sync>,
}

impl AgentTaskScheduler {
    pub fn new(factory: impl Fn() -> Arc<Agent> + Send + Sync + 'static) -> Self {
        Self {
            factory: Box::new(factory),
        }
    }

    /// Invoke `work` with the task's bound agent, or a freshly created one.
    pub async fn run<W, Fut, T>(&self, task: AgentTask, work: W) -> T
    where
        W: FnOnce(Arc<Agent>, &AgentTaskScheduler) -> Fut,
        Fut: Future<Output = T>,
    {
        let agent = task.agent.unwrap_or_else(|| (self.factory)());
        debug!(task = %task.name, "running agent task");
        work(agent, self).await
    }

    /// Resolve when the agent's `is_running` transitions to false, or when
    /// the timeout elapses.  Returns `true` on idle, `false` on timeout.
    /// Holds no locks while waiting.
    pub async fn wait_for_idle(&self, agent: &Agent, timeout: Option<Duration>) -> bool {
        let mut running = agent.running_watch();
        let wait = async move {
            loop {
                if !*running.borrow_and_update() {
                    return;
                }
                if running.changed().await.is_err() {
                    return;
                }
            }
        };
        match timeout {
            Some(limit) => tokio::time::timeout(limit, wait).await.is_ok(),
            None => {
                wait.await;
                true
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use ema_config::AgentConfig;
    use ema_model::{ScriptedLlm, ScriptedTurn};
    use ema_tools::ToolSet;

    use ema_core::AgentState;

    use super::*;

    fn idle_agent() -> Arc<Agent> {
        Arc::new(Agent::new(
            Arc::new(ScriptedLlm::always_text("ok")),
            AgentConfig::default(),
        ))
    }

    fn scheduler() -> AgentTaskScheduler {
        AgentTaskScheduler::new(idle_agent)
    }

    #[tokio::test]
    async fn unbound_task_runs_on_a_factory_agent() {
        let out = scheduler()
            .run(AgentTask::new("probe"), |agent, _| async move {
                agent.is_running()
            })
            .await;
        assert!(!out);
    }

    #[tokio::test]
    async fn bound_task_uses_its_own_agent() {
        let agent = idle_agent();
        let bound = Arc::clone(&agent);
        let same = scheduler()
            .run(AgentTask::bound("probe", bound), |got, _| async move {
                Arc::ptr_eq(&got, &agent)
            })
            .await;
        assert!(same);
    }

    #[tokio::test]
    async fn wait_for_idle_resolves_immediately_when_idle() {
        let agent = idle_agent();
        assert!(scheduler().wait_for_idle(&agent, None).await);
    }

    #[tokio::test]
    async fn wait_for_idle_times_out_while_running() {
        let agent = Arc::new(Agent::new(
            Arc::new(ScriptedLlm::new(vec![ScriptedTurn::WaitForCancel])),
            AgentConfig::default(),
        ));
        let (_, mut events) = agent.events().subscribe();
        let run = {
            let agent = Arc::clone(&agent);
            tokio::spawn(async move {
                let state = AgentState::new("sys", Arc::new(ToolSet::new()));
                agent.run_with_state(state).await
            })
        };
        // The step marker proves the run is active.
        loop {
            if let Some(ema_core::AgentEvent::StepStarted { .. }) = events.recv().await {
                break;
            }
        }

        let sched = scheduler();
        assert!(!sched
            .wait_for_idle(&agent, Some(Duration::from_millis(20)))
            .await);

        agent.abort();
        assert!(sched.wait_for_idle(&agent, None).await);
        run.await.unwrap().unwrap();
    }
}
