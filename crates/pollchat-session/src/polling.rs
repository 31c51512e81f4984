//! Background loop that keeps presence and history current.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use pollchat_core::{ChatError, ChatMessage, IncomingMessage, RemoteService, build_roster};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::state::SharedState;

/// Who the loop polls for.
#[derive(Clone)]
pub struct PollTarget {
    pub service: Arc<dyn RemoteService>,
    pub token: String,
    pub username: String,
    /// Session epoch the results belong to.
    pub epoch: u64,
}

/// Tick counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollingStats {
    pub ticks_completed: u64,
    pub ticks_failed: u64,
}

#[derive(Default)]
struct Counters {
    completed: AtomicU64,
    failed: AtomicU64,
}

struct TickResult {
    all_users: Vec<String>,
    online_users: Vec<String>,
    messages: Vec<IncomingMessage>,
}

/// Handle to a running polling task.
pub struct PollingLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    counters: Arc<Counters>,
}

impl PollingLoop {
    /// Start polling immediately, then every `interval`.
    #[must_use]
    pub fn spawn(target: PollTarget, state: Arc<SharedState>, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let counters = Arc::new(Counters::default());
        let handle = tokio::spawn(run(
            target,
            state,
            interval,
            cancel.clone(),
            Arc::clone(&counters),
        ));
        Self {
            cancel,
            handle,
            counters,
        }
    }

    #[must_use]
    pub fn stats(&self) -> PollingStats {
        PollingStats {
            ticks_completed: self.counters.completed.load(Ordering::Relaxed),
            ticks_failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Cancel and wait for the task to exit. Nothing is published afterwards.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                tracing::error!("polling task panicked: {e}");
            }
        }
    }
}

async fn run(
    target: PollTarget,
    state: Arc<SharedState>,
    interval: Duration,
    cancel: CancellationToken,
    counters: Arc<Counters>,
) {
    tracing::info!(user = %target.username, ?interval, "polling started");

    while !cancel.is_cancelled() {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = fetch(target.service.as_ref(), &target.token) => result,
        };

        match result {
            Ok(tick) => {
                if cancel.is_cancelled() {
                    break;
                }
                publish(&target, &state, tick);
                counters.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(category = ?e.category(), "polling error: {e}");
            }
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }
    }

    tracing::info!(user = %target.username, "polling stopped");
}

async fn fetch(service: &dyn RemoteService, token: &str) -> Result<TickResult, ChatError> {
    let all_users = service.list_all_users().await?;
    let online_users = service.list_online_users().await?;
    let messages = service.poll(token).await?;
    Ok(TickResult {
        all_users,
        online_users,
        messages,
    })
}

fn publish(target: &PollTarget, state: &SharedState, tick: TickResult) {
    let roster = build_roster(&tick.all_users, &tick.online_users);
    if !state.publish_roster(target.epoch, roster, &target.username) {
        tracing::debug!("dropping roster from a stale session");
        return;
    }

    if tick.messages.is_empty() {
        return;
    }
    let count = tick.messages.len();
    let messages: Vec<ChatMessage> = tick.messages.into_iter().map(ChatMessage::incoming).collect();
    if state.append(target.epoch, messages) {
        tracing::debug!(count, "received messages");
    }
}

#[cfg(test)]
mod tests {
    use pollchat_transport::MemoryService;

    use super::*;

    async fn start(service: &Arc<MemoryService>, state: &Arc<SharedState>) -> PollingLoop {
        let token = service.login("Bern", "pw").await.unwrap();
        PollingLoop::spawn(
            PollTarget {
                service: Arc::clone(service) as Arc<dyn RemoteService>,
                token,
                username: "Bern".into(),
                epoch: state.epoch(),
            },
            Arc::clone(state),
            Duration::from_secs(2),
        )
    }

    async fn wait_for(cond: impl Fn() -> bool) {
        for _ in 0..500 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_publishes_roster_and_messages() {
        let service = Arc::new(MemoryService::new().with_user("Bern", "pw"));
        service.set_online("Ada", true);
        service.set_online("Carl", false);
        service.deliver("Ada", "Bern", "one");
        service.deliver("Ada", "Bern", "two");
        let state = SharedState::new(16);

        let polling = start(&service, &state).await;
        wait_for(|| state.log().len() == 2).await;

        let roster = state.roster();
        let names: Vec<_> = roster.iter().map(|u| (u.username.as_str(), u.is_online)).collect();
        assert_eq!(names, [("Ada", true), ("Carl", false)]);

        let bodies: Vec<_> = state.log().snapshot().into_iter().map(|m| m.body).collect();
        assert_eq!(bodies, ["one", "two"]);
        assert!(polling.is_running());
        polling.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn log_only_grows_across_ticks() {
        let service = Arc::new(MemoryService::new().with_user("Bern", "pw"));
        let state = SharedState::new(64);
        let polling = start(&service, &state).await;

        let mut seen: Vec<ChatMessage> = Vec::new();
        for round in 0..5 {
            service.deliver("Ada", "Bern", &format!("m{round}"));
            if round == 2 {
                service.fail_next_polls(1);
            }
            tokio::time::sleep(Duration::from_secs(2)).await;
            let now = state.log().snapshot();
            assert!(now.len() >= seen.len());
            assert_eq!(&now[..seen.len()], &seen[..]);
            seen = now;
        }
        wait_for(|| state.log().len() == 5).await;
        assert!(polling.stats().ticks_failed >= 1);
        polling.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn errors_keep_previous_state() {
        let service = Arc::new(MemoryService::new().with_user("Bern", "pw"));
        service.set_online("Ada", true);
        let state = SharedState::new(16);
        let polling = start(&service, &state).await;
        wait_for(|| !state.roster().is_empty()).await;

        service.fail_next_polls(3);
        service.deliver("Ada", "Bern", "eventually");
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(state.roster().len(), 1);

        wait_for(|| state.log().len() == 1).await;
        assert_eq!(polling.stats().ticks_failed, 3);
        polling.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_ends_the_task() {
        let service = Arc::new(MemoryService::new().with_user("Bern", "pw"));
        let state = SharedState::new(16);
        let polling = start(&service, &state).await;
        wait_for(|| polling.stats().ticks_completed >= 1).await;

        polling.stop().await;
        service.deliver("Ada", "Bern", "too late");
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(state.log().is_empty());
    }
}
