use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{Instant, MissedTickBehavior};

use crate::application::ports::SessionStore;
use crate::application::saga::SagaManager;

use super::ConversationRequest;

pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(60);
pub const DEFAULT_SAGA_RETENTION: Duration = Duration::from_secs(10 * 60);

/// Periodically expires lapsed sessions and forgets finished saga instances.
pub struct SessionCleanupWorker {
    session_store: Arc<dyn SessionStore>,
    saga_manager: Arc<SagaManager<ConversationRequest>>,
    interval: Duration,
    initial_delay: Duration,
    saga_retention: Duration,
}

impl SessionCleanupWorker {
    pub fn new(
        session_store: Arc<dyn SessionStore>,
        saga_manager: Arc<SagaManager<ConversationRequest>>,
        interval: Duration,
        initial_delay: Duration,
        saga_retention: Duration,
    ) -> Self {
        Self {
            session_store,
            saga_manager,
            interval,
            initial_delay,
            saga_retention,
        }
    }

    pub async fn run(self) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Session cleanup worker started"
        );
        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.initial_delay, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.run_once().await;
        }
    }

    #[tracing::instrument(name = "session_cleanup", skip(self))]
    pub async fn run_once(&self) -> CleanupReport {
        let expired_sessions = match self.session_store.expire_sessions(Utc::now()).await {
            Ok(count) => count,
            Err(e) => {
                tracing::error!(error = %e, "Failed to expire sessions");
                0
            }
        };
        let pruned_sagas = self.saga_manager.prune_finished(self.saga_retention).await;

        tracing::info!(expired_sessions, pruned_sagas, "Session cleanup completed");
        CleanupReport {
            expired_sessions,
            pruned_sagas,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    pub expired_sessions: usize,
    pub pruned_sagas: usize,
}
