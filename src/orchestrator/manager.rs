//! Registry of live sync sessions, one per job id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

pub use crate::channel::client::validate_job_id;

use crate::channel::client::JobsClient;
use crate::channel::pull::HttpPullSource;
use crate::channel::push::HttpPushSource;
use crate::channel::{PullSource, PushSource};
use crate::config::{SyncConfig, TimingConfig};
use crate::{AppError, Result};

use super::session::{SyncHandle, SyncSession};

/// Starts and stops sync sessions, enforcing one live session per job.
pub struct SyncManager {
    push: Arc<dyn PushSource>,
    pull: Arc<dyn PullSource>,
    timing: TimingConfig,
    sessions: Mutex<HashMap<String, SyncHandle>>,
}

impl SyncManager {
    /// Build a manager over arbitrary channel sources.
    #[must_use]
    pub fn new(push: Arc<dyn PushSource>, pull: Arc<dyn PullSource>, timing: TimingConfig) -> Self {
        Self {
            push,
            pull,
            timing,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Build a manager talking HTTP to the configured importer API.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Http` if the HTTP client cannot be built.
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let client = JobsClient::new(config)?;
        Ok(Self::new(
            Arc::new(HttpPushSource::new(client.clone())),
            Arc::new(HttpPullSource::new(client)),
            config.timing.clone(),
        ))
    }

    /// Start following `job_id`.
    ///
    /// Sessions that have terminated on their own are dropped from the
    /// registry first, so a finished job id can be started again. Must be
    /// called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidJobId` if the id fails [`validate_job_id`].
    /// - `AppError::AlreadyWatching` if a live session for the id exists.
    pub fn start(&self, job_id: &str) -> Result<SyncHandle> {
        validate_job_id(job_id)?;

        let mut sessions = self.lock();
        prune_terminated(&mut sessions);
        if let Some(existing) = sessions.get(job_id) {
            return Err(AppError::AlreadyWatching(format!(
                "job {job_id} already has live session {}",
                existing.session_id()
            )));
        }

        let handle = SyncSession::new(
            job_id,
            Arc::clone(&self.push),
            Arc::clone(&self.pull),
            self.timing.clone(),
        )
        .spawn();
        info!(job_id, session_id = handle.session_id(), "sync session started");
        sessions.insert(job_id.to_owned(), handle.clone());
        Ok(handle)
    }

    /// Stop and forget the session for `job_id`.
    ///
    /// Returns whether a session was registered. Safe to call repeatedly.
    pub fn stop(&self, job_id: &str) -> bool {
        let removed = self.lock().remove(job_id);
        match removed {
            Some(handle) => {
                handle.stop();
                true
            }
            None => false,
        }
    }

    /// Handle for `job_id`, if a live session is registered.
    #[must_use]
    pub fn get(&self, job_id: &str) -> Option<SyncHandle> {
        let mut sessions = self.lock();
        prune_terminated(&mut sessions);
        sessions.get(job_id).cloned()
    }

    /// Ids of live sessions, sorted.
    #[must_use]
    pub fn active_job_ids(&self) -> Vec<String> {
        let mut sessions = self.lock();
        prune_terminated(&mut sessions);
        let mut ids: Vec<String> = sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of registered sessions, including any not yet pruned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no sessions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Stop every registered session.
    pub fn shutdown(&self) {
        let drained: Vec<SyncHandle> = self.lock().drain().map(|(_, handle)| handle).collect();
        for handle in &drained {
            handle.stop();
        }
        info!(count = drained.len(), "sync manager shut down");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SyncHandle>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Forget sessions that reached `Terminated`; their handles keep the final view.
fn prune_terminated(sessions: &mut HashMap<String, SyncHandle>) {
    sessions.retain(|job_id, handle| {
        let live = !handle.is_terminated();
        if !live {
            debug!(job_id = %job_id, "pruning terminated session");
        }
        live
    });
}
