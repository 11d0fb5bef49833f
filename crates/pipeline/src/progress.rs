//! Progress sessions
//!
//! One session per synthesis job. The orchestrator is the only writer;
//! pollers read sessions by id (or the latest active one) and subscribers
//! receive every change as a `ProgressEvent`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use karaoke_tts_config::ProgressConfig;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Starting,
    Processing,
    Combining,
    Completed,
    Error,
}

impl ProgressStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ProgressStatus::Completed | ProgressStatus::Error)
    }
}

/// Progress of one job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSession {
    pub id: String,
    pub total_chunks: usize,
    pub current_chunk: usize,
    pub status: ProgressStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

impl ProgressSession {
    fn new(id: String, total_chunks: usize) -> Self {
        let now = Utc::now();
        Self {
            id,
            total_chunks,
            current_chunk: 0,
            status: ProgressStatus::Starting,
            message: "Starting speech generation...".to_string(),
            error: None,
            created_at: now,
            last_update: now,
        }
    }

    /// Percentage of chunks reached, 100 once completed
    pub fn percentage(&self) -> f64 {
        if self.status == ProgressStatus::Completed {
            return 100.0;
        }
        if self.total_chunks == 0 {
            return 0.0;
        }
        (self.current_chunk as f64 / self.total_chunks as f64 * 100.0).min(100.0)
    }

    fn event(&self) -> ProgressEvent {
        ProgressEvent {
            session_id: self.id.clone(),
            current_chunk: self.current_chunk,
            total_chunks: self.total_chunks,
            percentage: self.percentage(),
            status: self.status,
            message: self.message.clone(),
            error: self.error.clone(),
            timestamp: self.last_update,
        }
    }
}

/// Published on every session change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub session_id: String,
    pub current_chunk: usize,
    pub total_chunks: usize,
    pub percentage: f64,
    pub status: ProgressStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

type Sessions = Arc<RwLock<HashMap<String, ProgressSession>>>;

/// Process-wide progress session registry
pub struct ProgressRegistry {
    sessions: Sessions,
    events: broadcast::Sender<ProgressEvent>,
    config: ProgressConfig,
}

impl ProgressRegistry {
    pub fn new(config: ProgressConfig) -> Self {
        let (events, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            events,
            config,
        }
    }

    /// Start a background sweep removing sessions idle for `stale_after_secs`
    ///
    /// Returns a shutdown sender; send `true` to stop the task.
    pub fn start_cleanup_task(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let registry = Arc::clone(self);
        let period = Duration::from_secs(registry.config.sweep_interval_secs.max(1));

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(period);
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let removed = registry.cleanup_stale();
                        if removed > 0 {
                            tracing::info!(
                                removed,
                                remaining = registry.count(),
                                "Removed stale progress sessions"
                            );
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("Progress cleanup task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }

    /// Create a session for a job of `total_chunks` chunks
    pub fn create_session(&self, total_chunks: usize) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let session = ProgressSession::new(id.clone(), total_chunks);
        let event = session.event();
        self.sessions.write().insert(id.clone(), session);
        self.publish(event);

        tracing::debug!(session_id = %id, total_chunks, "Created progress session");
        id
    }

    fn mutate(&self, id: &str, apply: impl FnOnce(&mut ProgressSession)) -> bool {
        let event = {
            let mut sessions = self.sessions.write();
            let Some(session) = sessions.get_mut(id) else {
                tracing::debug!(session_id = id, "Progress update for unknown session");
                return false;
            };
            apply(session);
            session.last_update = Utc::now();
            session.event()
        };
        self.publish(event);
        true
    }

    /// Record the chunk being worked on
    pub fn update(
        &self,
        id: &str,
        current_chunk: usize,
        status: ProgressStatus,
        message: impl Into<String>,
    ) -> bool {
        let message = message.into();
        self.mutate(id, |session| {
            session.current_chunk = current_chunk.min(session.total_chunks);
            session.status = status;
            session.message = message;
        })
    }

    /// Mark the job finished; the session is removed after `cleanup_delay_secs`
    pub fn complete(&self, id: &str, message: impl Into<String>) -> bool {
        let message = message.into();
        let found = self.mutate(id, |session| {
            session.current_chunk = session.total_chunks;
            session.status = ProgressStatus::Completed;
            session.message = message;
        });
        if found {
            self.schedule_removal(id);
        }
        found
    }

    /// Mark the job failed; the session is removed after `cleanup_delay_secs`
    pub fn error(&self, id: &str, error: impl Into<String>) -> bool {
        let error = error.into();
        let found = self.mutate(id, |session| {
            session.status = ProgressStatus::Error;
            session.message = format!("Error: {error}");
            session.error = Some(error);
        });
        if found {
            self.schedule_removal(id);
        }
        found
    }

    fn schedule_removal(&self, id: &str) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let sessions = Arc::clone(&self.sessions);
        let id = id.to_string();
        let delay = Duration::from_secs(self.config.cleanup_delay_secs);

        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let mut sessions = sessions.write();
            if sessions.get(&id).is_some_and(|s| s.status.is_terminal()) {
                sessions.remove(&id);
                tracing::debug!(session_id = %id, "Removed finished progress session");
            }
        });
    }

    pub fn get(&self, id: &str) -> Option<ProgressSession> {
        self.sessions.read().get(id).cloned()
    }

    /// Most recently updated session that has not finished
    pub fn latest_active(&self) -> Option<ProgressSession> {
        self.sessions
            .read()
            .values()
            .filter(|s| !s.status.is_terminal())
            .max_by_key(|s| s.last_update)
            .cloned()
    }

    pub fn remove(&self, id: &str) -> bool {
        self.sessions.write().remove(id).is_some()
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Remove sessions not updated within `stale_after_secs`; returns how many
    pub fn cleanup_stale(&self) -> usize {
        let max_age = chrono::Duration::seconds(self.config.stale_after_secs as i64);
        let now = Utc::now();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, s| now - s.last_update < max_age);
        before - sessions.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: ProgressEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl Default for ProgressRegistry {
    fn default() -> Self {
        Self::new(ProgressConfig::default())
    }
}

impl std::fmt::Debug for ProgressRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressRegistry")
            .field("sessions", &self.count())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifecycle() {
        let registry = ProgressRegistry::default();
        let id = registry.create_session(4);

        let session = registry.get(&id).unwrap();
        assert_eq!(session.status, ProgressStatus::Starting);
        assert_eq!(session.percentage(), 0.0);

        assert!(registry.update(&id, 2, ProgressStatus::Processing, "Processing chunk 2 of 4"));
        let session = registry.get(&id).unwrap();
        assert_eq!(session.current_chunk, 2);
        assert_eq!(session.percentage(), 50.0);

        assert!(registry.complete(&id, "Done"));
        let session = registry.get(&id).unwrap();
        assert_eq!(session.status, ProgressStatus::Completed);
        assert_eq!(session.percentage(), 100.0);

        assert!(!registry.update("missing", 1, ProgressStatus::Processing, "x"));
    }

    #[test]
    fn test_latest_active_skips_finished() {
        let registry = ProgressRegistry::default();
        let first = registry.create_session(2);
        let second = registry.create_session(3);
        registry.error(&second, "boom");

        let latest = registry.latest_active().unwrap();
        assert_eq!(latest.id, first);

        registry.complete(&first, "Done");
        assert!(registry.latest_active().is_none());
        assert_eq!(registry.get(&second).unwrap().error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let registry = ProgressRegistry::default();
        let mut events = registry.subscribe();

        let id = registry.create_session(2);
        registry.update(&id, 1, ProgressStatus::Processing, "Processing chunk 1 of 2");

        let created = events.recv().await.unwrap();
        assert_eq!(created.session_id, id);
        assert_eq!(created.status, ProgressStatus::Starting);

        let update = events.recv().await.unwrap();
        assert_eq!(update.current_chunk, 1);
        assert_eq!(update.percentage, 50.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_sessions_removed_after_delay() {
        let registry = ProgressRegistry::default();
        let id = registry.create_session(1);
        registry.complete(&id, "Done");
        assert!(registry.get(&id).is_some());

        tokio::time::sleep(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;
        assert!(registry.get(&id).is_none());
    }

    #[test]
    fn test_cleanup_stale() {
        let registry = ProgressRegistry::new(ProgressConfig {
            stale_after_secs: 0,
            ..Default::default()
        });
        registry.create_session(1);
        registry.create_session(2);
        assert_eq!(registry.cleanup_stale(), 2);
        assert_eq!(registry.count(), 0);

        let keeping = ProgressRegistry::default();
        keeping.create_session(1);
        assert_eq!(keeping.cleanup_stale(), 0);
    }
}
