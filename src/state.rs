use crate::catalog::ExamCatalog;
use crate::config::Config;
use crate::content::ContentSource;
use crate::models::User;
use crate::session::{ExamSession, Submission, TickOutcome};
use crate::timer::{spawn_ticker, Clock, TimerHandle};
use crate::ws_protocol::{WsEnvelope, SESSION_CLOSED, SESSION_SUBMITTED, TIMER_TICK};
use dashmap::DashMap;
use serde_json::json;
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{info, warn};

pub type SharedSession = Arc<Mutex<ExamSession>>;

pub struct ActiveSession {
    pub owner_id: String,
    pub exam_id: String,
    pub session: SharedSession,
    timer: TimerHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAccess {
    Missing,
    Forbidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abandon {
    Removed,
    Missing,
    AlreadySubmitted,
}

pub struct InMemoryDb {
    pub logins: RwLock<HashMap<String, User>>,
    pub sessions: RwLock<HashMap<String, ActiveSession>>,
    pub results: RwLock<HashMap<(String, String), Submission>>,
    pub broadcasters: DashMap<String, broadcast::Sender<WsEnvelope>>,
}

impl InMemoryDb {
    pub fn new() -> Self {
        Self {
            logins: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            results: RwLock::new(HashMap::new()),
            broadcasters: DashMap::new(),
        }
    }
}

impl Default for InMemoryDb {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<InMemoryDb>,
    pub content: Arc<dyn ContentSource>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(content: Arc<dyn ContentSource>, config: Config) -> Self {
        Self {
            db: Arc::new(InMemoryDb::new()),
            content,
            config: Arc::new(config),
        }
    }

    pub fn publish(&self, session_id: &str, envelope: WsEnvelope) {
        if let Some(sender) = self.db.broadcasters.get(session_id) {
            let _ = sender.send(envelope);
        }
    }

    /// Starts a session for the user, or returns the one already running for
    /// this exam. The flag is `true` when an existing session was resumed.
    pub async fn start_session(&self, user: &User, catalog: Arc<ExamCatalog>) -> (String, bool) {
        let mut sessions = self.db.sessions.write().await;
        if let Some((id, _)) = sessions
            .iter()
            .find(|(_, s)| s.owner_id == user.id && s.exam_id == catalog.id())
        {
            return (id.clone(), true);
        }

        let id = uuid::Uuid::new_v4().to_string();
        let exam_id = catalog.id().to_string();
        let session: SharedSession = Arc::new(Mutex::new(ExamSession::new(id.clone(), catalog)));
        let (sender, _) = broadcast::channel(64);
        self.db.broadcasters.insert(id.clone(), sender);

        // The sessions lock is held until the entry exists, so an early expiry
        // always finds it.
        let timer = self.spawn_countdown(id.clone(), session.clone());
        sessions.insert(
            id.clone(),
            ActiveSession {
                owner_id: user.id.clone(),
                exam_id: exam_id.clone(),
                session,
                timer,
            },
        );
        info!(session = %id, exam = %exam_id, user = %user.id, "exam session started");
        (id, false)
    }

    fn spawn_countdown(&self, session_id: String, session: SharedSession) -> TimerHandle {
        let state = self.clone();
        spawn_ticker(self.config.tick, move || {
            let state = state.clone();
            let session_id = session_id.clone();
            let session = session.clone();
            async move {
                let outcome = session.lock().await.tick();
                match outcome {
                    TickOutcome::Running(remaining) => {
                        state.publish(
                            &session_id,
                            WsEnvelope::now(
                                TIMER_TICK,
                                json!({
                                    "remainingSecs": remaining,
                                    "clock": Clock::from_secs(remaining).to_string()
                                }),
                            ),
                        );
                        ControlFlow::Continue(())
                    }
                    TickOutcome::Submitted(submission) => {
                        info!(session = %session_id, "exam time expired, submitting");
                        state.complete_session(&session_id, submission, true).await;
                        ControlFlow::Break(())
                    }
                    TickOutcome::Idle => ControlFlow::Break(()),
                }
            }
        })
    }

    pub async fn session_for(&self, session_id: &str, user_id: &str) -> Result<SharedSession, SessionAccess> {
        let sessions = self.db.sessions.read().await;
        let entry = sessions.get(session_id).ok_or(SessionAccess::Missing)?;
        if entry.owner_id != user_id {
            return Err(SessionAccess::Forbidden);
        }
        Ok(entry.session.clone())
    }

    pub async fn complete_session(&self, session_id: &str, submission: Submission, from_timer: bool) {
        let removed = self.db.sessions.write().await.remove(session_id);
        let Some(mut entry) = removed else {
            warn!(session = %session_id, "completed session was no longer registered");
            return;
        };
        if from_timer {
            entry.timer.detach();
        } else {
            entry.timer.cancel();
        }

        self.publish(
            session_id,
            WsEnvelope::now(
                SESSION_SUBMITTED,
                json!({
                    "examId": submission.exam_id,
                    "reason": submission.reason,
                    "next": {"screen": "results", "examId": submission.exam_id}
                }),
            ),
        );
        self.db.broadcasters.remove(session_id);
        self.db
            .results
            .write()
            .await
            .insert((entry.owner_id.clone(), submission.exam_id.clone()), submission);
    }

    pub async fn abandon_session(&self, session_id: &str) -> Abandon {
        let mut sessions = self.db.sessions.write().await;
        let Some(entry) = sessions.get(session_id) else {
            return Abandon::Missing;
        };
        // A submitted session is finished by whoever submitted it.
        if entry.session.lock().await.is_submitted() {
            return Abandon::AlreadySubmitted;
        }
        let Some(entry) = sessions.remove(session_id) else {
            return Abandon::Missing;
        };
        drop(sessions);

        self.publish(session_id, WsEnvelope::now(SESSION_CLOSED, json!({"examId": entry.exam_id})));
        self.db.broadcasters.remove(session_id);
        info!(session = %session_id, exam = %entry.exam_id, "exam session abandoned");
        Abandon::Removed
    }

    pub async fn submission_for(&self, user_id: &str, exam_id: &str) -> Option<Submission> {
        self.db
            .results
            .read()
            .await
            .get(&(user_id.to_string(), exam_id.to_string()))
            .cloned()
    }

    pub async fn active_timer_count(&self) -> usize {
        self.db
            .sessions
            .read()
            .await
            .values()
            .filter(|s| !s.timer.is_finished())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::MockContent;
    use crate::models::fixtures::sample_exam;
    use crate::models::AnswerValue;
    use crate::session::SubmitReason;
    use std::time::Duration;

    fn test_state() -> AppState {
        let content = MockContent::from_exams(vec![sample_exam()]).unwrap();
        AppState::new(Arc::new(content), Config::default())
    }

    fn student() -> User {
        User {
            id: "u1".into(),
            name: "Test Student".into(),
            email: "t@example.edu".into(),
            avatar: String::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_submits_and_releases_timer() {
        let state = test_state();
        let catalog = state.content.exam("exam-t").unwrap();
        let (id, resumed) = state.start_session(&student(), catalog).await;
        assert!(!resumed);
        let mut events = state.db.broadcasters.get(&id).unwrap().subscribe();

        {
            let session = state.session_for(&id, "u1").await.unwrap();
            session.lock().await.set_answer(1, AnswerValue::Text("A".into())).unwrap();
        }

        tokio::time::sleep(Duration::from_secs(61)).await;

        assert!(state.db.sessions.read().await.is_empty());
        assert!(state.db.broadcasters.is_empty());
        let submission = state.submission_for("u1", "exam-t").await.unwrap();
        assert_eq!(submission.reason, SubmitReason::TimeExpired);
        assert_eq!(submission.answered, 1);
        assert_eq!(submission.elapsed_secs, 60);

        let first = events.recv().await.unwrap();
        assert_eq!(first.event, TIMER_TICK);
        assert_eq!(first.payload["remainingSecs"], 59);
        let mut last = first;
        while let Ok(env) = events.try_recv() {
            last = env;
        }
        assert_eq!(last.event, SESSION_SUBMITTED);
    }

    #[tokio::test(start_paused = true)]
    async fn abandon_cancels_countdown() {
        let state = test_state();
        let catalog = state.content.exam("exam-t").unwrap();
        let (id, _) = state.start_session(&student(), catalog).await;
        let session = state.session_for(&id, "u1").await.unwrap();

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(state.active_timer_count().await, 1);
        assert_eq!(state.abandon_session(&id).await, Abandon::Removed);
        assert_eq!(state.abandon_session(&id).await, Abandon::Missing);

        tokio::time::sleep(Duration::from_secs(120)).await;
        let guard = session.lock().await;
        assert_eq!(guard.remaining_secs(), 57);
        assert!(!guard.is_submitted());
        assert!(state.submission_for("u1", "exam-t").await.is_none());
    }

    #[tokio::test]
    async fn resumes_and_guards_ownership() {
        let state = test_state();
        let catalog = state.content.exam("exam-t").unwrap();
        let (first, _) = state.start_session(&student(), catalog.clone()).await;
        let (again, resumed) = state.start_session(&student(), catalog).await;
        assert!(resumed);
        assert_eq!(first, again);
        assert_eq!(state.session_for(&first, "other").await.err(), Some(SessionAccess::Forbidden));
        assert_eq!(state.session_for("nope", "u1").await.err(), Some(SessionAccess::Missing));
    }

    #[tokio::test]
    async fn confirmed_submission_is_stored() {
        let state = test_state();
        let catalog = state.content.exam("exam-t").unwrap();
        let (id, _) = state.start_session(&student(), catalog).await;
        let session = state.session_for(&id, "u1").await.unwrap();
        let submission = {
            let mut guard = session.lock().await;
            guard.request_submit().unwrap();
            guard.confirm_submit().unwrap()
        };
        state.complete_session(&id, submission, false).await;
        assert!(state.session_for(&id, "u1").await.is_err());
        let stored = state.submission_for("u1", "exam-t").await.unwrap();
        assert_eq!(stored.reason, SubmitReason::Confirmed);
        assert_eq!(stored.unanswered, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn abandon_leaves_submitted_session_to_its_completion() {
        let state = test_state();
        let catalog = state.content.exam("exam-t").unwrap();
        let (id, _) = state.start_session(&student(), catalog).await;
        let session = state.session_for(&id, "u1").await.unwrap();
        let submission = {
            let mut guard = session.lock().await;
            guard.request_submit().unwrap();
            guard.confirm_submit().unwrap()
        };

        assert_eq!(state.abandon_session(&id).await, Abandon::AlreadySubmitted);
        assert!(state.session_for(&id, "u1").await.is_ok());

        state.complete_session(&id, submission, false).await;
        assert!(state.submission_for("u1", "exam-t").await.is_some());
        assert_eq!(state.abandon_session(&id).await, Abandon::Missing);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_survives_a_late_abandon() {
        let state = test_state();
        let catalog = state.content.exam("exam-t").unwrap();
        let (id, _) = state.start_session(&student(), catalog).await;

        // Hold the sessions lock across the final tick so the timer task
        // submits and then waits inside complete_session.
        let sessions = state.db.sessions.write().await;
        tokio::time::sleep(Duration::from_secs(61)).await;
        let session = sessions.get(&id).unwrap().session.clone();
        drop(sessions);
        assert!(session.lock().await.is_submitted());

        let outcome = state.abandon_session(&id).await;
        assert_ne!(outcome, Abandon::Removed);
        tokio::time::sleep(Duration::from_secs(1)).await;
        let stored = state.submission_for("u1", "exam-t").await.unwrap();
        assert_eq!(stored.reason, SubmitReason::TimeExpired);
    }
}
