//! Async session runtime.
//!
//! Wraps a [`QuestSession`] behind a lock so HUD readers always see a whole
//! transition, and runs every network call on its own tokio task. Local
//! state is committed before any push is spawned; pull results are applied
//! through the session's reconcile path, or discarded once the user has
//! logged out.
use mathstarz_game::{
    AnswerVerdict, NpcId, ProgressRecord, ProgressStorage, ProgressView, QuestSession,
    QuestionData, ReconcileStatus, SessionEffect,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::backend::{RemoteBackend, SyncError};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("session is still referenced by a running task")]
    SessionInUse,
}

/// Result of loading the question the session asked for.
#[derive(Debug)]
pub enum QuestionLoad {
    Ready(QuestionData),
    /// The question surface was closed; `effects` come from the session.
    Failed {
        error: SyncError,
        effects: Vec<SessionEffect>,
    },
}

type SharedSession<S> = Arc<RwLock<QuestSession<S>>>;

pub struct SessionRuntime<S, B> {
    session: SharedSession<S>,
    backend: Arc<B>,
    live: Arc<AtomicBool>,
    pull: Option<JoinHandle<()>>,
    pushes: Vec<JoinHandle<()>>,
}

impl<S, B> SessionRuntime<S, B>
where
    S: ProgressStorage + Send + Sync + 'static,
    B: RemoteBackend + 'static,
{
    #[must_use]
    pub fn new(session: QuestSession<S>, backend: Arc<B>) -> Self {
        Self {
            session: Arc::new(RwLock::new(session)),
            backend,
            live: Arc::new(AtomicBool::new(true)),
            pull: None,
            pushes: Vec::new(),
        }
    }

    /// Wrap `session` and immediately start the login-time pull.
    #[must_use]
    pub fn start(session: QuestSession<S>, backend: Arc<B>) -> Self {
        let mut runtime = Self::new(session, backend);
        runtime.request_pull();
        runtime
    }

    /// Pull server progress in the background and reconcile when it lands.
    ///
    /// A pull already in flight is abandoned in favour of the new one.
    pub fn request_pull(&mut self) {
        if let Some(previous) = self.pull.take() {
            previous.abort();
        }
        let session = Arc::clone(&self.session);
        let backend = Arc::clone(&self.backend);
        let live = Arc::clone(&self.live);
        let user_id = read(&self.session).user_id();
        self.pull = Some(tokio::spawn(async move {
            let records = match backend.pull_all_puzzles(user_id).await {
                Ok(records) => records,
                Err(err) => {
                    log::error!("Puzzle pull failed, continuing from local snapshot: {err}");
                    return;
                }
            };
            let mut guard = session.write().unwrap_or_else(PoisonError::into_inner);
            if !live.load(Ordering::SeqCst) {
                log::debug!("Discarding pull result for user {user_id}, session ended");
                return;
            }
            match guard.reconcile(records) {
                ReconcileStatus::Applied { report, .. } => {
                    log::debug!("Pull applied, {} puzzles changed", report.changed.len());
                }
                ReconcileStatus::Deferred => log::debug!("Pull held until interaction closes"),
            }
        }));
    }

    pub fn tap_npc(&mut self, npc_id: NpcId) -> Vec<SessionEffect> {
        self.apply(|session| session.tap_npc(npc_id))
    }

    pub fn chat_finished(&mut self) -> Vec<SessionEffect> {
        self.apply(QuestSession::chat_finished)
    }

    pub fn submit_verdict(&mut self, verdict: &AnswerVerdict) -> Vec<SessionEffect> {
        self.apply(|session| session.submit_verdict(verdict))
    }

    pub fn close_question_panel(&mut self) -> Vec<SessionEffect> {
        self.apply(QuestSession::close_question_panel)
    }

    pub fn advance_clock(&mut self, dt: f32) -> Vec<SessionEffect> {
        self.apply(|session| session.advance_clock(dt))
    }

    /// Fetch a question from the backend; on failure the question surface is closed.
    pub async fn fetch_question(&mut self, question_id: &str) -> QuestionLoad {
        match self.backend.fetch_question(question_id).await {
            Ok(question) => QuestionLoad::Ready(question),
            Err(error) => {
                log::error!("Failed to load question {question_id}: {error}");
                let effects = self.apply(QuestSession::question_failed);
                QuestionLoad::Failed { error, effects }
            }
        }
    }

    #[must_use]
    pub fn view(&self) -> ProgressView {
        read(&self.session).view()
    }

    #[must_use]
    pub fn feedback(&self, correct: bool) -> String {
        read(&self.session).feedback(correct)
    }

    /// Wait for every spawned network task to finish.
    pub async fn settle(&mut self) {
        if let Some(pull) = self.pull.take() {
            let _ = pull.await;
        }
        for push in self.pushes.drain(..) {
            let _ = push.await;
        }
    }

    /// End the session: abandon the pending pull, let pushes finish, write
    /// the final snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if a task still holds the session.
    pub async fn logout(mut self) -> Result<ProgressRecord, RuntimeError> {
        self.live.store(false, Ordering::SeqCst);
        if let Some(pull) = self.pull.take() {
            pull.abort();
            let _ = pull.await;
        }
        for push in self.pushes.drain(..) {
            let _ = push.await;
        }
        let lock = Arc::try_unwrap(self.session).map_err(|_| RuntimeError::SessionInUse)?;
        let session = lock.into_inner().unwrap_or_else(PoisonError::into_inner);
        Ok(session.logout())
    }

    fn apply<F>(&mut self, transition: F) -> Vec<SessionEffect>
    where
        F: FnOnce(&mut QuestSession<S>) -> Vec<SessionEffect>,
    {
        let (effects, requests) = {
            let mut session = self.session.write().unwrap_or_else(PoisonError::into_inner);
            let effects = transition(&mut *session);
            (effects, session.drain_sync_requests())
        };
        self.pushes.retain(|push| !push.is_finished());
        for request in requests {
            let backend = Arc::clone(&self.backend);
            self.pushes.push(tokio::spawn(async move {
                let key = request.idempotency_key();
                match backend.push(&request).await {
                    Ok(()) => log::debug!("Pushed {key}"),
                    Err(err) => log::error!("Push {key} to {} failed: {err}", request.endpoint()),
                }
            }));
        }
        effects
    }
}

fn read<S>(session: &SharedSession<S>) -> std::sync::RwLockReadGuard<'_, QuestSession<S>> {
    session.read().unwrap_or_else(PoisonError::into_inner)
}
