//! Quest session controller.
//!
//! One [`QuestSession`] exists per logged-in user. It owns the progress
//! cache and the NPC gate and drives a single interaction at a time:
//!
//! ```text
//! Idle -> Dialog -> QuestionOpen -+- correct, more questions -> QuestionOpen
//!                                 +- correct, exhausted -> Farewell -> Idle
//!                                 +- incorrect -> QuestionOpen
//! ```
//!
//! Every transition returns the [`SessionEffect`]s the presentation layer
//! should perform. Network uploads are queued in an outbox and drained by
//! the platform layer after local state has been committed.
use serde::Serialize;
use std::sync::Arc;

use crate::ProgressStorage;
use crate::constants::{
    EMPTY_CHAT_LINE, FAREWELL_DELAY, KEY_CORRECT_ANSWER, KEY_NPC_HELLO, KEY_WRONG_ANSWER,
};
use crate::data::{NpcDefinition, WorldData};
use crate::i18n::{Localizer, deferral_message};
use crate::npc::{AdvanceOutcome, EnterDecision, NpcGate, NpcId, NpcState};
use crate::progress::{ProgressCache, ProgressError, ProgressRecord, ReconcileReport};
use crate::puzzle::PuzzleKey;
use crate::question::AnswerVerdict;
use crate::sync::{PuzzleProgress, SyncOutbox, SyncRequest};
use crate::user::{ShapeStats, UserId, UserRecord};

/// Shared handle to whatever resolves translation keys.
pub type SharedLocalizer = Arc<dyn Localizer + Send + Sync>;

/// The single open interaction, if any.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InteractionState {
    Idle,
    Dialog { npc: NpcId },
    QuestionOpen { npc: NpcId, question_id: String },
    /// Last question answered; end lines show once `remaining` runs out.
    Farewell { npc: NpcId, remaining: f32 },
}

impl InteractionState {
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    #[must_use]
    pub const fn npc(&self) -> Option<NpcId> {
        match self {
            Self::Idle => None,
            Self::Dialog { npc }
            | Self::QuestionOpen { npc, .. }
            | Self::Farewell { npc, .. } => Some(*npc),
        }
    }
}

/// Work for the presentation layer produced by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEffect {
    /// Render these lines; report back with `chat_finished`.
    ShowChat(Vec<String>),
    /// Out-of-order tap; `required` must be completed first.
    Deferral { message: String, required: NpcId },
    /// Fetch and show this question; report back with a verdict.
    OpenQuestion { npc: NpcId, question_id: String },
    CloseQuestion,
    /// One-shot completion; the progress counter moved past `npc`.
    NpcCompleted { npc: NpcId, unlocked: Option<NpcId> },
    PuzzleCompleted(PuzzleKey),
    /// Farewell lines will follow after `delay` time units.
    ScheduleFarewell { npc: NpcId, delay: f32 },
    InteractionClosed,
}

/// Outcome of handing pulled server state to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileStatus {
    Applied {
        report: ReconcileReport,
        moved: Vec<NpcId>,
    },
    /// An interaction is open; the pull is applied when it closes.
    Deferred,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PuzzleView {
    pub key: PuzzleKey,
    pub pieces_collected: u8,
    pub complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NpcView {
    pub npc_id: NpcId,
    pub puzzle_id: u32,
    pub state: NpcState,
    pub question_index: usize,
    pub question_count: usize,
}

/// Consistent read-only copy of the session for HUDs and collection screens.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressView {
    pub user_id: UserId,
    pub npc_progress_counter: u32,
    pub total_points: i32,
    pub shapes: ShapeStats,
    pub puzzles: Vec<PuzzleView>,
    pub npcs: Vec<NpcView>,
    pub interaction: InteractionState,
}

impl ProgressView {
    #[must_use]
    pub fn puzzle(&self, key: PuzzleKey) -> Option<&PuzzleView> {
        self.puzzles.iter().find(|puzzle| puzzle.key == key)
    }

    #[must_use]
    pub fn npc(&self, npc_id: NpcId) -> Option<&NpcView> {
        self.npcs.iter().find(|npc| npc.npc_id == npc_id)
    }
}

/// Per-login progression context.
pub struct QuestSession<S> {
    cache: ProgressCache<S>,
    gate: NpcGate,
    localizer: SharedLocalizer,
    state: InteractionState,
    outbox: SyncOutbox,
    deferred_pull: Option<Vec<PuzzleProgress>>,
}

impl<S> std::fmt::Debug for QuestSession<S>
where
    S: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuestSession")
            .field("cache", &self.cache)
            .field("gate", &self.gate)
            .field("state", &self.state)
            .field("outbox", &self.outbox)
            .finish_non_exhaustive()
    }
}

impl<S> QuestSession<S>
where
    S: ProgressStorage,
{
    /// Load the user's snapshot and derive every question pointer from it.
    ///
    /// # Errors
    ///
    /// Returns an error if the user id is not numeric or local storage
    /// cannot be read.
    pub fn start(
        user: UserRecord,
        world: &WorldData,
        storage: S,
        localizer: SharedLocalizer,
    ) -> Result<Self, ProgressError> {
        let mut cache = ProgressCache::load(user, storage)?;
        let user_id = cache.user_id();
        for npc in &world.npcs {
            cache.ensure_puzzle(PuzzleKey::new(user_id, npc.puzzle_id));
        }
        let mut gate = NpcGate::new(world);
        gate.initialize(cache.puzzles(), user_id);
        log::info!(
            "Session started for user {user_id} with {} NPCs, counter = {}",
            gate.len(),
            cache.npc_progress_counter()
        );
        Ok(Self {
            cache,
            gate,
            localizer,
            state: InteractionState::Idle,
            outbox: SyncOutbox::new(),
            deferred_pull: None,
        })
    }

    /// Player tapped an NPC.
    pub fn tap_npc(&mut self, npc_id: NpcId) -> Vec<SessionEffect> {
        if !self.state.is_idle() {
            log::debug!("Tap on NPC {npc_id} ignored, interaction open: {:?}", self.state);
            return Vec::new();
        }
        if let EnterDecision::Denied { required } = self
            .gate
            .try_enter(npc_id, self.cache.npc_progress_counter())
        {
            log::debug!("NPC {npc_id} locked, player must finish NPC {required} first");
            return vec![SessionEffect::Deferral {
                message: deferral_message(self.localizer.as_ref(), required),
                required,
            }];
        }
        let Some(definition) = self.gate.definition(npc_id) else {
            log::warn!("Tap on unknown NPC {npc_id} ignored, every NPC is complete");
            return Vec::new();
        };
        let exhausted = self.gate.is_exhausted(npc_id);
        let lines = self.render_chat(definition, exhausted);

        if exhausted {
            // Pointer already at the end, e.g. after a pull.
            let mut effects = vec![SessionEffect::ShowChat(lines)];
            effects.extend(self.complete_npc(npc_id));
            self.persist();
            effects.push(SessionEffect::InteractionClosed);
            return effects;
        }
        log::debug!("Dialog opened with NPC {npc_id}");
        self.state = InteractionState::Dialog { npc: npc_id };
        vec![SessionEffect::ShowChat(lines)]
    }

    /// The chat surface finished showing the current lines.
    pub fn chat_finished(&mut self) -> Vec<SessionEffect> {
        let InteractionState::Dialog { npc } = self.state else {
            return Vec::new();
        };
        match self.gate.current_question(npc).map(str::to_string) {
            Some(question_id) => self.open_question(npc, question_id),
            None => {
                log::warn!("NPC {npc} has no question to ask, closing dialog");
                self.return_to_idle();
                vec![SessionEffect::InteractionClosed]
            }
        }
    }

    /// Apply the question surface's verdict for the open question.
    ///
    /// Incorrect answers leave the question open and change nothing.
    pub fn submit_verdict(&mut self, verdict: &AnswerVerdict) -> Vec<SessionEffect> {
        let InteractionState::QuestionOpen { npc, .. } = self.state else {
            log::warn!("Verdict received with no open question");
            return Vec::new();
        };
        if !verdict.correct {
            log::debug!("Incorrect answer for NPC {npc}, question stays open");
            return Vec::new();
        }
        let Some(puzzle_id) = self.gate.definition(npc).map(|def| def.puzzle_id) else {
            return Vec::new();
        };
        let key = PuzzleKey::new(self.cache.user_id(), puzzle_id);

        let accrual = self.cache.accrue(key);
        let outcome = self.gate.advance(npc);
        self.cache.award(verdict.points, &verdict.category);

        let mut effects = Vec::new();
        if accrual.just_completed() {
            log::info!("Puzzle {key} completed");
            effects.push(SessionEffect::PuzzleCompleted(key));
        }
        let exhausted = !matches!(outcome, AdvanceOutcome::Advanced { exhausted: false, .. });
        if exhausted {
            self.gate.close_question();
            effects.push(SessionEffect::CloseQuestion);
            effects.extend(self.complete_npc(npc));
        }
        self.persist();
        self.outbox
            .push(SyncRequest::PuzzleDelta(PuzzleProgress::from_key(key, accrual.count)));
        self.outbox
            .push(SyncRequest::ScoreUpdate(Box::new(self.cache.user().clone())));

        if exhausted {
            self.state = InteractionState::Farewell {
                npc,
                remaining: FAREWELL_DELAY,
            };
            effects.push(SessionEffect::ScheduleFarewell {
                npc,
                delay: FAREWELL_DELAY,
            });
        } else if let Some(question_id) = self.gate.current_question(npc).map(str::to_string) {
            effects.extend(self.open_question(npc, question_id));
        }
        effects
    }

    /// The player dismissed the question or dialog.
    pub fn close_question_panel(&mut self) -> Vec<SessionEffect> {
        match self.state {
            InteractionState::Dialog { .. } | InteractionState::QuestionOpen { .. } => {
                log::debug!("Interaction closed by player");
                self.return_to_idle();
                vec![SessionEffect::CloseQuestion, SessionEffect::InteractionClosed]
            }
            InteractionState::Idle | InteractionState::Farewell { .. } => Vec::new(),
        }
    }

    /// The open question could not be loaded or rendered.
    pub fn question_failed(&mut self) -> Vec<SessionEffect> {
        if let InteractionState::QuestionOpen { npc, question_id } = &self.state {
            log::warn!("Question {question_id} for NPC {npc} failed to open");
            return self.close_question_panel();
        }
        Vec::new()
    }

    /// Advance session time; shows the farewell once its delay has elapsed.
    pub fn advance_clock(&mut self, dt: f32) -> Vec<SessionEffect> {
        let InteractionState::Farewell { npc, remaining } = self.state else {
            return Vec::new();
        };
        if dt.is_nan() || dt <= 0.0 {
            return Vec::new();
        }
        let remaining = remaining - dt;
        if remaining > 0.0 {
            self.state = InteractionState::Farewell { npc, remaining };
            return Vec::new();
        }
        let lines = self
            .gate
            .definition(npc)
            .map(|definition| self.render_chat(definition, true))
            .unwrap_or_default();
        self.return_to_idle();
        vec![
            SessionEffect::ShowChat(lines),
            SessionEffect::InteractionClosed,
        ]
    }

    /// Overwrite local counts with pulled server values.
    ///
    /// Applied immediately when idle, otherwise held until the open
    /// interaction closes. A newer pull replaces a held one.
    pub fn reconcile(&mut self, remote: Vec<PuzzleProgress>) -> ReconcileStatus {
        if self.state.is_idle() {
            let (report, moved) = self.apply_pull(&remote);
            ReconcileStatus::Applied { report, moved }
        } else {
            log::debug!("Pull of {} records held until interaction closes", remote.len());
            self.deferred_pull = Some(remote);
            ReconcileStatus::Deferred
        }
    }

    /// Take every queued upload.
    pub fn drain_sync_requests(&mut self) -> Vec<SyncRequest> {
        self.outbox.drain()
    }

    /// Write the full record to local storage, logging failures.
    ///
    /// Returns whether the write succeeded.
    pub fn persist(&self) -> bool {
        match self.cache.snapshot() {
            Ok(()) => true,
            Err(err) => {
                log::error!(
                    "Failed to persist progress for user {}: {err}",
                    self.cache.user_id()
                );
                false
            }
        }
    }

    /// End the session, writing a final snapshot.
    pub fn logout(self) -> ProgressRecord {
        self.persist();
        log::info!("Session for user {} ended", self.cache.user_id());
        self.cache.record()
    }

    #[must_use]
    pub fn view(&self) -> ProgressView {
        let counter = self.cache.npc_progress_counter();
        let user = self.cache.user();
        ProgressView {
            user_id: self.cache.user_id(),
            npc_progress_counter: counter,
            total_points: user.total_points,
            shapes: user.shapes,
            puzzles: self
                .cache
                .puzzles()
                .iter()
                .map(|puzzle| PuzzleView {
                    key: puzzle.key,
                    pieces_collected: puzzle.pieces_collected(),
                    complete: puzzle.is_complete(),
                })
                .collect(),
            npcs: self
                .gate
                .definitions()
                .map(|definition| NpcView {
                    npc_id: definition.npc_id,
                    puzzle_id: definition.puzzle_id,
                    state: self.gate.state(definition.npc_id, counter),
                    question_index: self.gate.question_index(definition.npc_id),
                    question_count: definition.question_count(),
                })
                .collect(),
            interaction: self.state.clone(),
        }
    }

    /// Localized feedback for the question surface.
    #[must_use]
    pub fn feedback(&self, correct: bool) -> String {
        let key = if correct {
            KEY_CORRECT_ANSWER
        } else {
            KEY_WRONG_ANSWER
        };
        self.localizer.translate(key)
    }

    #[must_use]
    pub const fn interaction(&self) -> &InteractionState {
        &self.state
    }

    #[must_use]
    pub const fn gate(&self) -> &NpcGate {
        &self.gate
    }

    #[must_use]
    pub const fn cache(&self) -> &ProgressCache<S> {
        &self.cache
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.cache.user_id()
    }

    #[must_use]
    pub fn record(&self) -> ProgressRecord {
        self.cache.record()
    }

    #[must_use]
    pub fn pending_sync_count(&self) -> usize {
        self.outbox.len()
    }

    fn open_question(&mut self, npc: NpcId, question_id: String) -> Vec<SessionEffect> {
        log::debug!("NPC {npc} asks question {question_id}");
        self.gate.open_question(npc);
        self.state = InteractionState::QuestionOpen {
            npc,
            question_id: question_id.clone(),
        };
        vec![SessionEffect::OpenQuestion { npc, question_id }]
    }

    fn complete_npc(&mut self, npc: NpcId) -> Option<SessionEffect> {
        if !self.cache.record_completion(npc) {
            return None;
        }
        let next = NpcId::next_after(self.cache.npc_progress_counter());
        let unlocked = self.gate.definition(next).map(|definition| definition.npc_id);
        Some(SessionEffect::NpcCompleted { npc, unlocked })
    }

    fn return_to_idle(&mut self) {
        self.gate.close_question();
        self.state = InteractionState::Idle;
        if let Some(remote) = self.deferred_pull.take() {
            self.apply_pull(&remote);
        }
    }

    fn apply_pull(&mut self, remote: &[PuzzleProgress]) -> (ReconcileReport, Vec<NpcId>) {
        let report = self.cache.reconcile(remote);
        let user_id = self.cache.user_id();
        let moved = self
            .gate
            .recompute_linked(self.cache.puzzles(), user_id, &report.changed_keys());
        if !report.changed.is_empty() {
            self.persist();
        }
        log::info!(
            "Reconciled {} records: {} changed, {} NPC pointers moved",
            remote.len(),
            report.changed.len(),
            moved.len()
        );
        (report, moved)
    }

    fn render_chat(&self, definition: &NpcDefinition, exhausted: bool) -> Vec<String> {
        let keys = if exhausted {
            &definition.end_chat_lines
        } else {
            &definition.chat_lines
        };
        if keys.is_empty() {
            return vec![EMPTY_CHAT_LINE.to_string()];
        }
        keys.iter()
            .enumerate()
            .map(|(index, key)| {
                if index == 0 && !exhausted && key == KEY_NPC_HELLO {
                    self.localizer
                        .translate_with(key, &[self.cache.user().display_name()])
                } else {
                    self.localizer.translate(key)
                }
            })
            .collect()
    }
}
