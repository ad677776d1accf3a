use mathstarz_game::{
    AnswerVerdict, InteractionState, MAX_PIECES, MemoryProgressStorage, NpcDefinition, NpcId,
    NpcState, PuzzleKey, PuzzleProgress, QuestSession, ReconcileStatus, SessionEffect,
    SyncRequest, TranslationCatalog, UserId, UserRecord, WorldData,
};
use std::sync::Arc;

const USER: UserId = UserId(7);

fn load_world() -> WorldData {
    WorldData::from_json(include_str!("../assets/world.json")).unwrap()
}

fn start(
    storage: &MemoryProgressStorage,
    world: &WorldData,
) -> QuestSession<MemoryProgressStorage> {
    QuestSession::start(
        UserRecord::new(USER, "Noa"),
        world,
        storage.clone(),
        Arc::new(TranslationCatalog::load_from_static()),
    )
    .unwrap()
}

fn answer_correctly(session: &mut QuestSession<MemoryProgressStorage>) -> Vec<SessionEffect> {
    session.submit_verdict(&AnswerVerdict::correct(10, "triangle"))
}

/// Runs an NPC from tap to farewell, returning every effect produced.
fn complete_npc(
    session: &mut QuestSession<MemoryProgressStorage>,
    npc: NpcId,
) -> Vec<SessionEffect> {
    let mut effects = session.tap_npc(npc);
    effects.extend(session.chat_finished());
    while matches!(session.interaction(), InteractionState::QuestionOpen { .. }) {
        effects.extend(answer_correctly(session));
    }
    effects.extend(session.advance_clock(2.0));
    effects
}

#[test]
fn four_correct_answers_complete_puzzle_7_3() {
    let world = WorldData::from_npcs(vec![NpcDefinition {
        npc_id: NpcId(1),
        puzzle_id: 3,
        chat_lines: vec!["npc_hello".to_string()],
        end_chat_lines: vec!["npc3_goodbye".to_string()],
        question_ids: (1..=4).map(|q| q.to_string()).collect(),
    }])
    .unwrap();
    let storage = MemoryProgressStorage::default();
    let mut session = start(&storage, &world);
    let key = PuzzleKey::new(USER, 3);
    assert_eq!(key.to_string(), "7_3");
    assert_eq!(session.cache().puzzles().get(key), 0);

    session.tap_npc(NpcId(1));
    session.chat_finished();
    for expected in 1..=MAX_PIECES {
        assert!(!session.cache().puzzles().is_complete(key));
        let effects = answer_correctly(&mut session);
        assert_eq!(session.cache().puzzles().get(key), expected);
        assert_eq!(
            effects.contains(&SessionEffect::PuzzleCompleted(key)),
            expected == MAX_PIECES
        );
    }
    assert!(session.cache().puzzles().is_complete(key));
    assert_eq!(storage.get(USER).unwrap().puzzles[&key], MAX_PIECES);
}

#[test]
fn locked_npc_defers_without_mutation() {
    let world = load_world();
    let storage = MemoryProgressStorage::default();
    let mut session = start(&storage, &world);
    let before = session.record();
    let writes = storage.write_count();

    let effects = session.tap_npc(NpcId(2));
    let [SessionEffect::Deferral { message, required }] = effects.as_slice() else {
        panic!("expected a single deferral, got {effects:?}");
    };
    assert_eq!(*required, NpcId(1));
    assert_eq!(message, "Come back later. First talk to the gardener.");
    assert_eq!(session.record(), before);
    assert_eq!(storage.write_count(), writes);
    assert_eq!(session.pending_sync_count(), 0);
}

#[test]
fn three_wrong_answers_change_nothing() {
    let world = load_world();
    let storage = MemoryProgressStorage::default();
    let mut session = start(&storage, &world);
    session.tap_npc(NpcId(1));
    session.chat_finished();
    let before = session.record();
    let writes = storage.write_count();

    for _ in 0..3 {
        assert!(session.submit_verdict(&AnswerVerdict::incorrect()).is_empty());
    }
    assert_eq!(session.gate().question_index(NpcId(1)), 0);
    assert_eq!(session.record(), before);
    assert_eq!(storage.write_count(), writes);
    assert!(session.drain_sync_requests().is_empty());
}

#[test]
fn reconcile_raises_count_and_recomputes_pointer() {
    let world = load_world();
    let storage = MemoryProgressStorage::default();
    let mut session = start(&storage, &world);
    let key = PuzzleKey::new(USER, 1);
    session.tap_npc(NpcId(1));
    session.chat_finished();
    answer_correctly(&mut session);
    answer_correctly(&mut session);
    session.close_question_panel();
    assert_eq!(session.cache().puzzles().get(key), 2);

    let status = session.reconcile(vec![PuzzleProgress::from_key(key, 3)]);
    let ReconcileStatus::Applied { report, moved } = status else {
        panic!("session was idle, pull should apply");
    };
    assert_eq!(report.changed.len(), 1);
    assert_eq!(moved, vec![NpcId(1)]);
    assert_eq!(session.cache().puzzles().get(key), 3);
    assert_eq!(session.gate().question_index(NpcId(1)), 3);
    assert_eq!(storage.get(USER).unwrap().puzzles[&key], 3);
}

#[test]
fn reconcile_may_lower_local_progress() {
    let world = load_world();
    let storage = MemoryProgressStorage::default();
    let mut session = start(&storage, &world);
    let key = PuzzleKey::new(USER, 1);
    session.tap_npc(NpcId(1));
    session.chat_finished();
    for _ in 0..3 {
        answer_correctly(&mut session);
    }
    session.close_question_panel();

    let ReconcileStatus::Applied { report, .. } =
        session.reconcile(vec![PuzzleProgress::from_key(key, 1)])
    else {
        panic!("expected applied reconcile");
    };
    assert_eq!(report.downgrades(), 1);
    assert_eq!(session.gate().question_index(NpcId(1)), 1);
}

#[test]
fn full_walkthrough_unlocks_npcs_in_order() {
    let world = load_world();
    let storage = MemoryProgressStorage::default();
    let mut session = start(&storage, &world);

    for npc in 1..=3 {
        let npc = NpcId(npc);
        for later in (npc.0 + 1)..=3 {
            assert!(matches!(
                session.tap_npc(NpcId(later)).as_slice(),
                [SessionEffect::Deferral { .. }]
            ));
        }
        let effects = complete_npc(&mut session, npc);
        let completions = effects
            .iter()
            .filter(|effect| matches!(effect, SessionEffect::NpcCompleted { .. }))
            .count();
        assert_eq!(completions, 1);
        assert_eq!(session.cache().npc_progress_counter(), npc.0);
        assert_eq!(session.view().npc(npc).unwrap().state, NpcState::Exhausted);
    }

    let view = session.view();
    assert!(view.puzzles.iter().all(|puzzle| puzzle.complete));
    assert_eq!(view.total_points, 120);
    assert_eq!(view.shapes.triangle, 120);

    let last = session.drain_sync_requests();
    assert!(last.iter().any(|request| matches!(request, SyncRequest::ScoreUpdate(_))));
    assert_eq!(
        last.iter()
            .filter(|request| matches!(request, SyncRequest::PuzzleDelta(_)))
            .count(),
        3,
        "one coalesced delta per puzzle"
    );
}

#[test]
fn revisiting_completed_npc_never_recounts() {
    let world = load_world();
    let storage = MemoryProgressStorage::default();
    let mut session = start(&storage, &world);
    complete_npc(&mut session, NpcId(1));
    assert_eq!(session.cache().npc_progress_counter(), 1);

    let effects = session.tap_npc(NpcId(1));
    assert!(matches!(
        effects.as_slice(),
        [SessionEffect::Deferral { required: NpcId(2), .. }]
    ));
    assert_eq!(session.cache().npc_progress_counter(), 1);
}

#[test]
fn taps_during_open_interaction_are_ignored() {
    let world = load_world();
    let storage = MemoryProgressStorage::default();
    let mut session = start(&storage, &world);
    session.tap_npc(NpcId(1));
    assert!(session.tap_npc(NpcId(1)).is_empty());
    assert!(session.tap_npc(NpcId(2)).is_empty());
    session.chat_finished();
    assert!(session.tap_npc(NpcId(3)).is_empty());
    assert!(matches!(
        session.interaction(),
        InteractionState::QuestionOpen { npc: NpcId(1), .. }
    ));
}

#[test]
fn farewell_waits_for_delay() {
    let world = load_world();
    let storage = MemoryProgressStorage::default();
    let mut session = start(&storage, &world);
    session.tap_npc(NpcId(1));
    session.chat_finished();
    for _ in 0..4 {
        answer_correctly(&mut session);
    }
    assert!(matches!(
        session.interaction(),
        InteractionState::Farewell { npc: NpcId(1), .. }
    ));
    assert!(session.close_question_panel().is_empty());
    assert!(session.tap_npc(NpcId(2)).is_empty());
    assert!(session.advance_clock(1.0).is_empty());
    assert!(session.advance_clock(0.5).is_empty());
    let effects = session.advance_clock(0.5);
    assert_eq!(effects.last(), Some(&SessionEffect::InteractionClosed));
    assert!(session.interaction().is_idle());
}

#[test]
fn failed_question_returns_to_idle() {
    let world = load_world();
    let storage = MemoryProgressStorage::default();
    let mut session = start(&storage, &world);
    session.tap_npc(NpcId(1));
    session.chat_finished();
    let before = session.record();
    assert_eq!(
        session.question_failed(),
        vec![SessionEffect::CloseQuestion, SessionEffect::InteractionClosed]
    );
    assert!(session.interaction().is_idle());
    assert_eq!(session.record(), before);
    assert_eq!(session.view().npc(NpcId(1)).unwrap().state, NpcState::Active);
}

#[test]
fn snapshot_reload_reproduces_state() {
    let world = load_world();
    let storage = MemoryProgressStorage::default();
    let mut session = start(&storage, &world);
    complete_npc(&mut session, NpcId(1));
    session.tap_npc(NpcId(2));
    session.chat_finished();
    answer_correctly(&mut session);
    let view = session.view();
    let record = session.logout();

    let user = record.user.clone().expect("user saved with progress");
    assert_eq!(user.total_points, 50);
    let reloaded = QuestSession::start(
        user,
        &world,
        storage.clone(),
        Arc::new(TranslationCatalog::load_from_static()),
    )
    .unwrap();
    assert_eq!(reloaded.record(), record);
    assert_eq!(reloaded.gate().question_index(NpcId(2)), 1);
    assert_eq!(reloaded.view().puzzles, view.puzzles);
    assert_eq!(reloaded.view().npc_progress_counter, 1);
}
