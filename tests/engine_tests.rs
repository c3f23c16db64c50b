/// Engine integration tests — whole conversations through the public API.

use chrono::{DateTime, Duration, TimeZone, Utc};
use narrator_engine::core::config::EngineConfig;
use narrator_engine::core::pipeline::{Engine, TurnOutput};
use narrator_engine::core::responder::ResponseSource;
use narrator_engine::core::store::{FileStore, MemoryStore, Store};
use narrator_engine::schema::emotion::{EmotionCategory, Intensity};
use narrator_engine::schema::event::EngineEvent;
use narrator_engine::schema::intent::Intent;
use narrator_engine::schema::trust::TrustPhase;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 10, 31, 23, 0, 0).unwrap()
}

fn converse(engine: &mut Engine, inputs: &[&str]) -> Vec<TurnOutput> {
    inputs
        .iter()
        .enumerate()
        .map(|(i, text)| engine.process_turn_at(text, t0() + Duration::seconds(i as i64 * 20)))
        .collect()
}

fn phase_shift_count(outputs: &[TurnOutput]) -> usize {
    outputs
        .iter()
        .filter(|o| {
            o.fired_narrative_event
                .as_deref()
                .map_or(false, |label| label.starts_with("phase_shift"))
        })
        .count()
}

#[test]
fn fear_input_reaches_a_fear_template() {
    let mut engine = Engine::builder().seed(7).build().unwrap();
    let out = engine.process_turn_at("i am so afraid of the dark", t0());

    assert_eq!(out.emotional_state.primary, EmotionCategory::Fear);
    assert!(out.emotional_state.intensity >= Intensity::Medium);
    match out.source {
        ResponseSource::Template(key) => assert_eq!(key.emotion, EmotionCategory::Fear),
        other => panic!("expected a fear template, got {:?}", other),
    }
    // First contact is said before the response, not instead of it
    assert_eq!(out.fired_narrative_event.as_deref(), Some("first_contact"));
}

#[test]
fn affirmations_cross_into_curious_once() {
    let mut engine = Engine::builder().seed(11).build().unwrap();
    assert_eq!(engine.trust_snapshot().score, 20);

    let outputs = converse(&mut engine, &["thank you", "i believe you", "i trust you"]);

    assert_eq!(outputs[0].trust_score, 23);
    assert_eq!(outputs[1].trust_phase, TrustPhase::Cold);
    assert_eq!(outputs[2].trust_score, 37);
    assert_eq!(outputs[2].trust_phase, TrustPhase::Curious);
    assert_eq!(
        outputs[2].fired_narrative_event.as_deref(),
        Some("phase_shift:cold->curious")
    );
    assert_eq!(outputs[2].source, ResponseSource::Narrative);
    assert_eq!(phase_shift_count(&outputs), 1);

    // Staying in Curious does not fire again
    let more = converse(&mut engine, &["the weather is strange tonight"]);
    assert_eq!(phase_shift_count(&more), 0);
}

#[test]
fn repeating_yourself_triggers_the_loop() {
    let mut engine = Engine::builder().seed(3).build().unwrap();
    let outputs = converse(&mut engine, &["where am i"; 5]);

    assert_eq!(outputs[1].intent.intent, Intent::Repetition);
    assert_eq!(outputs[1].source, ResponseSource::Intent(Intent::Repetition));
    assert_eq!(
        outputs[2].fired_narrative_event.as_deref(),
        Some("repetition_loop:3")
    );
    // Not again until the next multiple
    assert!(outputs[3].fired_narrative_event.is_none());
    assert!(outputs[4].fired_narrative_event.is_none());
}

#[test]
fn repeated_affirmation_earns_nothing() {
    let mut engine = Engine::builder().seed(5).build().unwrap();
    let outputs = converse(&mut engine, &["i trust you", "i trust you"]);
    assert_eq!(outputs[0].trust_score, 28);
    assert_eq!(outputs[1].trust_score, 28);
}

#[test]
fn hostility_drops_trust_and_breaks_it_after_earning() {
    let mut config = EngineConfig::default();
    config.initial_trust = 32;
    let mut engine = Engine::builder().seed(9).config(config).build().unwrap();
    assert_eq!(engine.trust_snapshot().phase, TrustPhase::Curious);

    let outputs = converse(&mut engine, &["i hate you", "you are lying"]);
    assert_eq!(outputs[0].trust_score, 22);
    assert_eq!(outputs[1].trust_score, 14);
    assert_eq!(
        outputs[1].fired_narrative_event.as_deref(),
        Some("trust_broken:1")
    );
    assert_eq!(engine.counters().trust_drops, 1);
}

#[test]
fn state_survives_a_reload() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut engine = Engine::builder()
            .seed(1)
            .store(FileStore::open(dir.path()).unwrap())
            .build()
            .unwrap();
        converse(&mut engine, &["hello", "i trust you", "the mirror is watching me"]);
        assert!(engine.record_milestone_at("archive_page", 2, t0() + Duration::minutes(5)).is_some());
    }

    let mut engine = Engine::builder()
        .seed(1)
        .store(FileStore::open(dir.path()).unwrap())
        .build()
        .unwrap();
    assert_eq!(engine.turn_count(), 3);
    assert_eq!(engine.trust_snapshot().score, 30);
    assert_eq!(engine.conversation().len(), 3);
    assert!(engine.journal().count() > 0);
    // Flags persisted: neither first contact nor the milestone repeats
    assert!(engine.record_milestone_at("archive_page", 2, t0() + Duration::minutes(6)).is_none());
    let out = engine.process_turn_at("hello again", t0() + Duration::minutes(7));
    assert_ne!(out.fired_narrative_event.as_deref(), Some("first_contact"));
}

#[test]
fn reloading_before_every_turn_changes_nothing() {
    let inputs = [
        "hello",
        "i am so afraid of the dark",
        "i trust you",
        "the mirror is watching me again",
        "who was here before me?",
        "thank you",
        "the mirror is watching me again",
    ];
    let dir = tempfile::tempdir().unwrap();
    let mut steady = Engine::builder().seed(21).build().unwrap();

    for (i, text) in inputs.iter().enumerate() {
        let at = t0() + Duration::seconds(i as i64 * 40);
        let expected = steady.process_turn_at(text, at);
        let mut reloaded = Engine::builder()
            .seed(21)
            .store(FileStore::open(dir.path()).unwrap())
            .build()
            .unwrap();
        let got = reloaded.process_turn_at(text, at);

        assert_eq!(got.response_text, expected.response_text, "turn {}", i + 1);
        assert_eq!(got.emotional_state, expected.emotional_state, "turn {}", i + 1);
        assert_eq!(got.trust_score, expected.trust_score, "turn {}", i + 1);
    }
}

#[test]
fn reset_all_starts_over() {
    let mut engine = Engine::builder().seed(2).build().unwrap();
    converse(&mut engine, &["hello", "i trust you", "who was before me?"]);
    assert!(engine.confessions().iter().any(|f| f.revealed));

    engine.reset_all();
    assert_eq!(engine.turn_count(), 0);
    assert_eq!(engine.trust_snapshot().score, 20);
    assert!(engine.conversation().is_empty());
    assert_eq!(engine.journal().count(), 0);
    assert!(engine.confessions().iter().all(|f| !f.revealed));

    let out = engine.process_turn_at("hello", t0() + Duration::hours(1));
    assert_eq!(out.fired_narrative_event.as_deref(), Some("first_contact"));
}

#[test]
fn corrupt_records_reset_individually() {
    let mut store = MemoryStore::new();
    store.set("narrator.trust", "(score: 64, phase: Confessional, phase_entered_at: None)").unwrap();
    store.set("narrator.conversation", "this is not ron at all {{").unwrap();
    store.set("narrator.session", "(turn_count: \"three\")").unwrap();

    let mut engine = Engine::builder().seed(4).store(store).build().unwrap();
    assert_eq!(engine.trust_snapshot().score, 64);
    assert_eq!(engine.trust_snapshot().phase, TrustPhase::Confessional);
    assert!(engine.conversation().is_empty());
    assert_eq!(engine.turn_count(), 0);

    let out = engine.process_turn_at("are you still there", t0());
    assert!(!out.response_text.is_empty());
}

#[test]
fn namespaces_do_not_collide() {
    let dir = tempfile::tempdir().unwrap();
    let build = |namespace: &str| {
        let mut config = EngineConfig::default();
        config.namespace = namespace.to_string();
        Engine::builder()
            .seed(6)
            .config(config)
            .store(FileStore::open(dir.path()).unwrap())
            .build()
            .unwrap()
    };
    let mut left = build("left");
    converse(&mut left, &["i trust you"]);
    let right = build("right");
    assert_eq!(right.turn_count(), 0);
    assert_eq!(right.trust_snapshot().score, 20);
}

#[test]
fn export_then_import_moves_a_session() {
    let mut source = Engine::builder().seed(8).build().unwrap();
    converse(&mut source, &["hello", "i believe you", "the door was open"]);
    let snapshot = source.export_state();
    assert!(snapshot.contains_key("narrator.trust"));

    let mut target = Engine::builder().seed(8).build().unwrap();
    let written = target.import_state(&snapshot);
    assert_eq!(written, snapshot.len());
    assert_eq!(target.turn_count(), 3);
    assert_eq!(target.trust_snapshot(), source.trust_snapshot());
}

#[test]
fn unstable_phase_whispers_to_the_console() {
    let mut config = EngineConfig::default();
    config.initial_trust = 90;
    let mut engine = Engine::builder().seed(12).config(config).build().unwrap();
    let out = engine.process_turn_at("hello", t0());
    assert_eq!(out.trust_phase, TrustPhase::Unstable);
    assert!(out
        .events
        .iter()
        .any(|e| matches!(e, EngineEvent::ConsoleLog { .. })));
}

#[test]
fn sync_payload_reflects_progress() {
    let mut engine = Engine::builder().seed(10).build().unwrap();
    converse(&mut engine, &["hello", "i trust you"]);
    let payload = engine.sync_payload("someone@example.com");
    assert_eq!(payload.score, 28);
    assert_eq!(payload.phase, TrustPhase::Cold);
    assert_eq!(payload.counters.turns, 2);
    assert!(payload.user_hash.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn a_replacing_beat_spends_no_echo() {
    let mut config = EngineConfig::default();
    config.initial_trust = 55;
    let mut engine = Engine::builder().seed(13).config(config).build().unwrap();
    converse(
        &mut engine,
        &[
            "the hallway light keeps flickering tonight",
            "there is a red door at the end of the hall",
        ],
    );
    assert!(!engine.echoes().is_empty());
    let before: Vec<(u64, u32)> = engine.echoes().iter().map(|e| (e.id, e.uses)).collect();

    let out = engine.process_turn_at("i trust you", t0() + Duration::seconds(60));
    assert_eq!(out.trust_phase, TrustPhase::Confessional);
    assert!(out
        .fired_narrative_event
        .as_deref()
        .map_or(false, |label| label.starts_with("phase_shift")));
    assert!(!out
        .events
        .iter()
        .any(|e| matches!(e, EngineEvent::MemoryEcho { .. })));
    for (id, uses) in before {
        let echo = engine.echoes().iter().find(|e| e.id == id).unwrap();
        assert_eq!(echo.uses, uses, "echo #{} was spent", id);
    }
}
