//! WASM bindings for narrator-engine — the narrator behind the browser pages.
//!
//! Pages own their storage: they pass the last exported snapshot in when
//! constructing the narrator and save `export_state()` after each turn.

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use serde::Serialize;
use wasm_bindgen::prelude::*;

use narrator_engine::core::config::EngineConfig;
use narrator_engine::core::pipeline::Engine;
use narrator_engine::core::store::MemoryStore;
use narrator_engine::schema::memory::{FragmentKind, UnlockCondition};

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, JsError> {
    serde_json::to_string(value).map_err(|e| JsError::new(&format!("Serialization error: {e}")))
}

fn parse_kind(kind: &str) -> Result<FragmentKind, JsError> {
    match kind.to_lowercase().as_str() {
        "confession" => Ok(FragmentKind::Confession),
        "testament" => Ok(FragmentKind::Testament),
        other => Err(JsError::new(&format!("Unknown fragment kind: {other}"))),
    }
}

#[wasm_bindgen]
pub struct WasmNarrator {
    engine: Engine,
}

#[wasm_bindgen]
impl WasmNarrator {
    /// Create a narrator. `snapshot_json` is a previous `export_state()`
    /// result (or empty); `config_ron` an optional RON configuration.
    #[wasm_bindgen(constructor)]
    pub fn new(seed: u64, snapshot_json: &str, config_ron: &str) -> Result<WasmNarrator, JsError> {
        let mut builder = Engine::builder().seed(seed).store(MemoryStore::new());
        if !config_ron.trim().is_empty() {
            let config = EngineConfig::parse_ron(config_ron)
                .map_err(|e| JsError::new(&format!("Config error: {e}")))?;
            builder = builder.config(config);
        }
        let mut engine = builder
            .build()
            .map_err(|e| JsError::new(&format!("Engine error: {e}")))?;

        if !snapshot_json.trim().is_empty() {
            let records: BTreeMap<String, String> = serde_json::from_str(snapshot_json)
                .map_err(|e| JsError::new(&format!("Invalid snapshot JSON: {e}")))?;
            engine.import_state(&records);
        }
        Ok(WasmNarrator { engine })
    }

    /// Process one input. Returns the turn as JSON.
    pub fn process_turn(&mut self, text: &str) -> Result<String, JsError> {
        to_json(&self.engine.process_turn(text))
    }

    /// `{ score, phase }`.
    pub fn trust_snapshot(&self) -> Result<String, JsError> {
        to_json(&self.engine.trust_snapshot())
    }

    pub fn journal(&self) -> Result<String, JsError> {
        to_json(&self.engine.journal().collect::<Vec<_>>())
    }

    pub fn dreams(&self) -> Result<String, JsError> {
        to_json(&self.engine.dreams().collect::<Vec<_>>())
    }

    pub fn echoes(&self) -> Result<String, JsError> {
        to_json(self.engine.echoes())
    }

    pub fn confessions(&self) -> Result<String, JsError> {
        to_json(self.engine.confessions())
    }

    pub fn testaments(&self) -> Result<String, JsError> {
        to_json(self.engine.testaments())
    }

    /// The milestone line, or `undefined` if it was already recorded.
    pub fn record_milestone(&mut self, name: &str, delta: i32) -> Option<String> {
        self.engine.record_milestone(name, delta)
    }

    /// Ambient line as of now, or `undefined` while the user is active.
    pub fn ambient_line(&self) -> Option<String> {
        self.engine.ambient_line_at(Utc::now())
    }

    /// Ambient line as if the user had been idle `idle_secs` longer.
    pub fn ambient_line_after(&self, idle_secs: u32) -> Option<String> {
        self.engine
            .ambient_line_at(Utc::now() + Duration::seconds(i64::from(idle_secs)))
    }

    /// Generate a dream now. Returns it as JSON.
    pub fn dream(&mut self) -> Result<String, JsError> {
        to_json(&self.engine.dream_at(Utc::now()))
    }

    pub fn typing_plan(&self, text: &str) -> Result<String, JsError> {
        to_json(&self.engine.typing_plan(text))
    }

    /// Add a fragment with an optional trust and phrase unlock. Returns its id.
    pub fn add_fragment(
        &mut self,
        kind: &str,
        content: &str,
        min_trust: Option<i32>,
        phrase: Option<String>,
    ) -> Result<u32, JsError> {
        let kind = parse_kind(kind)?;
        let unlock = UnlockCondition { min_trust, phrase };
        Ok(self.engine.add_fragment(kind, content, unlock))
    }

    /// Reveal a fragment. Returns the reveal as JSON, or `null` if it was
    /// unknown or already open.
    pub fn reveal(&mut self, kind: &str, id: u32) -> Result<String, JsError> {
        let kind = parse_kind(kind)?;
        let revealed = self.engine.reveal(kind, id).map(|r| r.fragment);
        to_json(&revealed)
    }

    /// `{ user_hash, score, phase, counters }` for a remote sync.
    pub fn sync_payload(&self, user_id: &str) -> Result<String, JsError> {
        to_json(&self.engine.sync_payload(user_id))
    }

    /// Every persisted record as a JSON object of key -> RON text.
    pub fn export_state(&self) -> Result<String, JsError> {
        to_json(&self.engine.export_state())
    }

    /// Forget everything and start over.
    pub fn reset(&mut self) {
        self.engine.reset_all();
    }
}
