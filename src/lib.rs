pub mod game;

use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

pub use game::{
    Card, CardError, Cell, EffectId, EffectOutcome, GameEvent, GameOptions, GameOutcome,
    GameState, GameStats, Grid, IntegrityError, Pile, PileKind, Position, RestoreError,
    RuleEngine, RuleError, RuleResolution, SerializableState, Suit, Value,
};

#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    set_panic_hook();
    web_sys::console::log_1(&"地牢接龙引擎已加载".into());
}

fn to_js_error<E: Serialize>(error: E) -> JsValue {
    to_value(&error).unwrap_or_else(|serialize_err| JsValue::from_str(&serialize_err.to_string()))
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn make_resolution(state: GameState, events: Vec<GameEvent>) -> RuleResolution {
    RuleResolution::new(state, events)
}

fn make_resolution_json(resolution: RuleResolution) -> Result<String, JsValue> {
    serde_json::to_string(&resolution).map_err(serde_to_js_error)
}

fn parse_options_json(options_json: Option<String>) -> Result<GameOptions, JsValue> {
    match options_json {
        Some(json) if !json.trim().is_empty() => {
            serde_json::from_str(&json).map_err(serde_to_js_error)
        }
        _ => Ok(GameOptions::default()),
    }
}

fn parse_card(code: &str) -> Result<Card, JsValue> {
    code.parse::<Card>().map_err(to_js_error)
}

fn execute_with_engine<F>(state: &mut GameState, action: F) -> Result<Vec<GameEvent>, JsValue>
where
    F: FnOnce(&mut RuleEngine, &mut GameState) -> Result<Vec<GameEvent>, RuleError>,
{
    let mut engine = RuleEngine::new();
    action(&mut engine, state).map_err(to_js_error)
}

/// 有状态的引擎句柄，所有结果以 JSON 字符串返回。
#[wasm_bindgen]
pub struct GameEngine {
    state: GameState,
}

#[wasm_bindgen]
impl GameEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(options_json: Option<String>) -> Result<GameEngine, JsValue> {
        let options = parse_options_json(options_json)?;
        Ok(GameEngine {
            state: GameState::new(&options),
        })
    }

    #[wasm_bindgen(js_name = "fromSnapshot")]
    pub fn from_snapshot(snapshot_json: &str) -> Result<GameEngine, JsValue> {
        let saved: SerializableState =
            serde_json::from_str(snapshot_json).map_err(serde_to_js_error)?;
        let state = game::restore(saved).map_err(to_js_error)?;
        Ok(GameEngine { state })
    }

    pub fn state_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.state).map_err(serde_to_js_error)
    }

    pub fn snapshot_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&game::snapshot(&self.state)).map_err(serde_to_js_error)
    }

    pub fn restore_json(&mut self, snapshot_json: &str) -> Result<(), JsValue> {
        let saved: SerializableState =
            serde_json::from_str(snapshot_json).map_err(serde_to_js_error)?;
        self.state = game::restore(saved).map_err(to_js_error)?;
        Ok(())
    }

    pub fn place_card(&mut self, row: usize, col: usize) -> Result<String, JsValue> {
        let events = execute_with_engine(&mut self.state, |engine, state| {
            engine.place_card(state, Position::new(row, col))
        })?;
        make_resolution_json(make_resolution(self.state.clone(), events))
    }

    pub fn resolve_card(&mut self, row: usize, col: usize) -> Result<String, JsValue> {
        let events = execute_with_engine(&mut self.state, |engine, state| {
            engine.resolve_card(state, Position::new(row, col))
        })?;
        make_resolution_json(make_resolution(self.state.clone(), events))
    }

    pub fn choose_item(&mut self, card_code: &str) -> Result<String, JsValue> {
        let card = parse_card(card_code)?;
        let events = execute_with_engine(&mut self.state, |engine, state| {
            engine.choose_item(state, card)
        })?;
        make_resolution_json(make_resolution(self.state.clone(), events))
    }

    pub fn stats_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.state.stats()).map_err(serde_to_js_error)
    }

    pub fn is_game_over(&self) -> bool {
        self.state.is_game_over
    }
}

#[wasm_bindgen(js_name = "newGame")]
pub fn new_game(options: JsValue) -> Result<JsValue, JsValue> {
    let options: GameOptions = if options.is_undefined() || options.is_null() {
        GameOptions::default()
    } else {
        from_value(options).map_err(JsValue::from)?
    };
    to_value(&GameState::new(&options)).map_err(JsValue::from)
}

/// 在指定空位放牌，返回更新后的状态与触发事件。
#[wasm_bindgen(js_name = "placeCard")]
pub fn place_card(state: JsValue, row: usize, col: usize) -> Result<JsValue, JsValue> {
    let mut state: GameState = from_value(state).map_err(JsValue::from)?;
    let mut engine = RuleEngine::new();
    match engine.place_card(&mut state, Position::new(row, col)) {
        Ok(events) => to_value(&make_resolution(state, events)).map_err(JsValue::from),
        Err(error) => Err(to_js_error(error)),
    }
}

#[wasm_bindgen(js_name = "resolveCard")]
pub fn resolve_card(state: JsValue, row: usize, col: usize) -> Result<JsValue, JsValue> {
    let mut state: GameState = from_value(state).map_err(JsValue::from)?;
    let mut engine = RuleEngine::new();
    match engine.resolve_card(&mut state, Position::new(row, col)) {
        Ok(events) => to_value(&make_resolution(state, events)).map_err(JsValue::from),
        Err(error) => Err(to_js_error(error)),
    }
}

#[wasm_bindgen(js_name = "chooseItem")]
pub fn choose_item(state: JsValue, card_code: &str) -> Result<JsValue, JsValue> {
    let mut state: GameState = from_value(state).map_err(JsValue::from)?;
    let card = parse_card(card_code)?;
    let mut engine = RuleEngine::new();
    match engine.choose_item(&mut state, card) {
        Ok(events) => to_value(&make_resolution(state, events)).map_err(JsValue::from),
        Err(error) => Err(to_js_error(error)),
    }
}

#[wasm_bindgen(js_name = "snapshotState")]
pub fn snapshot_state(state: JsValue) -> Result<JsValue, JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    to_value(&game::snapshot(&state)).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "restoreState")]
pub fn restore_state(snapshot: JsValue) -> Result<JsValue, JsValue> {
    let saved: SerializableState = from_value(snapshot).map_err(JsValue::from)?;
    let state = game::restore(saved).map_err(to_js_error)?;
    to_value(&state).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "validateState")]
pub fn validate_state(state: JsValue) -> Result<(), JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    state
        .integrity_check()
        .map_err(|error| to_js_error(RuleError::IntegrityViolation { error }))?;
    Ok(())
}

/// 返回地牢牌代码（如 `"QS"`）对应的名称，非地牢牌返回 `undefined`。
#[wasm_bindgen(js_name = "describeCard")]
pub fn describe_card(card_code: &str) -> Result<Option<String>, JsValue> {
    let card = parse_card(card_code)?;
    Ok(game::card_name(card))
}

#[cfg(feature = "console_error_panic_hook")]
fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

#[cfg(not(feature = "console_error_panic_hook"))]
fn set_panic_hook() {}
