//! 地牢接龙核心逻辑（卡牌、牌堆、地牢网格、效果结算、规则引擎、存档）。

pub mod cards;
pub mod effects;
pub mod grid;
pub mod pile;
pub mod rng;
pub mod rules;
pub mod snapshot;
pub mod state;

pub use cards::{Card, CardError, Suit, Value};
pub use effects::{
    card_name,
    definition,
    effect_for,
    EffectContext,
    EffectDefinition,
    EffectEngine,
    EffectId,
    EffectKind,
    EffectOutcome,
};
pub use grid::{Cell, Grid, Position, MAX_HEIGHT, MAX_WIDTH};
pub use pile::{Pile, PileKind, DUNGEON_DECK_SIZE};
pub use rng::Mulberry32;
pub use rules::{RuleEngine, RuleError, RuleResolution};
pub use snapshot::{restore, snapshot, CellSnapshot, RestoreError, SerializableState};
pub use state::{
    GameEvent,
    GameOptions,
    GameOutcome,
    GameState,
    GameStats,
    IntegrityError,
    OutcomeKind,
    PendingChoice,
    EXIT_WILDCARD,
};
