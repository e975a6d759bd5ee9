use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::cards::{Card, Suit, Value};
use super::grid::Position;
use super::pile::PileKind;
use super::state::{GameEvent, GameState};

const MERCHANT_PROMPT: &str = "Purchase an inventory item: Treasure, Healing, Gem, or Exit";
const WIZARD_PROMPT: &str = "Choose an inventory item to gain: Treasure, Healing, Gem, or Exit";
const MERCHANT_NO_GEMS: &str = "You need at least 1 gem to use this card.";
const PASSAGE_UNMATCHED: &str =
    "You found a passage, but it doesn't match any other passage in the dungeon.";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EffectId {
    Exit,
    HiddenPitTrap,
    ShallowPitTrap,
    PitTrap,
    DeepPitTrap,
    Passage,
    Gem,
    Healing,
    TreasureChest,
    Slime,
    Skeleton,
    DragonQueen,
    Troll,
    YoungDragon,
    TrollKing,
    Merchant,
    GenerousWizard,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum EffectKind {
    ExitDungeon,
    PitTrap {
        damage: usize,
        hidden: bool,
    },
    Passage,
    GainResource {
        pile: PileKind,
        amount: usize,
    },
    DefeatDragonQueen,
    Enemy {
        threshold: u8,
        damage: usize,
        critical: Box<EffectKind>,
    },
    ItemSelection {
        gem_cost: usize,
        prompt: String,
    },
    Composite {
        effects: Vec<EffectKind>,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EffectDefinition {
    pub id: EffectId,
    pub name: String,
    pub kind: EffectKind,
}

/// 结算结果。`Deferred` 时卡牌保持正面朝上，可再次尝试。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum EffectOutcome {
    Resolved,
    Deferred { reason: String },
}

impl EffectOutcome {
    pub fn is_resolved(&self) -> bool {
        matches!(self, EffectOutcome::Resolved)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EffectContext {
    pub card: Card,
    pub position: Position,
}

impl EffectContext {
    pub fn new(card: Card, position: Position) -> Self {
        Self { card, position }
    }
}

fn gain(pile: PileKind, amount: usize) -> EffectKind {
    EffectKind::GainResource { pile, amount }
}

fn enemy(threshold: u8, damage: usize, critical: EffectKind) -> EffectKind {
    EffectKind::Enemy {
        threshold,
        damage,
        critical: Box::new(critical),
    }
}

fn item_selection(gem_cost: usize, prompt: &str) -> EffectKind {
    EffectKind::ItemSelection {
        gem_cost,
        prompt: prompt.to_string(),
    }
}

fn pit_trap_name(damage: usize, hidden: bool) -> String {
    let visibility = if hidden { "Hidden" } else { "Visible" };
    format!("{visibility} Pit Trap ({damage} damage)")
}

static DEFINITIONS: Lazy<HashMap<EffectId, EffectDefinition>> = Lazy::new(|| {
    let pit = |id, damage, hidden| {
        (
            id,
            pit_trap_name(damage, hidden),
            EffectKind::PitTrap { damage, hidden },
        )
    };
    let entries = vec![
        (EffectId::Exit, "Exit".to_string(), EffectKind::ExitDungeon),
        pit(EffectId::HiddenPitTrap, 2, true),
        pit(EffectId::ShallowPitTrap, 1, false),
        pit(EffectId::PitTrap, 2, false),
        pit(EffectId::DeepPitTrap, 3, false),
        (EffectId::Passage, "Passage".to_string(), EffectKind::Passage),
        (EffectId::Gem, "Gem".to_string(), gain(PileKind::Gems, 1)),
        (EffectId::Healing, "Healing".to_string(), gain(PileKind::Health, 2)),
        (
            EffectId::TreasureChest,
            "Treasure Chest".to_string(),
            gain(PileKind::Inventory, 1),
        ),
        (
            EffectId::Slime,
            "Slime".to_string(),
            enemy(7, 1, gain(PileKind::Health, 1)),
        ),
        (
            EffectId::Skeleton,
            "Skeleton".to_string(),
            enemy(8, 1, gain(PileKind::Gems, 1)),
        ),
        (
            EffectId::DragonQueen,
            "Dragon Queen".to_string(),
            enemy(9, 3, EffectKind::DefeatDragonQueen),
        ),
        (
            EffectId::Troll,
            "Troll".to_string(),
            enemy(9, 2, gain(PileKind::Inventory, 1)),
        ),
        (
            EffectId::YoungDragon,
            "Young Dragon".to_string(),
            enemy(10, 1, gain(PileKind::Gems, 3)),
        ),
        (
            EffectId::TrollKing,
            "Troll King".to_string(),
            enemy(
                9,
                3,
                EffectKind::Composite {
                    effects: vec![
                        gain(PileKind::Gems, 1),
                        gain(PileKind::Inventory, 1),
                        gain(PileKind::Health, 1),
                    ],
                },
            ),
        ),
        (
            EffectId::Merchant,
            "Merchant".to_string(),
            item_selection(1, MERCHANT_PROMPT),
        ),
        (
            EffectId::GenerousWizard,
            "Generous Wizard".to_string(),
            item_selection(0, WIZARD_PROMPT),
        ),
    ];
    entries
        .into_iter()
        .map(|(id, name, kind)| (id, EffectDefinition { id, name, kind }))
        .collect()
});

/// (花色, 点数) → 效果。梅花 7..J 与黑桃共用同一效果。
static REGISTRY: Lazy<HashMap<(Suit, Value), EffectId>> = Lazy::new(|| {
    let mut registry = HashMap::new();
    let spades = [
        (Value::Ace, EffectId::Exit),
        (Value::Two, EffectId::HiddenPitTrap),
        (Value::Three, EffectId::ShallowPitTrap),
        (Value::Four, EffectId::Passage),
        (Value::Five, EffectId::Passage),
        (Value::Six, EffectId::Passage),
        (Value::Seven, EffectId::Gem),
        (Value::Eight, EffectId::Healing),
        (Value::Nine, EffectId::TreasureChest),
        (Value::Ten, EffectId::Slime),
        (Value::Jack, EffectId::Skeleton),
        (Value::Queen, EffectId::DragonQueen),
        (Value::King, EffectId::Troll),
    ];
    for (value, id) in spades {
        registry.insert((Suit::Spades, value), id);
    }

    let clubs = [
        (Value::Ace, EffectId::Merchant),
        (Value::Two, EffectId::PitTrap),
        (Value::Three, EffectId::DeepPitTrap),
        (Value::Four, EffectId::Passage),
        (Value::Five, EffectId::Passage),
        (Value::Six, EffectId::Passage),
        (Value::Queen, EffectId::YoungDragon),
        (Value::King, EffectId::TrollKing),
    ];
    for (value, id) in clubs {
        registry.insert((Suit::Clubs, value), id);
    }
    for value in [Value::Seven, Value::Eight, Value::Nine, Value::Ten, Value::Jack] {
        if let Some(id) = registry.get(&(Suit::Spades, value)).copied() {
            registry.insert((Suit::Clubs, value), id);
        }
    }

    registry.insert((Suit::Black, Value::Joker), EffectId::GenerousWizard);
    registry
});

pub fn effect_for(card: Card) -> Option<EffectId> {
    REGISTRY.get(&(card.suit(), card.value())).copied()
}

pub fn definition(id: EffectId) -> Option<&'static EffectDefinition> {
    DEFINITIONS.get(&id)
}

/// 地牢牌的显示名称，通道牌附带点数。
pub fn card_name(card: Card) -> Option<String> {
    let id = effect_for(card)?;
    let definition = definition(id)?;
    Some(match id {
        EffectId::Passage => format!("{} ({})", definition.name, card.value().code()),
        _ => definition.name.clone(),
    })
}

impl EffectKind {
    pub fn apply(&self, id: EffectId, ctx: &EffectContext, state: &mut GameState) -> EffectOutcome {
        match self {
            EffectKind::ExitDungeon => {
                state.exit_dungeon();
                EffectOutcome::Resolved
            }
            EffectKind::PitTrap { damage, hidden } => {
                state.take_damage(*damage, *hidden);
                EffectOutcome::Resolved
            }
            EffectKind::Passage => resolve_passage(ctx, state),
            EffectKind::GainResource { pile, amount } => {
                state.gain(*pile, *amount);
                EffectOutcome::Resolved
            }
            EffectKind::DefeatDragonQueen => {
                state.defeat_dragon_queen();
                EffectOutcome::Resolved
            }
            EffectKind::Enemy {
                threshold,
                damage,
                critical,
            } => {
                let Some(fate) = state.draw_fate() else {
                    return EffectOutcome::Deferred {
                        reason: "the fate deck is empty".to_string(),
                    };
                };
                if fate < *threshold {
                    state.lose(PileKind::Health, *damage);
                } else if fate == 10 {
                    debug!(card = %ctx.card, "critical success");
                    critical.apply(id, ctx, state);
                }
                EffectOutcome::Resolved
            }
            EffectKind::ItemSelection { gem_cost, prompt } => {
                if state.gems.available_count() < *gem_cost {
                    state.display_message(MERCHANT_NO_GEMS);
                    return EffectOutcome::Deferred {
                        reason: MERCHANT_NO_GEMS.to_string(),
                    };
                }
                state.offer_choice(ctx.position, id, prompt.clone(), *gem_cost);
                EffectOutcome::Resolved
            }
            EffectKind::Composite { effects } => {
                for effect in effects {
                    effect.apply(id, ctx, state);
                }
                EffectOutcome::Resolved
            }
        }
    }
}

fn resolve_passage(ctx: &EffectContext, state: &mut GameState) -> EffectOutcome {
    let other_end = ctx
        .card
        .suit()
        .passage_opposite()
        .and_then(|suit| Card::new(suit, ctx.card.value()).ok())
        .and_then(|card| state.grid.find_face_up(card));

    match other_end {
        Some(position) => {
            state.grid.set_face_down(position);
            state.record_event(GameEvent::PassageLinked {
                from: ctx.position,
                to: position,
            });
            EffectOutcome::Resolved
        }
        None => {
            state.display_message(PASSAGE_UNMATCHED);
            EffectOutcome::Deferred {
                reason: PASSAGE_UNMATCHED.to_string(),
            }
        }
    }
}

#[derive(Default)]
pub struct EffectEngine;

impl EffectEngine {
    /// 查找并执行卡牌效果；没有地牢效果的牌返回 `None`。
    pub fn resolve(
        &self,
        ctx: &EffectContext,
        state: &mut GameState,
    ) -> Option<(EffectId, EffectOutcome)> {
        let id = effect_for(ctx.card)?;
        let definition = definition(id)?;
        let outcome = definition.kind.apply(id, ctx, state);
        debug!(card = %ctx.card, effect = %definition.name, ?outcome, "effect applied");
        Some((id, outcome))
    }
}
