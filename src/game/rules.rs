use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    cards::Card,
    effects::{EffectContext, EffectEngine, EffectOutcome},
    grid::{Cell, Position},
    pile::PileKind,
    state::{GameEvent, GameOutcome, GameState, IntegrityError, EXIT_WILDCARD},
};

const DUNGEON_EMPTY: &str = "The dungeon deck is empty.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[serde(tag = "type")]
pub enum RuleError {
    #[error("the game is over")]
    GameFinished,
    #[error("({row}, {col}) is outside the {rows}x{cols} dungeon")]
    PositionOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },
    #[error("a card already lies at ({}, {})", position.row, position.col)]
    CellOccupied { position: Position },
    #[error("no card can be placed at ({}, {})", position.row, position.col)]
    CellNotInteractable { position: Position },
    #[error("no card lies at ({}, {})", position.row, position.col)]
    CellEmpty { position: Position },
    #[error("the card at ({}, {}) is not face-up", position.row, position.col)]
    CardNotFaceUp { position: Position },
    #[error("{card} has no dungeon effect")]
    NoEffect { card: Card },
    #[error("an item choice is still pending")]
    ChoicePending,
    #[error("no item choice is pending")]
    NoPendingChoice,
    #[error("{card} is not among the offered items")]
    InvalidChoice { card: Card },
    #[error("integrity violation: {error}")]
    IntegrityViolation { error: IntegrityError },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResolution {
    pub state: GameState,
    pub events: Vec<GameEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<GameOutcome>,
}

impl RuleResolution {
    pub fn new(state: GameState, events: Vec<GameEvent>) -> Self {
        let outcome = state.outcome.clone();
        Self {
            state,
            events,
            outcome,
        }
    }
}

#[derive(Default)]
pub struct RuleEngine {
    effect_engine: EffectEngine,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self {
            effect_engine: EffectEngine,
        }
    }

    fn ensure_active(state: &GameState) -> Result<(), RuleError> {
        if state.is_finished() {
            return Err(RuleError::GameFinished);
        }
        Ok(())
    }

    fn ensure_no_pending_choice(state: &GameState) -> Result<(), RuleError> {
        if state.pending_choice.is_some() {
            return Err(RuleError::ChoicePending);
        }
        Ok(())
    }

    fn ensure_integrity(state: &GameState) -> Result<(), RuleError> {
        state
            .integrity_check()
            .map_err(|error| RuleError::IntegrityViolation { error })
    }

    fn cell_at(state: &GameState, position: Position) -> Result<&Cell, RuleError> {
        state
            .grid
            .cell(position)
            .ok_or(RuleError::PositionOutOfBounds {
                row: position.row,
                col: position.col,
                rows: state.grid.rows(),
                cols: state.grid.cols(),
            })
    }

    fn ensure_can_act(state: &GameState) -> Result<(), RuleError> {
        Self::ensure_active(state)?;
        Self::ensure_no_pending_choice(state)?;
        Self::ensure_integrity(state)
    }

    /// 翻开地牢库存顶牌，正面朝上放到指定空位。
    pub fn place_card(
        &mut self,
        state: &mut GameState,
        position: Position,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_can_act(state)?;

        let cell = Self::cell_at(state, position)?;
        if cell.has_card() {
            return Err(RuleError::CellOccupied { position });
        }
        if !cell.interactable {
            return Err(RuleError::CellNotInteractable { position });
        }

        let mark = state.event_log.len();
        let Some(card) = state.dungeon_stock.pop() else {
            debug!("placement skipped, dungeon stock empty");
            state.display_message(DUNGEON_EMPTY);
            return Ok(state.events_since(mark));
        };

        state.grid.set_card(position, card, false);
        state.cards_explored += 1;
        state.grid.update_after_placing(position);
        info!(%card, row = position.row, col = position.col, "card placed");
        state.record_event(GameEvent::CardPlaced { position, card });

        Ok(state.events_since(mark))
    }

    /// 结算正面朝上的卡牌；被推迟的结算不改变格子。
    pub fn resolve_card(
        &mut self,
        state: &mut GameState,
        position: Position,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_can_act(state)?;

        let cell = Self::cell_at(state, position)?;
        let card = cell.card.ok_or(RuleError::CellEmpty { position })?;
        if cell.face_down {
            return Err(RuleError::CardNotFaceUp { position });
        }

        let mark = state.event_log.len();
        let ctx = EffectContext::new(card, position);
        let (effect, outcome) = self
            .effect_engine
            .resolve(&ctx, state)
            .ok_or(RuleError::NoEffect { card })?;

        match outcome {
            EffectOutcome::Resolved => {
                // 出口效果可能已重新发牌，此位置未必还是这张牌
                if state.cell_card(position) == Some(card) {
                    state.grid.set_face_down(position);
                }
                state.grid.update();
                info!(%card, ?effect, "card resolved");
                state.record_event(GameEvent::CardResolved {
                    position,
                    card,
                    effect,
                });
            }
            EffectOutcome::Deferred { reason } => {
                info!(%card, %reason, "resolution deferred");
                state.record_event(GameEvent::ResolutionDeferred {
                    position,
                    card,
                    reason,
                });
            }
        }

        Ok(state.events_since(mark))
    }

    /// 完成商人/巫师的选择：获得所选物品，或选中出口牌时直接离开地牢。
    pub fn choose_item(
        &mut self,
        state: &mut GameState,
        card: Card,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_active(state)?;
        Self::ensure_integrity(state)?;

        let pending = state
            .pending_choice
            .as_ref()
            .ok_or(RuleError::NoPendingChoice)?;
        if !pending.options.contains(&card) {
            return Err(RuleError::InvalidChoice { card });
        }
        if card != EXIT_WILDCARD && !state.inventory.stock.contains(&card) {
            return Err(RuleError::InvalidChoice { card });
        }

        let mark = state.event_log.len();
        let Some(pending) = state.pending_choice.take() else {
            return Err(RuleError::NoPendingChoice);
        };
        state.record_event(GameEvent::ItemChosen { card });
        if card == EXIT_WILDCARD {
            state.exit_dungeon();
        } else {
            state.inventory.take_from_stock(card);
        }
        if pending.gem_cost > 0 {
            state.lose(PileKind::Gems, pending.gem_cost);
        }
        info!(%card, effect = ?pending.effect, "item chosen");

        Ok(state.events_since(mark))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::cards::{Suit, Value};
    use crate::game::effects::EffectId;
    use crate::game::grid::{Grid, MAX_HEIGHT, MAX_WIDTH};
    use crate::game::pile::DUNGEON_DECK_SIZE;
    use crate::game::state::OutcomeKind;

    fn card(suit: Suit, value: Value) -> Card {
        Card::new(suit, value).expect("valid card")
    }

    fn frontier(state: &GameState) -> Vec<Position> {
        state
            .grid
            .positions()
            .filter(|position| {
                state
                    .grid
                    .cell(*position)
                    .is_some_and(|cell| cell.interactable && !cell.has_card())
            })
            .collect()
    }

    /// 把 `wanted` 移到地牢库存顶部。
    fn stack_dungeon(state: &mut GameState, wanted: Card) {
        if let Some(index) = state.dungeon_stock.iter().position(|card| *card == wanted) {
            let card = state.dungeon_stock.remove(index);
            state.dungeon_stock.push(card);
            return;
        }
        // the card is on the grid: swap it with the top of the stock
        let position = state
            .grid
            .occupied()
            .find(|(_, cell)| cell.card == Some(wanted))
            .map(|(position, _)| position)
            .expect("card is somewhere in the dungeon");
        let replacement = state.dungeon_stock.pop().expect("stock not empty");
        let face_down = state.grid.cell(position).is_some_and(|cell| cell.face_down);
        state.grid.set_card(position, replacement, face_down);
        state.dungeon_stock.push(wanted);
    }

    fn force_fate(state: &mut GameState, value: Value) {
        let wanted = card(Suit::Hearts, value);
        let mut cards: Vec<Card> = state
            .fate
            .stock
            .drain(..)
            .chain(state.fate.available.drain(..))
            .filter(|card| *card != wanted)
            .collect();
        cards.push(wanted);
        state.fate.stock = cards;
    }

    /// 把 `wanted` 放到第一个可放牌的空位，返回落点。
    fn place(engine: &mut RuleEngine, state: &mut GameState, wanted: Card) -> Position {
        stack_dungeon(state, wanted);
        let position = frontier(state)[0];
        engine
            .place_card(state, position)
            .expect("placement should succeed");
        state
            .grid
            .occupied()
            .find(|(_, cell)| cell.card == Some(wanted))
            .map(|(position, _)| position)
            .expect("placed card is on the grid")
    }

    fn assert_invariants(state: &GameState) {
        state.integrity_check().expect("state stays consistent");
        assert_eq!(
            state.dungeon_stock.len() + state.grid.occupied_count(),
            DUNGEON_DECK_SIZE
        );
        assert!(state.grid.rows() <= MAX_HEIGHT && state.grid.cols() <= MAX_WIDTH);
        if let Some(bounds) = state.grid.bounding_box() {
            assert!(bounds.max_row < state.grid.rows());
            assert!(bounds.max_col < state.grid.cols());
        }
    }

    #[test]
    fn placing_next_to_the_seed_reveals_a_card_and_grows_the_grid() {
        let mut state = GameState::seeded(42);
        let mut engine = RuleEngine::new();
        let before = state.dungeon_stock.len();
        let top = *state.dungeon_stock.last().expect("stock card");

        let events = engine
            .place_card(&mut state, Position::new(1, 2))
            .expect("frontier placement");

        assert_eq!(state.dungeon_stock.len(), before - 1);
        assert_eq!((state.grid.rows(), state.grid.cols()), (3, 4));
        let placed = state.grid.cell(Position::new(1, 2)).expect("placed cell");
        assert_eq!(placed.card, Some(top));
        assert!(!placed.face_down);
        assert!(placed.interactable);
        assert!(events.contains(&GameEvent::CardPlaced {
            position: Position::new(1, 2),
            card: top
        }));
        assert_invariants(&state);
    }

    #[test]
    fn placement_preconditions_are_enforced() {
        let mut state = GameState::seeded(42);
        let mut engine = RuleEngine::new();

        assert_eq!(
            engine.place_card(&mut state, Position::new(1, 1)),
            Err(RuleError::CellOccupied {
                position: Position::new(1, 1)
            })
        );
        assert_eq!(
            engine.place_card(&mut state, Position::new(0, 0)),
            Err(RuleError::CellNotInteractable {
                position: Position::new(0, 0)
            })
        );
        assert!(matches!(
            engine.place_card(&mut state, Position::new(9, 9)),
            Err(RuleError::PositionOutOfBounds { .. })
        ));
    }

    #[test]
    fn empty_dungeon_stock_makes_placement_a_no_op() {
        let mut state = GameState::seeded(43);
        let mut engine = RuleEngine::new();
        let mut deck = std::mem::take(&mut state.dungeon_stock);
        deck.extend(state.grid.cards());

        // every dungeon card on the grid, leaving (4, 0) open below a face-down card
        let mut grid = Grid::with_dimensions(MAX_HEIGHT, MAX_WIDTH);
        let positions: Vec<Position> = grid.positions().collect();
        for (position, card) in positions.into_iter().zip(deck) {
            grid.set_card(position, card, true);
        }
        grid.refresh_availability();
        state.grid = grid;
        let grid_before = state.grid.clone();

        let events = engine
            .place_card(&mut state, Position::new(4, 0))
            .expect("empty stock is not an error");

        assert_eq!(
            events,
            vec![GameEvent::Message {
                text: DUNGEON_EMPTY.to_string()
            }]
        );
        assert_eq!(state.grid, grid_before);
        assert_invariants(&state);
    }

    #[test]
    fn resolving_a_gem_flips_the_card_and_opens_its_neighbours() {
        let mut state = GameState::seeded(7);
        let mut engine = RuleEngine::new();
        let gem = card(Suit::Spades, Value::Seven);
        let position = place(&mut engine, &mut state, gem);

        let events = engine
            .resolve_card(&mut state, position)
            .expect("gem resolves");

        assert_eq!(state.gems.available_count(), 1);
        let cell = state.grid.cell(position).expect("cell exists");
        assert!(cell.face_down && !cell.interactable);
        assert!(events.contains(&GameEvent::CardResolved {
            position,
            card: gem,
            effect: EffectId::Gem
        }));
        assert_eq!(
            engine.resolve_card(&mut state, position),
            Err(RuleError::CardNotFaceUp { position })
        );
        assert_invariants(&state);
    }

    #[test]
    fn slime_miss_costs_one_health_and_spends_a_fate_card() {
        let mut state = GameState::seeded(8);
        let mut engine = RuleEngine::new();
        let slime = card(Suit::Spades, Value::Ten);
        let position = place(&mut engine, &mut state, slime);
        force_fate(&mut state, Value::Six);
        let fate_stock = state.fate.stock.len();
        let fate_available = state.fate.available.len();

        engine
            .resolve_card(&mut state, position)
            .expect("enemy always resolves");

        assert_eq!(state.health.available_count(), 4);
        assert_eq!(state.fate.stock.len(), fate_stock - 1);
        assert_eq!(state.fate.available.len(), fate_available + 1);
        assert_eq!(state.fate.available.last(), Some(&card(Suit::Hearts, Value::Six)));
    }

    #[test]
    fn slime_critical_heals_up_to_capacity() {
        let mut state = GameState::seeded(9);
        let mut engine = RuleEngine::new();
        let slime = card(Suit::Clubs, Value::Ten);
        let position = place(&mut engine, &mut state, slime);
        force_fate(&mut state, Value::Ten);

        engine
            .resolve_card(&mut state, position)
            .expect("enemy always resolves");

        assert_eq!(state.health.available_count(), 5, "already at full health");
        assert_eq!(state.health.total(), 5);
    }

    #[test]
    fn unmatched_passage_stays_face_up_until_its_twin_appears() {
        let mut state = GameState::seeded(21);
        let mut engine = RuleEngine::new();
        let spades_five = card(Suit::Spades, Value::Five);
        let first = place(&mut engine, &mut state, spades_five);

        let events = engine
            .resolve_card(&mut state, first)
            .expect("deferral is not an error");
        assert!(events
            .iter()
            .any(|event| matches!(event, GameEvent::ResolutionDeferred { .. })));
        assert!(state.grid.cell(first).is_some_and(|cell| cell.is_face_up_card()));

        let clubs_five = card(Suit::Clubs, Value::Five);
        let second = place(&mut engine, &mut state, clubs_five);
        engine
            .resolve_card(&mut state, second)
            .expect("passage links");
        assert!(state.grid.cell(first).is_some_and(|cell| cell.face_down));
        assert!(state.grid.cell(second).is_some_and(|cell| cell.face_down));
        assert_invariants(&state);
    }

    #[test]
    fn merchant_choice_moves_the_item_and_spends_a_gem() {
        let mut state = GameState::seeded(22);
        let mut engine = RuleEngine::new();
        state.gain(PileKind::Gems, 2);
        let merchant = card(Suit::Clubs, Value::Ace);
        let position = place(&mut engine, &mut state, merchant);

        engine
            .resolve_card(&mut state, position)
            .expect("merchant opens a choice");
        assert!(state.pending_choice.is_some());
        assert_eq!(
            engine.place_card(&mut state, Position::new(0, 0)),
            Err(RuleError::ChoicePending)
        );

        let queen = card(Suit::Diamonds, Value::Queen);
        engine
            .choose_item(&mut state, queen)
            .expect("offered item can be chosen");
        assert_eq!(state.inventory.available, vec![queen]);
        assert_eq!(state.gems.available_count(), 1);
        assert!(state.pending_choice.is_none());
        assert_eq!(
            engine.choose_item(&mut state, queen),
            Err(RuleError::NoPendingChoice)
        );
        assert_invariants(&state);
    }

    #[test]
    fn merchant_without_gems_can_be_retried() {
        let mut state = GameState::seeded(23);
        let mut engine = RuleEngine::new();
        let merchant = card(Suit::Clubs, Value::Ace);
        let position = place(&mut engine, &mut state, merchant);

        engine
            .resolve_card(&mut state, position)
            .expect("deferral is not an error");
        assert!(state.grid.cell(position).is_some_and(|cell| cell.is_face_up_card()));
        assert!(state.pending_choice.is_none());

        state.gain(PileKind::Gems, 1);
        engine
            .resolve_card(&mut state, position)
            .expect("merchant opens a choice");
        assert!(state.pending_choice.is_some());
    }

    #[test]
    fn choosing_an_item_not_on_offer_is_rejected() {
        let mut state = GameState::seeded(24);
        let mut engine = RuleEngine::new();
        let wizard = card(Suit::Black, Value::Joker);
        let position = place(&mut engine, &mut state, wizard);
        engine
            .resolve_card(&mut state, position)
            .expect("wizard opens a choice");

        let health_card = card(Suit::Hearts, Value::Ace);
        assert_eq!(
            engine.choose_item(&mut state, health_card),
            Err(RuleError::InvalidChoice { card: health_card })
        );
        assert!(state.pending_choice.is_some(), "choice stays open");
    }

    #[test]
    fn exit_without_the_dragon_queen_resets_the_dungeon() {
        let mut state = GameState::seeded(25);
        let mut engine = RuleEngine::new();
        state.gain(PileKind::Gems, 2);
        let exit = card(Suit::Spades, Value::Ace);
        let position = place(&mut engine, &mut state, exit);

        let events = engine
            .resolve_card(&mut state, position)
            .expect("exit resolves");

        assert!(events
            .iter()
            .any(|event| matches!(event, GameEvent::DungeonReset { .. })));
        assert_eq!(state.grid.occupied_count(), 1);
        assert_eq!(state.dungeon_stock.len(), DUNGEON_DECK_SIZE - 1);
        assert_eq!(state.gems.available_count(), 2);
        assert!(!state.is_game_over);
        assert_invariants(&state);
    }

    #[test]
    fn wizard_exit_after_the_dragon_queen_wins() {
        let mut state = GameState::seeded(26);
        let mut engine = RuleEngine::new();
        state.defeat_dragon_queen();
        let wizard = card(Suit::Black, Value::Joker);
        let position = place(&mut engine, &mut state, wizard);
        engine
            .resolve_card(&mut state, position)
            .expect("wizard opens a choice");

        engine
            .choose_item(&mut state, EXIT_WILDCARD)
            .expect("exit wildcard is on offer");

        assert!(state.is_game_over);
        assert_eq!(
            state.outcome.as_ref().map(|outcome| outcome.kind),
            Some(OutcomeKind::Victory)
        );
        assert_eq!(state.inventory.available_count(), 0);
        assert_eq!(
            engine.place_card(&mut state, Position::new(0, 0)),
            Err(RuleError::GameFinished)
        );
    }

    #[test]
    fn finished_games_reject_actions() {
        let mut state = GameState::seeded(27);
        let mut engine = RuleEngine::new();
        let gem = card(Suit::Spades, Value::Seven);
        let position = place(&mut engine, &mut state, gem);
        state.lose(PileKind::Health, 5);
        assert!(state.is_game_over);

        assert_eq!(
            engine.resolve_card(&mut state, position),
            Err(RuleError::GameFinished)
        );
    }

    #[test]
    fn resolving_an_empty_cell_is_rejected() {
        let mut state = GameState::seeded(28);
        let mut engine = RuleEngine::new();
        assert_eq!(
            engine.resolve_card(&mut state, Position::new(0, 0)),
            Err(RuleError::CellEmpty {
                position: Position::new(0, 0)
            })
        );
        assert_eq!(
            engine.resolve_card(&mut state, Position::new(1, 1)),
            Err(RuleError::CardNotFaceUp {
                position: Position::new(1, 1)
            })
        );
    }

    #[test]
    fn a_long_seeded_walk_keeps_every_invariant() {
        for seed in [1_u32, 99, 12345] {
            let mut state = GameState::seeded(seed);
            let mut engine = RuleEngine::new();
            for _ in 0..60 {
                if state.is_finished() {
                    break;
                }
                if let Some(pending) = state.pending_choice.clone() {
                    let choice = pending.options[0];
                    engine
                        .choose_item(&mut state, choice)
                        .expect("first option is valid");
                    assert_invariants(&state);
                    continue;
                }
                let face_up = state
                    .grid
                    .occupied()
                    .find(|(_, cell)| cell.is_face_up_card())
                    .map(|(position, _)| position);
                let open = frontier(&state)
                    .first()
                    .copied()
                    .filter(|_| !state.dungeon_stock.is_empty());
                let result = match (open, face_up) {
                    (Some(position), _) => engine.place_card(&mut state, position),
                    (None, Some(position)) => engine.resolve_card(&mut state, position),
                    (None, None) => break,
                };
                result.expect("walk only takes legal actions");
                assert_invariants(&state);
            }
        }
    }

    #[test]
    fn rule_errors_serialize_with_a_type_tag() {
        let json = serde_json::to_value(RuleError::CellEmpty {
            position: Position::new(2, 3),
        })
        .expect("error serializes");
        assert_eq!(json["type"], "CellEmpty");
        assert_eq!(json["position"]["row"], 2);
    }

    #[test]
    fn placing_against_a_full_width_edge_moves_the_margin() {
        let mut state = GameState::seeded(31);
        let mut engine = RuleEngine::new();
        let treasures = [
            card(Suit::Spades, Value::Seven),
            card(Suit::Spades, Value::Eight),
            card(Suit::Spades, Value::Nine),
            card(Suit::Clubs, Value::Seven),
            card(Suit::Clubs, Value::Eight),
        ];

        for treasure in treasures {
            let bounds = state.grid.bounding_box().expect("cards present");
            let position = Position::new(bounds.min_row, bounds.max_col + 1);
            stack_dungeon(&mut state, treasure);
            engine
                .place_card(&mut state, position)
                .expect("the cell right of a face-down card is open");
            let placed = state
                .grid
                .find_face_up(treasure)
                .expect("placed card is face-up");
            engine
                .resolve_card(&mut state, placed)
                .expect("treasure resolves");
            assert_invariants(&state);
        }

        let bounds = state.grid.bounding_box().expect("cards present");
        assert_eq!(state.grid.cols(), MAX_WIDTH);
        assert_eq!(bounds.width(), 6);
        assert_eq!(bounds.max_col + 2, state.grid.cols(), "margin follows the placement");
        assert!(state
            .grid
            .cell(Position::new(bounds.min_row, bounds.max_col + 1))
            .is_some_and(|cell| cell.interactable));
    }

    #[test]
    fn explored_count_survives_resolution_and_reset() {
        let mut state = GameState::seeded(32);
        let mut engine = RuleEngine::new();
        let gem = card(Suit::Spades, Value::Seven);
        let position = place(&mut engine, &mut state, gem);
        assert_eq!(state.stats().cards_explored, 1);

        engine
            .resolve_card(&mut state, position)
            .expect("gem resolves");
        assert_eq!(state.stats().cards_explored, 1);

        let exit = card(Suit::Spades, Value::Ace);
        let position = place(&mut engine, &mut state, exit);
        engine
            .resolve_card(&mut state, position)
            .expect("exit resolves");
        assert_eq!(state.grid.occupied_count(), 1, "dungeon was reset");
        assert_eq!(state.stats().cards_explored, 2);
    }
}
