use serde::{Deserialize, Serialize};
use tracing::info;

use super::cards::{Card, CardError, Suit, Value};
use super::grid::{Grid, Position, MAX_HEIGHT, MAX_WIDTH};
use super::pile::{dungeon_deck, Pile, PileKind};
use super::rng::Mulberry32;
use super::state::{GameState, IntegrityError, PendingChoice};

/// 稀疏记录的地牢格子：只保存有牌的格子。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CellSnapshot {
    pub row: usize,
    pub col: usize,
    #[serde(alias = "suitKey")]
    pub suit: Suit,
    #[serde(alias = "valueKey")]
    pub value: Value,
    #[serde(default, alias = "cardFaceDown")]
    pub face_down: bool,
}

/// 与浏览器版共用的扁平存档格式，可选字段缺省时取默认值。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SerializableState {
    pub health: Pile,
    pub inventory: Pile,
    pub gems: Pile,
    pub fate: Pile,
    pub dungeon_stock: Vec<Card>,
    pub dungeon_matrix: Vec<CellSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matrix_rows: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matrix_cols: Option<usize>,
    #[serde(default)]
    pub is_game_over: bool,
    #[serde(default)]
    pub dragon_queen_defeated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rng_state: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_choice: Option<PendingChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cards_explored: Option<usize>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, thiserror::Error)]
#[serde(tag = "type")]
pub enum RestoreError {
    #[error("invalid card in dungeon matrix: {error}")]
    InvalidCard { error: CardError },
    #[error("matrix {rows}x{cols} is outside 1x1..{max_rows}x{max_cols}")]
    BadDimensions {
        rows: usize,
        cols: usize,
        max_rows: usize,
        max_cols: usize,
    },
    #[error("cell ({row}, {col}) lies outside the matrix")]
    CellOutsideMatrix { row: usize, col: usize },
    #[error("cell ({row}, {col}) appears twice")]
    DuplicateCell { row: usize, col: usize },
    #[error("{pile:?} pile holds {actual} cards, expected {expected}")]
    PileCountMismatch {
        pile: PileKind,
        expected: usize,
        actual: usize,
    },
    #[error("{pile:?} pile holds cards that do not belong to it")]
    WrongPileCards { pile: PileKind },
    #[error("dungeon stock and matrix do not hold the 27 dungeon cards")]
    WrongDungeonCards,
    #[error("the dungeon matrix holds no card")]
    EmptyDungeon,
    #[error("save is marked finished but the hero is alive and the dragon queen stands")]
    GameOverWithoutCause,
    #[error("restored state is inconsistent: {error}")]
    Integrity { error: IntegrityError },
}

impl From<CardError> for RestoreError {
    fn from(error: CardError) -> Self {
        RestoreError::InvalidCard { error }
    }
}

impl From<IntegrityError> for RestoreError {
    fn from(error: IntegrityError) -> Self {
        RestoreError::Integrity { error }
    }
}

pub fn snapshot(state: &GameState) -> SerializableState {
    let dungeon_matrix = state
        .grid
        .occupied()
        .filter_map(|(position, cell)| {
            cell.card.map(|card| CellSnapshot {
                row: position.row,
                col: position.col,
                suit: card.suit(),
                value: card.value(),
                face_down: cell.face_down,
            })
        })
        .collect();

    SerializableState {
        health: state.health.clone(),
        inventory: state.inventory.clone(),
        gems: state.gems.clone(),
        fate: state.fate.clone(),
        dungeon_stock: state.dungeon_stock.clone(),
        dungeon_matrix,
        matrix_rows: Some(state.grid.rows()),
        matrix_cols: Some(state.grid.cols()),
        is_game_over: state.is_game_over,
        dragon_queen_defeated: state.dragon_queen_defeated,
        rng_state: Some(state.rng.state()),
        pending_choice: state.pending_choice.clone(),
        cards_explored: Some(state.cards_explored),
    }
}

fn validate_pile(kind: PileKind, pile: &Pile) -> Result<(), RestoreError> {
    if pile.total() != kind.capacity() {
        return Err(RestoreError::PileCountMismatch {
            pile: kind,
            expected: kind.capacity(),
            actual: pile.total(),
        });
    }
    if !pile.holds_exactly(&kind.cards()) {
        return Err(RestoreError::WrongPileCards { pile: kind });
    }
    Ok(())
}

/// 按存档尺寸重建网格：重算可交互状态，但不调整矩阵尺寸。
fn restore_grid(saved: &SerializableState) -> Result<Grid, RestoreError> {
    let rows = saved
        .matrix_rows
        .unwrap_or_else(|| saved.dungeon_matrix.iter().map(|cell| cell.row + 1).max().unwrap_or(1));
    let cols = saved
        .matrix_cols
        .unwrap_or_else(|| saved.dungeon_matrix.iter().map(|cell| cell.col + 1).max().unwrap_or(1));
    if !(1..=MAX_HEIGHT).contains(&rows) || !(1..=MAX_WIDTH).contains(&cols) {
        return Err(RestoreError::BadDimensions {
            rows,
            cols,
            max_rows: MAX_HEIGHT,
            max_cols: MAX_WIDTH,
        });
    }

    let mut grid = Grid::with_dimensions(rows, cols);
    for saved_cell in &saved.dungeon_matrix {
        let position = Position::new(saved_cell.row, saved_cell.col);
        let card = Card::new(saved_cell.suit, saved_cell.value)?;
        match grid.cell(position) {
            None => {
                return Err(RestoreError::CellOutsideMatrix {
                    row: position.row,
                    col: position.col,
                })
            }
            Some(cell) if cell.has_card() => {
                return Err(RestoreError::DuplicateCell {
                    row: position.row,
                    col: position.col,
                })
            }
            Some(_) => {
                grid.set_card(position, card, saved_cell.face_down);
            }
        }
    }
    if grid.occupied_count() == 0 {
        return Err(RestoreError::EmptyDungeon);
    }
    grid.refresh_availability();
    Ok(grid)
}

pub fn restore(saved: SerializableState) -> Result<GameState, RestoreError> {
    validate_pile(PileKind::Health, &saved.health)?;
    validate_pile(PileKind::Gems, &saved.gems)?;
    validate_pile(PileKind::Inventory, &saved.inventory)?;
    validate_pile(PileKind::Fate, &saved.fate)?;

    if saved.is_game_over
        && !saved.health.available.is_empty()
        && !saved.dragon_queen_defeated
    {
        return Err(RestoreError::GameOverWithoutCause);
    }

    let grid = restore_grid(&saved)?;

    let mut dungeon_cards: Vec<Card> = saved.dungeon_stock.clone();
    dungeon_cards.extend(grid.cards());
    dungeon_cards.sort_unstable();
    let mut expected = dungeon_deck();
    expected.sort_unstable();
    if dungeon_cards != expected {
        return Err(RestoreError::WrongDungeonCards);
    }

    let rng = match saved.rng_state {
        Some(state) => Mulberry32::new(state),
        None => Mulberry32::from_entropy_seed(),
    };

    // 旧存档没有探索计数，以起始牌之外的已放牌数估算
    let cards_explored = saved
        .cards_explored
        .unwrap_or_else(|| grid.occupied_count().saturating_sub(1));

    let mut state = GameState {
        health: saved.health,
        gems: saved.gems,
        inventory: saved.inventory,
        fate: saved.fate,
        dungeon_stock: saved.dungeon_stock,
        grid,
        is_game_over: false,
        dragon_queen_defeated: saved.dragon_queen_defeated,
        outcome: None,
        pending_choice: saved.pending_choice,
        rng,
        cards_explored,
        event_log: Vec::new(),
    };
    if saved.is_game_over {
        // 存档只记录结束标记，结局从牌堆重建
        state.check_game_over();
        if !state.is_game_over {
            state.declare_victory();
        }
    } else {
        state.check_game_over();
    }

    state.integrity_check()?;
    info!(
        rows = state.grid.rows(),
        cols = state.grid.cols(),
        placed = state.grid.occupied_count(),
        "state restored"
    );
    Ok(state)
}
