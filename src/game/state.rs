use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::cards::{Card, Suit, Value};
use super::effects::EffectId;
use super::grid::{Grid, Position, MAX_HEIGHT, MAX_WIDTH};
use super::pile::{dungeon_deck, Pile, PileKind, DUNGEON_DECK_SIZE};
use super::rng::{shuffle, Mulberry32};

/// 商人/巫师选项里附带的“出口”万能牌。
pub const EXIT_WILDCARD: Card = Card::known(Suit::Spades, Value::Ace);

/// 开局参数，可由前端以 JSON 传入。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct GameOptions {
    pub seed: Option<u32>,
}

impl GameOptions {
    pub fn seeded(seed: u32) -> Self {
        Self { seed: Some(seed) }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameStats {
    pub cards_explored: usize,
    pub total_cards_placed: usize,
    pub gems_collected: usize,
    pub inventory_items: usize,
    pub health_remaining: usize,
    pub dungeon_cards_remaining: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OutcomeKind {
    Defeat,
    Victory,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameOutcome {
    pub kind: OutcomeKind,
    pub stats: GameStats,
}

/// 等待玩家从列表中选一张物品牌（商人/慷慨巫师）。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingChoice {
    pub source: Position,
    pub effect: EffectId,
    pub prompt: String,
    pub options: Vec<Card>,
    pub gem_cost: usize,
}

/// 游戏事件流。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameEvent {
    CardPlaced {
        position: Position,
        card: Card,
    },
    CardResolved {
        position: Position,
        card: Card,
        effect: EffectId,
    },
    ResolutionDeferred {
        position: Position,
        card: Card,
        reason: String,
    },
    PileGained {
        pile: PileKind,
        requested: usize,
        moved: usize,
    },
    PileLost {
        pile: PileKind,
        requested: usize,
        moved: usize,
    },
    DamageAbsorbed {
        damage: usize,
        gems_spent: usize,
    },
    FateDrawn {
        card: Card,
        value: u8,
    },
    FateReshuffled {
        cards: usize,
    },
    PassageLinked {
        from: Position,
        to: Position,
    },
    Message {
        text: String,
    },
    ChoiceOffered {
        prompt: String,
        options: Vec<Card>,
        gem_cost: usize,
    },
    ItemChosen {
        card: Card,
    },
    DungeonReset {
        cards_returned: usize,
    },
    DragonQueenDefeated,
    GameOver {
        stats: GameStats,
    },
    Victory {
        stats: GameStats,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[serde(tag = "type")]
pub enum IntegrityError {
    #[error("{pile:?} pile holds {actual} cards, expected {expected}")]
    PileTotalMismatch {
        pile: PileKind,
        expected: usize,
        actual: usize,
    },
    #[error("dungeon holds {actual} cards, expected {expected}")]
    DungeonTotalMismatch { expected: usize, actual: usize },
    #[error("grid is {rows}x{cols}, larger than the dungeon allows")]
    GridTooLarge { rows: usize, cols: usize },
    #[error("grid holds no card")]
    EmptyGrid,
}

/// 游戏整体状态。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub health: Pile,
    pub gems: Pile,
    pub inventory: Pile,
    pub fate: Pile,
    pub dungeon_stock: Vec<Card>,
    pub grid: Grid,
    #[serde(default)]
    pub is_game_over: bool,
    #[serde(default)]
    pub dragon_queen_defeated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<GameOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_choice: Option<PendingChoice>,
    pub rng: Mulberry32,
    /// 放牌翻开过的地牢牌总数，跨越地牢重置累计。
    #[serde(default)]
    pub cards_explored: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_log: Vec<GameEvent>,
}

impl GameState {
    pub fn new(options: &GameOptions) -> Self {
        let mut rng = match options.seed {
            Some(seed) => Mulberry32::new(seed),
            None => Mulberry32::from_entropy_seed(),
        };

        let health = PileKind::Health.initial_pile(&mut rng);
        let inventory = PileKind::Inventory.initial_pile(&mut rng);
        let gems = PileKind::Gems.initial_pile(&mut rng);
        let fate = PileKind::Fate.initial_pile(&mut rng);

        let mut dungeon_stock = dungeon_deck();
        shuffle(&mut dungeon_stock, &mut rng);
        let grid = match dungeon_stock.pop() {
            Some(seed_card) => Grid::seeded(seed_card),
            None => Grid::with_dimensions(1, 1),
        };

        debug!(seed = ?options.seed, "new dungeon dealt");
        Self {
            health,
            gems,
            inventory,
            fate,
            dungeon_stock,
            grid,
            is_game_over: false,
            dragon_queen_defeated: false,
            outcome: None,
            pending_choice: None,
            rng,
            cards_explored: 0,
            event_log: Vec::new(),
        }
    }

    pub fn seeded(seed: u32) -> Self {
        Self::new(&GameOptions::seeded(seed))
    }

    pub fn record_event(&mut self, event: GameEvent) {
        self.event_log.push(event);
    }

    pub fn events_since(&self, mark: usize) -> Vec<GameEvent> {
        self.event_log.get(mark..).map(<[GameEvent]>::to_vec).unwrap_or_default()
    }

    pub fn is_finished(&self) -> bool {
        self.is_game_over
    }

    pub fn pile(&self, kind: PileKind) -> &Pile {
        match kind {
            PileKind::Health => &self.health,
            PileKind::Gems => &self.gems,
            PileKind::Inventory => &self.inventory,
            PileKind::Fate => &self.fate,
        }
    }

    pub fn pile_mut(&mut self, kind: PileKind) -> &mut Pile {
        match kind {
            PileKind::Health => &mut self.health,
            PileKind::Gems => &mut self.gems,
            PileKind::Inventory => &mut self.inventory,
            PileKind::Fate => &mut self.fate,
        }
    }

    pub fn gain(&mut self, kind: PileKind, amount: usize) -> usize {
        let moved = self.pile_mut(kind).gain(amount);
        self.record_event(GameEvent::PileGained {
            pile: kind,
            requested: amount,
            moved,
        });
        moved
    }

    /// 失去牌；生命耗尽时触发游戏结束检查。
    pub fn lose(&mut self, kind: PileKind, amount: usize) -> usize {
        let moved = self.pile_mut(kind).lose(amount);
        self.record_event(GameEvent::PileLost {
            pile: kind,
            requested: amount,
            moved,
        });
        if kind == PileKind::Health && self.health.available.is_empty() {
            self.check_game_over();
        }
        moved
    }

    /// 每颗可用宝石抵消一点伤害，其余扣除生命。
    pub fn take_damage(&mut self, damage: usize, absorb_with_gems: bool) -> usize {
        let mut remaining = damage;
        if absorb_with_gems && remaining > 0 {
            let gems_spent = self.gems.available_count().min(remaining);
            if gems_spent > 0 {
                self.lose(PileKind::Gems, gems_spent);
                self.record_event(GameEvent::DamageAbsorbed { damage, gems_spent });
                remaining -= gems_spent;
            }
        }
        if remaining > 0 {
            self.lose(PileKind::Health, remaining)
        } else {
            0
        }
    }

    /// 仅在真正结束游戏的那次调用返回 true。
    pub fn check_game_over(&mut self) -> bool {
        if self.is_game_over || !self.health.available.is_empty() {
            return false;
        }
        self.is_game_over = true;
        let stats = self.stats();
        warn!(?stats, "health depleted, game over");
        self.outcome = Some(GameOutcome {
            kind: OutcomeKind::Defeat,
            stats,
        });
        self.record_event(GameEvent::GameOver { stats });
        true
    }

    /// 抽一张命运牌，库存为空时先把已用的牌洗回库存。返回 6..=10。
    pub fn draw_fate(&mut self) -> Option<u8> {
        if self.fate.stock.is_empty() {
            let mut cards = std::mem::take(&mut self.fate.available);
            shuffle(&mut cards, &mut self.rng);
            debug!(cards = cards.len(), "fate deck reshuffled");
            self.record_event(GameEvent::FateReshuffled { cards: cards.len() });
            self.fate.stock = cards;
        }
        let card = self.fate.stock.pop()?;
        self.fate.available.push(card);
        let value = card.value().order()?;
        debug!(%card, value, "fate drawn");
        self.record_event(GameEvent::FateDrawn { card, value });
        Some(value)
    }

    pub fn display_message(&mut self, text: impl Into<String>) {
        self.record_event(GameEvent::Message { text: text.into() });
    }

    /// 物品库存加上出口万能牌。
    pub fn item_choices(&self) -> Vec<Card> {
        let mut options = self.inventory.stock.clone();
        options.push(EXIT_WILDCARD);
        options
    }

    pub fn offer_choice(
        &mut self,
        source: Position,
        effect: EffectId,
        prompt: impl Into<String>,
        gem_cost: usize,
    ) {
        let prompt = prompt.into();
        let options = self.item_choices();
        self.record_event(GameEvent::ChoiceOffered {
            prompt: prompt.clone(),
            options: options.clone(),
            gem_cost,
        });
        self.pending_choice = Some(PendingChoice {
            source,
            effect,
            prompt,
            options,
            gem_cost,
        });
    }

    /// 出口：已击败龙后则胜利，否则重置地牢。
    pub fn exit_dungeon(&mut self) {
        if self.dragon_queen_defeated {
            self.declare_victory();
        } else {
            self.reset_dungeon();
        }
    }

    /// 所有地牢牌洗回库存，重新发一张背面朝上的起始牌。
    /// 生命、宝石、物品与命运牌保持不变。
    pub fn reset_dungeon(&mut self) {
        let mut cards: Vec<Card> = self.grid.cards().collect();
        let cards_returned = cards.len();
        cards.append(&mut self.dungeon_stock);
        shuffle(&mut cards, &mut self.rng);
        if let Some(seed_card) = cards.pop() {
            self.grid = Grid::seeded(seed_card);
        }
        self.dungeon_stock = cards;
        info!(cards_returned, "dungeon reset");
        self.record_event(GameEvent::DungeonReset { cards_returned });
    }

    pub fn defeat_dragon_queen(&mut self) {
        if self.dragon_queen_defeated {
            return;
        }
        self.dragon_queen_defeated = true;
        info!("dragon queen defeated");
        self.record_event(GameEvent::DragonQueenDefeated);
    }

    pub fn declare_victory(&mut self) {
        if self.is_game_over {
            return;
        }
        self.is_game_over = true;
        let stats = self.stats();
        info!(?stats, "dungeon escaped, victory");
        self.outcome = Some(GameOutcome {
            kind: OutcomeKind::Victory,
            stats,
        });
        self.record_event(GameEvent::Victory { stats });
    }

    pub fn stats(&self) -> GameStats {
        GameStats {
            cards_explored: self.cards_explored,
            total_cards_placed: self.grid.occupied_count(),
            gems_collected: self.gems.available_count(),
            inventory_items: self.inventory.available_count(),
            health_remaining: self.health.available_count(),
            dungeon_cards_remaining: self.dungeon_stock.len(),
        }
    }

    pub fn cell_card(&self, position: Position) -> Option<Card> {
        self.grid.cell(position).and_then(|cell| cell.card)
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        for kind in PileKind::ALL {
            let actual = self.pile(kind).total();
            if actual != kind.capacity() {
                return Err(IntegrityError::PileTotalMismatch {
                    pile: kind,
                    expected: kind.capacity(),
                    actual,
                });
            }
        }

        let placed = self.grid.occupied_count();
        if placed == 0 {
            return Err(IntegrityError::EmptyGrid);
        }
        let actual = self.dungeon_stock.len() + placed;
        if actual != DUNGEON_DECK_SIZE {
            return Err(IntegrityError::DungeonTotalMismatch {
                expected: DUNGEON_DECK_SIZE,
                actual,
            });
        }

        if self.grid.rows() > MAX_HEIGHT || self.grid.cols() > MAX_WIDTH {
            return Err(IntegrityError::GridTooLarge {
                rows: self.grid.rows(),
                cols: self.grid.cols(),
            });
        }

        Ok(())
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new(&GameOptions::default())
    }
}
