use serde::{Deserialize, Serialize};

use super::cards::{Card, Suit, Value};
use super::rng::{shuffle, Mulberry32};

pub const HEALTH_CAPACITY: usize = 5;
pub const GEMS_CAPACITY: usize = 10;
pub const INVENTORY_CAPACITY: usize = 7;
pub const FATE_CAPACITY: usize = 5;
pub const DUNGEON_DECK_SIZE: usize = 27;

/// 资源牌堆种类。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum PileKind {
    Health,
    Gems,
    Inventory,
    Fate,
}

impl PileKind {
    pub const ALL: [PileKind; 4] = [
        PileKind::Health,
        PileKind::Gems,
        PileKind::Inventory,
        PileKind::Fate,
    ];

    pub fn capacity(self) -> usize {
        match self {
            PileKind::Health => HEALTH_CAPACITY,
            PileKind::Gems => GEMS_CAPACITY,
            PileKind::Inventory => INVENTORY_CAPACITY,
            PileKind::Fate => FATE_CAPACITY,
        }
    }

    /// 该牌堆固定的组成牌，按建堆顺序排列。
    pub fn cards(self) -> Vec<Card> {
        match self {
            PileKind::Health => ranked(Suit::Hearts, &Value::RANKED[0..5]),
            PileKind::Gems => ranked(Suit::Diamonds, &Value::RANKED[0..10]),
            PileKind::Inventory => {
                let mut cards = ranked(Suit::Hearts, &Value::RANKED[10..13]);
                cards.extend(ranked(Suit::Diamonds, &Value::RANKED[10..13]));
                cards.push(Card::known(Suit::Red, Value::Joker));
                cards
            }
            PileKind::Fate => ranked(Suit::Hearts, &Value::RANKED[5..10]),
        }
    }

    /// 开局牌堆：生命全部可用，宝石按顺序放入库存，物品与命运洗牌。
    pub fn initial_pile(self, rng: &mut Mulberry32) -> Pile {
        let mut cards = self.cards();
        match self {
            PileKind::Health => Pile::new(Vec::new(), cards),
            PileKind::Gems => Pile::new(cards, Vec::new()),
            PileKind::Inventory | PileKind::Fate => {
                shuffle(&mut cards, rng);
                Pile::new(cards, Vec::new())
            }
        }
    }
}

fn ranked(suit: Suit, values: &[Value]) -> Vec<Card> {
    values
        .iter()
        .map(|value| Card::known(suit, *value))
        .collect()
}

/// 洗牌前的 27 张地牢牌：梅花、黑桃加黑色小丑。
pub fn dungeon_deck() -> Vec<Card> {
    let mut cards = ranked(Suit::Clubs, &Value::RANKED);
    cards.extend(ranked(Suit::Spades, &Value::RANKED));
    cards.push(Card::known(Suit::Black, Value::Joker));
    cards
}

/// 牌堆：`stock` 为背面朝上的库存，末尾为顶；`available` 为玩家持有的部分，末尾为最近获得。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pile {
    pub stock: Vec<Card>,
    pub available: Vec<Card>,
}

impl Pile {
    pub fn new(stock: Vec<Card>, available: Vec<Card>) -> Self {
        Self { stock, available }
    }

    pub fn total(&self) -> usize {
        self.stock.len() + self.available.len()
    }

    pub fn available_count(&self) -> usize {
        self.available.len()
    }

    /// 从库存移动至多 `amount` 张到可用区，返回实际移动的张数。
    pub fn gain(&mut self, amount: usize) -> usize {
        let mut moved = 0;
        while moved < amount {
            let Some(card) = self.stock.pop() else {
                break;
            };
            self.available.push(card);
            moved += 1;
        }
        moved
    }

    /// 从可用区移回至多 `amount` 张到库存，返回实际移动的张数。
    pub fn lose(&mut self, amount: usize) -> usize {
        let mut moved = 0;
        while moved < amount {
            let Some(card) = self.available.pop() else {
                break;
            };
            self.stock.push(card);
            moved += 1;
        }
        moved
    }

    /// 把库存中指定的一张牌移到可用区。
    pub fn take_from_stock(&mut self, card: Card) -> bool {
        match self.stock.iter().position(|candidate| *candidate == card) {
            Some(index) => {
                let card = self.stock.remove(index);
                self.available.push(card);
                true
            }
            None => false,
        }
    }

    /// 与 `expected` 的牌完全一致（不区分区域与顺序）。
    pub fn holds_exactly(&self, expected: &[Card]) -> bool {
        let mut held: Vec<Card> = self.stock.iter().chain(&self.available).copied().collect();
        let mut expected = expected.to_vec();
        held.sort_unstable();
        expected.sort_unstable();
        held == expected
    }
}
