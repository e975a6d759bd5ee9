use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 花色。`Black`/`Red` 只用于王牌。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Suit {
    Hearts,
    Clubs,
    Diamonds,
    Spades,
    Black,
    Red,
}

impl Suit {
    pub const ALL: [Suit; 6] = [
        Suit::Hearts,
        Suit::Clubs,
        Suit::Diamonds,
        Suit::Spades,
        Suit::Black,
        Suit::Red,
    ];

    pub fn code(self) -> char {
        match self {
            Suit::Hearts => 'H',
            Suit::Clubs => 'C',
            Suit::Diamonds => 'D',
            Suit::Spades => 'S',
            Suit::Black => 'B',
            Suit::Red => 'R',
        }
    }

    pub fn from_code(code: char) -> Option<Suit> {
        Suit::ALL.into_iter().find(|suit| suit.code() == code)
    }

    pub fn glyph(self) -> &'static str {
        match self {
            Suit::Hearts => "♥️",
            Suit::Clubs => "♣️",
            Suit::Diamonds => "♦️",
            Suit::Spades => "♠️",
            Suit::Black => "⚫️",
            Suit::Red => "🔴",
        }
    }

    pub fn is_joker_color(self) -> bool {
        matches!(self, Suit::Black | Suit::Red)
    }

    /// 通道牌的另一端：梅花 ↔ 黑桃。
    pub fn passage_opposite(self) -> Option<Suit> {
        match self {
            Suit::Clubs => Some(Suit::Spades),
            Suit::Spades => Some(Suit::Clubs),
            _ => None,
        }
    }
}

/// 牌面点数，`Ace..King` 有严格顺序，`Joker` 不参与排序。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Value {
    Ace,
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
    Joker,
}

impl Value {
    pub const RANKED: [Value; 13] = [
        Value::Ace,
        Value::Two,
        Value::Three,
        Value::Four,
        Value::Five,
        Value::Six,
        Value::Seven,
        Value::Eight,
        Value::Nine,
        Value::Ten,
        Value::Jack,
        Value::Queen,
        Value::King,
    ];

    pub fn order(self) -> Option<u8> {
        Value::RANKED
            .iter()
            .position(|value| *value == self)
            .map(|index| index as u8 + 1)
    }

    pub fn code(self) -> char {
        match self {
            Value::Ace => 'A',
            Value::Two => '2',
            Value::Three => '3',
            Value::Four => '4',
            Value::Five => '5',
            Value::Six => '6',
            Value::Seven => '7',
            Value::Eight => '8',
            Value::Nine => '9',
            Value::Ten => '0',
            Value::Jack => 'J',
            Value::Queen => 'Q',
            Value::King => 'K',
            Value::Joker => 'X',
        }
    }

    pub fn glyph(self) -> &'static str {
        match self {
            Value::Ace => "A",
            Value::Two => "2",
            Value::Three => "3",
            Value::Four => "4",
            Value::Five => "5",
            Value::Six => "6",
            Value::Seven => "7",
            Value::Eight => "8",
            Value::Nine => "9",
            Value::Ten => "10",
            Value::Jack => "J",
            Value::Queen => "Q",
            Value::King => "K",
            Value::Joker => "X",
        }
    }

    pub fn from_code(code: char) -> Option<Value> {
        Value::RANKED
            .into_iter()
            .chain(std::iter::once(Value::Joker))
            .find(|value| value.code() == code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "type")]
pub enum CardError {
    #[error("suit {suit:?} cannot carry value {value:?}")]
    InvalidPairing { suit: Suit, value: Value },
    #[error("unknown card code {code:?}")]
    UnknownCode { code: String },
}

/// 不可变的卡牌，身份即 (花色, 点数)。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "RawCard")]
pub struct Card {
    suit: Suit,
    value: Value,
}

#[derive(Deserialize)]
struct RawCard {
    #[serde(alias = "suitKey")]
    suit: Suit,
    #[serde(alias = "valueKey")]
    value: Value,
}

impl TryFrom<RawCard> for Card {
    type Error = CardError;

    fn try_from(raw: RawCard) -> Result<Self, Self::Error> {
        Card::new(raw.suit, raw.value)
    }
}

impl Card {
    pub fn new(suit: Suit, value: Value) -> Result<Self, CardError> {
        if suit.is_joker_color() != (value == Value::Joker) {
            return Err(CardError::InvalidPairing { suit, value });
        }
        Ok(Self { suit, value })
    }

    /// 仅供本 crate 内固定牌表使用，花色与点数组合已知合法。
    pub(crate) const fn known(suit: Suit, value: Value) -> Self {
        Self { suit, value }
    }

    pub fn suit(&self) -> Suit {
        self.suit
    }

    pub fn value(&self) -> Value {
        self.value
    }

    pub fn code(&self) -> String {
        format!("{}{}", self.value.code(), self.suit.code())
    }

    /// Face label for renderers, e.g. `10♠️`.
    pub fn label(&self) -> String {
        format!("{}{}", self.value.glyph(), self.suit.glyph())
    }

    /// 所有合法卡牌：52 张数字/人头牌加两张小丑。
    pub fn all() -> Vec<Card> {
        Suit::ALL
            .into_iter()
            .flat_map(|suit| {
                Value::RANKED
                    .into_iter()
                    .chain(std::iter::once(Value::Joker))
                    .filter_map(move |value| Card::new(suit, value).ok())
            })
            .collect()
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value.code(), self.suit.code())
    }
}

impl FromStr for Card {
    type Err = CardError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        let unknown = || CardError::UnknownCode {
            code: code.to_string(),
        };
        let mut chars = code.chars();
        let (Some(value), Some(suit), None) = (chars.next(), chars.next(), chars.next()) else {
            return Err(unknown());
        };
        let value = Value::from_code(value).ok_or_else(unknown)?;
        let suit = Suit::from_code(suit).ok_or_else(unknown)?;
        Card::new(suit, value)
    }
}
