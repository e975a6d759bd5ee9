use serde::{Deserialize, Serialize};

use super::cards::Card;

pub const MAX_WIDTH: usize = 7;
pub const MAX_HEIGHT: usize = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// 地牢格子。无牌时 `interactable` 表示“可以在此放牌”。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<Card>,
    #[serde(default)]
    pub face_down: bool,
    #[serde(default)]
    pub interactable: bool,
}

impl Cell {
    pub fn has_card(&self) -> bool {
        self.card.is_some()
    }

    pub fn is_face_up_card(&self) -> bool {
        self.card.is_some() && !self.face_down
    }

    pub fn is_face_down_card(&self) -> bool {
        self.card.is_some() && self.face_down
    }
}

/// 已占用格子的外接矩形，网格中有牌时才存在。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub min_row: usize,
    pub max_row: usize,
    pub min_col: usize,
    pub max_col: usize,
}

impl BoundingBox {
    pub fn width(&self) -> usize {
        self.max_col - self.min_col + 1
    }

    pub fn height(&self) -> usize {
        self.max_row - self.min_row + 1
    }
}

/// 行优先的格子矩阵，尺寸随放牌动态扩展/裁剪。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Grid {
    cells: Vec<Vec<Cell>>,
}

impl Grid {
    /// 只含一张背面朝上起始牌的网格，已完成扩展与可交互刷新。
    pub fn seeded(card: Card) -> Self {
        let mut grid = Self {
            cells: vec![vec![Cell {
                card: Some(card),
                face_down: true,
                interactable: false,
            }]],
        };
        grid.update();
        grid
    }

    /// 空的 `rows x cols` 矩阵，由调用方通过 [`Grid::set_card`] 填牌。
    pub fn with_dimensions(rows: usize, cols: usize) -> Self {
        Self {
            cells: vec![vec![Cell::default(); cols]; rows],
        }
    }

    pub fn rows(&self) -> usize {
        self.cells.len()
    }

    pub fn cols(&self) -> usize {
        self.cells.first().map_or(0, Vec::len)
    }

    pub fn cell(&self, position: Position) -> Option<&Cell> {
        self.cells.get(position.row)?.get(position.col)
    }

    fn cell_mut(&mut self, position: Position) -> Option<&mut Cell> {
        self.cells.get_mut(position.row)?.get_mut(position.col)
    }

    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        let cols = self.cols();
        (0..self.rows()).flat_map(move |row| (0..cols).map(move |col| Position::new(row, col)))
    }

    pub fn occupied(&self) -> impl Iterator<Item = (Position, &Cell)> + '_ {
        self.positions().filter_map(move |position| {
            self.cell(position)
                .filter(|cell| cell.has_card())
                .map(|cell| (position, cell))
        })
    }

    pub fn occupied_count(&self) -> usize {
        self.occupied().count()
    }

    pub fn cards(&self) -> impl Iterator<Item = Card> + '_ {
        self.occupied().filter_map(|(_, cell)| cell.card)
    }

    /// 直接放牌，不调整尺寸也不刷新可交互状态。
    pub fn set_card(&mut self, position: Position, card: Card, face_down: bool) -> bool {
        match self.cell_mut(position) {
            Some(cell) => {
                cell.card = Some(card);
                cell.face_down = face_down;
                true
            }
            None => false,
        }
    }

    pub fn set_face_down(&mut self, position: Position) -> bool {
        match self.cell_mut(position) {
            Some(cell) if cell.has_card() => {
                cell.face_down = true;
                true
            }
            _ => false,
        }
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.occupied().fold(None, |bounds, (position, _)| {
            Some(match bounds {
                None => BoundingBox {
                    min_row: position.row,
                    max_row: position.row,
                    min_col: position.col,
                    max_col: position.col,
                },
                Some(bounds) => BoundingBox {
                    min_row: bounds.min_row.min(position.row),
                    max_row: bounds.max_row.max(position.row),
                    min_col: bounds.min_col.min(position.col),
                    max_col: bounds.max_col.max(position.col),
                },
            })
        })
    }

    /// 调整尺寸后全量刷新可交互状态。
    pub fn update(&mut self) {
        self.resize(None);
        self.refresh_availability();
    }

    /// 放牌后的整理：矩阵已达上限时，向新牌所贴的边平移出留白。
    pub fn update_after_placing(&mut self, placed: Position) {
        self.resize(Some(placed));
        self.refresh_availability();
    }

    fn resize(&mut self, placed: Option<Position>) {
        if let Some(placed) = placed {
            self.trim_toward(placed);
        }
        self.expand();
    }

    fn insert_col_left(&mut self) {
        for row in &mut self.cells {
            row.insert(0, Cell::default());
        }
    }

    fn push_col_right(&mut self) {
        for row in &mut self.cells {
            row.push(Cell::default());
        }
    }

    fn remove_col_left(&mut self) {
        for row in &mut self.cells {
            row.remove(0);
        }
    }

    fn pop_col_right(&mut self) {
        for row in &mut self.cells {
            row.pop();
        }
    }

    /// 占用区域贴边时，在该侧补一行/列空格，每侧最多一次，矩阵不超过上限。
    fn expand(&mut self) {
        let Some(bounds) = self.bounding_box() else {
            return;
        };
        let touches_left = bounds.min_col == 0;
        let touches_right = bounds.max_col + 1 == self.cols();
        let touches_top = bounds.min_row == 0;
        let touches_bottom = bounds.max_row + 1 == self.rows();

        if touches_left && self.cols() < MAX_WIDTH {
            self.insert_col_left();
        }
        if touches_right && self.cols() < MAX_WIDTH {
            self.push_col_right();
        }
        if touches_top && self.rows() < MAX_HEIGHT {
            self.cells.insert(0, vec![Cell::default(); self.cols()]);
        }
        if touches_bottom && self.rows() < MAX_HEIGHT {
            self.cells.push(vec![Cell::default(); self.cols()]);
        }
    }

    /// 矩阵某一方向已达上限而占用区域未满时，新牌落在边缘则裁掉对侧的空行/列，
    /// 并在新牌一侧补回留白。
    fn trim_toward(&mut self, placed: Position) {
        let Some(bounds) = self.bounding_box() else {
            return;
        };

        if self.cols() == MAX_WIDTH && bounds.width() < MAX_WIDTH {
            if placed.col == 0 && bounds.max_col + 1 < self.cols() {
                self.pop_col_right();
                self.insert_col_left();
            } else if placed.col + 1 == self.cols() && bounds.min_col > 0 {
                self.remove_col_left();
                self.push_col_right();
            }
        }

        if self.rows() == MAX_HEIGHT && bounds.height() < MAX_HEIGHT {
            let cols = self.cols();
            if placed.row == 0 && bounds.max_row + 1 < self.rows() {
                self.cells.pop();
                self.cells.insert(0, vec![Cell::default(); cols]);
            } else if placed.row + 1 == self.rows() && bounds.min_row > 0 {
                self.cells.remove(0);
                self.cells.push(vec![Cell::default(); cols]);
            }
        }
    }

    fn neighbors(&self, position: Position) -> impl Iterator<Item = &Cell> + '_ {
        let Position { row, col } = position;
        let up = row.checked_sub(1).map(|row| Position::new(row, col));
        let down = Some(Position::new(row + 1, col));
        let left = col.checked_sub(1).map(|col| Position::new(row, col));
        let right = Some(Position::new(row, col + 1));
        [up, down, left, right]
            .into_iter()
            .flatten()
            .filter_map(move |neighbor| self.cell(neighbor))
    }

    /// 全量重算可交互状态：
    /// 有牌的格子正面朝上即可交互；空格子当且仅当恰有一个背面朝上的相邻牌时可交互。
    pub fn refresh_availability(&mut self) {
        let flags: Vec<Vec<bool>> = (0..self.rows())
            .map(|row| {
                (0..self.cols())
                    .map(|col| {
                        let position = Position::new(row, col);
                        match self.cell(position) {
                            Some(cell) if cell.has_card() => !cell.face_down,
                            Some(_) => {
                                self.neighbors(position)
                                    .filter(|neighbor| neighbor.is_face_down_card())
                                    .count()
                                    == 1
                            }
                            None => false,
                        }
                    })
                    .collect()
            })
            .collect();

        for (row, row_flags) in self.cells.iter_mut().zip(flags) {
            for (cell, interactable) in row.iter_mut().zip(row_flags) {
                cell.interactable = interactable;
            }
        }
    }

    /// 按行扫描，返回第一张正面朝上的 `card` 所在位置。
    pub fn find_face_up(&self, card: Card) -> Option<Position> {
        self.occupied()
            .find(|(_, cell)| cell.card == Some(card) && !cell.face_down)
            .map(|(position, _)| position)
    }
}
