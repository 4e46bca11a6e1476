//! Cell addressing - セル座標とレンジ指定
//!
//! 行・列とも 1-based。列は英字（`A`, `B`, …, `Z`, `AA`, …）で書きます。
//!
//! # 行レイアウト（固定）
//! - 1 行目: 予約（プロトコルでは使わない）
//! - 2 行目: ヘッダー
//! - 3 行目以降: タスク行

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// ヘッダー行の行番号
pub const HEADER_ROW: u32 = 2;

/// 最初のタスク行の行番号（スキャン index + この値 = 行番号）
pub const FIRST_TASK_ROW: u32 = 3;

/// 終端を省略したときの既定の終端行
pub const DEFAULT_END_ROW: u32 = 1000;

/// 終端を省略したときの既定の終端列（`Z`）
pub const DEFAULT_END_COLUMN: u32 = 26;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CellRefError {
    #[error("invalid column identifier '{0}'")]
    InvalidColumn(String),

    #[error("invalid cell reference '{0}'")]
    InvalidCell(String),

    #[error("invalid range '{0}': end must not be above or left of start")]
    InvalidRange(String),
}

/// CellRef はテーブル内の 1 セルを指す（1-based）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellRef {
    pub row: u32,
    pub column: u32,
}

impl CellRef {
    pub fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }

    /// スキャン時の行 index（0-based）と列 index（0-based）から作る
    ///
    /// 行は 2 行分のオフセット（予約行とヘッダー）を足し、列は 1-based に直します。
    pub fn for_task(row_index: usize, column_index: usize) -> Self {
        Self {
            row: row_index as u32 + FIRST_TASK_ROW,
            column: column_index as u32 + 1,
        }
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_to_letters(self.column), self.row)
    }
}

impl FromStr for CellRef {
    type Err = CellRefError;

    /// `"C12"` 形式をパース
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let split = s
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| CellRefError::InvalidCell(s.to_string()))?;
        let (letters, digits) = s.split_at(split);
        let column = letters_to_column(letters)
            .map_err(|_| CellRefError::InvalidCell(s.to_string()))?;
        let row = digits
            .parse::<u32>()
            .ok()
            .filter(|row| *row > 0)
            .ok_or_else(|| CellRefError::InvalidCell(s.to_string()))?;
        Ok(Self { row, column })
    }
}

/// RangeSpec は矩形レンジ
///
/// `end` が None のときは `Z1000` までを読む（十分大きい固定上限）。
/// 終端の行だけ・列だけの指定はできません。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSpec {
    pub start: CellRef,
    pub end: Option<CellRef>,
}

impl RangeSpec {
    /// A1 から既定の上限までのテーブル全体
    pub fn whole_table() -> Self {
        Self {
            start: CellRef::new(1, 1),
            end: None,
        }
    }

    pub fn single(cell: CellRef) -> Self {
        Self {
            start: cell,
            end: Some(cell),
        }
    }

    pub fn bounded(start: CellRef, end: CellRef) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    /// 終端（省略時は既定の上限）
    pub fn resolved_end(&self) -> CellRef {
        self.end
            .unwrap_or(CellRef::new(DEFAULT_END_ROW, DEFAULT_END_COLUMN))
    }

    /// `tab!A1:Z1000` 形式にする
    pub fn to_a1(&self, table: &str) -> String {
        format!("{}!{}:{}", table, self.start, self.resolved_end())
    }
}

impl FromStr for RangeSpec {
    type Err = CellRefError;

    /// `"C3:D10"` または 1 セルの `"C3"` をパース（テーブル名は付けない）
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((start, end)) = s.split_once(':') else {
            return Ok(Self::single(s.parse()?));
        };
        let (start, end): (CellRef, CellRef) = (start.parse()?, end.parse()?);
        if end.row < start.row || end.column < start.column {
            return Err(CellRefError::InvalidRange(s.to_string()));
        }
        Ok(Self::bounded(start, end))
    }
}

/// 1-based の列番号を英字にする（1 → A, 27 → AA）
pub fn column_to_letters(column: u32) -> String {
    let mut n = column;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        letters.push((b'A' + rem) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// 列の英字を 1-based の列番号にする（大文字・小文字どちらも可）
pub fn letters_to_column(letters: &str) -> Result<u32, CellRefError> {
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(CellRefError::InvalidColumn(letters.to_string()));
    }
    letters.chars().try_fold(0u32, |acc, c| {
        let digit = (c.to_ascii_uppercase() as u8 - b'A' + 1) as u32;
        acc.checked_mul(26)
            .and_then(|acc| acc.checked_add(digit))
            .ok_or_else(|| CellRefError::InvalidColumn(letters.to_string()))
    })
}
