//! Sheet - 行優先の文字列グリッド
//!
//! InMemoryTableStore と FileTableStore が共有するレンジ読み書きのロジック。
//! 読み込みはスプレッドシート API と同じく末尾の空セル・空行を落とす。

use serde::{Deserialize, Serialize};

use crate::domain::{CellRef, RangeSpec};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sheet {
    rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 行の並びからそのまま作る（row 1 が先頭）
    pub fn from_rows(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// 1 セル取得（存在しなければ None）
    pub fn cell(&self, cell: CellRef) -> Option<&str> {
        let row = self.rows.get(cell.row.checked_sub(1)? as usize)?;
        row.get(cell.column.checked_sub(1)? as usize)
            .map(String::as_str)
    }

    pub fn read_range(&self, range: &RangeSpec) -> Vec<Vec<String>> {
        let end = range.resolved_end();
        let (row_lo, row_hi) = (range.start.row.max(1), end.row);
        let (col_lo, col_hi) = (range.start.column.max(1), end.column);
        if row_lo > row_hi || col_lo > col_hi {
            return Vec::new();
        }

        let mut out: Vec<Vec<String>> = self
            .rows
            .iter()
            .skip((row_lo - 1) as usize)
            .take((row_hi - row_lo + 1) as usize)
            .map(|row| {
                let mut cells: Vec<String> = row
                    .iter()
                    .skip((col_lo - 1) as usize)
                    .take((col_hi - col_lo + 1) as usize)
                    .cloned()
                    .collect();
                while cells.last().is_some_and(|c| c.is_empty()) {
                    cells.pop();
                }
                cells
            })
            .collect();

        while out.last().is_some_and(|row| row.is_empty()) {
            out.pop();
        }
        out
    }

    /// `top_left` から矩形に上書き。足りない行・列は空文字で伸ばす。
    pub fn write_at(&mut self, top_left: CellRef, values: &[Vec<String>]) {
        let row0 = top_left.row.max(1) as usize - 1;
        let col0 = top_left.column.max(1) as usize - 1;
        for (dr, value_row) in values.iter().enumerate() {
            let r = row0 + dr;
            if self.rows.len() <= r {
                self.rows.resize_with(r + 1, Vec::new);
            }
            let row = &mut self.rows[r];
            let needed = col0 + value_row.len();
            if row.len() < needed {
                row.resize(needed, String::new());
            }
            for (dc, value) in value_row.iter().enumerate() {
                row[col0 + dc] = value.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> Sheet {
        Sheet::from_rows(
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    #[test]
    fn read_clips_to_range() {
        let sheet = grid(&[&["a", "b", "c"], &["d", "e", "f"], &["g", "h", "i"]]);
        let range = RangeSpec::bounded(CellRef::new(2, 2), CellRef::new(3, 3));
        assert_eq!(
            sheet.read_range(&range),
            vec![vec!["e".to_string(), "f".to_string()], vec!["h".to_string(), "i".to_string()]]
        );
    }

    #[test]
    fn read_trims_trailing_empty_cells_and_rows() {
        let sheet = grid(&[&["a", "", ""], &["", ""], &[]]);
        assert_eq!(
            sheet.read_range(&RangeSpec::whole_table()),
            vec![vec!["a".to_string()]]
        );
    }

    #[test]
    fn read_keeps_interior_empty_rows() {
        let sheet = grid(&[&[], &["x"]]);
        assert_eq!(
            sheet.read_range(&RangeSpec::whole_table()),
            vec![vec![], vec!["x".to_string()]]
        );
    }

    #[test]
    fn write_extends_grid() {
        let mut sheet = Sheet::new();
        sheet.write_at(CellRef::new(3, 2), &[vec!["x".to_string(), "y".to_string()]]);
        assert_eq!(sheet.rows().len(), 3);
        assert_eq!(sheet.cell(CellRef::new(3, 2)), Some("x"));
        assert_eq!(sheet.cell(CellRef::new(3, 3)), Some("y"));
        assert_eq!(sheet.cell(CellRef::new(3, 1)), Some(""));
        assert_eq!(sheet.cell(CellRef::new(1, 1)), None);
    }

    #[test]
    fn write_overwrites_whole_cells() {
        let mut sheet = grid(&[&["-1", "old"]]);
        sheet.write_at(CellRef::new(1, 1), &[vec!["2".to_string()]]);
        assert_eq!(sheet.cell(CellRef::new(1, 1)), Some("2"));
        assert_eq!(sheet.cell(CellRef::new(1, 2)), Some("old"));
    }
}
