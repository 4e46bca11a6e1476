//! Status cell - 行の所有状態
//!
//! State transitions:
//! - セルなし / `-1` → token（予約） → `1`（処理中） → `2`（完了）
//! - 予約 / 処理中 → `-1`（release）
//! - `2` から戻ることはない

use super::token::Token;

pub const FREE: i64 = -1;
pub const PROCESSING: i64 = 1;
pub const FINISHED: i64 = 2;

/// ステータスセルの解釈結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// セル自体がない（行がステータス列まで届いていない）。暗黙の空き。
    Absent,

    /// セルはあるが空文字。整数として読めないので Malformed と同じく触らない。
    Blank,

    /// `-1`: 明示的に空き
    Free,

    /// `1`: 予約済みかつ処理中
    Processing,

    /// `2`: 完了
    Finished,

    /// その他の整数。書き込んだ node の token。
    Reserved(i64),

    /// 整数として読めない値。書きかけ・壊れたセルなので触らない。
    Malformed,
}

impl Status {
    /// 行の `status_index` 番目のセルを解釈する
    pub fn of_row(row: &[String], status_index: usize) -> Self {
        Self::parse(row.get(status_index).map(String::as_str))
    }

    pub fn parse(cell: Option<&str>) -> Self {
        let Some(raw) = cell else {
            return Status::Absent;
        };
        let raw = raw.trim();
        if raw.is_empty() {
            return Status::Blank;
        }
        match raw.parse::<i64>() {
            Ok(FREE) => Status::Free,
            Ok(PROCESSING) => Status::Processing,
            Ok(FINISHED) => Status::Finished,
            Ok(value) => Status::Reserved(value),
            Err(_) => Status::Malformed,
        }
    }

    /// coordinator が予約してよい状態か
    pub fn is_claimable(self) -> bool {
        matches!(self, Status::Absent | Status::Free)
    }

    pub fn is_held_by(self, token: Token) -> bool {
        matches!(self, Status::Reserved(value) if value == token.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::absent(None, Status::Absent)]
    #[case::empty(Some(""), Status::Blank)]
    #[case::blank(Some("  "), Status::Blank)]
    #[case::free(Some("-1"), Status::Free)]
    #[case::processing(Some("1"), Status::Processing)]
    #[case::finished(Some("2"), Status::Finished)]
    #[case::token(Some("48151623"), Status::Reserved(48151623))]
    #[case::padded_token(Some(" 42 "), Status::Reserved(42))]
    #[case::float(Some("1.5"), Status::Malformed)]
    #[case::text(Some("done"), Status::Malformed)]
    fn parse_status_cell(#[case] cell: Option<&str>, #[case] expected: Status) {
        assert_eq!(Status::parse(cell), expected);
    }

    #[test]
    fn claimable_states() {
        assert!(Status::Absent.is_claimable());
        assert!(Status::Free.is_claimable());
        assert!(!Status::Blank.is_claimable());
        assert!(!Status::Malformed.is_claimable());
        assert!(!Status::Processing.is_claimable());
        assert!(!Status::Reserved(99).is_claimable());
    }

    #[test]
    fn held_by_exact_token_only() {
        let token = Token::new(1234).unwrap();
        assert!(Status::Reserved(1234).is_held_by(token));
        assert!(!Status::Reserved(1235).is_held_by(token));
        assert!(!Status::Free.is_held_by(token));
    }

    #[test]
    fn status_of_short_row_is_absent() {
        let row = vec!["0.01".to_string(), "32".to_string()];
        assert_eq!(Status::of_row(&row, 2), Status::Absent);
    }
}
