//! Token - 行を予約するための整数値
//!
//! coordinator は自分の token をステータスセルに書き込むことで行を予約します。
//! 同じ token を事前共有された worker は、その行を「自分の行」として扱います。
//!
//! # 値の制約
//! - 正の整数
//! - `1`（処理中）と `2`（完了）はステータスとして予約済みなので使えない

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// 生成する token の下限（`1`, `2` と衝突しない）
pub const TOKEN_MIN: i64 = 10;

/// 生成する token の上限
pub const TOKEN_MAX: i64 = 100_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token must be a positive integer other than 1 and 2, got {0}")]
    Reserved(i64),

    #[error("token is not an integer: '{0}'")]
    NotAnInteger(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Token(i64);

impl Token {
    pub fn new(value: i64) -> Result<Self, TokenError> {
        if value <= 2 {
            return Err(TokenError::Reserved(value));
        }
        Ok(Self(value))
    }

    /// `[TOKEN_MIN, TOKEN_MAX]` から乱数で生成
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::thread_rng())
    }

    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(rng.gen_range(TOKEN_MIN..=TOKEN_MAX))
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for Token {
    type Error = TokenError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Token> for i64 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl std::str::FromStr for Token {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<i64>()
            .map_err(|_| TokenError::NotAnInteger(s.to_string()))?;
        Self::new(value)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rstest::rstest;

    #[rstest]
    #[case::free(-1)]
    #[case::zero(0)]
    #[case::processing(1)]
    #[case::finished(2)]
    #[case::negative(-42)]
    fn status_values_are_not_tokens(#[case] value: i64) {
        assert_eq!(Token::new(value), Err(TokenError::Reserved(value)));
    }

    #[test]
    fn generated_tokens_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let token = Token::generate_with(&mut rng);
            assert!((TOKEN_MIN..=TOKEN_MAX).contains(&token.value()));
        }
    }

    #[test]
    fn parse_from_string() {
        assert_eq!("  12345 ".parse::<Token>().unwrap().value(), 12345);
        assert!(matches!(
            "abc".parse::<Token>(),
            Err(TokenError::NotAnInteger(_))
        ));
        assert!(matches!("2".parse::<Token>(), Err(TokenError::Reserved(2))));
    }

    #[test]
    fn serde_rejects_reserved_values() {
        let token: Token = serde_json::from_str("987654").unwrap();
        assert_eq!(token.value(), 987654);
        assert!(serde_json::from_str::<Token>("1").is_err());
    }
}
