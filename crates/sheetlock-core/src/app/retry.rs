//! Claim retry policy: pass budget and backoff between unproductive passes.

use rand::Rng;
use serde::Deserialize;
use std::time::Duration;

/// 既定の最大パス数
pub const DEFAULT_MAX_ATTEMPTS: u32 = 20;

/// claim のリトライ方針
///
/// 既定値は待ち時間なし（空振りしたら即座に読み直す）。共有ストアを叩きすぎる
/// 場合は `with_backoff` で指数バックオフを入れる。
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimRetryPolicy {
    /// 1 回の claim で読み直す最大回数
    pub max_attempts: u32,

    /// 最初の空振り後の待ち時間（ZERO なら待たない）
    pub base_delay: Duration,

    /// 空振りするごとに待ち時間に掛ける倍率（1.0 以上）
    pub multiplier: f64,

    /// 待ち時間の上限
    pub max_delay: Duration,

    /// 0〜delay の範囲でランダムにずらす（full jitter）
    pub jitter: bool,
}

impl Default for ClaimRetryPolicy {
    fn default() -> Self {
        Self::immediate()
    }
}

impl ClaimRetryPolicy {
    /// 20 回まで、待ち時間なし
    pub fn immediate() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::ZERO,
            multiplier: 2.0,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    pub fn with_backoff(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            ..Self::immediate()
        }
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// jitter を入れる前の待ち時間
    ///
    /// delay = base_delay * multiplier^(attempts - 1)、max_delay で頭打ち。
    /// `attempts` は空振りしたパスの数（1-indexed）。
    pub fn next_delay(&self, attempts: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let base_secs = self.base_delay.as_secs_f64();
        let delay_secs = base_secs * self.multiplier.powi(attempts.saturating_sub(1) as i32);
        let delay = Duration::try_from_secs_f64(delay_secs).unwrap_or(Duration::MAX);
        if self.max_delay.is_zero() {
            delay
        } else {
            delay.min(self.max_delay)
        }
    }

    /// 実際に待つ時間（jitter 込み）
    pub fn delay_for<R: Rng + ?Sized>(&self, attempts: u32, rng: &mut R) -> Duration {
        let delay = self.next_delay(attempts);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let nanos = delay.as_nanos().min(u64::MAX as u128) as u64;
        Duration::from_nanos(rng.gen_range(0..=nanos))
    }
}

/// 設定ファイルの `[retry]` セクション
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: 0,
            multiplier: 2.0,
            max_delay_ms: 0,
            jitter: false,
        }
    }
}

impl From<&RetrySettings> for ClaimRetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            base_delay: Duration::from_millis(settings.base_delay_ms),
            multiplier: settings.multiplier,
            max_delay: Duration::from_millis(settings.max_delay_ms),
            jitter: settings.jitter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn default_policy_retries_immediately() {
        let policy = ClaimRetryPolicy::default();
        assert_eq!(policy.max_attempts, 20);
        assert_eq!(policy.next_delay(1), Duration::ZERO);
        assert_eq!(policy.next_delay(19), Duration::ZERO);
    }

    #[test]
    fn exponential_backoff_increases_until_cap() {
        let policy =
            ClaimRetryPolicy::with_backoff(Duration::from_millis(100), Duration::from_millis(500));

        assert_eq!(policy.next_delay(1), Duration::from_millis(100));
        assert_eq!(policy.next_delay(2), Duration::from_millis(200));
        assert_eq!(policy.next_delay(3), Duration::from_millis(400));
        // 800ms → 上限で 500ms
        assert_eq!(policy.next_delay(4), Duration::from_millis(500));
        assert_eq!(policy.next_delay(30), Duration::from_millis(500));
    }

    #[test]
    fn jitter_stays_below_delay() {
        let policy = ClaimRetryPolicy::with_backoff(Duration::from_millis(100), Duration::ZERO)
            .jitter(true);
        let mut rng = StdRng::seed_from_u64(1);
        for attempt in 1..=5 {
            let delay = policy.delay_for(attempt, &mut rng);
            assert!(delay <= policy.next_delay(attempt));
        }
    }

    #[test]
    fn settings_convert_to_policy() {
        let settings = RetrySettings {
            max_attempts: 5,
            base_delay_ms: 250,
            multiplier: 3.0,
            max_delay_ms: 1000,
            jitter: true,
        };
        let policy = ClaimRetryPolicy::from(&settings);
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.next_delay(2), Duration::from_millis(750));
        assert!(policy.jitter);
    }
}
