//! 変更間隔の統計とレポート行の表現を担当するモジュール
//!
//! 平均間隔は、昇順に並べた各変更日時とその次の変更日時との差を平均したものです。
//! 最新の変更については「現在時刻」を次の変更とみなします。

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::slice;

/// 1ファイル分の変更間隔の統計
///
/// 内部ではサブ秒精度の `Duration` のまま保持し、日数への切り捨ては表示時にのみ行います。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalStats {
    pub mean_interval: Duration,
    pub recency: Duration,
}

impl IntervalStats {
    /// 昇順にソート済みの日時列から統計を計算します
    ///
    /// 日時列が空の場合は `None` を返します。
    pub fn from_sorted(sorted: &[DateTime<Utc>], now: DateTime<Utc>) -> Option<Self> {
        Some(Self {
            mean_interval: mean_interval(sorted, now)?,
            recency: recency(sorted, now)?,
        })
    }

    /// 最後の変更からの経過時間が平均間隔より短い場合に `true`
    pub fn is_overdue(&self) -> bool {
        self.recency < self.mean_interval
    }
}

/// 平均変更間隔を計算します
///
/// 各要素と次の要素（最新の要素には `now`）との符号付きの差を平均し、符号を反転します。
/// 未来の日時による負の値はゼロに切り上げます。
pub fn mean_interval(sorted: &[DateTime<Utc>], now: DateTime<Utc>) -> Option<Duration> {
    if sorted.is_empty() {
        return None;
    }

    let total = sorted
        .iter()
        .enumerate()
        .map(|(index, stamp)| {
            let successor = sorted.get(index + 1).copied().unwrap_or(now);
            *stamp - successor
        })
        .fold(Duration::zero(), |acc, delta| acc + delta);

    Some((-average(total, sorted.len())?).max(Duration::zero()))
}

/// `Duration` を `count` で割ります
///
/// `chrono` の除算は `i32` の除数しか受け付けないため、それを超える件数では `None` を返します。
fn average(total: Duration, count: usize) -> Option<Duration> {
    let count = i32::try_from(count).ok().filter(|count| *count > 0)?;
    Some(total / count)
}

/// 最後の変更から `now` までの経過時間
pub fn recency(sorted: &[DateTime<Utc>], now: DateTime<Utc>) -> Option<Duration> {
    let (last, _) = sorted.split_last()?;
    mean_interval(slice::from_ref(last), now)
}

/// レポートの1行に相当するファイルごとの統計
///
/// # フィールド
///
/// - `path`: ファイルのパス
/// - `changes`: ファイルが変更されたコミット数
/// - `mean_interval_days`: 平均変更間隔（日数、切り捨て）
/// - `days_since_last_change`: 最後の変更からの経過日数（切り捨て）
/// - `overdue`: 経過時間が平均間隔を下回っているかどうか
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStats {
    pub path: String,
    pub changes: usize,
    pub mean_interval_days: i64,
    pub days_since_last_change: i64,
    pub overdue: bool,
}

impl FileStats {
    /// 昇順にソート済みの日時列から `FileStats` を作成します
    pub fn from_sorted(path: String, sorted: &[DateTime<Utc>], now: DateTime<Utc>) -> Option<Self> {
        let stats = IntervalStats::from_sorted(sorted, now)?;
        Some(Self {
            path,
            changes: sorted.len(),
            mean_interval_days: stats.mean_interval.num_days(),
            days_since_last_change: stats.recency.num_days(),
            overdue: stats.is_overdue(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn hours_ago(hours: &[i64]) -> Vec<DateTime<Utc>> {
        hours.iter().map(|h| now() - Duration::hours(*h)).collect()
    }

    #[test]
    fn test_regular_cadence_is_not_overdue() {
        let stamps = hours_ago(&[96, 72, 48, 24]);
        let stats = IntervalStats::from_sorted(&stamps, now()).unwrap();

        assert_eq!(stats.mean_interval, Duration::hours(24));
        assert_eq!(stats.recency, Duration::hours(24));
        assert!(!stats.is_overdue());
    }

    #[test]
    fn test_recent_change_after_long_gap_is_overdue() {
        let stamps = hours_ago(&[240, 72, 48, 24]);
        let stats = IntervalStats::from_sorted(&stamps, now()).unwrap();

        assert_eq!(stats.mean_interval, Duration::hours(60));
        assert_eq!(stats.recency, Duration::hours(24));
        assert!(stats.is_overdue());
    }

    #[test]
    fn test_single_change_mean_equals_recency() {
        let stamps = hours_ago(&[100]);
        let stats = IntervalStats::from_sorted(&stamps, now()).unwrap();

        assert_eq!(stats.mean_interval, stats.recency);
        assert_eq!(stats.recency, Duration::hours(100));
        assert!(!stats.is_overdue());
    }

    #[test]
    fn test_empty_sequence_has_no_stats() {
        assert!(mean_interval(&[], now()).is_none());
        assert!(recency(&[], now()).is_none());
        assert!(FileStats::from_sorted("a.txt".to_string(), &[], now()).is_none());
    }

    #[test]
    fn test_average_rejects_unrepresentable_counts() {
        assert_eq!(average(Duration::hours(10), 4), Some(Duration::minutes(150)));
        assert_eq!(average(Duration::hours(10), 0), None);
        assert_eq!(average(Duration::hours(10), i32::MAX as usize + 1), None);
    }

    #[test]
    fn test_days_are_truncated() {
        // 平均は 36 時間、経過は 23 時間
        let stamps = hours_ago(&[72, 23]);
        let row = FileStats::from_sorted("a.txt".to_string(), &stamps, now()).unwrap();

        assert_eq!(row.changes, 2);
        assert_eq!(row.mean_interval_days, 1);
        assert_eq!(row.days_since_last_change, 0);
        assert!(row.overdue);
    }

    #[test]
    fn test_sub_day_precision_is_kept_until_presentation() {
        // 30分ずつの変更を多数積み重ねても丸め誤差は蓄積しない
        let stamps: Vec<_> = (1..=96)
            .rev()
            .map(|i| now() - Duration::minutes(30 * i))
            .collect();
        let stats = IntervalStats::from_sorted(&stamps, now()).unwrap();

        assert_eq!(stats.mean_interval, Duration::minutes(30));
    }

    #[test]
    fn test_future_timestamps_clamp_to_zero() {
        let stamps = vec![now() + Duration::hours(5)];
        let row = FileStats::from_sorted("skewed.rs".to_string(), &stamps, now()).unwrap();

        assert_eq!(row.mean_interval_days, 0);
        assert_eq!(row.days_since_last_change, 0);
        assert!(!row.overdue);
    }

    #[test]
    fn test_file_stats_serialization() {
        let row = FileStats {
            path: "src/main.rs".to_string(),
            changes: 42,
            mean_interval_days: 7,
            days_since_last_change: 3,
            overdue: true,
        };

        let json = serde_json::to_string(&row).unwrap();
        let deserialized: FileStats = serde_json::from_str(&json).unwrap();

        assert_eq!(row, deserialized);
        assert!(json.contains("\"overdue\":true"));
    }
}
