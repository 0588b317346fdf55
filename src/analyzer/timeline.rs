//! ファイルごとの変更タイムライン
//!
//! 集約スレッドだけが `FileTimeline` を書き換えます。集約が終わると
//! 値ごと後段に渡されるため、ロックは必要ありません。

use super::history::ChangeEvent;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

/// ファイルパスから変更日時の列への対応
///
/// 日時はイベントの到着順に並んでおり、時系列順である保証はありません。
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FileTimeline {
    changes: HashMap<String, Vec<DateTime<Utc>>>,
}

impl FileTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// イベントの日時をパスの列の末尾に追加します
    pub fn record(&mut self, event: ChangeEvent) {
        self.changes.entry(event.path).or_default().push(event.at);
    }

    pub fn get(&self, path: &str) -> Option<&[DateTime<Utc>]> {
        self.changes.get(path).map(Vec::as_slice)
    }

    /// 記録されているファイルの数
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// 全ファイルの変更回数の合計
    pub fn total_changes(&self) -> usize {
        self.changes.values().map(Vec::len).sum()
    }

    /// パスの辞書順に並べ、各ファイルの日時を昇順にソートした形に変換します
    pub fn into_sorted(self) -> BTreeMap<String, Vec<DateTime<Utc>>> {
        self.changes
            .into_iter()
            .map(|(path, mut stamps)| {
                stamps.sort_unstable();
                (path, stamps)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(path: &str, secs: i64) -> ChangeEvent {
        ChangeEvent {
            path: path.to_string(),
            at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[test]
    fn test_record_creates_and_appends() {
        let mut timeline = FileTimeline::new();
        timeline.record(event("a.txt", 30));
        timeline.record(event("b.txt", 20));
        timeline.record(event("a.txt", 10));

        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline.total_changes(), 3);
        assert_eq!(timeline.get("a.txt").unwrap().len(), 2);
        assert!(timeline.get("c.txt").is_none());
    }

    #[test]
    fn test_into_sorted_orders_paths_and_stamps() {
        let mut timeline = FileTimeline::new();
        timeline.record(event("src/z.rs", 30));
        timeline.record(event("src/a.rs", 50));
        timeline.record(event("src/a.rs", 10));
        timeline.record(event("Cargo.toml", 5));

        let sorted = timeline.into_sorted();
        let paths: Vec<_> = sorted.keys().cloned().collect();
        assert_eq!(paths, vec!["Cargo.toml", "src/a.rs", "src/z.rs"]);

        let stamps: Vec<i64> = sorted["src/a.rs"].iter().map(|t| t.timestamp()).collect();
        assert_eq!(stamps, vec![10, 50]);
    }
}
