//! コミット履歴の供給元を抽象化するモジュール
//!
//! 分析パイプラインは `HistoryProvider` トレイトだけを通して履歴にアクセスします。
//! 実際のGitリポジトリは `git` モジュールの `GitHistory` が、
//! テストや合成データ用の履歴は `MemoryHistory` が実装します。

use super::error::AnalyzerError;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 履歴から取り出した1件のコミット
///
/// 変更されたファイルの一覧は保持せず、`id` を使って
/// `HistoryProvider::changed_files` から取得します。
///
/// # フィールド
///
/// - `id`: コミットの識別子（Gitの場合は16進数のハッシュ）
/// - `authored_at`: 作成者のタイムスタンプ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub id: String,
    pub authored_at: DateTime<Utc>,
}

/// 1つのコミットで1つのファイルが変更されたことを表すイベント
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: String,
    pub at: DateTime<Utc>,
}

/// コミット履歴の供給元
///
/// `walk` は呼び出し元のスレッドでのみ実行されますが、
/// `changed_files` は複数のワーカースレッドから同時に呼ばれるため `Sync` が必要です。
pub trait HistoryProvider: Sync {
    /// 開始リファレンスから履歴を辿り、コミットごとに `visit` を呼び出します
    ///
    /// `visit` が `ControlFlow::Break` を返した時点で走査を打ち切ります。
    /// 走査に使ったリソースは、成功・失敗に関わらずこの関数から戻る前に解放されます。
    ///
    /// # エラー
    ///
    /// 走査の途中で履歴の読み出しに失敗した場合は `TraversalFailed` を返します。
    fn walk(&self, visit: &mut dyn FnMut(Commit) -> ControlFlow<()>)
        -> Result<(), AnalyzerError>;

    /// コミットとその最初の親との差分から、変更されたファイルのパスを返します
    ///
    /// 同じパスが2回以上含まれることはありません。
    fn changed_files(&self, commit: &Commit) -> Result<Vec<String>, AnalyzerError>;

    /// 現在のワーカースレッドが保持しているリソースを解放します
    ///
    /// 抽出が終わった後、スレッドプールのすべてのワーカーで1回ずつ呼ばれます。
    fn release_worker(&self) {}
}

type DelayHook = Box<dyn Fn(&Commit) + Send + Sync>;

/// メモリ上に構築した合成履歴
///
/// コミットは登録した順に走査されます。特定コミットの差分計算や
/// 走査の途中での失敗を注入できます。
#[derive(Default)]
pub struct MemoryHistory {
    commits: Vec<Commit>,
    files: HashMap<String, Vec<String>>,
    failing_commits: HashSet<String>,
    traversal_error_at: Option<usize>,
    delay: Option<DelayHook>,
    released_workers: AtomicUsize,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// コミットを追加します
    ///
    /// 登録済みの `id` を渡した場合は、走査順を保ったまま日時とファイルを置き換えます。
    pub fn commit<I, S>(mut self, id: &str, authored_at: DateTime<Utc>, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let files = files
            .into_iter()
            .map(Into::into)
            .filter(|path: &String| seen.insert(path.clone()))
            .collect();
        let commit = Commit {
            id: id.to_string(),
            authored_at,
        };
        if self.files.insert(id.to_string(), files).is_some() {
            if let Some(existing) = self.commits.iter_mut().find(|existing| existing.id == id) {
                *existing = commit;
            }
        } else {
            self.commits.push(commit);
        }
        self
    }

    /// 指定したコミットの差分計算を失敗させます
    pub fn fail_extraction(mut self, id: &str) -> Self {
        self.failing_commits.insert(id.to_string());
        self
    }

    /// `index` 番目のコミットに到達した時点で走査を失敗させます
    pub fn fail_traversal_at(mut self, index: usize) -> Self {
        self.traversal_error_at = Some(index);
        self
    }

    /// 差分計算の前に毎回呼び出されるフックを設定します
    pub fn with_delay(mut self, hook: impl Fn(&Commit) + Send + Sync + 'static) -> Self {
        self.delay = Some(Box::new(hook));
        self
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    /// `release_worker` が呼ばれた回数
    pub fn released_workers(&self) -> usize {
        self.released_workers.load(Ordering::Relaxed)
    }
}

impl HistoryProvider for MemoryHistory {
    fn walk(
        &self,
        visit: &mut dyn FnMut(Commit) -> ControlFlow<()>,
    ) -> Result<(), AnalyzerError> {
        for (index, commit) in self.commits.iter().enumerate() {
            if self.traversal_error_at == Some(index) {
                return Err(AnalyzerError::TraversalFailed(format!(
                    "synthetic history broke at commit {}",
                    commit.id
                )));
            }
            if visit(commit.clone()).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn changed_files(&self, commit: &Commit) -> Result<Vec<String>, AnalyzerError> {
        if let Some(delay) = &self.delay {
            delay(commit);
        }
        if self.failing_commits.contains(&commit.id) {
            return Err(AnalyzerError::StatComputationFailed {
                commit: commit.id.clone(),
                reason: "synthetic failure".to_string(),
            });
        }
        self.files
            .get(&commit.id)
            .cloned()
            .ok_or_else(|| AnalyzerError::StatComputationFailed {
                commit: commit.id.clone(),
                reason: "unknown commit".to_string(),
            })
    }

    fn release_worker(&self) {
        self.released_workers.fetch_add(1, Ordering::Relaxed);
    }
}
