//! 変更頻度分析の中核となるモジュール
//!
//! 分析プロセスは以下の流れで行われます：
//!
//! 1. コミット履歴の走査（`history`, `git`）
//! 2. コミットごとの変更ファイルの並列抽出（`pipeline`）
//! 3. ファイルごとのタイムラインへの集約（`pipeline`, `timeline`）
//! 4. 変更間隔の統計の算出（`metrics`）
//!
//! # 主要なコンポーネント
//!
//! - `CadenceAnalyzer`: 分析プロセス全体を制御する構造体
//! - `FileTimeline`: ファイルごとの変更日時の集約結果
//! - `FileStats`: レポートの1行に相当する統計

mod error;
mod git;
mod history;
mod metrics;
mod pipeline;
mod timeline;

pub use error::AnalyzerError;
pub use git::{GitHistory, PathFilter};
pub use history::{ChangeEvent, Commit, HistoryProvider, MemoryHistory};
pub use metrics::{mean_interval, recency, FileStats, IntervalStats};
pub use pipeline::{collect_timeline, CommitErrorPolicy, PipelineOptions};
pub use timeline::FileTimeline;

use crate::report;
use chrono::{DateTime, Utc};

/// 分析の設定
///
/// # フィールド
///
/// - `reference`: 走査を開始するブランチ・リファレンス（`None` の場合は `HEAD`）
/// - `include_patterns`: 分析対象とするファイルのglobパターン（空の場合はすべて）
/// - `exclude_patterns`: 分析から除外するファイルのglobパターン
/// - `pipeline`: 並列抽出の設定
#[derive(Debug, Clone, Default)]
pub struct AnalyzerOptions {
    pub reference: Option<String>,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub pipeline: PipelineOptions,
}

/// 変更頻度分析を実行するメインの構造体
///
/// 履歴の供給元は `HistoryProvider` を実装していれば何でも構いません。
/// 通常は `CadenceAnalyzer::open` でGitリポジトリから作成します。
pub struct CadenceAnalyzer<P = GitHistory> {
    provider: P,
    pipeline: PipelineOptions,
}

impl CadenceAnalyzer<GitHistory> {
    /// Gitリポジトリを開いて新しいインスタンスを作成します
    ///
    /// # 引数
    ///
    /// - `locator`: ローカルのパス、またはクローン可能なURL
    /// - `options`: 分析の設定
    ///
    /// # エラー
    ///
    /// 以下の場合にエラーを返します：
    /// - リポジトリを開けない、またはクローンできない
    /// - 開始リファレンスが見つからない
    pub fn open(locator: &str, options: AnalyzerOptions) -> Result<Self, AnalyzerError> {
        let filter = PathFilter::new(&options.include_patterns, &options.exclude_patterns)?;
        let provider = GitHistory::open(locator, options.reference.as_deref(), filter)?;
        Ok(Self::with_provider(provider, options.pipeline))
    }
}

impl<P: HistoryProvider> CadenceAnalyzer<P> {
    pub fn with_provider(provider: P, pipeline: PipelineOptions) -> Self {
        Self { provider, pipeline }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// 履歴全体を集約したタイムラインを返します
    pub fn timeline(&self) -> Result<FileTimeline, AnalyzerError> {
        collect_timeline(&self.provider, &self.pipeline)
    }

    /// 分析を実行し、パスの辞書順に並んだファイルごとの統計を返します
    ///
    /// 経過時間の基準となる現在時刻は、集約が終わった時点で取得します。
    pub fn analyze(&self) -> Result<Vec<FileStats>, AnalyzerError> {
        self.analyze_with(Utc::now)
    }

    /// `analyze` と同じですが、現在時刻を `clock` から取得します
    ///
    /// `clock` はタイムラインの集約が完了した後に1回だけ呼ばれます。
    pub fn analyze_with(
        &self,
        clock: impl FnOnce() -> DateTime<Utc>,
    ) -> Result<Vec<FileStats>, AnalyzerError> {
        let timeline = self.timeline()?;
        Ok(report::assemble(timeline, clock()))
    }
}
