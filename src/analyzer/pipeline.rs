//! 変更イベントを並列に抽出し、1つのタイムラインに集約するパイプライン
//!
//! 処理の流れ：
//!
//! 1. 呼び出し元のスレッドで履歴を走査し、コミットごとに抽出タスクを投入する
//! 2. 抽出タスクはrayonのスレッドプール上で変更ファイルを計算し、イベントをチャネルに送る
//! 3. 専用の集約スレッドだけがタイムラインを所有し、チャネルからイベントを受け取って追記する
//!
//! スコープを抜けた時点ですべての抽出タスクが完了しているため、
//! 送信側を破棄するとチャネルが閉じ、集約スレッドが終了します。

use super::error::AnalyzerError;
use super::history::{ChangeEvent, Commit, HistoryProvider};
use super::timeline::FileTimeline;
use rayon::ThreadPoolBuilder;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// 1コミット分の差分計算に失敗した場合の扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitErrorPolicy {
    /// 最初の失敗で分析全体を中断する
    #[default]
    FailFast,
    /// 警告を記録し、そのコミットは変更なしとして扱う
    Skip,
}

/// パイプラインの実行パラメータ
///
/// # フィールド
///
/// - `jobs`: 抽出スレッド数（0の場合はCPU数）
/// - `channel_capacity`: イベントチャネルの容量
/// - `on_commit_error`: 差分計算に失敗したコミットの扱い
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub jobs: usize,
    pub channel_capacity: usize,
    pub on_commit_error: CommitErrorPolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            jobs: 0,
            channel_capacity: 1024,
            on_commit_error: CommitErrorPolicy::FailFast,
        }
    }
}

/// 履歴全体から `FileTimeline` を構築します
///
/// # エラー
///
/// 以下の場合にエラーを返します：
/// - 履歴の走査に失敗（`TraversalFailed`）
/// - `FailFast` の下でコミットの差分計算に失敗（`StatComputationFailed`）
/// - スレッドプールや集約スレッドの起動・終了に失敗（`AnalysisError`）
///
/// いずれの場合も、投入済みのタスクがすべて終わるのを待ってからエラーを返し、
/// 途中までのタイムラインは破棄されます。
pub fn collect_timeline<P>(
    provider: &P,
    options: &PipelineOptions,
) -> Result<FileTimeline, AnalyzerError>
where
    P: HistoryProvider + ?Sized,
{
    let pool = ThreadPoolBuilder::new()
        .num_threads(options.jobs)
        .thread_name(|index| format!("extract-{index}"))
        .build()
        .map_err(|e| AnalyzerError::AnalysisError(e.to_string()))?;

    let (sender, receiver) = mpsc::sync_channel(options.channel_capacity.max(1));
    let aggregator = spawn_aggregator(receiver)?;

    let shared = Shared {
        policy: options.on_commit_error,
        abort: AtomicBool::new(false),
        failure: Mutex::new(None),
        skipped: AtomicUsize::new(0),
    };
    let shared = &shared;
    let mut dispatched = 0usize;

    let walked = pool.in_place_scope(|scope| {
        let walked = provider.walk(&mut |commit| {
            if shared.abort.load(Ordering::Acquire) {
                return ControlFlow::Break(());
            }
            dispatched += 1;
            let sender = sender.clone();
            scope.spawn(move |_| {
                if shared.abort.load(Ordering::Acquire) {
                    return;
                }
                extract(provider, commit, &sender, shared);
            });
            ControlFlow::Continue(())
        });
        if walked.is_err() {
            // まだ始まっていないタスクは何もせずに終わる
            shared.abort.store(true, Ordering::Release);
        }
        walked
    });
    debug!(dispatched, "all extraction tasks finished");

    // プールのスレッドは破棄しても終了を待たないため、ここで各ワーカーのリソースを閉じる
    pool.broadcast(|_| provider.release_worker());

    // 最後の送信側を破棄してチャネルを閉じる
    drop(sender);
    let timeline = aggregator
        .join()
        .map_err(|_| AnalyzerError::AnalysisError("aggregator thread panicked".to_string()))?;

    walked?;
    if let Some(err) = shared.take_failure() {
        return Err(err);
    }

    info!(
        commits = dispatched,
        skipped = shared.skipped.load(Ordering::Relaxed),
        files = timeline.len(),
        changes = timeline.total_changes(),
        "aggregated change history"
    );
    Ok(timeline)
}

/// 抽出タスク間で共有する状態（タイムラインは含まない）
struct Shared {
    policy: CommitErrorPolicy,
    abort: AtomicBool,
    failure: Mutex<Option<AnalyzerError>>,
    skipped: AtomicUsize,
}

impl Shared {
    fn fail(&self, err: AnalyzerError) {
        self.abort.store(true, Ordering::Release);
        let mut slot = self.failure.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    fn take_failure(&self) -> Option<AnalyzerError> {
        self.failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

fn extract<P>(provider: &P, commit: Commit, sender: &SyncSender<ChangeEvent>, shared: &Shared)
where
    P: HistoryProvider + ?Sized,
{
    let files = match provider.changed_files(&commit) {
        Ok(files) => files,
        Err(err) => match shared.policy {
            CommitErrorPolicy::FailFast => {
                shared.fail(err);
                return;
            }
            CommitErrorPolicy::Skip => {
                warn!(commit = %commit.id, error = %err, "skipping commit");
                shared.skipped.fetch_add(1, Ordering::Relaxed);
                return;
            }
        },
    };

    for path in files {
        let event = ChangeEvent {
            path,
            at: commit.authored_at,
        };
        if sender.send(event).is_err() {
            shared.fail(AnalyzerError::AnalysisError(
                "change event channel closed before extraction finished".to_string(),
            ));
            return;
        }
    }
}

/// タイムラインを所有する集約スレッドを起動します
///
/// プールのワーカーが送信で待機している間も受信を続けられるよう、プールとは別のスレッドで動かします。
fn spawn_aggregator(
    receiver: Receiver<ChangeEvent>,
) -> Result<JoinHandle<FileTimeline>, AnalyzerError> {
    thread::Builder::new()
        .name("aggregator".to_string())
        .spawn(move || {
            let mut timeline = FileTimeline::new();
            for event in receiver {
                timeline.record(event);
            }
            timeline
        })
        .map_err(|e| AnalyzerError::AnalysisError(e.to_string()))
}
