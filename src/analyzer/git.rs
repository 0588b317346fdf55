//! Gitリポジトリとの対話を担当するモジュール
//!
//! このモジュールは、libgit2を使用してローカルまたはリモートのリポジトリを開き、
//! コミット履歴の走査と、コミットごとの変更ファイルの抽出を行います。
//!
//! リモートのURLが渡された場合は一時ディレクトリにベアクローンし、
//! `GitHistory` が破棄されるまでそのディレクトリを保持します。

use super::error::AnalyzerError;
use super::history::{Commit, HistoryProvider};
use chrono::DateTime;
use git2::build::RepoBuilder;
use git2::{FetchOptions, Oid, RemoteCallbacks, Repository, Sort};
use regex::Regex;
use std::cell::RefCell;
use std::collections::HashSet;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

thread_local! {
    // ワーカースレッドごとに開いたリポジトリを再利用する
    static WORKER_REPO: RefCell<Option<Repository>> = RefCell::new(None);
}

/// Gitリポジトリを履歴の供給元とする `HistoryProvider` の実装
///
/// # フィールド
///
/// - `git_dir`: リポジトリの `.git` ディレクトリ（ベアの場合はリポジトリ自体）
/// - `start`: 走査を開始するコミット
/// - `filter`: 分析対象とするファイルパスのフィルタ
/// - `_clone_dir`: リモートからクローンした場合の一時ディレクトリ
pub struct GitHistory {
    git_dir: PathBuf,
    start: Oid,
    filter: PathFilter,
    _clone_dir: Option<TempDir>,
}

impl GitHistory {
    /// リポジトリを開き、開始リファレンスを解決します
    ///
    /// # 引数
    ///
    /// - `locator`: ローカルのパス、またはクローン可能なURL
    /// - `reference`: 開始するブランチ・リファレンス名（`None` の場合は `HEAD`）
    /// - `filter`: 分析対象とするファイルパスのフィルタ
    ///
    /// # エラー
    ///
    /// 以下の場合にエラーを返します：
    /// - リポジトリを開けない、またはクローンに失敗した（`SourceUnreachable`）
    /// - リファレンスがコミットに解決できない（`ReferenceMissing`）
    pub fn open(
        locator: &str,
        reference: Option<&str>,
        filter: PathFilter,
    ) -> Result<Self, AnalyzerError> {
        let (repo, clone_dir) = acquire(locator)?;
        let start = resolve_start(&repo, reference)?;
        debug!(start = %start, git_dir = %repo.path().display(), "resolved starting commit");

        Ok(Self {
            git_dir: repo.path().to_path_buf(),
            start,
            filter,
            _clone_dir: clone_dir,
        })
    }

    pub fn start(&self) -> Oid {
        self.start
    }
}

impl HistoryProvider for GitHistory {
    fn walk(
        &self,
        visit: &mut dyn FnMut(Commit) -> ControlFlow<()>,
    ) -> Result<(), AnalyzerError> {
        let traversal = |e: git2::Error| AnalyzerError::TraversalFailed(e.message().to_string());

        let repo = Repository::open(&self.git_dir).map_err(traversal)?;
        let mut revwalk = repo.revwalk().map_err(traversal)?;
        revwalk.push(self.start).map_err(traversal)?;
        revwalk.set_sorting(Sort::TIME).map_err(traversal)?;

        for oid in revwalk {
            let oid = oid.map_err(traversal)?;
            let commit = repo.find_commit(oid).map_err(traversal)?;

            let authored_at = DateTime::from_timestamp(commit.author().when().seconds(), 0)
                .ok_or_else(|| {
                    AnalyzerError::TraversalFailed(format!(
                        "commit {oid} has an invalid author timestamp"
                    ))
                })?;

            let record = Commit {
                id: oid.to_string(),
                authored_at,
            };
            if visit(record).is_break() {
                debug!(commit = %oid, "traversal stopped early");
                break;
            }
        }

        Ok(())
    }

    fn changed_files(&self, commit: &Commit) -> Result<Vec<String>, AnalyzerError> {
        let stat_failure = |reason: String| AnalyzerError::StatComputationFailed {
            commit: commit.id.clone(),
            reason,
        };

        let oid = Oid::from_str(&commit.id).map_err(|e| stat_failure(e.message().to_string()))?;
        let files = with_worker_repository(&self.git_dir, |repo| get_changed_files(repo, oid))
            .map_err(|e| stat_failure(e.message().to_string()))?;

        Ok(files
            .into_iter()
            .filter(|file_path| self.filter.matches(file_path))
            .collect())
    }

    fn release_worker(&self) {
        // クローン先の一時ディレクトリを削除する前にハンドルを閉じておく
        WORKER_REPO.with(|slot| slot.borrow_mut().take());
    }
}

/// ローカルのパスならそのまま開き、それ以外はURLとして一時ディレクトリにクローンします
fn acquire(locator: &str) -> Result<(Repository, Option<TempDir>), AnalyzerError> {
    let unreachable =
        |e: git2::Error| AnalyzerError::SourceUnreachable(format!("{locator}: {}", e.message()));

    if Path::new(locator).exists() {
        let repo = Repository::open(locator).map_err(unreachable)?;
        return Ok((repo, None));
    }

    let clone_dir = tempfile::Builder::new()
        .prefix("change-cadence-")
        .tempdir()
        .map_err(|e| AnalyzerError::SourceUnreachable(format!("{locator}: {e}")))?;

    let mut callbacks = RemoteCallbacks::new();
    callbacks.transfer_progress(|progress| {
        debug!(
            received = progress.received_objects(),
            total = progress.total_objects(),
            bytes = progress.received_bytes(),
            "fetching objects"
        );
        true
    });
    let mut fetch_options = FetchOptions::new();
    fetch_options.remote_callbacks(callbacks);

    info!(url = locator, dir = %clone_dir.path().display(), "cloning repository");
    let repo = RepoBuilder::new()
        .bare(true)
        .fetch_options(fetch_options)
        .clone(locator, clone_dir.path())
        .map_err(unreachable)?;

    Ok((repo, Some(clone_dir)))
}

fn resolve_start(repo: &Repository, reference: Option<&str>) -> Result<Oid, AnalyzerError> {
    let name = reference.unwrap_or("HEAD");
    let missing = |e: git2::Error| AnalyzerError::ReferenceMissing(format!("{name}: {}", e.message()));

    let resolved = match reference {
        Some(short_name) => repo.resolve_reference_from_short_name(short_name),
        None => repo.head(),
    }
    .map_err(missing)?;

    let commit = resolved.peel_to_commit().map_err(missing)?;
    Ok(commit.id())
}

fn with_worker_repository<T>(
    git_dir: &Path,
    f: impl FnOnce(&Repository) -> Result<T, git2::Error>,
) -> Result<T, git2::Error> {
    WORKER_REPO.with(|slot| {
        let mut slot = slot.borrow_mut();
        let repo = match slot.take() {
            Some(repo) if repo.path() == git_dir => repo,
            _ => Repository::open(git_dir)?,
        };
        let result = f(&repo);
        *slot = Some(repo);
        result
    })
}

/// コミットと最初の親とのツリー差分から、変更されたファイルのパスを取得します
///
/// 親を持たないコミットは空のツリーと比較します。削除されたファイルは削除前のパスで返します。
fn get_changed_files(repo: &Repository, oid: Oid) -> Result<Vec<String>, git2::Error> {
    let commit = repo.find_commit(oid)?;
    let tree = commit.tree()?;
    let parent_tree = if commit.parent_count() > 0 {
        Some(commit.parent(0)?.tree()?)
    } else {
        None
    };

    let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;

    let mut seen = HashSet::new();
    let mut files = Vec::new();
    for delta in diff.deltas() {
        let path = delta.new_file().path().or_else(|| delta.old_file().path());
        if let Some(path) = path {
            let path_str = path.to_string_lossy().into_owned();
            if seen.insert(path_str.clone()) {
                files.push(path_str);
            }
        }
    }

    Ok(files)
}

/// 分析対象とするファイルパスのフィルタ
///
/// 除外パターンに一致したパスは常に除外されます。
/// インクルードパターンが空の場合は、除外されなかったすべてのパスが対象になります。
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    include_patterns: Vec<Regex>,
    exclude_patterns: Vec<Regex>,
}

impl PathFilter {
    /// globパターンのリストからフィルタを作成します
    ///
    /// # エラー
    ///
    /// パターンが正規表現に変換できない場合は `InvalidPattern` を返します。
    pub fn new(
        include_patterns: &[String],
        exclude_patterns: &[String],
    ) -> Result<Self, AnalyzerError> {
        Ok(Self {
            include_patterns: compile_patterns(include_patterns)?,
            exclude_patterns: compile_patterns(exclude_patterns)?,
        })
    }

    /// 指定されたファイルパスが分析対象に含まれるかどうかを判定します
    pub fn matches(&self, file_path: &str) -> bool {
        if self
            .exclude_patterns
            .iter()
            .any(|pattern| pattern.is_match(file_path))
        {
            return false;
        }

        if self.include_patterns.is_empty() {
            return true;
        }

        self.include_patterns
            .iter()
            .any(|pattern| pattern.is_match(file_path))
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, AnalyzerError> {
    patterns
        .iter()
        .map(|p| Regex::new(&glob_to_regex(p)))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AnalyzerError::InvalidPattern(e.to_string()))
}

fn glob_to_regex(pattern: &str) -> String {
    let mut regex = String::new();
    regex.push('^');

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        // `**/` はゼロ個以上のディレクトリに一致する
                        regex.push_str("(?:.*/)?");
                    } else {
                        regex.push_str(".*");
                    }
                } else {
                    regex.push_str("[^/]*");
                }
            }
            '?' => regex.push_str("[^/]"),
            '/' => regex.push('/'),
            c if c.is_alphanumeric() => regex.push(c),
            _ => regex.push_str(&regex::escape(&c.to_string())),
        }
    }

    regex.push('$');
    regex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_to_regex() {
        let test_cases = [
            ("*.py", "^[^/]*\\.py$"),
            ("src/*.rs", "^src/[^/]*\\.rs$"),
            ("**/*.js", "^(?:.*/)?[^/]*\\.js$"),
            ("src/**/*.ts", "^src/(?:.*/)?[^/]*\\.ts$"),
            ("doc/?.md", "^doc/[^/]\\.md$"),
            ("test/**", "^test/.*$"),
            ("**.txt", "^.*\\.txt$"),
        ];

        for (input, expected) in test_cases {
            let result = glob_to_regex(input);
            assert_eq!(
                result, expected,
                "Pattern '{}' should convert to '{}', but got '{}'",
                input, expected, result
            );
        }
    }

    #[test]
    fn test_path_filter_matches() {
        let filter = PathFilter::new(
            &["**/*.rs".to_string(), "src/*.toml".to_string()],
            &["target/**".to_string()],
        )
        .unwrap();

        assert!(filter.matches("main.rs"));
        assert!(filter.matches("src/main.rs"));
        assert!(filter.matches("src/config.toml"));
        assert!(!filter.matches("src/main.py"));
        assert!(!filter.matches("target/debug/main.rs"));
    }

    #[test]
    fn test_empty_filter_keeps_everything() {
        let filter = PathFilter::default();
        assert!(filter.matches("README.md"));
        assert!(filter.matches("deeply/nested/path/file.bin"));
    }

    #[test]
    fn test_release_worker_closes_cached_repository() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let signature = git2::Signature::now("tester", "tester@example.com").unwrap();
        let tree_id = repo.index().unwrap().write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let oid = repo
            .commit(Some("HEAD"), &signature, &signature, "empty", &tree, &[])
            .unwrap();

        let history =
            GitHistory::open(dir.path().to_str().unwrap(), None, PathFilter::default()).unwrap();
        let commit = Commit {
            id: oid.to_string(),
            authored_at: DateTime::from_timestamp(0, 0).unwrap(),
        };
        assert!(history.changed_files(&commit).unwrap().is_empty());
        assert!(WORKER_REPO.with(|slot| slot.borrow().is_some()));

        history.release_worker();
        assert!(WORKER_REPO.with(|slot| slot.borrow().is_none()));
    }

    #[test]
    fn test_open_missing_path_is_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");

        let result = GitHistory::open(missing.to_str().unwrap(), None, PathFilter::default());
        assert!(matches!(result, Err(AnalyzerError::SourceUnreachable(_))));
    }

    #[test]
    fn test_open_empty_repository_has_no_reference() {
        let dir = tempfile::tempdir().unwrap();
        Repository::init(dir.path()).unwrap();

        let result = GitHistory::open(dir.path().to_str().unwrap(), None, PathFilter::default());
        assert!(matches!(result, Err(AnalyzerError::ReferenceMissing(_))));
    }
}
