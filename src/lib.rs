//! Gitリポジトリの変更頻度分析ツール
//!
//! このクレートは、Gitリポジトリのコミット履歴を分析し、
//! ファイルごとの変更回数、平均変更間隔、最後の変更からの経過日数を求めます。
//! 最後の変更からの経過時間が、そのファイル自身の平均間隔を下回っている場合は
//! 「overdue」としてマークされます。
//!
//! # 主な機能
//!
//! - コミット履歴の走査（ローカルのパスまたはリモートのURL）
//! - コミットごとの変更ファイルの並列抽出
//! - 単一の集約スレッドによるファイルごとのタイムラインの構築
//! - 平均変更間隔と経過日数の算出
//! - CSV / JSON でのレポート出力
//!
//! # 使用例
//!
//! ```no_run
//! use change_cadence::{AnalyzerOptions, CadenceAnalyzer};
//! use change_cadence::report::{write_report, CsvSink};
//!
//! let analyzer = CadenceAnalyzer::open("path/to/repo", AnalyzerOptions::default()).unwrap();
//! let rows = analyzer.analyze().unwrap();
//!
//! let mut sink = CsvSink::create("report.csv").unwrap();
//! write_report(&rows, &mut sink).unwrap();
//! ```

pub mod analyzer;
pub mod report;

pub use analyzer::{AnalyzerError, AnalyzerOptions, CadenceAnalyzer, FileStats};
