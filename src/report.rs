//! レポートの組み立てと書き出しを担当するモジュール
//!
//! 集約済みのタイムラインから `FileStats` の行を作り、`ReportSink` に順番に渡します。
//! 書き出し形式はCSVとJSONの2種類です。

use crate::analyzer::{AnalyzerError, FileStats, FileTimeline};
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// CSVレポートのヘッダー行
pub const HEADER: [&str; 4] = [
    "File",
    "Changes",
    "Mean days between changes",
    "Days since last change",
];

/// タイムラインからパスの辞書順に並んだ行を作成します
///
/// 各ファイルの日時はここで昇順にソートされ、すべての行が同じ `now` を基準に計算されます。
pub fn assemble(timeline: FileTimeline, now: DateTime<Utc>) -> Vec<FileStats> {
    timeline
        .into_sorted()
        .into_iter()
        .filter_map(|(path, stamps)| FileStats::from_sorted(path, &stamps, now))
        .collect()
}

/// レポートの書き出し先
pub trait ReportSink {
    fn write_header(&mut self) -> Result<(), AnalyzerError>;
    fn write_row(&mut self, row: &FileStats) -> Result<(), AnalyzerError>;
    /// バッファに残っている内容をすべて書き出します
    fn finish(&mut self) -> Result<(), AnalyzerError>;
}

/// ヘッダーと各行を順番に書き出します
pub fn write_report(rows: &[FileStats], sink: &mut dyn ReportSink) -> Result<(), AnalyzerError> {
    sink.write_header()?;
    for row in rows {
        sink.write_row(row)?;
    }
    sink.finish()
}

fn sink_error(e: impl std::fmt::Display) -> AnalyzerError {
    AnalyzerError::SinkWriteFailed(e.to_string())
}

/// 4列のCSVとして書き出すシンク
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
}

impl CsvSink<File> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, AnalyzerError> {
        let writer = csv::Writer::from_path(path).map_err(sink_error)?;
        Ok(Self { writer })
    }
}

impl<W: Write> CsvSink<W> {
    pub fn from_writer(out: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(out),
        }
    }

    pub fn into_inner(self) -> Result<W, AnalyzerError> {
        self.writer.into_inner().map_err(sink_error)
    }
}

impl<W: Write> ReportSink for CsvSink<W> {
    fn write_header(&mut self) -> Result<(), AnalyzerError> {
        self.writer.write_record(HEADER).map_err(sink_error)
    }

    fn write_row(&mut self, row: &FileStats) -> Result<(), AnalyzerError> {
        self.writer
            .write_record([
                row.path.clone(),
                row.changes.to_string(),
                row.mean_interval_days.to_string(),
                row.days_since_last_change.to_string(),
            ])
            .map_err(sink_error)
    }

    fn finish(&mut self) -> Result<(), AnalyzerError> {
        self.writer.flush().map_err(sink_error)
    }
}

/// `overdue` を含むJSON配列として書き出すシンク
pub struct JsonSink<W: Write> {
    out: W,
    rows: Vec<FileStats>,
}

impl JsonSink<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, AnalyzerError> {
        let file = File::create(path).map_err(sink_error)?;
        Ok(Self::from_writer(BufWriter::new(file)))
    }
}

impl<W: Write> JsonSink<W> {
    pub fn from_writer(out: W) -> Self {
        Self {
            out,
            rows: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ReportSink for JsonSink<W> {
    fn write_header(&mut self) -> Result<(), AnalyzerError> {
        Ok(())
    }

    fn write_row(&mut self, row: &FileStats) -> Result<(), AnalyzerError> {
        self.rows.push(row.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), AnalyzerError> {
        serde_json::to_writer_pretty(&mut self.out, &self.rows).map_err(sink_error)?;
        writeln!(self.out).map_err(sink_error)?;
        self.out.flush().map_err(sink_error)
    }
}
