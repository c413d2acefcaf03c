//! Packaging: both documents into one ZIP, plus the run statistics.

use crate::config::ProcessingConfig;
use crate::error::StylerError;
use crate::output::{OutputFile, ProcessedParagraph, ProcessingStats};
use crate::pipeline::llm::UsageCounter;
use chrono::{DateTime, SecondsFormat, Utc};
use std::io::{Cursor, Write};
use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const STYLED_FILE_NAME: &str = "completo.docx";
pub const SANITIZED_FILE_NAME: &str = "completo_pronto_para_indesign.docx";

/// The bundled outputs of one run.
#[derive(Debug, Clone)]
pub struct Package {
    pub archive: Vec<u8>,
    /// `{folder}.zip`
    pub archive_name: String,
    /// `{book_name}_{timestamp}`, the single top-level folder of the archive.
    pub folder: String,
    pub files: Vec<OutputFile>,
}

/// Bundle the styled and sanitized documents, stamped with the current time.
pub fn package(book_name: &str, styled: &[u8], sanitized: &[u8]) -> Result<Package, StylerError> {
    package_at(book_name, styled, sanitized, Utc::now())
}

/// [`package`] with an explicit timestamp.
pub fn package_at(
    book_name: &str,
    styled: &[u8],
    sanitized: &[u8],
    now: DateTime<Utc>,
) -> Result<Package, StylerError> {
    let folder = format!("{}_{}", folder_safe(book_name), timestamp(now));
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.add_directory(format!("{folder}/"), options)
        .map_err(archive_err)?;
    for (name, bytes) in [(STYLED_FILE_NAME, styled), (SANITIZED_FILE_NAME, sanitized)] {
        zip.start_file(format!("{folder}/{name}"), options)
            .map_err(archive_err)?;
        zip.write_all(bytes).map_err(archive_err)?;
    }
    let archive = zip.finish().map_err(archive_err)?.into_inner();

    debug!("Packaged {} ({} bytes)", folder, archive.len());

    Ok(Package {
        archive,
        archive_name: format!("{folder}.zip"),
        files: vec![
            OutputFile {
                name: STYLED_FILE_NAME.into(),
                size: format_file_size(styled.len() as u64),
                path: STYLED_FILE_NAME.into(),
            },
            OutputFile {
                name: SANITIZED_FILE_NAME.into(),
                size: format_file_size(sanitized.len() as u64),
                path: SANITIZED_FILE_NAME.into(),
            },
        ],
        folder,
    })
}

fn archive_err(e: impl std::fmt::Display) -> StylerError {
    StylerError::ArchiveFailed {
        detail: e.to_string(),
    }
}

/// RFC 3339 UTC with millisecond precision, `:` and `.` replaced by `-`.
fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}

/// Path separators would create extra folders inside the archive.
fn folder_safe(book_name: &str) -> String {
    let name = book_name.trim().replace(['/', '\\'], "_");
    if name.is_empty() {
        "documento".to_string()
    } else {
        name
    }
}

/// Human readable byte count: `"512 B"`, `"1.5 KB"`, `"2.0 MB"`.
pub fn format_file_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    if bytes < KB {
        format!("{bytes} B")
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    }
}

/// Summary numbers for a finished run.
///
/// `api_calls` is what the usage counter saw, which is `ceil(N / batch_size)`
/// for a run that dispatched every batch.
pub fn compute_stats(
    total_paragraphs: usize,
    records: &[ProcessedParagraph],
    usage: &UsageCounter,
    config: &ProcessingConfig,
) -> ProcessingStats {
    ProcessingStats {
        total_pages: total_paragraphs.div_ceil(config.paragraphs_per_page.max(1)),
        total_paragraphs,
        questions_processed: records.iter().filter(|r| r.is_question()).count(),
        api_calls: usage.calls,
        estimated_cost_usd: usage.calls as f64 * config.cost_per_call_usd,
        total_input_tokens: usage.input_tokens,
        total_output_tokens: usage.output_tokens,
        failed_batches: usage.failed_batches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ElementType;
    use chrono::TimeZone;
    use std::io::Read;
    use zip::ZipArchive;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap()
    }

    #[test]
    fn archive_layout() {
        let pkg = package_at("Matemática 9º ano", b"styled", b"sanitized!", fixed_time()).unwrap();
        assert_eq!(pkg.folder, "Matemática 9º ano_2026-03-14T09-26-53-000Z");
        assert_eq!(pkg.archive_name, format!("{}.zip", pkg.folder));

        let mut zip = ZipArchive::new(Cursor::new(pkg.archive)).unwrap();
        let mut styled = String::new();
        zip.by_name(&format!("{}/completo.docx", pkg.folder))
            .unwrap()
            .read_to_string(&mut styled)
            .unwrap();
        assert_eq!(styled, "styled");
        assert!(zip
            .by_name(&format!("{}/completo_pronto_para_indesign.docx", pkg.folder))
            .is_ok());
    }

    #[test]
    fn manifest_sizes() {
        let pkg = package_at("b", &[0u8; 2048], &[0u8; 10], fixed_time()).unwrap();
        assert_eq!(pkg.files[0].name, STYLED_FILE_NAME);
        assert_eq!(pkg.files[0].size, "2.0 KB");
        assert_eq!(pkg.files[1].size, "10 B");
    }

    #[test]
    fn book_name_cannot_add_folders() {
        let pkg = package_at("a/b\\c", b"", b"", fixed_time()).unwrap();
        assert!(pkg.folder.starts_with("a_b_c_"));
        assert!(package_at("  ", b"", b"", fixed_time())
            .unwrap()
            .folder
            .starts_with("documento_"));
    }

    #[test]
    fn file_sizes() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(1023), "1023 B");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn stats_follow_usage_and_ratios() {
        let records = vec![
            ProcessedParagraph::styled("q", "enunciado", ElementType::Text),
            ProcessedParagraph::styled("q", "questao", ElementType::Text),
            ProcessedParagraph::normal("x"),
        ];
        let usage = UsageCounter {
            calls: 4,
            input_tokens: 1000,
            output_tokens: 300,
            failed_batches: 1,
        };
        let stats = compute_stats(100, &records, &usage, &ProcessingConfig::default());
        assert_eq!(stats.total_pages, 4);
        assert_eq!(stats.questions_processed, 2);
        assert_eq!(stats.api_calls, 4);
        assert!((stats.estimated_cost_usd - 0.008).abs() < 1e-9);
        assert_eq!(stats.failed_batches, 1);
    }
}
