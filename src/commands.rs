use csv::WriterBuilder;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::SplitSettings;
use crate::error::SplitError;
use crate::naming::plan_file_names;
use crate::records::{self, Group, Header, LoadedTable};

/// One output file produced by `partition_and_write`
#[derive(Debug, Clone)]
pub struct WrittenFile {
    pub key: String,
    pub path: PathBuf,
    pub rows: usize,
}

#[derive(Debug, Clone, Default)]
pub struct WriteReport {
    pub files: Vec<WrittenFile>,
}

impl WriteReport {
    pub fn row_count(&self) -> usize {
        self.files.iter().map(|f| f.rows).sum()
    }
}

/// Write one file per group into `settings.output_dir`.
///
/// A failing file does not stop the remaining groups from being written; the
/// first failure is returned once every group has been attempted. Files
/// written before or after a failure stay on disk.
pub fn partition_and_write(
    table: &LoadedTable,
    settings: &SplitSettings,
) -> Result<WriteReport, SplitError> {
    let out_dir = settings.output_dir.as_path();
    fs::create_dir_all(out_dir).map_err(|source| SplitError::DirectoryCreationFailed {
        path: out_dir.to_path_buf(),
        source,
    })?;

    let names = plan_file_names(table.groups.keys(), &settings.extension);
    let mut report = WriteReport::default();
    let mut first_error: Option<SplitError> = None;

    for (group, name) in table.groups.iter().zip(names) {
        let path = out_dir.join(name);

        match write_group(&path, &table.header, group, settings.delimiter) {
            Ok(()) => {
                tracing::info!(path = %path.display(), rows = group.rows.len(), "file written");
                report.files.push(WrittenFile {
                    key: group.key.clone(),
                    path,
                    rows: group.rows.len(),
                });
            }
            Err(source) => {
                tracing::error!(path = %path.display(), error = %source, "write failed");
                if first_error.is_none() {
                    first_error = Some(SplitError::WriteFailed { path, source });
                }
            }
        }
    }

    match first_error {
        Some(err) => {
            tracing::warn!(
                written = report.files.len(),
                groups = table.groups.len(),
                "output is incomplete"
            );
            Err(err)
        }
        None => Ok(report),
    }
}

fn write_group(path: &Path, header: &Header, group: &Group, delimiter: u8) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(BufWriter::new(file));

    writer.write_record(header)?;
    for row in &group.rows {
        writer.write_record(row)?;
    }
    writer.flush()
}

/// Totals of a completed run
#[derive(Debug)]
pub struct RunSummary {
    pub report: WriteReport,
    pub skipped: usize,
    pub elapsed_secs: f64,
}

/// Load, then partition and write, timing both phases together.
pub fn run(settings: &SplitSettings) -> Result<RunSummary, SplitError> {
    let start = Instant::now();

    let table = records::load(settings)?;
    let report = partition_and_write(&table, settings)?;

    Ok(RunSummary {
        report,
        skipped: table.skipped,
        elapsed_secs: start.elapsed().as_secs_f64(),
    })
}

pub fn print_run_summary(summary: &RunSummary, out_dir: &Path) {
    for file in &summary.report.files {
        println!("  {:>8} rows  {:<20} {}", file.rows, file.key, file.path.display());
    }
    println!(
        "\nWrote {} files ({} rows) to {}",
        summary.report.files.len(),
        summary.report.row_count(),
        out_dir.display()
    );
    if summary.skipped > 0 {
        println!("Skipped {} malformed rows", summary.skipped);
    }
    println!("Duration: {:.2} seconds", summary.elapsed_secs);
}

/// Per-group line of the `groups` listing
#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    pub key: String,
    pub rows: usize,
    pub file: String,
}

pub fn summarize_groups(table: &LoadedTable, extension: &str) -> Vec<GroupSummary> {
    let names = plan_file_names(table.groups.keys(), extension);
    table
        .groups
        .iter()
        .zip(names)
        .map(|(group, file)| GroupSummary {
            key: group.key.clone(),
            rows: group.rows.len(),
            file,
        })
        .collect()
}

pub fn group_listing(table: &LoadedTable, settings: &SplitSettings) {
    let summaries = summarize_groups(table, &settings.extension);
    let total = table.groups.row_count();

    println!(
        "Grouping {} rows by column {:?} (field {}, {} groups)\n",
        total,
        settings.column,
        table.column_index + 1,
        summaries.len()
    );

    if table.groups.is_empty() {
        println!("No data rows");
        return;
    }

    let key_width = summaries
        .iter()
        .map(|s| s.key.chars().count())
        .max()
        .unwrap_or(0)
        .max(3);

    println!(
        "{:<kw$}  {:>8}  {:>6}  File",
        "Key",
        "Rows",
        "Share",
        kw = key_width
    );
    println!("{}", "-".repeat(key_width + 30));

    for s in &summaries {
        println!(
            "{:<kw$}  {:>8}  {:>5.1}%  {}",
            s.key,
            s.rows,
            100.0 * s.rows as f64 / total as f64,
            s.file,
            kw = key_width
        );
    }

    if table.skipped > 0 {
        println!("\nSkipped {} malformed rows", table.skipped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MalformedPolicy;
    use tempfile::TempDir;

    fn setup(content: &str) -> (TempDir, SplitSettings) {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("raw.csv");
        fs::write(&input, content).unwrap();
        let settings = SplitSettings::new(input, dir.path().join("sorted").join("by_vehicle"));
        (dir, settings)
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn test_scenario_two_vehicles() {
        let (_dir, settings) = setup("vehicle;temp\nA;10\nB;20\nA;30\n");

        let summary = run(&settings).unwrap();
        assert_eq!(summary.report.files.len(), 2);
        assert_eq!(summary.report.row_count(), 3);

        let out = &settings.output_dir;
        assert_eq!(read(&out.join("A.csv")), "vehicle;temp\nA;10\nA;30\n");
        assert_eq!(read(&out.join("B.csv")), "vehicle;temp\nB;20\n");
        assert_eq!(fs::read_dir(out).unwrap().count(), 2);
    }

    #[test]
    fn test_every_row_lands_once() {
        let input = "id;vehicle;speed\n1;x;3\n2;y;4\n3;x;5\n4;z;6\n5;y;7\n6;x;8\n";
        let (_dir, settings) = setup(input);

        run(&settings).unwrap();

        let mut seen: Vec<String> = Vec::new();
        for entry in fs::read_dir(&settings.output_dir).unwrap() {
            let path = entry.unwrap().path();
            let key = path.file_stem().unwrap().to_string_lossy().to_string();
            let content = read(&path);
            let mut lines = content.lines();
            assert_eq!(lines.next(), Some("id;vehicle;speed"));
            let rows: Vec<&str> = lines.collect();
            assert!(rows.iter().all(|r| r.split(';').nth(1) == Some(key.as_str())));
            let ids: Vec<u32> = rows
                .iter()
                .map(|r| r.split(';').next().unwrap().parse().unwrap())
                .collect();
            assert!(ids.windows(2).all(|w| w[0] < w[1]), "rows out of order in {:?}", path);
            seen.extend(rows.iter().map(|r| r.to_string()));
        }

        seen.sort();
        let mut expected: Vec<String> = input.lines().skip(1).map(String::from).collect();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_rerun_is_byte_identical() {
        let (_dir, settings) = setup("vehicle;temp\nA;10\nB;\"2;0\"\nA;30\n");

        run(&settings).unwrap();
        let first_a = fs::read(settings.output_dir.join("A.csv")).unwrap();
        let first_b = fs::read(settings.output_dir.join("B.csv")).unwrap();

        fs::remove_dir_all(&settings.output_dir).unwrap();
        run(&settings).unwrap();
        assert_eq!(fs::read(settings.output_dir.join("A.csv")).unwrap(), first_a);
        assert_eq!(fs::read(settings.output_dir.join("B.csv")).unwrap(), first_b);
        assert_eq!(String::from_utf8(first_b).unwrap(), "vehicle;temp\nB;\"2;0\"\n");
    }

    #[test]
    fn test_existing_dir_and_file_overwritten() {
        let (_dir, settings) = setup("vehicle;temp\nA;10\n");
        fs::create_dir_all(&settings.output_dir).unwrap();
        fs::write(settings.output_dir.join("A.csv"), "stale content that is longer\n").unwrap();

        run(&settings).unwrap();
        assert_eq!(read(&settings.output_dir.join("A.csv")), "vehicle;temp\nA;10\n");
    }

    #[test]
    fn test_header_only_writes_nothing() {
        let (_dir, settings) = setup("vehicle;temp\n");

        let summary = run(&settings).unwrap();
        assert!(summary.report.files.is_empty());
        assert!(settings.output_dir.is_dir());
        assert_eq!(fs::read_dir(&settings.output_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_column_writes_nothing() {
        let (_dir, settings) = setup("bus;temp\nA;10\n");

        assert!(matches!(run(&settings), Err(SplitError::ColumnNotFound { .. })));
        assert!(!settings.output_dir.exists());
    }

    #[test]
    fn test_unsafe_keys_kept_apart() {
        let (_dir, settings) = setup("vehicle;temp\na/b;1\na_b;2\n../up;3\n");

        let summary = run(&settings).unwrap();
        assert_eq!(summary.report.files.len(), 3);

        let out = &settings.output_dir;
        assert_eq!(read(&out.join("a%2Fb.csv")), "vehicle;temp\na/b;1\n");
        assert_eq!(read(&out.join("a_b.csv")), "vehicle;temp\na_b;2\n");
        assert_eq!(read(&out.join("%2E.%2Fup.csv")), "vehicle;temp\n../up;3\n");
        assert_eq!(fs::read_dir(out).unwrap().count(), 3);
    }

    #[test]
    fn test_output_dir_is_a_file() {
        let (dir, mut settings) = setup("vehicle;temp\nA;10\n");
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        settings.output_dir = blocker;

        assert!(matches!(
            run(&settings),
            Err(SplitError::DirectoryCreationFailed { .. })
        ));
    }

    #[test]
    fn test_write_failure_continues_with_other_groups() {
        let (_dir, settings) = setup("vehicle;temp\nA;10\nB;20\n");
        // A directory where A.csv should go makes that one file unwritable
        fs::create_dir_all(settings.output_dir.join("A.csv")).unwrap();

        match run(&settings) {
            Err(SplitError::WriteFailed { path, .. }) => {
                assert_eq!(path, settings.output_dir.join("A.csv"));
            }
            other => panic!("expected WriteFailed, got {:?}", other),
        }
        assert_eq!(read(&settings.output_dir.join("B.csv")), "vehicle;temp\nB;20\n");
    }

    #[test]
    fn test_skipped_rows_reported() {
        let (_dir, mut settings) = setup("vehicle;temp\nA;10\nA\nB;20\n");
        settings.on_malformed = MalformedPolicy::Skip;

        let summary = run(&settings).unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.report.row_count(), 2);
    }

    #[test]
    fn test_partition_writes_into_configured_dir() {
        let (dir, mut settings) = setup("vehicle;temp\nA;10\nB;20\n");
        let table = records::load(&settings).unwrap();
        settings.output_dir = dir.path().join("elsewhere");

        let report = partition_and_write(&table, &settings).unwrap();
        assert_eq!(report.files.len(), 2);
        assert!(report.files.iter().all(|f| f.path.starts_with(&settings.output_dir)));
        assert_eq!(read(&settings.output_dir.join("B.csv")), "vehicle;temp\nB;20\n");
        assert!(!dir.path().join("sorted").exists());
    }

    #[test]
    fn test_summarize_groups() {
        let (_dir, settings) = setup("vehicle;temp\nbus;1\nBUS;2\nbus;3\n");
        let table = records::load(&settings).unwrap();

        let summaries = summarize_groups(&table, "csv");
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].key, "bus");
        assert_eq!(summaries[0].rows, 2);
        assert_eq!(summaries[0].file, "bus.csv");
        assert_eq!(summaries[1].file, "BUS~2.csv");
        assert!(!settings.output_dir.exists());
    }
}
