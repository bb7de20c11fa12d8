//! Batch persistence of record documents.

use crate::config::HarvesterConfig;
use oaiharvest_common::{Error, Result, TextEncoding, Timestamp};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// Default number of records per output file.
pub const DEFAULT_MAX_RECORDS: usize = 1000;

const BATCH_OPEN: &str = "<ListRecords>";
const BATCH_CLOSE: &str = "</ListRecords>";

/// Files written by one [`ChunkedWriter::write`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// Created files, in batch order.
    pub files: Vec<PathBuf>,
    /// Number of records written across all files.
    pub total: usize,
}

/// Writes records in batches of at most `max_records` per file, each batch
/// wrapped in a `<ListRecords>` element.
#[derive(Debug, Clone)]
pub struct ChunkedWriter {
    root: PathBuf,
    max_records: usize,
    encoding: TextEncoding,
}

impl ChunkedWriter {
    /// Writer rooted at `<workdir>/oaiharvester`.
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            root: workdir.into().join("oaiharvester"),
            max_records: DEFAULT_MAX_RECORDS,
            encoding: TextEncoding::Utf8,
        }
    }

    pub fn from_config(config: &HarvesterConfig) -> Self {
        Self::new(config.workdir())
            .with_max_records(config.max_records)
            .with_encoding(config.encoding)
    }

    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records;
        self
    }

    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `records` under `output_dir` (relative to the writer root).
    ///
    /// Empty input touches nothing. A failed batch aborts the call; files of
    /// earlier batches stay on disk.
    pub fn write<R: AsRef<str>>(&self, records: &[R], output_dir: &Path) -> Result<WriteSummary> {
        if records.is_empty() {
            return Ok(WriteSummary::default());
        }
        if self.max_records == 0 {
            return Err(Error::Config("max_records must be at least 1".to_string()));
        }

        let dir = ensure_output_dir(&self.root, output_dir)?;
        let mut summary = WriteSummary::default();

        for batch in records.chunks(self.max_records) {
            let path = create_file_name(&dir);
            self.write_batch(&path, batch)?;
            debug!(path = %path.display(), records = batch.len(), "Wrote batch");
            summary.total += batch.len();
            summary.files.push(path);
        }

        info!(
            files = summary.files.len(),
            records = summary.total,
            dir = %dir.display(),
            "Harvested records written"
        );
        Ok(summary)
    }

    fn write_batch<R: AsRef<str>>(&self, path: &Path, batch: &[R]) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| Error::persistence(path, e))?;
        let mut out = BufWriter::new(file);

        self.write_text(&mut out, path, BATCH_OPEN)?;
        for record in batch {
            self.write_text(&mut out, path, record.as_ref())?;
        }
        self.write_text(&mut out, path, BATCH_CLOSE)?;

        out.flush().map_err(|e| Error::persistence(path, e))
    }

    fn write_text(&self, out: &mut BufWriter<File>, path: &Path, text: &str) -> Result<()> {
        let bytes = self.encoding.encode(text).map_err(|c| {
            Error::persistence(
                path,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("character {:?} cannot be encoded as {}", c, self.encoding),
                ),
            )
        })?;
        out.write_all(&bytes).map_err(|e| Error::persistence(path, e))
    }
}

/// Create `root/output_dir` if missing and return its canonical path.
///
/// `output_dir` must be relative and stay below `root`.
pub fn ensure_output_dir(root: &Path, output_dir: &Path) -> Result<PathBuf> {
    let escapes = output_dir
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(Error::Config(format!(
            "output directory {} must be relative to the work directory",
            output_dir.display()
        )));
    }
    let path = root.join(output_dir);
    if !path.exists() {
        std::fs::create_dir_all(&path).map_err(|e| Error::persistence(&path, e))?;
    }
    Ok(path.canonicalize()?)
}

/// Fresh `oaiharvest_<date>_<unique>.xml` path inside `dir`.
pub fn create_file_name(dir: &Path) -> PathBuf {
    dir.join(format!(
        "oaiharvest_{}_{}.xml",
        Timestamp::now().to_date_stamp(),
        Uuid::new_v4().simple()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn records(n: usize) -> Vec<String> {
        (0..n)
            .map(|i| format!("<OAI-PMH><record><id>{}</id></record></OAI-PMH>", i))
            .collect()
    }

    fn count_records(path: &Path) -> usize {
        std::fs::read_to_string(path)
            .unwrap()
            .matches("<record>")
            .count()
    }

    #[test]
    fn test_empty_input_touches_nothing() {
        let dir = tempdir().unwrap();
        let writer = ChunkedWriter::new(dir.path());
        let summary = writer.write::<String>(&[], Path::new("set")).unwrap();

        assert_eq!(summary, WriteSummary::default());
        assert!(!writer.root().exists());
    }

    #[test]
    fn test_batches_of_max_records() {
        let dir = tempdir().unwrap();
        let writer = ChunkedWriter::new(dir.path());
        let summary = writer.write(&records(2500), Path::new("big")).unwrap();

        assert_eq!(summary.total, 2500);
        assert_eq!(summary.files.len(), 3);
        let counts: Vec<usize> = summary.files.iter().map(|f| count_records(f)).collect();
        assert_eq!(counts, vec![1000, 1000, 500]);
    }

    #[test]
    fn test_file_count_is_ceiling() {
        let dir = tempdir().unwrap();
        for (n, size, expected) in [(1, 3, 1), (3, 3, 1), (4, 3, 2), (7, 1, 7)] {
            let writer = ChunkedWriter::new(dir.path()).with_max_records(size);
            let summary = writer.write(&records(n), Path::new("ceil")).unwrap();
            assert_eq!(summary.files.len(), expected, "n={} size={}", n, size);
            let written: usize = summary.files.iter().map(|f| count_records(f)).sum();
            assert_eq!(written, n);
            assert_eq!(summary.total, n);
        }
    }

    #[test]
    fn test_batch_content_and_order() {
        let dir = tempdir().unwrap();
        let writer = ChunkedWriter::new(dir.path()).with_max_records(2);
        let input = records(3);
        let summary = writer.write(&input, Path::new("order")).unwrap();

        let first = std::fs::read_to_string(&summary.files[0]).unwrap();
        assert_eq!(first, format!("<ListRecords>{}{}</ListRecords>", input[0], input[1]));
        let second = std::fs::read_to_string(&summary.files[1]).unwrap();
        assert_eq!(second, format!("<ListRecords>{}</ListRecords>", input[2]));
    }

    #[test]
    fn test_file_names() {
        let dir = tempdir().unwrap();
        let writer = ChunkedWriter::new(dir.path()).with_max_records(1);
        let summary = writer.write(&records(2), Path::new("a/b")).unwrap();

        let base = dir.path().canonicalize().unwrap().join("oaiharvester/a/b");
        let prefix = format!("oaiharvest_{}_", Timestamp::now().to_date_stamp());
        for file in &summary.files {
            assert_eq!(file.parent().unwrap(), base);
            let name = file.file_name().unwrap().to_string_lossy();
            assert!(name.starts_with(&prefix), "{}", name);
            assert!(name.ends_with(".xml"));
        }
        assert_ne!(summary.files[0], summary.files[1]);
    }

    #[test]
    fn test_ensure_output_dir_idempotent() {
        let dir = tempdir().unwrap();
        let first = ensure_output_dir(dir.path(), Path::new("x/y")).unwrap();
        let second = ensure_output_dir(dir.path(), Path::new("x/y")).unwrap();
        assert_eq!(first, second);
        assert!(first.is_absolute());
        assert!(first.is_dir());
    }

    #[test]
    fn test_output_dir_stays_under_root() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("work");
        let writer = ChunkedWriter::new(&root);

        for out in ["/tmp/elsewhere", "../escaped", "a/../../b"] {
            let err = writer.write(&records(1), Path::new(out)).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{} accepted", out);
        }
        assert!(!root.join("escaped").exists());
        assert!(!root.join("b").exists());

        let nested = ensure_output_dir(writer.root(), Path::new("./a/b")).unwrap();
        assert!(nested.starts_with(writer.root().canonicalize().unwrap()));
    }

    #[test]
    fn test_zero_max_records_rejected() {
        let dir = tempdir().unwrap();
        let writer = ChunkedWriter::new(dir.path()).with_max_records(0);
        let err = writer.write(&records(1), Path::new("zero")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_latin1_output() {
        let dir = tempdir().unwrap();
        let writer = ChunkedWriter::new(dir.path()).with_encoding(TextEncoding::Latin1);
        let summary = writer
            .write(&["<r>caf\u{e9}</r>"], Path::new("latin"))
            .unwrap();

        let bytes = std::fs::read(&summary.files[0]).unwrap();
        assert!(bytes.windows(4).any(|w| w == [b'c', b'a', b'f', 0xE9]));
    }

    #[test]
    fn test_unencodable_record_fails_batch() {
        let dir = tempdir().unwrap();
        let writer = ChunkedWriter::new(dir.path())
            .with_max_records(1)
            .with_encoding(TextEncoding::Latin1);
        let err = writer
            .write(&["<r>ok</r>", "<r>\u{20ac}</r>"], Path::new("euro"))
            .unwrap_err();
        assert!(matches!(err, Error::Persistence { .. }));

        // the first batch stays on disk
        let out = dir.path().join("oaiharvester/euro");
        assert_eq!(std::fs::read_dir(out).unwrap().count(), 2);
    }
}
