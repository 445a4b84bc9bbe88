//! JSON score files.
//!
//! A score file is one JSON array of [`RoundRecord`]s, pretty-printed with
//! two-space indentation and with Japanese text left unescaped so the files
//! stay readable and diffable.
//!
//! Writes are all-or-nothing: the array is written to a temporary file in the
//! target directory and renamed into place, so an interrupted run never
//! leaves a truncated file behind.

use crate::error::OutputError;
use crate::models::RoundRecord;
use chrono::Local;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::{error, info, instrument};

/// `scores_YYYYmmddHHMMSS.json` for the current local time.
pub fn default_filename() -> String {
    format!("scores_{}.json", Local::now().format("%Y%m%d%H%M%S"))
}

/// Serialize `records` into `dir/filename` (or a timestamped default name).
///
/// Creates `dir` if needed and writes the pretty-printed JSON array through
/// a temporary file that is renamed into place.
///
/// # Arguments
///
/// * `records` - The rounds to save, in collection order
/// * `dir` - Output directory
/// * `filename` - File name to use instead of [`default_filename`]
///
/// # Returns
///
/// The path of the written file.
///
/// # Errors
///
/// [`OutputError`] if the directory cannot be created, serialization fails,
/// or the temporary file cannot be written or persisted.
#[instrument(level = "info", skip_all, fields(dir = %dir.display(), count = records.len()))]
pub async fn write_scores(
    records: &[RoundRecord],
    dir: &Path,
    filename: Option<&str>,
) -> Result<PathBuf, OutputError> {
    let path = dir.join(filename.map(str::to_string).unwrap_or_else(default_filename));

    let json = serde_json::to_string_pretty(records).map_err(|source| OutputError::Json {
        path: path.clone(),
        source,
    })?;

    if let Err(source) = fs::create_dir_all(dir).await {
        error!(error = %source, "Failed to create output dir");
        return Err(OutputError::Io {
            path: dir.to_path_buf(),
            source,
        });
    }

    info!(path = %path.display(), "Writing scores");
    let target = path.clone();
    tokio::task::spawn_blocking(move || persist_atomically(&target, json.as_bytes()))
        .await
        .map_err(|e| OutputError::Io {
            path: path.clone(),
            source: std::io::Error::other(e),
        })??;

    info!(path = %path.display(), "Wrote score file");
    Ok(path)
}

fn persist_atomically(path: &Path, bytes: &[u8]) -> Result<(), OutputError> {
    let io_err = |source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

/// Read a score file written by [`write_scores`] (or an earlier version of the tool).
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub fn load_scores(path: &Path) -> Result<Vec<RoundRecord>, OutputError> {
    let file = File::open(path).map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| OutputError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HoleMark, HoleStat};

    fn sample() -> RoundRecord {
        let mut r = RoundRecord::new("2025", "04", "28", "箱根くらかけゴルフ場");
        r.prefecture = "神奈川県".into();
        r.course_former_half = "OUT".into();
        r.course_latter_half = "IN".into();
        r.hall_scores = vec![HoleStat::Count(5), HoleStat::NoData, HoleStat::Count(4)];
        r.fairway_keeps = vec![HoleMark::Mark("is-keep".into()), HoleMark::NoData];
        r.set_companions(vec!["山田".into()], vec![vec![HoleStat::Count(6)]]);
        r
    }

    #[tokio::test]
    async fn test_write_then_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![sample(), RoundRecord::new("2024", "12", "01", "テスト")];

        let path = write_scores(&records, dir.path(), Some("scores.json")).await.unwrap();
        assert_eq!(path, dir.path().join("scores.json"));

        let loaded = load_scores(&path).unwrap();
        assert_eq!(loaded, records);
        assert_eq!(loaded[0].hall_scores[1], HoleStat::NoData);
        assert!(loaded[1].putt_scores.is_empty());
    }

    #[tokio::test]
    async fn test_file_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_scores(&[sample()], dir.path(), Some("out.json")).await.unwrap();
        let text = std::fs::read_to_string(&path).unwrap();

        assert!(text.starts_with("[\n  {\n    \"year\": \"2025\""));
        assert!(text.contains("箱根くらかけゴルフ場"));
        assert!(text.contains("\"ー\""));
        assert!(text.contains("\"bunkers\": []"));
        assert!(!text.contains("\\u"));
    }

    #[tokio::test]
    async fn test_default_filename_and_nested_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let path = write_scores(&[sample()], &nested, None).await.unwrap();

        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("scores_"));
        assert!(name.ends_with(".json"));
        assert_eq!(name.len(), "scores_20250428091500.json".len());
        // Only the final file; no temporaries left behind.
        assert_eq!(std::fs::read_dir(&nested).unwrap().count(), 1);
    }

    #[test]
    fn test_load_older_file_with_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.json");
        std::fs::write(
            &path,
            r#"[{"year":"2019","month":"07","day":"14","golf_place_name":"旧ゴルフ場",
                "course_former_half":"東","course_latter_half":"西","hall_scores":["5",6,"ー",""]}]"#,
        )
        .unwrap();

        let loaded = load_scores(&path).unwrap();
        assert_eq!(
            loaded[0].hall_scores,
            vec![HoleStat::Count(5), HoleStat::Count(6), HoleStat::NoData, HoleStat::NoData]
        );
        assert!(loaded[0].accompany_member_names.is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_scores(Path::new("/nonexistent/scores.json")).unwrap_err();
        assert!(matches!(err, OutputError::Io { .. }));
    }
}
