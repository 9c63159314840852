//! Rendering and writing harvest records.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use almanac_core::{MonthDay, OutputRecord};

use crate::error::HarvestResult;

/// Serialized form of the record list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Pretty-printed JSON array.
    #[default]
    Json,
    /// Header row plus one row per record.
    Csv,
}

impl OutputFormat {
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(format!("unknown output format: {other} (expected json or csv)")),
        }
    }
}

/// Where rendered output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Stdout,
    File(PathBuf),
}

impl fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// `{dir}/{MM-DD}.{ext}`.
pub fn default_path(dir: &Path, day: MonthDay, format: OutputFormat) -> PathBuf {
    dir.join(format!("{}.{}", day, format.extension()))
}

/// Render records. The same records always render to the same bytes.
///
/// # Errors
/// Returns an error if serialization fails.
pub fn render(records: &[OutputRecord], format: OutputFormat) -> HarvestResult<Vec<u8>> {
    match format {
        OutputFormat::Json => {
            let mut bytes = serde_json::to_vec_pretty(records)?;
            bytes.push(b'\n');
            Ok(bytes)
        }
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(Vec::new());
            for record in records {
                writer.serialize(record)?;
            }
            writer
                .into_inner()
                .map_err(|e| e.into_error().into())
        }
    }
}

/// Render and write records, creating parent directories as needed.
///
/// # Errors
/// Returns an error if rendering or writing fails.
pub fn write_output(
    records: &[OutputRecord],
    format: OutputFormat,
    target: &OutputTarget,
) -> HarvestResult<()> {
    let bytes = render(records, format)?;

    match target {
        OutputTarget::Stdout => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
        }
        OutputTarget::File(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, &bytes)?;
            log::debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use almanac_core::{Bucket, Category, Qid};

    fn record(n: u64, year: Option<i32>) -> OutputRecord {
        OutputRecord {
            id: Qid::from_number(n),
            date: MonthDay::new(9, 21).unwrap(),
            title: "Leonard Cohen".to_string(),
            summary: "Leonard Cohen, Canadian singer-songwriter, born".to_string(),
            url: "https://en.wikipedia.org/wiki/Leonard_Cohen".to_string(),
            category: Category::Music,
            year,
            bucket: Bucket::Births,
            times_seen: 0,
        }
    }

    #[test]
    fn test_json_is_flat_pretty_array_with_trailing_newline() {
        let bytes = render(&[record(1276, Some(1934))], OutputFormat::Json).unwrap();
        let text = String::from_utf8(bytes).unwrap();

        assert!(text.starts_with("[\n"));
        assert!(text.ends_with("]\n"));
        assert!(text.contains(r#""id": "Q1276""#));
        assert!(text.contains(r#""date": "09-21""#));
        assert!(text.contains(r#""category": "music""#));
        assert!(text.contains(r#""bucket": "births""#));
        assert!(text.contains(r#""times_seen": 0"#));
    }

    #[test]
    fn test_empty_json_output() {
        let bytes = render(&[], OutputFormat::Json).unwrap();
        assert_eq!(bytes, b"[]\n");
    }

    #[test]
    fn test_csv_has_header_and_empty_year() {
        let bytes = render(&[record(1, None)], OutputFormat::Csv).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();

        assert_eq!(
            lines.next(),
            Some("id,date,title,summary,url,category,year,bucket,times_seen")
        );
        assert_eq!(
            lines.next(),
            Some(
                "Q1,09-21,Leonard Cohen,\"Leonard Cohen, Canadian singer-songwriter, born\",\
                 https://en.wikipedia.org/wiki/Leonard_Cohen,music,,births,0"
            )
        );
    }

    #[test]
    fn test_default_path() {
        let day = MonthDay::new(1, 5).unwrap();
        assert_eq!(
            default_path(Path::new("data/otd"), day, OutputFormat::Json),
            PathBuf::from("data/otd/01-05.json")
        );
        assert_eq!(
            default_path(Path::new("out"), day, OutputFormat::Csv),
            PathBuf::from("out/01-05.csv")
        );
    }

    #[test]
    fn test_write_output_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/otd/09-21.json");
        let records = vec![record(1276, Some(1934))];

        write_output(&records, OutputFormat::Json, &OutputTarget::File(path.clone())).unwrap();

        let written = fs::read(&path).unwrap();
        assert_eq!(written, render(&records, OutputFormat::Json).unwrap());
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("csv".parse::<OutputFormat>(), Ok(OutputFormat::Csv));
        assert!("xml".parse::<OutputFormat>().is_err());
        assert_eq!(OutputTarget::Stdout.to_string(), "stdout");
    }
}
