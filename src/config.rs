//! Settings for a split run.
//!
//! Values are layered: built-in defaults, then a TOML config file, then
//! command-line flags.
//!
//! ```toml
//! [split]
//! input = "diagnose/rohdaten_20231025.csv"
//! output_dir = "diagnose/by_vehicle"
//! column = "vehicle"
//! delimiter = ";"
//! extension = "csv"
//! on_malformed = "fail"   # or "skip"
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_COLUMN: &str = "vehicle";
pub const DEFAULT_DELIMITER: u8 = b';';
pub const DEFAULT_EXTENSION: &str = "csv";

const LOCAL_CONFIG: &str = "gsplit.toml";

/// What to do with a row whose field count differs from the header's
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Abort the run on the first malformed row
    #[default]
    Fail,
    /// Drop the row with a warning and keep going
    Skip,
}

impl std::str::FromStr for MalformedPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail" => Ok(Self::Fail),
            "skip" => Ok(Self::Skip),
            other => bail!("unknown malformed-row policy {:?} (expected 'fail' or 'skip')", other),
        }
    }
}

/// Fully resolved settings handed to the load and write phases
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitSettings {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub column: String,
    pub delimiter: u8,
    pub extension: String,
    pub on_malformed: MalformedPolicy,
}

impl SplitSettings {
    pub fn new(input: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output_dir: output_dir.into(),
            column: DEFAULT_COLUMN.to_string(),
            delimiter: DEFAULT_DELIMITER,
            extension: DEFAULT_EXTENSION.to_string(),
            on_malformed: MalformedPolicy::Fail,
        }
    }
}

/// Optional values, as found in a config file or on the command line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SplitOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_malformed: Option<MalformedPolicy>,
}

impl SplitOverrides {
    /// Values set in `other` win over values set in `self`
    pub fn merge(self, other: SplitOverrides) -> SplitOverrides {
        SplitOverrides {
            input: other.input.or(self.input),
            output_dir: other.output_dir.or(self.output_dir),
            column: other.column.or(self.column),
            delimiter: other.delimiter.or(self.delimiter),
            extension: other.extension.or(self.extension),
            on_malformed: other.on_malformed.or(self.on_malformed),
        }
    }

    /// Fill in defaults; `input` is always required, `output_dir` only when
    /// `need_output` is set.
    pub fn resolve(self, need_output: bool) -> Result<SplitSettings> {
        let input = self
            .input
            .ok_or_else(|| anyhow::anyhow!("no input file given (pass INPUT or set split.input)"))?;
        let output_dir = match self.output_dir {
            Some(dir) => dir,
            None if need_output => {
                bail!("no output directory given (pass --output-dir or set split.output_dir)")
            }
            None => PathBuf::new(),
        };
        let delimiter = match self.delimiter {
            Some(d) => parse_delimiter(&d)?,
            None => DEFAULT_DELIMITER,
        };
        let column = self.column.unwrap_or_else(|| DEFAULT_COLUMN.to_string());
        if column.is_empty() {
            bail!("group column name must not be empty");
        }
        let extension = self
            .extension
            .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
            .trim_start_matches('.')
            .to_string();
        if extension.contains(['/', '\\']) {
            bail!("extension {:?} must not contain path separators", extension);
        }

        Ok(SplitSettings {
            column,
            delimiter,
            extension,
            on_malformed: self.on_malformed.unwrap_or_default(),
            ..SplitSettings::new(input, output_dir)
        })
    }
}

/// On-disk config file layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub split: SplitOverrides,
}

impl ConfigFile {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("failed to parse config")
    }

    /// Settings as `gsplit config` shows them: fully resolved when an input
    /// is known, otherwise just the values that are set. Any other invalid
    /// value is an error.
    pub fn effective(overrides: SplitOverrides) -> Result<Self> {
        if overrides.input.is_none() {
            return Ok(ConfigFile { split: overrides });
        }
        let settings = overrides.resolve(false)?;
        Ok(ConfigFile {
            split: SplitOverrides::from(&settings),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        Self::from_toml(&content).with_context(|| format!("in config file {:?}", path))
    }

    /// Load the explicit config if given, otherwise the first file found on
    /// the search path. Returns the path that was used, if any.
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            let config = Self::load(path)?;
            return Ok((config, Some(path.to_path_buf())));
        }

        for path in search_paths() {
            if path.is_file() {
                let config = Self::load(&path)?;
                tracing::debug!(path = %path.display(), "loaded config");
                return Ok((config, Some(path)));
            }
        }

        Ok((Self::default(), None))
    }
}

/// Config file locations, in lookup order
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(LOCAL_CONFIG)];
    if let Ok(home) = std::env::var("HOME") {
        if !home.is_empty() {
            paths.push(
                PathBuf::from(home)
                    .join(".config")
                    .join("groupsplit")
                    .join("config.toml"),
            );
        }
    }
    paths
}

/// Parse a delimiter given as a single ASCII character or `tab`
pub fn parse_delimiter(s: &str) -> Result<u8> {
    match s {
        "tab" | "\\t" | "\t" => return Ok(b'\t'),
        _ => {}
    }

    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() && c != '"' && c != '\n' && c != '\r' => Ok(c as u8),
        (Some(_), None) => bail!("delimiter {:?} must be a single ASCII character other than quote or newline", s),
        _ => bail!("delimiter {:?} must be exactly one character", s),
    }
}

/// Render a delimiter byte back into its config form
pub fn delimiter_name(delimiter: u8) -> String {
    match delimiter {
        b'\t' => "tab".to_string(),
        d => (d as char).to_string(),
    }
}

impl From<&SplitSettings> for SplitOverrides {
    fn from(settings: &SplitSettings) -> Self {
        SplitOverrides {
            input: Some(settings.input.clone()),
            output_dir: if settings.output_dir.as_os_str().is_empty() {
                None
            } else {
                Some(settings.output_dir.clone())
            },
            column: Some(settings.column.clone()),
            delimiter: Some(delimiter_name(settings.delimiter)),
            extension: Some(settings.extension.clone()),
            on_malformed: Some(settings.on_malformed),
        }
    }
}
