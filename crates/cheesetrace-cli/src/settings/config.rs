use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use cheesetrace_core::DateRange;
use cheesetrace_generate::GenerateOptions;
use cheesetrace_store::SchemaSource;

use super::atomic::write_bytes_atomic;
use super::{SettingsError, SettingsResult};

/// Read when `--config` is not given; absent means defaults.
pub const DEFAULT_CONFIG_PATH: &str = "cheesetrace.toml";

/// Contents of `cheesetrace.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: PathBuf,
    pub run_dir: PathBuf,
    /// Directory of `NN_name.sql` files; the embedded schema when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_dir: Option<PathBuf>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub generation: GenerateOptions,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: PathBuf::from("cheese_traceability.db"),
            run_dir: PathBuf::from("runs"),
            schema_dir: None,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or(NaiveDate::MIN),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap_or(NaiveDate::MIN),
            generation: GenerateOptions::default(),
        }
    }
}

impl Settings {
    pub fn range(&self) -> SettingsResult<DateRange> {
        DateRange::new(self.start_date, self.end_date)
            .map_err(|err| SettingsError::Invalid(err.to_string()))
    }

    pub fn schema_source(&self) -> SchemaSource {
        match &self.schema_dir {
            Some(dir) => SchemaSource::Directory(dir.clone()),
            None => SchemaSource::Embedded,
        }
    }
}

/// Loads settings from `explicit`, or from [`DEFAULT_CONFIG_PATH`] when it
/// exists. An explicit path that does not exist is an error.
pub fn load_settings(explicit: Option<&Path>) -> SettingsResult<Settings> {
    let path = match explicit {
        Some(path) if !path.is_file() => return Err(SettingsError::NotFound(path.to_path_buf())),
        Some(path) => path.to_path_buf(),
        None => {
            let path = PathBuf::from(DEFAULT_CONFIG_PATH);
            if !path.is_file() {
                return Ok(Settings::default());
            }
            path
        }
    };
    let content = std::fs::read_to_string(&path)?;
    let settings: Settings = toml::from_str(&content)?;
    Ok(settings)
}

pub fn save_settings(path: &Path, settings: &Settings) -> SettingsResult<()> {
    let encoded = toml::to_string_pretty(settings)?;
    write_bytes_atomic(path, encoded.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cheesetrace_generate::MissingParentPolicy;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cheesetrace.toml");
        std::fs::write(
            &path,
            "end_date = \"2024-01-05\"\n\n[generation]\nseed = 7\nmissing_parent_policy = \"skip\"\n",
        )
        .expect("write");

        let settings = load_settings(Some(&path)).expect("load");
        assert_eq!(settings.start_date, Settings::default().start_date);
        assert_eq!(settings.range().expect("range").days(), 5);
        assert_eq!(settings.generation.seed, 7);
        assert_eq!(settings.generation.lot_prefix, "TAL");
        assert_eq!(
            settings.generation.missing_parent_policy,
            MissingParentPolicy::Skip
        );
        assert!(matches!(settings.schema_source(), SchemaSource::Embedded));
    }

    #[test]
    fn saved_settings_load_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cheesetrace.toml");
        let mut settings = Settings::default();
        settings.schema_dir = Some(PathBuf::from("sql"));
        settings.generation.facility_code = "FAC009".to_string();

        save_settings(&path, &settings).expect("save");
        let loaded = load_settings(Some(&path)).expect("load");
        assert_eq!(loaded.schema_dir, settings.schema_dir);
        assert_eq!(loaded.generation.facility_code, "FAC009");
        assert_eq!(loaded.end_date, settings.end_date);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_settings(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, SettingsError::NotFound(_)));
    }

    #[test]
    fn inverted_dates_are_rejected() {
        let settings = Settings {
            start_date: NaiveDate::from_ymd_opt(2024, 2, 1).expect("date"),
            ..Settings::default()
        };
        assert!(matches!(settings.range(), Err(SettingsError::Invalid(_))));
    }
}
