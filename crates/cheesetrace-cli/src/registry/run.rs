use std::fs::{OpenOptions, create_dir_all};
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use cheesetrace_core::SCHEMA_VERSION;
use cheesetrace_generate::{GenerateOptions, GenerationReport};

use super::{RegistryError, RegistryResult};

/// Metadata captured at run start.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub command: String,
    pub run_dir: PathBuf,
    pub database: PathBuf,
    pub schema_source: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub options: GenerateOptions,
}

/// JSON config written to each run directory.
#[derive(Debug, Serialize)]
pub struct RunConfig {
    pub run_id: String,
    pub started_at: String,
    pub command: String,
    pub database: String,
    pub schema_source: String,
    pub schema_version: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub options: GenerateOptions,
    pub git: GitInfo,
}

/// Git metadata for reproducibility.
#[derive(Debug, Serialize)]
pub struct GitInfo {
    pub commit: Option<String>,
    pub dirty: Option<bool>,
}

/// Paths for run artifacts.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub logs_path: PathBuf,
    pub report_path: PathBuf,
}

pub fn start_run(ctx: &RunContext) -> RegistryResult<RunPaths> {
    let timestamp = ctx.started_at.format("%Y-%m-%dT%H-%M-%SZ").to_string();
    let root = ctx.run_dir.join(format!("{timestamp}__run_{}", ctx.run_id));

    create_dir_all(&root)?;

    let config_path = root.join("config.json");
    let logs_path = root.join("logs.ndjson");
    let report_path = root.join("report.json");

    let config = RunConfig {
        run_id: ctx.run_id.clone(),
        started_at: ctx.started_at.to_rfc3339(),
        command: ctx.command.clone(),
        database: ctx.database.display().to_string(),
        schema_source: ctx.schema_source.clone(),
        schema_version: SCHEMA_VERSION.to_string(),
        start_date: ctx.start_date,
        end_date: ctx.end_date,
        options: ctx.options.clone(),
        git: collect_git_info(),
    };

    write_json(&config_path, &config)?;

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&logs_path)?;

    Ok(RunPaths {
        root,
        config_path,
        logs_path,
        report_path,
    })
}

pub fn write_report(paths: &RunPaths, report: &GenerationReport) -> RegistryResult<()> {
    write_json(&paths.report_path, report)
}

pub fn collect_git_info() -> GitInfo {
    let commit = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
            } else {
                None
            }
        })
        .filter(|value| !value.is_empty());

    let dirty = Command::new("git")
        .args(["status", "--porcelain"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| !output.stdout.is_empty());

    GitInfo { commit, dirty }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> RegistryResult<()> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)?;
    serde_json::to_writer_pretty(file, value).map_err(RegistryError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_directory_holds_config_and_log() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = RunContext {
            run_id: "abc".to_string(),
            started_at: Utc::now(),
            command: "generate".to_string(),
            run_dir: dir.path().to_path_buf(),
            database: PathBuf::from("cheese.db"),
            schema_source: "embedded".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).expect("date"),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 3).expect("date"),
            options: GenerateOptions::default(),
        };

        let paths = start_run(&ctx).expect("start run");

        let name = paths.root.file_name().expect("name").to_string_lossy().into_owned();
        assert!(name.ends_with("__run_abc"), "{name}");
        assert!(paths.logs_path.exists());
        let config: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&paths.config_path).expect("read"))
                .expect("parse");
        assert_eq!(config["run_id"], "abc");
        assert_eq!(config["options"]["seed"], 42);
        assert_eq!(config["end_date"], "2024-01-03");
    }
}
