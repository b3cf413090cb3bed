use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::TabmetaError;
use crate::hierarchy::Level;

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub input: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub first_row: Option<usize>,
    #[serde(default)]
    pub delimiter: Option<String>,
    pub mapping_column: Option<String>,
    #[serde(default)]
    pub metadata_destination: Option<String>,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub dry_run: bool,
    pub object_type: Option<String>,
    #[serde(default)]
    pub attached_files: bool,
    #[serde(default)]
    pub key_map: Option<String>,
    pub destination: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub input: Utf8PathBuf,
    pub output: Utf8PathBuf,
    pub first_row: usize,
    pub delimiter: char,
    pub mapping_column: String,
    pub metadata_destination: String,
    pub overwrite: bool,
    pub dry_run: bool,
    pub object_type: Level,
    pub attached_files: bool,
    pub key_map: Option<Utf8PathBuf>,
    pub destination: String,
    pub base_url: String,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, TabmetaError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from("tabmeta.json"),
        };

        if path.is_none() && !config_path.exists() {
            return Err(TabmetaError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| TabmetaError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| TabmetaError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, TabmetaError> {
        let input = config
            .input
            .ok_or_else(|| TabmetaError::ConfigParse("`input` is required".to_string()))?;
        let mapping_column = config
            .mapping_column
            .ok_or_else(|| TabmetaError::ConfigParse("`mapping_column` is required".to_string()))?;
        let object_type: Level = config
            .object_type
            .ok_or_else(|| TabmetaError::ConfigParse("`object_type` is required".to_string()))?
            .parse()?;
        let destination = config
            .destination
            .ok_or_else(|| TabmetaError::ConfigParse("`destination` is required".to_string()))?;

        let first_row = config.first_row.unwrap_or(1);
        if first_row == 0 {
            return Err(TabmetaError::ConfigParse(
                "`first_row` is 1-based and must be at least 1".to_string(),
            ));
        }

        let delimiter = parse_delimiter(config.delimiter.as_deref().unwrap_or(","))?;

        Ok(ResolvedConfig {
            input: Utf8PathBuf::from(input),
            output: Utf8PathBuf::from(
                config
                    .output
                    .unwrap_or_else(|| "Data_Import_Status_report.csv".to_string()),
            ),
            first_row,
            delimiter,
            mapping_column,
            metadata_destination: config
                .metadata_destination
                .unwrap_or_else(|| "info".to_string()),
            overwrite: config.overwrite,
            dry_run: config.dry_run,
            object_type,
            attached_files: config.attached_files,
            key_map: config.key_map.map(Utf8PathBuf::from),
            destination,
            base_url: config
                .base_url
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
        })
    }
}

fn parse_delimiter(value: &str) -> Result<char, TabmetaError> {
    match value {
        "\\t" | "tab" => Ok('\t'),
        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(delimiter), None) => Ok(delimiter),
                _ => Err(TabmetaError::ConfigParse(format!(
                    "`delimiter` must be a single character, got {value:?}"
                ))),
            }
        }
    }
}
