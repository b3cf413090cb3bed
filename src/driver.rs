use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::TabmetaError;
use crate::hierarchy::Level;
use crate::mapping::KeyMap;
use crate::merge::{merge, normalize_cell};
use crate::platform::{ContainerQuery, ContainerRef, PlatformClient};
use crate::resolver::{ResolutionRequest, Resolver};
use crate::table::Table;

pub const STATUS_COLUMN: &str = "Import_Status";
pub const LOCATION_COLUMN: &str = "Resolved_Path";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    Success,
    DryRunSuccess,
    NoMatch,
    AmbiguousMatch,
    Failed,
}

impl RowStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RowStatus::Success => "Success",
            RowStatus::DryRunSuccess => "DryRunSuccess",
            RowStatus::NoMatch => "NoMatch",
            RowStatus::AmbiguousMatch => "AmbiguousMatch",
            RowStatus::Failed => "Failed",
        }
    }
}

impl fmt::Display for RowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub mapping_column: String,
    pub metadata_destination: String,
    pub overwrite: bool,
    pub dry_run: bool,
    pub attached_files: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    pub total: usize,
    pub success: usize,
    pub dry_run_success: usize,
    pub no_match: usize,
    pub ambiguous_match: usize,
    pub failed: usize,
    pub finished_at: String,
}

impl ImportSummary {
    fn record(&mut self, status: RowStatus) {
        self.total += 1;
        match status {
            RowStatus::Success => self.success += 1,
            RowStatus::DryRunSuccess => self.dry_run_success += 1,
            RowStatus::NoMatch => self.no_match += 1,
            RowStatus::AmbiguousMatch => self.ambiguous_match += 1,
            RowStatus::Failed => self.failed += 1,
        }
    }
}

pub struct ImportDriver<'a, P: PlatformClient> {
    client: &'a P,
    options: ImportOptions,
    key_map: KeyMap,
}

impl<'a, P: PlatformClient> ImportDriver<'a, P> {
    pub fn new(client: &'a P, options: ImportOptions, key_map: KeyMap) -> Self {
        Self {
            client,
            options,
            key_map,
        }
    }

    /// Resolves the batch's candidate containers once up front: everything of
    /// `object_type` under the destination's project, or those containers'
    /// attached files when `attached_files` is set.
    pub fn gather_candidates(
        &self,
        destination: &ContainerRef,
        object_type: Level,
    ) -> Result<Vec<ContainerRef>, TabmetaError> {
        let project = if destination.container_type == Level::Project {
            destination.clone()
        } else {
            self.client
                .get_ancestor(destination, Level::Project)?
                .ok_or_else(|| {
                    TabmetaError::ContainerNotFound(format!(
                        "no project ancestor for {} {}",
                        destination.container_type, destination.label
                    ))
                })?
        };
        info!(
            project = %project.label,
            %object_type,
            attached_files = self.options.attached_files,
            "gathering candidate containers"
        );

        let mut request = ResolutionRequest::new();
        request.set(Level::Project, Some(&project.native_id));
        request.target_level = Some(object_type);
        let containers = Resolver::new(self.client).resolve(&request)?;

        if !self.options.attached_files {
            return Ok(containers);
        }

        let mut files = Vec::new();
        for container in &containers {
            match self
                .client
                .find(Some(container), Level::File, &ContainerQuery::All)
            {
                Ok(found) => files.extend(found),
                Err(err) => {
                    warn!(container = %container.label, error = %err, "could not list files");
                }
            }
        }
        Ok(files)
    }

    /// Processes every row independently, appending the status and resolved
    /// path columns in place. One row's failure never aborts the batch; only
    /// a missing match column does.
    pub fn import(
        &self,
        table: &mut Table,
        candidates: &[ContainerRef],
    ) -> Result<ImportSummary, TabmetaError> {
        let key_index = table
            .column_index(&self.options.mapping_column)
            .ok_or_else(|| TabmetaError::MissingColumn(self.options.mapping_column.clone()))?;
        let width = table.header.len();
        let status_index = table.push_column(STATUS_COLUMN, RowStatus::Failed.as_str());
        let location_index = table.push_column(LOCATION_COLUMN, "");

        info!(rows = table.rows.len(), candidates = candidates.len(), "starting import");
        let mut summary = ImportSummary::default();
        for row in 0..table.rows.len() {
            let (status, location) =
                match self.process_row(&*table, row, key_index, width, candidates) {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        warn!(row, error = %err, "row could not be processed");
                        (RowStatus::Failed, None)
                    }
                };
            table.set(row, status_index, status.as_str());
            if let Some(location) = &location {
                table.set(row, location_index, location);
            }
            summary.record(status);
        }

        summary.finished_at = chrono::Utc::now().to_rfc3339();
        info!(
            success = summary.success,
            dry_run = summary.dry_run_success,
            no_match = summary.no_match,
            ambiguous = summary.ambiguous_match,
            failed = summary.failed,
            "import finished"
        );
        Ok(summary)
    }

    fn process_row(
        &self,
        table: &Table,
        row: usize,
        key_index: usize,
        width: usize,
        candidates: &[ContainerRef],
    ) -> Result<(RowStatus, Option<String>), TabmetaError> {
        let cells = &table.rows[row];
        let key = cells[key_index].trim();
        if key.is_empty() {
            warn!(row, "blank match key");
            return Ok((RowStatus::NoMatch, None));
        }

        let matches: Vec<&ContainerRef> = candidates
            .iter()
            .filter(|candidate| candidate.label == key)
            .collect();
        let target = match matches.as_slice() {
            [] => {
                warn!(row, key, "no match for object name");
                return Ok((RowStatus::NoMatch, None));
            }
            [only] => *only,
            _ => {
                warn!(
                    row,
                    key,
                    count = matches.len(),
                    "multiple matches for object name, refusing to guess"
                );
                return Ok((RowStatus::AmbiguousMatch, None));
            }
        };

        let mut payload = Map::new();
        for (index, (name, cell)) in table.header.iter().zip(cells).enumerate().take(width) {
            if index == key_index || cell.trim().is_empty() {
                continue;
            }
            payload.insert(name.clone(), normalize_cell(cell));
        }
        let payload = self.key_map.apply(payload);
        let payload = nest_payload(&self.options.metadata_destination, payload);

        let location = match self.client.label_path(target) {
            Ok(parts) => parts.join("/"),
            Err(err) => {
                warn!(error = %err, "could not build label path, falling back to label");
                target.label.clone()
            }
        };

        let merged = merge(&target.metadata, &payload, self.options.overwrite);
        if self.options.dry_run {
            info!(location, "dry run, skipping metadata write");
            return Ok((RowStatus::DryRunSuccess, Some(location)));
        }
        self.client.write_metadata(target, &merged)?;
        Ok((RowStatus::Success, Some(location)))
    }
}

/// Wraps `data` under the dot-separated destination path. A leading `info`
/// segment is stripped: metadata lands at the container's top level unless a
/// deeper namespace is given.
pub fn nest_payload(destination: &str, data: Map<String, Value>) -> Map<String, Value> {
    let mut segments: Vec<&str> = destination
        .split('.')
        .filter(|segment| !segment.trim().is_empty())
        .collect();
    if segments.first() == Some(&"info") {
        segments.remove(0);
    }

    let mut data = data;
    while let Some(segment) = segments.pop() {
        let mut outer = Map::new();
        outer.insert(segment.to_string(), Value::Object(data));
        data = outer;
    }
    data
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn nest_payload_strips_leading_info() {
        let data = as_map(json!({"TR": 2.0}));
        let nested = nest_payload("info.scan_params", data);
        assert_eq!(Value::Object(nested), json!({"scan_params": {"TR": 2.0}}));
    }

    #[test]
    fn nest_payload_info_alone_is_top_level() {
        let data = as_map(json!({"TR": 2.0}));
        let nested = nest_payload("info", data);
        assert_eq!(Value::Object(nested), json!({"TR": 2.0}));
    }

    #[test]
    fn nest_payload_supports_deep_paths() {
        let data = as_map(json!({"x": 1}));
        let nested = nest_payload("a.b", data);
        assert_eq!(Value::Object(nested), json!({"a": {"b": {"x": 1}}}));
    }

    #[test]
    fn status_strings_match_report_vocabulary() {
        assert_eq!(RowStatus::Success.as_str(), "Success");
        assert_eq!(RowStatus::DryRunSuccess.as_str(), "DryRunSuccess");
        assert_eq!(RowStatus::NoMatch.as_str(), "NoMatch");
        assert_eq!(RowStatus::AmbiguousMatch.as_str(), "AmbiguousMatch");
        assert_eq!(RowStatus::Failed.as_str(), "Failed");
    }
}
