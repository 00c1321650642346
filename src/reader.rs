use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;

use crate::model::{JobId, Sample, ScalarLog};

/// Locates and reads job scalar logs. Location runs once on the calling
/// thread; `read_job` is then invoked from parallel workers, one call per
/// located job.
pub trait ScalarLogReader: Sync {
    /// Maps each requested id to the files holding its log. Ids without
    /// files are simply absent from the map (not an error at this layer).
    fn locate(&self, root: &Path, ids: &[JobId]) -> Result<BTreeMap<JobId, Vec<PathBuf>>>;

    /// Parses the located files into the job's metric-key -> samples mapping.
    fn read_job(&self, id: JobId, files: &[PathBuf]) -> Result<ScalarLog>;
}

#[derive(Debug, Deserialize)]
struct SampleRecord {
    key: String,
    time: f64,
    step: i64,
    value: f64,
}

/// Locates job logs by numeric directory components and reads `*.jsonl`
/// files of `{"key", "time", "step", "value"}` lines.
///
/// Each job is expected under a subdirectory named after its id. When
/// preceding directories are also purely numeric (e.g. an array-task index),
/// set the component offset accordingly.
pub struct JsonlLogReader {
    numeric_component: Regex,
    id_component_offset: usize,
}

impl JsonlLogReader {
    pub fn new() -> Result<Self> {
        Self::with_offset(0)
    }

    pub fn with_offset(id_component_offset: usize) -> Result<Self> {
        let numeric_component =
            Regex::new(r"^\d+$").context("failed to compile job-id component pattern")?;
        Ok(Self { numeric_component, id_component_offset })
    }

    /// Numeric directory components of `path` relative to `root`, in order,
    /// excluding the file name itself.
    fn numeric_components(&self, root: &Path, path: &Path) -> Vec<JobId> {
        let Some(parent) = path.parent() else {
            return Vec::new();
        };
        let Ok(relative) = parent.strip_prefix(root) else {
            return Vec::new();
        };
        relative
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .filter(|part| self.numeric_component.is_match(part))
            .filter_map(|part| part.parse().ok())
            .collect()
    }

    fn parse_file(&self, path: &Path, log: &mut ScalarLog) -> Result<()> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: SampleRecord = serde_json::from_str(line).with_context(|| {
                format!("malformed sample at {}:{}", path.display(), index + 1)
            })?;
            log.entry(record.key)
                .or_default()
                .push(Sample(record.time, record.step, record.value));
        }
        Ok(())
    }
}

impl ScalarLogReader for JsonlLogReader {
    /// One walk of the tree serves every requested id.
    fn locate(&self, root: &Path, ids: &[JobId]) -> Result<BTreeMap<JobId, Vec<PathBuf>>> {
        let mut files = Vec::new();
        collect_files(root, &mut files)?;

        let mut located: BTreeMap<JobId, Vec<PathBuf>> = BTreeMap::new();
        for path in files {
            let numeric = self.numeric_components(root, &path);
            if let Some(id) = numeric.get(self.id_component_offset)
                && ids.contains(id)
            {
                located.entry(*id).or_default().push(path);
            }
        }
        Ok(located)
    }

    fn read_job(&self, id: JobId, files: &[PathBuf]) -> Result<ScalarLog> {
        let mut log = ScalarLog::new();
        for path in files {
            if path.extension().and_then(|ext| ext.to_str()) == Some("jsonl") {
                self.parse_file(path, &mut log)
                    .with_context(|| format!("failed to read logs of job {id}"))?;
            }
        }
        Ok(log)
    }
}

/// Recursive, name-sorted file listing (deterministic sample order when a
/// job has several log files).
fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)
        .with_context(|| format!("failed to list {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("failed to list {}", dir.display()))?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}
