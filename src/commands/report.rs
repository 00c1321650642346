use std::fs;

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::cli::{OutputFormat, ReportArgs};
use crate::manager::GroupManager;
use crate::model::{GroupConfig, ReportConfig};
use crate::reader::JsonlLogReader;

pub fn run(args: ReportArgs) -> Result<()> {
    let raw = fs::read(&args.config)
        .with_context(|| format!("failed to read {}", args.config.display()))?;
    let config: ReportConfig = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", args.config.display()))?;

    let mut manager = match &args.cache {
        Some(path) => GroupManager::with_cache(path)?,
        None => GroupManager::new(),
    };

    for group in &config.groups {
        match group {
            GroupConfig::Separator(marker) if marker == "separator" => manager.add_separator(),
            GroupConfig::Separator(marker) => {
                bail!("unknown group entry '{marker}' in {}", args.config.display())
            }
            GroupConfig::Data { name, ids, params } => {
                manager.add_group(name.clone(), ids.clone(), params.clone());
            }
        }
    }

    info!(
        groups = config.groups.len(),
        metrics = config.metrics.len(),
        log_root = %args.log_root.display(),
        "building report"
    );

    let reader = JsonlLogReader::with_offset(args.id_component_offset)?;
    manager.update(&args.log_root, &config.metrics, args.force, &reader)?;

    if !config.filters.is_empty() {
        manager.filter(&config.filters, true);
    }
    if let Some(key) = &config.merge_by_param {
        manager.merge_by_param(key, false);
    }
    if let Some(sort_by) = &args.sort_by {
        manager.sort(sort_by, args.descending, true);
    }

    let table = match args.format {
        OutputFormat::Csv => manager.render_csv(&args.ignore_keys),
        OutputFormat::Latex => manager.render_latex(&args.ignore_keys),
    };
    println!("{table}");

    Ok(())
}
