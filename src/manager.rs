use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cache::ScalarLogCache;
use crate::group::{self, Group, GroupEntry, Registries};
use crate::metric::{MetricSpec, ResultValue};
use crate::model::{EventMap, JobId};
use crate::reader::ScalarLogReader;
use crate::table;

/// Owns a list of groups, the key registries defining table columns, and
/// the persistent cache of parsed logs. Orchestrates fetching, grouping,
/// merging, filtering, sorting and table rendering.
pub struct GroupManager {
    groups: Vec<GroupEntry>,
    registries: Registries,
    cache: ScalarLogCache,
}

impl GroupManager {
    /// A manager with a purely in-memory cache.
    pub fn new() -> Self {
        Self { groups: Vec::new(), registries: Registries::default(), cache: ScalarLogCache::memory() }
    }

    /// A manager holding the exclusive handle on a file-backed cache.
    pub fn with_cache(path: &Path) -> Result<Self> {
        Ok(Self {
            groups: Vec::new(),
            registries: Registries::default(),
            cache: ScalarLogCache::open(path)?,
        })
    }

    /// Adds a group, registering its parameter keys in declaration order
    /// (the pair list, not a map, is what keeps the column order).
    pub fn add_group(
        &mut self,
        name: impl Into<String>,
        ids: Vec<JobId>,
        params: Vec<(String, String)>,
    ) {
        for (key, _) in &params {
            self.registries.params.register(key);
        }
        self.add_existing_group(Group::new(name, ids, params));
    }

    /// Adds a pre-built group, registering its parameter keys.
    pub fn add_existing_group(&mut self, group: Group) {
        for key in group.params.keys() {
            self.registries.params.register(key);
        }
        self.groups.push(GroupEntry::Data(group));
    }

    /// Inserts a table row break.
    pub fn add_separator(&mut self) {
        self.groups.push(GroupEntry::Separator);
    }

    pub fn entries(&self) -> &[GroupEntry] {
        &self.groups
    }

    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    /// Looks up a group by name; a miss is silent (`None`), not an error.
    pub fn group_by_name(&self, name: &str) -> Option<Group> {
        self.groups
            .iter()
            .filter_map(GroupEntry::as_data)
            .find(|group| group.name == name)
            .cloned()
    }

    /// Looks up the group containing a job id; a miss is silent (`None`).
    pub fn group_by_job_id(&self, id: JobId) -> Option<Group> {
        self.groups
            .iter()
            .filter_map(GroupEntry::as_data)
            .find(|group| group.ids.contains(&id))
            .cloned()
    }

    /// Clones an existing group under a new name with modified params.
    pub fn copy_group(
        &mut self,
        name: &str,
        new_name: impl Into<String>,
        param_changes: Vec<(String, String)>,
    ) -> Option<()> {
        let mut group = self.group_by_name(name)?;
        group.name = new_name.into();
        for (key, value) in param_changes {
            self.registries.params.register(&key);
            group.params.insert(key, value);
        }
        self.add_existing_group(group);
        Some(())
    }

    /// Fetches logs for every uncached member id (all ids when `force`):
    /// one location pass on the calling thread, one parallel unit of work
    /// per located job, then a refresh of every group's data and results.
    /// Idempotent: a second call with no new ids performs no reader
    /// invocations.
    pub fn update(
        &mut self,
        root: &Path,
        specs: &[MetricSpec],
        force: bool,
        reader: &dyn ScalarLogReader,
    ) -> Result<()> {
        let mut ids: Vec<JobId> = Vec::new();
        for group in self.groups.iter().filter_map(GroupEntry::as_data) {
            for &id in &group.ids {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }

        if !force {
            let mut uncached = Vec::with_capacity(ids.len());
            for id in ids {
                if !self.cache.contains_events(id)? {
                    uncached.push(id);
                }
            }
            ids = uncached;
        }

        info!(jobs = ids.len(), root = %root.display(), "parsing scalar logs");
        let mut located: Vec<(JobId, Vec<PathBuf>)> = Vec::new();
        if !ids.is_empty() {
            let mut files_by_id = reader.locate(root, &ids)?;
            for &id in &ids {
                match files_by_id.remove(&id) {
                    Some(files) => located.push((id, files)),
                    None => debug!(job_id = id, "no log files located"),
                }
            }
        }
        let parsed = read_jobs_parallel(reader, &located);
        self.cache.put_many(&parsed)?;

        let events = self.cache.all_events()?;
        for entry in &mut self.groups {
            if let Some(group) = entry.as_data_mut() {
                group.update_all(&events);
                group.update_results(specs, &mut self.registries.results)?;
            }
        }
        Ok(())
    }

    /// Retains only groups whose params match every predicate; a group
    /// missing a predicate key fails it. Mutating view: operate on a
    /// duplicate if the original composition must be preserved.
    pub fn filter(
        &mut self,
        predicates: &BTreeMap<String, Vec<String>>,
        keep_separators: bool,
    ) -> &mut Self {
        self.groups.retain(|entry| match entry {
            GroupEntry::Separator => keep_separators,
            GroupEntry::Data(group) => predicates.iter().all(|(key, allowed)| {
                group.params.get(key).is_some_and(|value| allowed.contains(value))
            }),
        });
        self
    }

    /// Merges another manager into this one: cache events are merged, then
    /// each of this manager's groups absorbs the first same-named group of
    /// the other.
    pub fn merge(&mut self, other: &GroupManager) -> Result<()> {
        self.cache.put_many(&other.cache.all_events()?)?;
        self.registries.absorb(&other.registries);

        for entry in &mut self.groups {
            if let Some(group) = entry.as_data_mut()
                && let Some(other_group) = other.group_by_name(&group.name)
            {
                group.merge(other_group);
            }
        }
        Ok(())
    }

    /// Partitions data groups by their full parameter map with `key`
    /// excluded and merges each partition into one synthetic group. A
    /// merged group spans all values of `key`, so the key is dropped from
    /// its params either way. Separators never take part. With
    /// `keep_originals` the merged groups are appended and `key` stays
    /// registered (the originals still report it); otherwise the merged
    /// groups replace everything and `key` leaves the registry.
    pub fn merge_by_param(&mut self, key: &str, keep_originals: bool) {
        let mut partitions: Vec<(Vec<(String, String)>, Vec<Group>)> = Vec::new();
        for group in self.groups.iter().filter_map(GroupEntry::as_data) {
            let partition_key = group.param_partition_key(key);
            match partitions.iter_mut().find(|(existing, _)| *existing == partition_key) {
                Some((_, members)) => members.push(group.clone()),
                None => partitions.push((partition_key, vec![group.clone()])),
            }
        }

        let mut merged_groups = Vec::with_capacity(partitions.len());
        for (_, members) in partitions {
            let mut merged =
                Group::new(format!("merged {}", members.len()), Vec::new(), Vec::new());
            for member in members {
                merged.merge(member);
            }
            merged.params.remove(key);
            merged_groups.push(merged);
        }

        debug!(key, merged = merged_groups.len(), keep_originals, "merged groups by param");
        if keep_originals {
            self.groups.extend(merged_groups.into_iter().map(GroupEntry::Data));
        } else {
            self.groups = merged_groups.into_iter().map(GroupEntry::Data).collect();
            self.registries.params.remove(key);
        }
    }

    /// Totally orders data groups by the named result (missing result =
    /// universal minimum). Separators retain their positions; consecutive
    /// separators collapse to one unless disabled.
    pub fn sort(&mut self, sort_by: &str, descending: bool, collapse_separators: bool) {
        if !sort_by.is_empty() {
            let mut data: Vec<Group> = Vec::new();
            for entry in &self.groups {
                if let Some(group) = entry.as_data() {
                    data.push(group.clone());
                }
            }

            let sort_key = |group: &Group| {
                group
                    .result(sort_by)
                    .map(|result| result.value.clone())
                    .unwrap_or_else(|| ResultValue::Text(String::new()))
            };
            if descending {
                data.sort_by(|a, b| sort_key(b).cmp(&sort_key(a)));
            } else {
                data.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
            }

            let mut sorted = data.into_iter();
            for entry in &mut self.groups {
                if !entry.is_separator()
                    && let Some(group) = sorted.next()
                {
                    *entry = GroupEntry::Data(group);
                }
            }
        }

        if collapse_separators {
            self.groups.dedup_by(|a, b| a.is_separator() && b.is_separator());
        }
    }

    /// Detaches the cache (single-writer: the file handle cannot be shared)
    /// and returns an independent copy of this manager with a snapshot.
    pub fn duplicate(&mut self) -> Result<GroupManager> {
        self.cache.detach()?;
        let events = self.cache.all_events()?;
        let mut cache = ScalarLogCache::memory();
        cache.put_many(&events)?;
        Ok(GroupManager {
            groups: self.groups.clone(),
            registries: self.registries.clone(),
            cache,
        })
    }

    pub fn cache(&self) -> &ScalarLogCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut ScalarLogCache {
        &mut self.cache
    }

    /// Entries as rendered: no leading or trailing separator and never two
    /// separator rows in a row.
    fn renderable_entries(&self) -> Vec<&GroupEntry> {
        let mut entries: Vec<&GroupEntry> = Vec::with_capacity(self.groups.len());
        for entry in &self.groups {
            if entry.is_separator()
                && entries.last().is_none_or(|last| last.is_separator())
            {
                continue;
            }
            entries.push(entry);
        }
        while entries.last().is_some_and(|last| last.is_separator()) {
            entries.pop();
        }
        entries
    }

    /// `;`-delimited table text, e.g. to paste into a spreadsheet.
    pub fn render_csv(&self, ignore: &[String]) -> String {
        let header = group::csv_header(&self.registries, ignore);
        let rows: Vec<String> = self
            .renderable_entries()
            .iter()
            .map(|entry| entry.csv_row(&self.registries, ignore))
            .collect();
        table::csv_table(&header, &rows)
    }

    /// Booktabs LaTeX table text, columns space-aligned.
    pub fn render_latex(&self, ignore: &[String]) -> String {
        let header = group::latex_header(&self.registries, ignore);
        let rows: Vec<String> = self
            .renderable_entries()
            .iter()
            .map(|entry| entry.latex_row(&self.registries, ignore))
            .collect();
        table::latex_table(&header, &rows)
    }
}

impl Default for GroupManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs one reader invocation per located job on a bounded worker pool.
/// Jobs are chunked per worker, so no unit of work shares mutable state;
/// the join is the only barrier, and the caller merges the results
/// afterwards. A failed parse is logged and the job simply contributes no
/// data.
fn read_jobs_parallel(reader: &dyn ScalarLogReader, located: &[(JobId, Vec<PathBuf>)]) -> EventMap {
    let mut events = EventMap::new();
    if located.is_empty() {
        return events;
    }

    let workers =
        thread::available_parallelism().map(usize::from).unwrap_or(1).min(located.len());
    let chunk_size = located.len().div_ceil(workers);

    thread::scope(|scope| {
        let handles: Vec<_> = located
            .chunks(chunk_size)
            .map(|chunk| {
                scope.spawn(move || {
                    let mut parsed = Vec::with_capacity(chunk.len());
                    for (id, files) in chunk {
                        match reader.read_job(*id, files) {
                            Ok(log) => parsed.push((*id, log)),
                            Err(err) => {
                                warn!(job_id = *id, error = %err, "failed to parse job log")
                            }
                        }
                    }
                    parsed
                })
            })
            .collect();

        for handle in handles {
            match handle.join() {
                Ok(parsed) => events.extend(parsed),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
    });
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::metric::Aggregate;
    use crate::model::{Sample, ScalarLog};

    /// Serves a fixed log per job id and counts location and read calls.
    struct FakeReader {
        logs: BTreeMap<JobId, ScalarLog>,
        locates: AtomicUsize,
        calls: AtomicUsize,
    }

    impl FakeReader {
        fn new(logs: BTreeMap<JobId, ScalarLog>) -> Self {
            Self { logs, locates: AtomicUsize::new(0), calls: AtomicUsize::new(0) }
        }

        fn locates(&self) -> usize {
            self.locates.load(Ordering::SeqCst)
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ScalarLogReader for FakeReader {
        fn locate(&self, _root: &Path, ids: &[JobId]) -> Result<BTreeMap<JobId, Vec<PathBuf>>> {
            self.locates.fetch_add(1, Ordering::SeqCst);
            Ok(ids
                .iter()
                .copied()
                .filter(|id| self.logs.contains_key(id))
                .map(|id| (id, vec![PathBuf::from(format!("{id}.jsonl"))]))
                .collect())
        }

        fn read_job(&self, id: JobId, _files: &[PathBuf]) -> Result<ScalarLog> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.logs.get(&id).cloned().unwrap_or_default())
        }
    }

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn log_with(key: &str, values: &[f64]) -> ScalarLog {
        let samples = values.iter().enumerate().map(|(i, &v)| Sample(i as f64, i as i64, v));
        ScalarLog::from([(key.to_string(), samples.collect())])
    }

    fn reader_for(ids_values: &[(JobId, &[f64])]) -> FakeReader {
        let logs = ids_values.iter().map(|&(id, values)| (id, log_with("acc", values))).collect();
        FakeReader::new(logs)
    }

    #[test]
    fn update_skips_cached_ids_on_the_second_call() {
        let mut manager = GroupManager::new();
        manager.add_group("g", vec![1, 2], params(&[]));

        let reader = reader_for(&[(1, &[0.5]), (2, &[0.7])]);
        let specs = vec![MetricSpec::new("acc", [Aggregate::Avg])];

        manager.update(Path::new("/logs"), &specs, false, &reader).unwrap();
        assert_eq!(reader.calls(), 2);
        assert_eq!(reader.locates(), 1, "one location pass serves every job");

        manager.update(Path::new("/logs"), &specs, false, &reader).unwrap();
        assert_eq!(reader.calls(), 2, "cached ids must not be re-read");
        assert_eq!(reader.locates(), 1, "nothing to locate when everything is cached");

        manager.update(Path::new("/logs"), &specs, true, &reader).unwrap();
        assert_eq!(reader.calls(), 4, "force re-reads everything");
        assert_eq!(reader.locates(), 2);
    }

    #[test]
    fn update_computes_results_per_group() {
        let mut manager = GroupManager::new();
        manager.add_group("low", vec![1], params(&[("mu", "0.1")]));
        manager.add_group("high", vec![2], params(&[("mu", "0.9")]));

        let reader = reader_for(&[(1, &[0.2, 0.4]), (2, &[0.8, 1.0])]);
        let specs = vec![MetricSpec::new("acc", [Aggregate::Avg])];
        manager.update(Path::new("/logs"), &specs, false, &reader).unwrap();

        let low = manager.group_by_name("low").unwrap();
        assert_eq!(low.result("acc avg").unwrap().to_string(), "0.30");
        let high = manager.group_by_job_id(2).unwrap();
        assert_eq!(high.result("acc avg").unwrap().to_string(), "0.90");
    }

    #[test]
    fn failing_group_does_not_corrupt_earlier_results() {
        let mut manager = GroupManager::new();
        manager.add_group("ok", vec![1], params(&[]));
        manager.add_group("broken", vec![2], params(&[]));

        // job 2 reports a different key, so the required "acc" is missing
        let logs = BTreeMap::from([(1, log_with("acc", &[0.5])), (2, log_with("loss", &[1.0]))]);
        let reader = FakeReader::new(logs);
        let specs = vec![MetricSpec::new("acc", [Aggregate::Avg])];

        let err = manager.update(Path::new("/logs"), &specs, false, &reader).unwrap_err();
        assert!(err.to_string().contains("acc"));
        assert!(err.to_string().contains('2'));

        let ok = manager.group_by_name("ok").unwrap();
        assert_eq!(ok.result("acc avg").unwrap().to_string(), "0.50");
    }

    #[test]
    fn parse_failures_surface_as_missing_data_not_errors() {
        struct FailingReader;
        impl ScalarLogReader for FailingReader {
            fn locate(
                &self,
                _root: &Path,
                ids: &[JobId],
            ) -> Result<BTreeMap<JobId, Vec<PathBuf>>> {
                Ok(ids.iter().map(|&id| (id, Vec::new())).collect())
            }

            fn read_job(&self, id: JobId, _files: &[PathBuf]) -> Result<ScalarLog> {
                if id == 2 {
                    anyhow::bail!("malformed log file");
                }
                Ok(ScalarLog::from([(
                    "acc".to_string(),
                    vec![Sample(0.0, 0, 1.0)],
                )]))
            }
        }

        let mut manager = GroupManager::new();
        manager.add_group("g", vec![1, 2], params(&[]));
        let specs =
            vec![MetricSpec::new("acc", [Aggregate::Avg]).not_available("N/A")];
        manager.update(Path::new("/logs"), &specs, false, &FailingReader).unwrap();

        let group = manager.group_by_name("g").unwrap();
        assert_eq!(group.result("acc avg").unwrap().to_string(), "1.00");
    }

    #[test]
    fn filter_matches_on_every_predicate_key() {
        let mut manager = GroupManager::new();
        manager.add_group("a", vec![1], params(&[("model", "resnet18")]));
        manager.add_separator();
        manager.add_group("b", vec![2], params(&[("model", "resnet50")]));
        manager.add_group("c", vec![3], params(&[])); // missing key fails

        let predicates = BTreeMap::from([("model".to_string(), vec!["resnet18".to_string()])]);
        manager.filter(&predicates, true);

        let names: Vec<String> = manager
            .entries()
            .iter()
            .filter_map(GroupEntry::as_data)
            .map(|g| g.name.clone())
            .collect();
        assert_eq!(names, vec!["a"]);
        assert_eq!(manager.entries().len(), 2, "separator passes through");

        manager.filter(&predicates, false);
        assert_eq!(manager.entries().len(), 1);
    }

    #[test]
    fn merge_by_param_collapses_seed_groups() {
        let mut manager = GroupManager::new();
        manager.add_group("s0", vec![1], params(&[("mu", "0.1"), ("seed", "0")]));
        manager.add_group("s1", vec![2], params(&[("mu", "0.1"), ("seed", "1")]));
        manager.add_group("other", vec![3], params(&[("mu", "0.2"), ("seed", "0")]));
        manager.add_separator();

        manager.merge_by_param("seed", false);

        let names: Vec<String> = manager
            .entries()
            .iter()
            .filter_map(GroupEntry::as_data)
            .map(|g| g.name.clone())
            .collect();
        assert_eq!(names, vec!["merged 2", "merged 1"]);

        let merged = manager.group_by_name("merged 2").unwrap();
        assert_eq!(merged.ids, vec![1, 2]);
        assert!(!merged.params.contains_key("seed"));
        assert!(!manager.registries().params.contains("seed"));
        assert!(manager.registries().params.contains("mu"));
    }

    #[test]
    fn merge_by_param_with_kept_originals_keeps_the_registry_key() {
        let mut manager = GroupManager::new();
        manager.add_group("s0", vec![1], params(&[("seed", "0")]));
        manager.add_group("s1", vec![2], params(&[("seed", "1")]));

        manager.merge_by_param("seed", true);

        assert_eq!(manager.entries().len(), 3);
        assert!(manager.registries().params.contains("seed"));

        // the merged group spans both seeds, so it must report neither
        let merged = manager.group_by_name("merged 2").unwrap();
        assert!(!merged.params.contains_key("seed"));
        let original = manager.group_by_name("s1").unwrap();
        assert_eq!(original.params.get("seed").map(String::as_str), Some("1"));
    }

    #[test]
    fn param_columns_follow_declaration_order() {
        let mut manager = GroupManager::new();
        manager.add_group("g", vec![1], params(&[("mu", "0.1"), ("alpha", "2")]));
        manager.add_group("h", vec![2], params(&[("alpha", "3"), ("beta", "4")]));

        let columns: Vec<&str> = manager.registries().params.keys(&[]).collect();
        assert_eq!(columns, vec!["mu", "alpha", "beta"]);
        assert!(manager.render_csv(&[]).starts_with("name;slurm_ids;;mu;alpha;beta;"));
    }

    #[test]
    fn cross_manager_merge_joins_groups_by_name() {
        let mut left = GroupManager::new();
        left.add_group("g", vec![3], params(&[("mu", "0.3")]));

        let mut right = GroupManager::new();
        right.add_group("g", vec![1, 2], params(&[("mu", "0.1"), ("model", "resnet18")]));
        right.cache_mut().put_many(&EventMap::from([(1, log_with("acc", &[0.5]))])).unwrap();

        left.merge(&right).unwrap();

        let merged = left.group_by_name("g").unwrap();
        assert_eq!(merged.ids, vec![3, 1, 2]);
        assert_eq!(merged.params.get("mu").map(String::as_str), Some("0.1"));
        assert!(left.cache().contains_events(1).unwrap());
        assert!(left.registries().params.contains("model"));
    }

    #[test]
    fn sort_orders_by_result_with_missing_at_the_minimum() {
        let mut manager = GroupManager::new();
        manager.add_group("worst", vec![1], params(&[]));
        manager.add_group("best", vec![2], params(&[]));
        manager.add_group("empty", vec![3], params(&[]));

        let reader = reader_for(&[(1, &[0.1]), (2, &[0.9])]);
        let specs =
            vec![MetricSpec::new("acc", [Aggregate::Avg]).not_available("N/A")];
        manager.update(Path::new("/logs"), &specs, false, &reader).unwrap();

        manager.sort("acc avg", true, true);
        let names: Vec<String> = manager
            .entries()
            .iter()
            .filter_map(GroupEntry::as_data)
            .map(|g| g.name.clone())
            .collect();
        assert_eq!(names, vec!["best", "worst", "empty"]);
    }

    #[test]
    fn sort_keeps_separator_positions() {
        let mut manager = GroupManager::new();
        manager.add_group("low", vec![1], params(&[]));
        manager.add_separator();
        manager.add_group("high", vec![2], params(&[]));

        let reader = reader_for(&[(1, &[1.0]), (2, &[2.0])]);
        let specs = vec![MetricSpec::new("acc", [Aggregate::Avg])];
        manager.update(Path::new("/logs"), &specs, false, &reader).unwrap();

        manager.sort("acc avg", true, true);
        assert!(manager.entries()[1].is_separator());
        assert_eq!(manager.entries()[0].as_data().unwrap().name, "high");
        assert_eq!(manager.entries()[2].as_data().unwrap().name, "low");
    }

    #[test]
    fn consecutive_separators_collapse_in_rendered_output() {
        let mut manager = GroupManager::new();
        manager.add_separator();
        manager.add_group("a", vec![1], params(&[]));
        manager.add_separator();
        manager.add_separator();
        manager.add_group("b", vec![2], params(&[]));
        manager.add_separator();

        let csv = manager.render_csv(&[]);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 4); // header, a, one separator, b
        assert!(lines[1].starts_with("a;"));
        assert_eq!(lines[2], "");
        assert!(lines[3].starts_with("b;"));
    }

    #[test]
    fn render_csv_matches_the_documented_layout() {
        let mut manager = GroupManager::new();
        manager.add_group("n0", vec![1], params(&[("mu", "0.1")]));

        let reader = FakeReader::new(BTreeMap::from([(1, log_with("r", &[5.0]))]));
        let specs = vec![MetricSpec::new("r", [Aggregate::Avg])];
        manager.update(Path::new("/logs"), &specs, false, &reader).unwrap();

        let csv = manager.render_csv(&[]);
        assert_eq!(csv, "name;slurm_ids;;mu;;r avg;\nn0;[1];;0.1;;5.00;");
    }

    #[test]
    fn render_latex_is_a_booktabs_block_with_separators() {
        let mut manager = GroupManager::new();
        manager.add_group("a", vec![1], params(&[("mu", "0.1")]));
        manager.add_separator();
        manager.add_group("b", vec![2], params(&[("mu", "0.2")]));

        let reader = reader_for(&[(1, &[1.0]), (2, &[2.0])]);
        let specs = vec![MetricSpec::new("acc", [Aggregate::Avg])];
        manager.update(Path::new("/logs"), &specs, false, &reader).unwrap();

        let latex = manager.render_latex(&[]);
        let lines: Vec<&str> = latex.lines().collect();
        assert_eq!(lines[0], "\\begin{tabular}{lcc}");
        assert_eq!(lines[1], "\\toprule");
        assert!(lines[2].starts_with("name"));
        assert_eq!(lines[3], "\\midrule");
        assert!(lines[4].starts_with('a'));
        assert_eq!(lines[5], "\\midrule");
        assert!(lines[6].starts_with('b'));
        assert_eq!(lines[7], "\\bottomrule");
        assert_eq!(lines[8], "\\end{tabular}");
    }

    #[test]
    fn ignore_keys_drop_columns_from_header_and_rows() {
        let mut manager = GroupManager::new();
        manager.add_group("g", vec![1], params(&[("mu", "0.1"), ("seed", "0")]));

        let ignore = vec!["seed".to_string()];
        let csv = manager.render_csv(&ignore);
        assert_eq!(csv, "name;slurm_ids;;mu;;;\ng;[1];;0.1;;;");
    }

    #[test]
    fn duplicate_detaches_the_cache_and_copies_state() {
        let mut manager = GroupManager::new();
        manager.add_group("g", vec![1], params(&[]));
        manager.cache_mut().put_many(&EventMap::from([(1, log_with("acc", &[0.5]))])).unwrap();

        let copy = manager.duplicate().unwrap();
        assert!(copy.cache().contains_events(1).unwrap());
        assert!(copy.group_by_name("g").is_some());
        assert!(!manager.cache().is_live());
    }

    #[test]
    fn copy_group_clones_with_param_overrides() {
        let mut manager = GroupManager::new();
        manager.add_group("base", vec![1], params(&[("mu", "0.1")]));

        manager
            .copy_group("base", "variant", params(&[("mu", "0.2")]))
            .unwrap();

        let variant = manager.group_by_name("variant").unwrap();
        assert_eq!(variant.ids, vec![1]);
        assert_eq!(variant.params.get("mu").map(String::as_str), Some("0.2"));
        assert!(manager.group_by_name("missing").is_none());
    }
}
