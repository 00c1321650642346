use std::collections::BTreeMap;

use anyhow::{Result, bail};

use crate::metric::{MetricResult, MetricSpec};
use crate::model::{EventMap, JobId, ScalarLog};
use crate::table::escape_latex_underscores;

/// Insertion-ordered set of keys seen across groups; defines table columns.
#[derive(Debug, Clone, Default)]
pub struct KeyRegistry {
    keys: Vec<String>,
}

impl KeyRegistry {
    pub fn register(&mut self, key: &str) {
        if !self.keys.iter().any(|k| k == key) {
            self.keys.push(key.to_string());
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.keys.retain(|k| k != key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    /// Keys in insertion order, minus the caller's ignore set.
    pub fn keys<'a>(&'a self, ignore: &'a [String]) -> impl Iterator<Item = &'a str> {
        self.keys
            .iter()
            .filter(move |k| !ignore.iter().any(|ignored| ignored == *k))
            .map(String::as_str)
    }
}

/// Parameter- and result-key registries. Owned by the GroupManager and
/// mutated only through group construction and merge calls it mediates.
#[derive(Debug, Clone, Default)]
pub struct Registries {
    pub params: KeyRegistry,
    pub results: KeyRegistry,
}

impl Registries {
    /// Appends all keys known to `other`, preserving insertion order.
    pub fn absorb(&mut self, other: &Registries) {
        for key in other.params.keys(&[]) {
            self.params.register(key);
        }
        for key in other.results.keys(&[]) {
            self.results.register(key);
        }
    }
}

/// A named cluster of jobs that share hyperparameters (except e.g. the
/// random seed). Metrics are computed per group over the member series.
#[derive(Debug, Clone)]
pub struct Group {
    pub name: String,
    /// Insertion order, duplicates allowed.
    pub ids: Vec<JobId>,
    pub params: BTreeMap<String, String>,
    data: BTreeMap<JobId, ScalarLog>,
    results: BTreeMap<String, MetricResult>,
}

impl Group {
    pub fn new(
        name: impl Into<String>,
        ids: Vec<JobId>,
        params: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        Self {
            name: name.into(),
            ids,
            params: params.into_iter().collect(),
            data: BTreeMap::new(),
            results: BTreeMap::new(),
        }
    }

    /// Merges another group into this one; this group's name is kept and
    /// the other group's params/data/results win on key collisions.
    pub fn merge(&mut self, other: Group) {
        self.ids.extend(other.ids);
        self.params.extend(other.params);
        self.data.extend(other.data);
        self.results.extend(other.results);
    }

    /// Overlays newly available series for one member.
    pub fn update_data(&mut self, id: JobId, log: ScalarLog) {
        self.data.entry(id).or_default().extend(log);
    }

    /// Overlays series for every member present in `events`; members absent
    /// from the slice are left untouched (incremental updates).
    pub fn update_all(&mut self, events: &EventMap) {
        for id in self.ids.clone() {
            if let Some(log) = events.get(&id) {
                self.update_data(id, log.clone());
            }
        }
    }

    pub fn result(&self, name: &str) -> Option<&MetricResult> {
        self.results.get(name)
    }

    /// Per-member series for `key` as a rectangular matrix (axis 0 = jobs
    /// that report the key, `None` if no job does), plus the ids lacking it.
    /// Unequal series lengths within one group indicate mis-grouped or
    /// incomplete runs and are fatal.
    pub fn series_matrix(&self, key: &str) -> Result<(Option<Vec<Vec<f64>>>, Vec<JobId>)> {
        let mut rows: Vec<Vec<f64>> = Vec::new();
        let mut missing = Vec::new();
        for (&id, log) in &self.data {
            match log.get(key) {
                Some(samples) => rows.push(samples.iter().map(|s| s.value()).collect()),
                None => missing.push(id),
            }
        }
        if let Some(first) = rows.first()
            && rows.iter().any(|row| row.len() != first.len())
        {
            bail!(
                "group '{}': unequal series lengths for key '{}' across members",
                self.name,
                key,
            );
        }
        if rows.is_empty() { Ok((None, missing)) } else { Ok((Some(rows), missing)) }
    }

    /// Evaluates every spec against this group's data. For overlapping
    /// metric sets across repeated calls, the better (maximum) previously
    /// computed value is kept per result name.
    pub fn update_results(
        &mut self,
        specs: &[MetricSpec],
        results_registry: &mut KeyRegistry,
    ) -> Result<()> {
        for spec in specs {
            let (matrix, missing) = self.series_matrix(spec.key())?;
            if spec.is_required() && !missing.is_empty() {
                bail!(
                    "group '{}': key '{}' is required but missing for job ids {:?}",
                    self.name,
                    spec.key(),
                    missing,
                );
            }
            for result in spec.evaluate(matrix.as_deref())? {
                results_registry.register(&result.name);
                let keep_existing = self
                    .results
                    .get(&result.name)
                    .is_some_and(|existing| existing.value >= result.value);
                if !keep_existing {
                    self.results.insert(result.name.clone(), result);
                }
            }
        }
        Ok(())
    }

    /// Full parameter map minus `skip`; partition key for merge-by-param.
    pub fn param_partition_key(&self, skip: &str) -> Vec<(String, String)> {
        self.params
            .iter()
            .filter(|(k, _)| k.as_str() != skip)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn projected_fields(&self, registries: &Registries, ignore: &[String]) -> (Vec<String>, Vec<String>) {
        let params = registries
            .params
            .keys(ignore)
            .map(|k| self.params.get(k).cloned().unwrap_or_default())
            .collect();
        let results = registries
            .results
            .keys(ignore)
            .map(|k| self.results.get(k).map(|r| r.to_string()).unwrap_or_default())
            .collect();
        (params, results)
    }

    pub fn csv_row(&self, registries: &Registries, ignore: &[String]) -> String {
        let (params, results) = self.projected_fields(registries, ignore);
        format!("{};{:?};;{};;{};", self.name, self.ids, params.join(";"), results.join(";"))
    }

    pub fn latex_row(&self, registries: &Registries, ignore: &[String]) -> String {
        let (params, results) = self.projected_fields(registries, ignore);
        let mut cells = vec![self.name.clone()];
        cells.extend(params);
        cells.extend(results);
        escape_latex_underscores(&format!("{} \\\\", cells.join(" & ")))
    }
}

/// Header row matching [`Group::csv_row`]: identical key ordering and
/// identical ignore filtering, so columns always line up.
pub fn csv_header(registries: &Registries, ignore: &[String]) -> String {
    let params: Vec<&str> = registries.params.keys(ignore).collect();
    let results: Vec<&str> = registries.results.keys(ignore).collect();
    format!("name;slurm_ids;;{};;{};", params.join(";"), results.join(";"))
}

/// Header row matching [`Group::latex_row`].
pub fn latex_header(registries: &Registries, ignore: &[String]) -> String {
    let mut cells = vec!["name"];
    cells.extend(registries.params.keys(ignore));
    cells.extend(registries.results.keys(ignore));
    escape_latex_underscores(&format!("{} \\\\", cells.join(" & ")))
}

/// A table entry: either a data group or a pure row break. Separators never
/// carry data, so result updates cannot be misapplied to them.
#[derive(Debug, Clone)]
pub enum GroupEntry {
    Data(Group),
    Separator,
}

impl GroupEntry {
    pub fn is_separator(&self) -> bool {
        matches!(self, GroupEntry::Separator)
    }

    pub fn as_data(&self) -> Option<&Group> {
        match self {
            GroupEntry::Data(group) => Some(group),
            GroupEntry::Separator => None,
        }
    }

    pub fn as_data_mut(&mut self) -> Option<&mut Group> {
        match self {
            GroupEntry::Data(group) => Some(group),
            GroupEntry::Separator => None,
        }
    }

    pub fn csv_row(&self, registries: &Registries, ignore: &[String]) -> String {
        match self {
            GroupEntry::Data(group) => group.csv_row(registries, ignore),
            GroupEntry::Separator => String::new(),
        }
    }

    pub fn latex_row(&self, registries: &Registries, ignore: &[String]) -> String {
        match self {
            GroupEntry::Data(group) => group.latex_row(registries, ignore),
            GroupEntry::Separator => "\\midrule".to_string(),
        }
    }
}
