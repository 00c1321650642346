use std::collections::BTreeMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::metric::MetricSpec;

/// Scheduler-assigned id of one executed job.
pub type JobId = i64;

/// One scalar sample: (wall-clock time, step index, value).
/// Serializes as a JSON `[time, step, value]` triple.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample(pub f64, pub i64, pub f64);

impl Sample {
    pub fn wall_time(&self) -> f64 {
        self.0
    }

    pub fn step(&self) -> i64 {
        self.1
    }

    pub fn value(&self) -> f64 {
        self.2
    }
}

/// Everything one job logged: metric key -> ordered samples.
pub type ScalarLog = BTreeMap<String, Vec<Sample>>;

/// All parsed logs, keyed by job id.
pub type EventMap = BTreeMap<JobId, ScalarLog>;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum GroupConfig {
    /// The plain string `"separator"` inserts a table row break.
    Separator(String),
    Data {
        name: String,
        ids: Vec<JobId>,
        #[serde(default, deserialize_with = "ordered_params")]
        params: Vec<(String, String)>,
    },
}

/// Reads a JSON object into pairs, preserving declaration order. Collecting
/// into a map would resort the keys and with them the table columns.
fn ordered_params<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct PairsVisitor;

    impl<'de> Visitor<'de> for PairsVisitor {
        type Value = Vec<(String, String)>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a map of parameter names to values")
        }

        fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut pairs = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some(pair) = access.next_entry()? {
                pairs.push(pair);
            }
            Ok(pairs)
        }
    }

    deserializer.deserialize_map(PairsVisitor)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    pub groups: Vec<GroupConfig>,
    pub metrics: Vec<MetricSpec>,
    #[serde(default)]
    pub filters: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub merge_by_param: Option<String>,
}
