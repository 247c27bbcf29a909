use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

/// Tag name under which a metric's endpoint is exposed to tag filters and
/// group-by lists.
pub const ENDPOINT_TAG: &str = "endpoint";

/// A single time-series sample pushed by the transfer layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    #[serde(default)]
    pub value: f64,
    /// Secondary numeric fields addressable by `select(field)`.
    #[serde(default)]
    pub fields: HashMap<String, f64>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub endpoint: String,
    /// Unix seconds.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub step: i64,
}

impl Metric {
    /// Reads a field by name; `"value"` resolves to the primary value.
    pub fn field(&self, name: &str) -> Option<f64> {
        if name == "value" {
            return Some(self.value);
        }
        self.fields.get(name).copied()
    }

    /// Own tags plus the synthesized endpoint tag.
    pub fn resolved_tags(&self) -> HashMap<String, String> {
        let mut tags = self.tags.clone();
        tags.insert(ENDPOINT_TAG.to_string(), self.endpoint.clone());
        tags
    }

    /// Stable identity of the time series this sample belongs to.
    ///
    /// # Examples
    ///
    /// ```
    /// use vigil_common::types::Metric;
    ///
    /// let mut a = Metric { name: "cpu".into(), endpoint: "web-01".into(), ..Default::default() };
    /// a.tags.insert("core".into(), "0".into());
    /// let mut b = a.clone();
    /// b.value = 42.0;
    /// b.timestamp = 10;
    /// assert_eq!(a.identity(), b.identity());
    ///
    /// b.tags.insert("core".into(), "1".into());
    /// assert_ne!(a.identity(), b.identity());
    /// ```
    pub fn identity(&self) -> String {
        let mut tags: Vec<(&String, &String)> = self.tags.iter().collect();
        tags.sort();
        let mut input = String::with_capacity(64);
        input.push_str(&self.name);
        for (k, v) in tags {
            input.push('\x1f');
            input.push_str(k);
            input.push('=');
            input.push_str(v);
        }
        input.push('\x1f');
        input.push_str(&self.endpoint);
        short_hash(&input)
    }
}

/// A declarative alerting rule as delivered by the config-sync collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    pub metric: String,
    /// Value extraction rule, e.g. `select(value)` or `rangeselect(...)`.
    #[serde(default = "default_field_transform")]
    pub field_transform: String,
    /// Calculation and window, e.g. `all(#3)` or `have(#5,2)`.
    pub func: String,
    /// Comma separated tag filter expressions, e.g. `host^=web,idc=[bj|sh]`.
    #[serde(default)]
    pub tags: String,
    pub op: String,
    pub right_value: f64,
    /// Only used when the strategy is a sub-rule of a [`MultiStrategy`].
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub group_by: Vec<String>,
}

fn default_field_transform() -> String {
    "select(value)".to_string()
}

/// Several sub-rules whose weights are summed per group and compared
/// against one combined threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiStrategy {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub strategies: Vec<Strategy>,
    /// Compact sub-rules: `metric;transform;func;op;threshold;weight[;tags]`.
    #[serde(default)]
    pub rules: Vec<String>,
    pub op: String,
    pub right_value: f64,
    #[serde(default)]
    pub group_by: Vec<String>,
}

/// Outcome of one judgment, as carried by an [`Event`].
///
/// # Examples
///
/// ```
/// use vigil_common::types::EventStatus;
///
/// let status: EventStatus = "problem".parse().unwrap();
/// assert_eq!(status, EventStatus::Problem);
/// assert_eq!(status.to_string(), "problem");
/// assert!(status.is_alarming());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Ok,
    Problem,
    Ignore,
    Syntax,
    NotEnough,
    FieldMissing,
    OutTime,
    Outdated,
    NoData,
    Closed,
}

impl EventStatus {
    pub fn is_alarming(self) -> bool {
        self == EventStatus::Problem
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventStatus::Ok => "ok",
            EventStatus::Problem => "problem",
            EventStatus::Ignore => "ignore",
            EventStatus::Syntax => "syntax",
            EventStatus::NotEnough => "notenough",
            EventStatus::FieldMissing => "fieldmissing",
            EventStatus::OutTime => "outtime",
            EventStatus::Outdated => "outdated",
            EventStatus::NoData => "nodata",
            EventStatus::Closed => "closed",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ok" => Ok(EventStatus::Ok),
            "problem" => Ok(EventStatus::Problem),
            "ignore" => Ok(EventStatus::Ignore),
            "syntax" => Ok(EventStatus::Syntax),
            "notenough" => Ok(EventStatus::NotEnough),
            "fieldmissing" => Ok(EventStatus::FieldMissing),
            "outtime" => Ok(EventStatus::OutTime),
            "outdated" => Ok(EventStatus::Outdated),
            "nodata" => Ok(EventStatus::NoData),
            "closed" => Ok(EventStatus::Closed),
            _ => Err(format!("unknown event status: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// `s_{strategy_id}_{metric_identity}` or `m_{multi_id}_{group}`.
    pub id: String,
    pub status: EventStatus,
    pub left_value: f64,
    /// Consecutive judgments with the same status, starting at 0.
    pub step: u32,
    pub strategy_id: i64,
    pub metric: String,
    pub endpoint: String,
    /// Timestamp of the sample (unix seconds) that produced this event.
    pub timestamp: i64,
    /// Tags of the triggering metric, including the endpoint tag.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Copy without the bulky tag and field snapshots.
    pub fn simplified(&self) -> Event {
        Event {
            tags: HashMap::new(),
            fields: BTreeMap::new(),
            ..self.clone()
        }
    }

    pub fn is_simple(&self) -> bool {
        self.tags.is_empty() && self.fields.is_empty()
    }
}

/// Format tags into a human-readable string.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use vigil_common::types::format_tags;
///
/// let mut tags = HashMap::new();
/// tags.insert("mount".to_string(), "/data".to_string());
/// tags.insert("device".to_string(), "sda1".to_string());
/// assert_eq!(format_tags(&tags), "device=sda1, mount=/data");
/// ```
pub fn format_tags(tags: &HashMap<String, String>) -> String {
    if tags.is_empty() {
        return String::new();
    }
    let mut pairs: Vec<String> = tags.iter().map(|(k, v)| format!("{k}={v}")).collect();
    pairs.sort();
    pairs.join(", ")
}

/// First 16 hex characters of the SHA-256 digest of `input`.
pub fn short_hash(input: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(input.as_bytes()));
    digest[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_reads_primary_value_and_named_fields() {
        let mut m = Metric {
            name: "disk".into(),
            value: 3.5,
            ..Default::default()
        };
        m.fields.insert("used".into(), 70.0);
        assert_eq!(m.field("value"), Some(3.5));
        assert_eq!(m.field("used"), Some(70.0));
        assert_eq!(m.field("free"), None);
    }

    #[test]
    fn resolved_tags_include_endpoint() {
        let mut m = Metric {
            name: "cpu".into(),
            endpoint: "web-01".into(),
            ..Default::default()
        };
        m.tags.insert("core".into(), "0".into());
        let tags = m.resolved_tags();
        assert_eq!(tags.get(ENDPOINT_TAG).map(String::as_str), Some("web-01"));
        assert_eq!(tags.get("core").map(String::as_str), Some("0"));
    }

    #[test]
    fn identity_depends_on_endpoint_and_name() {
        let a = Metric {
            name: "cpu".into(),
            endpoint: "web-01".into(),
            ..Default::default()
        };
        let mut b = a.clone();
        b.endpoint = "web-02".into();
        let mut c = a.clone();
        c.name = "mem".into();
        assert_eq!(a.identity().len(), 16);
        assert_ne!(a.identity(), b.identity());
        assert_ne!(a.identity(), c.identity());
    }

    #[test]
    fn strategy_defaults_from_json() {
        let s: Strategy = serde_json::from_str(
            r#"{"id": 7, "metric": "cpu", "func": "all(#3)", "op": ">", "right_value": 90}"#,
        )
        .unwrap();
        assert_eq!(s.field_transform, "select(value)");
        assert!(s.tags.is_empty());
        assert!(s.group_by.is_empty());
    }

    #[test]
    fn simplified_event_drops_snapshots() {
        let mut tags = HashMap::new();
        tags.insert("host".to_string(), "a".to_string());
        let mut fields = BTreeMap::new();
        fields.insert("k".to_string(), serde_json::json!(1));
        let event = Event {
            id: "s_1_x".into(),
            status: EventStatus::Ok,
            left_value: 1.0,
            step: 4,
            strategy_id: 1,
            metric: "cpu".into(),
            endpoint: "a".into(),
            timestamp: 10,
            tags,
            fields,
            created_at: Utc::now(),
        };
        let simple = event.simplified();
        assert!(simple.is_simple());
        assert!(!event.is_simple());
        assert_eq!(simple.step, 4);
        assert_eq!(simple.id, event.id);
    }
}
