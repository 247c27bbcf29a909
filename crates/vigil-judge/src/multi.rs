//! Composite strategies: several sub-rules whose weights are summed per
//! group and compared with one combined threshold.

use crate::compare::CompareOp;
use crate::error::{self, ParseError};
use crate::unit::{Judgment, StrategyUnit};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use vigil_common::types::{short_hash, Event, EventStatus, Metric, MultiStrategy, Strategy};

/// Group key used when a composite strategy has no group-by tags.
const ALL_GROUP: &str = "all";

/// Parses a compact sub-rule `metric;transform;func;op;threshold;weight[;tags]`.
///
/// # Examples
///
/// ```
/// use vigil_judge::multi::parse_compact_rule;
///
/// let s = parse_compact_rule(3, "cpu;select(value);all(#3);>;90;40;host^=web").unwrap();
/// assert_eq!(s.id, 3);
/// assert_eq!(s.func, "all(#3)");
/// assert_eq!(s.weight, 40.0);
/// assert_eq!(s.tags, "host^=web");
/// ```
pub fn parse_compact_rule(id: i64, text: &str) -> Result<Strategy, ParseError> {
    let parts: Vec<&str> = text.split(';').map(str::trim).collect();
    if parts.len() != 6 && parts.len() != 7 {
        return Err(ParseError::Arity {
            name: "rule",
            expected: "6 or 7",
            got: parts.len(),
        });
    }
    let number = |s: &str| {
        s.parse::<f64>()
            .map_err(|_| ParseError::InvalidNumber(s.to_string()))
    };
    Ok(Strategy {
        id,
        name: String::new(),
        metric: parts[0].to_string(),
        field_transform: parts[1].to_string(),
        func: parts[2].to_string(),
        tags: parts.get(6).map(|s| s.to_string()).unwrap_or_default(),
        op: parts[3].to_string(),
        right_value: number(parts[4])?,
        weight: number(parts[5])?,
        group_by: Vec::new(),
    })
}

#[derive(Debug)]
struct SubRule {
    key: String,
    hash: String,
    weight: f64,
    unit: StrategyUnit,
}

/// A triggered sub-rule within a group.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreItem {
    pub rule_key: String,
    pub rule_hash: String,
    pub weight: f64,
    pub value: f64,
    pub identity: String,
    pub timestamp: i64,
}

#[derive(Debug, Default)]
struct ScoreGroup {
    tags: BTreeMap<String, String>,
    endpoint: String,
    metric: String,
    timestamp: i64,
    /// Keyed by `(rule_key, metric identity)`.
    items: HashMap<(String, String), ScoreItem>,
}

#[derive(Debug)]
pub struct MultiUnit {
    id: i64,
    strategy: MultiStrategy,
    compare: CompareOp,
    subs: Vec<SubRule>,
    groups: RwLock<HashMap<String, Arc<Mutex<ScoreGroup>>>>,
}

impl MultiUnit {
    pub fn new(strategy: MultiStrategy) -> Result<Self, ParseError> {
        let compare: CompareOp = strategy.op.parse()?;

        let mut definitions = strategy.strategies.clone();
        for rule in &strategy.rules {
            let index = definitions.len() as i64;
            definitions.push(parse_compact_rule(index, rule)?);
        }

        let mut subs = Vec::with_capacity(definitions.len());
        for (index, sub) in definitions.into_iter().enumerate() {
            let hash = short_hash(&format!(
                "{}|{}|{}|{}|{}|{}",
                sub.metric, sub.field_transform, sub.func, sub.op, sub.right_value, sub.tags
            ));
            subs.push(SubRule {
                key: format!("{}_{}", strategy.id, index),
                hash,
                weight: sub.weight,
                unit: StrategyUnit::new(sub)?,
            });
        }

        Ok(Self {
            id: strategy.id,
            strategy,
            compare,
            subs,
            groups: RwLock::new(HashMap::new()),
        })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn strategy(&self) -> &MultiStrategy {
        &self.strategy
    }

    pub fn sub_rule_count(&self) -> usize {
        self.subs.len()
    }

    /// Index of the first sub-rule accepting the metric.
    pub fn accept(&self, metric: &Metric) -> Option<usize> {
        self.subs.iter().position(|s| s.unit.accept(metric))
    }

    /// Key of the sub-rule at `index`.
    pub fn rule_key(&self, index: usize) -> Option<&str> {
        self.subs.get(index).map(|s| s.key.as_str())
    }

    /// Judges the metric with one sub-rule and records or clears its score.
    pub fn check(&self, index: usize, metric: &Metric) -> error::Result<Judgment> {
        let Some(sub) = self.subs.get(index) else {
            return Ok(Judgment {
                status: EventStatus::Ignore,
                left_value: metric.value,
            });
        };
        let identity = metric.identity();
        let judgment = sub.unit.check_identity(&identity, metric)?;

        let tags = self.group_tags(metric);
        let group_key = group_hash(&tags);
        let item_key = (sub.key.clone(), identity.clone());

        match judgment.status {
            EventStatus::Problem => {
                let item = ScoreItem {
                    rule_key: sub.key.clone(),
                    rule_hash: sub.hash.clone(),
                    weight: sub.weight,
                    value: judgment.left_value,
                    identity,
                    timestamp: metric.timestamp,
                };
                self.with_group(&group_key, |group| {
                    if group.tags.is_empty() {
                        group.tags = tags.clone();
                    }
                    group.endpoint = metric.endpoint.clone();
                    group.metric = metric.name.clone();
                    group.timestamp = group.timestamp.max(metric.timestamp);
                    group.items.insert(item_key, item);
                });
            }
            EventStatus::Ok => {
                let groups = self.groups.read();
                if let Some(group) = groups.get(&group_key) {
                    let mut group = group.lock();
                    group.timestamp = group.timestamp.max(metric.timestamp);
                    group.items.remove(&item_key);
                }
            }
            _ => {}
        }
        Ok(judgment)
    }

    /// Runs `f` on the group under its lock while the group map stays
    /// read-locked, creating the group when absent.
    fn with_group(&self, key: &str, f: impl FnOnce(&mut ScoreGroup)) {
        {
            let groups = self.groups.read();
            if let Some(group) = groups.get(key) {
                let mut guard = group.lock();
                f(&mut *guard);
                return;
            }
        }
        let mut groups = self.groups.write();
        let group = groups.entry(key.to_string()).or_default();
        let mut guard = group.lock();
        f(&mut *guard);
    }

    fn group_tags(&self, metric: &Metric) -> BTreeMap<String, String> {
        if self.strategy.group_by.is_empty() {
            return BTreeMap::new();
        }
        let resolved = metric.resolved_tags();
        self.strategy
            .group_by
            .iter()
            .map(|k| (k.clone(), resolved.get(k).cloned().unwrap_or_default()))
            .collect()
    }

    /// Scores every group and returns one composite event per group.
    ///
    /// Within a group each distinct sub-rule contributes its highest weight
    /// once. A group is dropped only after an empty score was reported for
    /// it, so every alarming group sees its Ok event.
    pub fn scan(&self) -> Vec<Event> {
        let (events, emptied) = self.score_groups();
        self.prune_groups(&emptied);
        events
    }

    /// Builds the composite events from a snapshot of every group, along
    /// with the keys of groups that held no items in that snapshot.
    fn score_groups(&self) -> (Vec<Event>, Vec<String>) {
        let snapshot: Vec<(String, Arc<Mutex<ScoreGroup>>)> = self
            .groups
            .read()
            .iter()
            .map(|(k, g)| (k.clone(), Arc::clone(g)))
            .collect();

        let mut events = Vec::with_capacity(snapshot.len());
        let mut emptied = Vec::new();
        for (key, group) in snapshot {
            let (tags, endpoint, metric, timestamp, items) = {
                let g = group.lock();
                (
                    g.tags.clone(),
                    g.endpoint.clone(),
                    g.metric.clone(),
                    g.timestamp,
                    g.items.values().cloned().collect::<Vec<_>>(),
                )
            };
            if items.is_empty() {
                emptied.push(key.clone());
            }
            let score = score_items(&items);
            let status = if self.compare.compare(score, self.strategy.right_value) {
                EventStatus::Problem
            } else {
                EventStatus::Ok
            };

            let mut scores = serde_json::Map::new();
            for item in &items {
                scores.insert(
                    format!("{}:{}", item.rule_key, item.identity),
                    json!({ "weight": item.weight, "value": item.value }),
                );
            }
            let mut fields = BTreeMap::new();
            fields.insert("scores".to_string(), serde_json::Value::Object(scores));
            fields.insert("threshold".to_string(), json!(self.strategy.right_value));

            events.push(Event {
                id: format!("m_{}_{}", self.id, key),
                status,
                left_value: score,
                step: 0,
                strategy_id: self.id,
                metric,
                endpoint,
                timestamp,
                tags: tags.into_iter().collect(),
                fields,
                created_at: Utc::now(),
            });
        }

        (events, emptied)
    }

    /// Drops groups reported empty by the last scoring pass, unless a
    /// check refilled them since.
    fn prune_groups(&self, emptied: &[String]) {
        if emptied.is_empty() {
            return;
        }
        let mut groups = self.groups.write();
        for key in emptied {
            if groups.get(key).is_some_and(|g| g.lock().items.is_empty()) {
                groups.remove(key);
            }
        }
    }

    /// Drops idle windows of every sub-rule. Returns the number removed.
    pub fn evict_idle(&self, cutoff: i64) -> usize {
        self.subs.iter().map(|s| s.unit.evict_idle(cutoff)).sum()
    }

    pub fn group_count(&self) -> usize {
        self.groups.read().len()
    }
}

fn group_hash(tags: &BTreeMap<String, String>) -> String {
    if tags.is_empty() {
        return ALL_GROUP.to_string();
    }
    let joined: Vec<String> = tags.iter().map(|(k, v)| format!("{k}={v}")).collect();
    short_hash(&joined.join(","))
}

/// Sum of the maximum weight per distinct rule hash.
pub fn score_items(items: &[ScoreItem]) -> f64 {
    let mut best: HashMap<&str, f64> = HashMap::new();
    for item in items {
        let entry = best.entry(item.rule_hash.as_str()).or_insert(f64::MIN);
        *entry = entry.max(item.weight);
    }
    best.values().sum()
}
