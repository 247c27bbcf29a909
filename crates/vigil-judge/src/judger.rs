use crate::current::{Current, JudgeConfig};
use crate::error::JudgeError;
use crate::multi::MultiUnit;
use crate::unit::{Judgment, StrategyUnit};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use vigil_common::types::{format_tags, Event, EventStatus, Metric, MultiStrategy, Strategy};

/// Active strategy units plus the metric-name dispatch index built from them.
#[derive(Debug, Default)]
struct Registry {
    units: HashMap<i64, Arc<StrategyUnit>>,
    /// Metric name -> unit ids, ascending.
    by_metric: HashMap<String, Vec<i64>>,
}

/// The judgment engine: owns the strategy units, composite units and the
/// debounce table. Shared between metric consumers behind an `Arc`.
#[derive(Debug, Default)]
pub struct Judger {
    config: JudgeConfig,
    registry: RwLock<Registry>,
    multis: RwLock<HashMap<i64, Arc<MultiUnit>>>,
    current: Current,
    /// Newest metric timestamp judged so far.
    latest_timestamp: AtomicI64,
}

fn strategy_prefix(id: i64) -> String {
    format!("s_{id}_")
}

fn multi_prefix(id: i64) -> String {
    format!("m_{id}_")
}

impl Judger {
    pub fn new(config: JudgeConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &JudgeConfig {
        &self.config
    }

    /// Reconciles the active units with a full strategy snapshot.
    ///
    /// Unchanged strategies keep their windows; changed ones get a fresh
    /// unit. Strategies that fail to parse are skipped. Returns `Closed`
    /// events for alarming identities of strategies that are no longer
    /// active.
    pub fn set_strategy_data(&self, strategies: Vec<Strategy>) -> Vec<Event> {
        let mut registry = self.registry.write();

        let mut units: HashMap<i64, Arc<StrategyUnit>> = HashMap::with_capacity(strategies.len());
        let mut rejected = 0usize;
        for strategy in strategies {
            let id = strategy.id;
            if let Some(existing) = registry.units.get(&id) {
                if *existing.strategy() == strategy {
                    units.insert(id, Arc::clone(existing));
                    continue;
                }
            }
            match StrategyUnit::new(strategy) {
                Ok(unit) => {
                    units.insert(id, Arc::new(unit));
                }
                Err(e) => {
                    rejected += 1;
                    tracing::warn!(strategy_id = id, error = %e, "Skipping invalid strategy");
                }
            }
        }

        let mut by_metric: HashMap<String, Vec<i64>> = HashMap::new();
        for (id, unit) in &units {
            by_metric
                .entry(unit.strategy().metric.clone())
                .or_default()
                .push(*id);
        }
        for ids in by_metric.values_mut() {
            ids.sort_unstable();
        }

        let mut closed = Vec::new();
        for id in registry.units.keys() {
            if !units.contains_key(id) {
                closed.extend(self.current.close_prefix(&strategy_prefix(*id)));
            }
        }

        let previous = registry.units.len();
        *registry = Registry { units, by_metric };
        tracing::info!(
            previous,
            active = registry.units.len(),
            rejected,
            closed = closed.len(),
            "Strategy units reconciled"
        );
        closed
    }

    /// Reconciles composite strategies, returning `Closed` events for the
    /// groups of removed or rejected ones.
    pub fn set_multi_strategy_data(&self, strategies: Vec<MultiStrategy>) -> Vec<Event> {
        let mut multis = self.multis.write();

        let mut next: HashMap<i64, Arc<MultiUnit>> = HashMap::with_capacity(strategies.len());
        for strategy in strategies {
            let id = strategy.id;
            if let Some(existing) = multis.get(&id) {
                if *existing.strategy() == strategy {
                    next.insert(id, Arc::clone(existing));
                    continue;
                }
            }
            match MultiUnit::new(strategy) {
                Ok(unit) => {
                    next.insert(id, Arc::new(unit));
                }
                Err(e) => {
                    tracing::warn!(multi_id = id, error = %e, "Skipping invalid multi strategy");
                }
            }
        }

        let mut closed = Vec::new();
        for id in multis.keys() {
            if !next.contains_key(id) {
                closed.extend(self.current.close_prefix(&multi_prefix(*id)));
            }
        }
        *multis = next;
        tracing::info!(active = multis.len(), closed = closed.len(), "Multi strategies reconciled");
        closed
    }

    /// Judges a batch of metrics and returns the events to emit.
    pub fn judge(&self, metrics: &[Metric]) -> Vec<Event> {
        let mut events = Vec::new();
        let multis: Vec<Arc<MultiUnit>> = self.multis.read().values().cloned().collect();

        for metric in metrics {
            self.latest_timestamp
                .fetch_max(metric.timestamp, Ordering::Relaxed);
            for unit in self.candidates(&metric.name) {
                if let Some(event) = self.judge_unit(&unit, metric) {
                    events.push(event);
                }
            }

            for multi in &multis {
                let Some(index) = multi.accept(metric) else {
                    continue;
                };
                if let Err(e) = multi.check(index, metric) {
                    log_check_error(multi.id(), metric, &e);
                }
            }
        }
        events
    }

    /// Units registered for a metric name, in ascending id order.
    fn candidates(&self, metric_name: &str) -> Vec<Arc<StrategyUnit>> {
        let registry = self.registry.read();
        registry
            .by_metric
            .get(metric_name)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| registry.units.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Checks one metric against one unit and records the judgment.
    ///
    /// The event is recorded under the registry read lock, and only while
    /// `unit` is still the registered unit for its id, so a concurrent
    /// reconciliation that removed it cannot be followed by a stale entry.
    pub(crate) fn judge_unit(&self, unit: &Arc<StrategyUnit>, metric: &Metric) -> Option<Event> {
        if !unit.accept(metric) {
            return None;
        }
        let identity = metric.identity();
        let judgment = match unit.check_identity(&identity, metric) {
            Ok(judgment) => judgment,
            Err(e) => {
                log_check_error(unit.id(), metric, &e);
                return None;
            }
        };

        let registry = self.registry.read();
        let registered = registry
            .units
            .get(&unit.id())
            .is_some_and(|active| Arc::ptr_eq(active, unit));
        if !registered {
            tracing::debug!(strategy_id = unit.id(), "Judgment of a replaced unit dropped");
            return None;
        }
        self.record(unit, &identity, metric, judgment)
    }

    fn record(
        &self,
        unit: &StrategyUnit,
        identity: &str,
        metric: &Metric,
        judgment: Judgment,
    ) -> Option<Event> {
        if !matches!(judgment.status, EventStatus::Ok | EventStatus::Problem) {
            return None;
        }
        let operator = unit.operator();
        let mut fields = BTreeMap::new();
        fields.insert("threshold".to_string(), serde_json::json!(operator.threshold()));
        fields.insert("op".to_string(), serde_json::json!(operator.compare().to_string()));
        fields.insert("func".to_string(), serde_json::json!(unit.strategy().func));

        let event = Event {
            id: format!("{}{}", strategy_prefix(unit.id()), identity),
            status: judgment.status,
            left_value: judgment.left_value,
            step: 0,
            strategy_id: unit.id(),
            metric: metric.name.clone(),
            endpoint: metric.endpoint.clone(),
            timestamp: metric.timestamp,
            tags: metric.resolved_tags(),
            fields,
            created_at: Utc::now(),
        };
        self.current.observe(event, &self.config)
    }

    /// Scores every composite strategy and returns the events to emit.
    ///
    /// Runs under the composite map read lock so a concurrent removal
    /// cannot follow its `Closed` events with a fresh entry.
    pub fn scan_multi(&self) -> Vec<Event> {
        let multis = self.multis.read();
        let events: Vec<Event> = multis
            .values()
            .flat_map(|m| m.scan())
            .filter_map(|e| self.current.observe(e, &self.config))
            .collect();
        events
    }

    /// Drops per-identity windows, of strategy units and composite sub-rules
    /// alike, that saw no sample since `cutoff`.
    pub fn evict_idle(&self, cutoff: i64) -> usize {
        let units: Vec<Arc<StrategyUnit>> = self.registry.read().units.values().cloned().collect();
        let multis: Vec<Arc<MultiUnit>> = self.multis.read().values().cloned().collect();
        let evicted: usize = units.iter().map(|u| u.evict_idle(cutoff)).sum::<usize>()
            + multis.iter().map(|m| m.evict_idle(cutoff)).sum::<usize>();
        if evicted > 0 {
            tracing::debug!(evicted, cutoff, "Idle windows evicted");
        }
        evicted
    }

    /// Newest metric timestamp judged so far, 0 before the first metric.
    /// Idle eviction is measured against this clock rather than wall time.
    pub fn latest_timestamp(&self) -> i64 {
        self.latest_timestamp.load(Ordering::Relaxed)
    }

    /// Last recorded event of every identity under a strategy.
    pub fn events_by_strategy(&self, strategy_id: i64) -> Vec<Event> {
        self.current.by_strategy(strategy_id)
    }

    pub fn all_events(&self) -> Vec<Event> {
        self.current.all()
    }

    pub fn current(&self, event_id: &str) -> Option<Event> {
        self.current.get(event_id)
    }

    pub fn unit(&self, strategy_id: i64) -> Option<Arc<StrategyUnit>> {
        self.registry.read().units.get(&strategy_id).cloned()
    }

    pub fn unit_count(&self) -> usize {
        self.registry.read().units.len()
    }

    pub fn multi_count(&self) -> usize {
        self.multis.read().len()
    }
}

fn log_check_error(strategy_id: i64, metric: &Metric, error: &JudgeError) {
    match error {
        JudgeError::FieldMissing(_) | JudgeError::OutOfRange(_) => {
            tracing::debug!(
                strategy_id,
                metric = %metric.name,
                endpoint = %metric.endpoint,
                error = %error,
                "Metric skipped"
            );
        }
        JudgeError::Calculation(_) => {
            tracing::warn!(
                strategy_id,
                metric = %metric.name,
                endpoint = %metric.endpoint,
                tags = %format_tags(&metric.tags),
                error = %error,
                "Calculation failed"
            );
        }
    }
}
