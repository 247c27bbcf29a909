use crate::error::{self, ParseError};
use crate::operator::Operator;
use crate::window::SlidingWindow;
use dashmap::DashMap;
use vigil_common::types::{EventStatus, Metric, Strategy};

/// Result of checking one metric against one strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Judgment {
    pub status: EventStatus,
    pub left_value: f64,
}

impl Judgment {
    fn ignore(left_value: f64) -> Self {
        Self {
            status: EventStatus::Ignore,
            left_value,
        }
    }
}

/// Runtime instance of one strategy: its compiled operator plus the sliding
/// window of every metric identity it has accepted.
#[derive(Debug)]
pub struct StrategyUnit {
    strategy: Strategy,
    operator: Operator,
    windows: DashMap<String, SlidingWindow>,
}

impl StrategyUnit {
    pub fn new(strategy: Strategy) -> Result<Self, ParseError> {
        let operator = Operator::parse(&strategy)?;
        Ok(Self {
            strategy,
            operator,
            windows: DashMap::new(),
        })
    }

    pub fn id(&self) -> i64 {
        self.strategy.id
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    /// Whether the metric belongs to this strategy: same name, and every tag
    /// predicate matches the metric's tags plus its endpoint tag.
    pub fn accept(&self, metric: &Metric) -> bool {
        if metric.name != self.strategy.metric {
            return false;
        }
        if self.operator.tags().is_empty() {
            return true;
        }
        self.operator.match_tags(&metric.resolved_tags())
    }

    /// Pushes the metric into its window and judges the window once full.
    ///
    /// Out-of-order samples and partially filled windows yield
    /// [`EventStatus::Ignore`]. Transform and calculation failures are
    /// returned as errors; callers skip the metric for this strategy.
    pub fn check(&self, metric: &Metric) -> error::Result<Judgment> {
        self.check_identity(&metric.identity(), metric)
    }

    pub(crate) fn check_identity(
        &self,
        identity: &str,
        metric: &Metric,
    ) -> error::Result<Judgment> {
        let value = self.operator.transform(metric)?;
        let limit = self.operator.limit();

        let values = {
            let mut window = self
                .windows
                .entry(identity.to_string())
                .or_insert_with(|| SlidingWindow::new(limit));
            if !window.push(value, metric.timestamp) {
                tracing::debug!(
                    strategy_id = self.strategy.id,
                    identity,
                    timestamp = metric.timestamp,
                    "Out-of-order sample rejected"
                );
                return Ok(Judgment::ignore(value));
            }
            if !window.is_full() {
                return Ok(Judgment::ignore(value));
            }
            window.values()
        };

        let calc = self.operator.evaluate(&values)?;
        Ok(Judgment {
            status: if calc.triggered {
                EventStatus::Problem
            } else {
                EventStatus::Ok
            },
            left_value: calc.value,
        })
    }

    /// Drops windows whose newest sample is older than `cutoff` (unix
    /// seconds). Returns the number removed.
    pub fn evict_idle(&self, cutoff: i64) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, w| w.newest().is_some_and(|s| s.timestamp >= cutoff));
        before.saturating_sub(self.windows.len())
    }

    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    /// Number of samples currently held for an identity.
    pub fn window_len(&self, identity: &str) -> usize {
        self.windows.get(identity).map_or(0, |w| w.len())
    }
}
