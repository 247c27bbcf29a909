//! Debounce table of the last event recorded for every event identity.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use vigil_common::types::{Event, EventStatus};

/// Tunables of the judgment engine's event emission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    /// Re-emit a still-alarming event every N identical judgments; 0 never
    /// re-emits.
    #[serde(default)]
    pub realarm_steps: u32,
    /// Consecutive Ok judgments after which the recorded event is kept in
    /// simplified form.
    #[serde(default = "default_simplify_ok_after")]
    pub simplify_ok_after: u32,
}

fn default_simplify_ok_after() -> u32 {
    3
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            realarm_steps: 0,
            simplify_ok_after: default_simplify_ok_after(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Current {
    events: RwLock<HashMap<String, Event>>,
}

impl Current {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a judgment and returns the event to emit, if any.
    ///
    /// An event is emitted on first sight of its identity, on a status
    /// change, and every `realarm_steps` identical Problem judgments.
    pub fn observe(&self, mut event: Event, config: &JudgeConfig) -> Option<Event> {
        let mut events = self.events.write();
        let emit = match events.get(&event.id) {
            None => {
                event.step = 0;
                true
            }
            Some(last) if last.status != event.status => {
                event.step = 0;
                true
            }
            Some(last) => {
                event.step = last.step.saturating_add(1);
                event.status == EventStatus::Problem
                    && config.realarm_steps > 0
                    && event.step % config.realarm_steps == 0
            }
        };

        if event.status == EventStatus::Ok && event.step >= config.simplify_ok_after {
            event = event.simplified();
        }

        let emitted = emit.then(|| event.clone());
        events.insert(event.id.clone(), event);
        emitted
    }

    /// Removes every identity starting with `prefix`, returning a `Closed`
    /// event for each one that was alarming.
    pub fn close_prefix(&self, prefix: &str) -> Vec<Event> {
        let mut events = self.events.write();
        let ids: Vec<String> = events
            .keys()
            .filter(|id| id.starts_with(prefix))
            .cloned()
            .collect();

        let mut closed = Vec::new();
        for id in ids {
            if let Some(last) = events.remove(&id) {
                if last.status.is_alarming() {
                    closed.push(Event {
                        status: EventStatus::Closed,
                        step: 0,
                        created_at: chrono::Utc::now(),
                        ..last
                    });
                }
            }
        }
        closed
    }

    pub fn get(&self, id: &str) -> Option<Event> {
        self.events.read().get(id).cloned()
    }

    pub fn by_strategy(&self, strategy_id: i64) -> Vec<Event> {
        self.events
            .read()
            .values()
            .filter(|e| e.strategy_id == strategy_id)
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<Event> {
        self.events.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}
