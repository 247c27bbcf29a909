use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use vigil_common::types::EventStatus;
use vigil_judge::Judger;
use vigil_server::config::ServerConfig;
use vigil_server::publisher::EventPublisher;
use vigil_server::replay::parse_batch;
use vigil_server::scheduler::MultiScanScheduler;
use vigil_server::strategy_loader::{load_strategies, reload_judger};

const STRATEGIES: &str = r#"{
  "strategies": [
    { "id": 1, "name": "cpu busy", "metric": "cpu", "func": "all(#2)", "op": ">=", "right_value": 1 },
    { "id": 2, "name": "broken", "metric": "cpu", "field_transform": "pick(value)", "func": "all(#1)", "op": ">", "right_value": 0 }
  ]
}"#;

const MULTI_STRATEGIES: &str = r#"{
  "multi_strategies": [
    {
      "id": 7,
      "name": "host degraded",
      "rules": ["cpu;select(value);all(#1);>;90;50", "load;select(value);all(#1);>;4;20"],
      "op": ">=",
      "right_value": 60,
      "group_by": ["endpoint"]
    }
  ]
}"#;

fn write(dir: &Path, name: &str, content: &str) -> Result<String> {
    let path = dir.join(name);
    std::fs::write(&path, content)?;
    Ok(path.to_string_lossy().into_owned())
}

fn seeded_config(dir: &TempDir) -> Result<ServerConfig> {
    let strategies = write(dir.path(), "strategies.json", STRATEGIES)?;
    let multi = write(dir.path(), "multi.json", MULTI_STRATEGIES)?;
    let toml = format!(
        "strategies_path = {strategies:?}\nmulti_strategies_path = {multi:?}\nmulti_scan_interval_secs = 5\n\n[judge]\nrealarm_steps = 4\n"
    );
    let config_path = write(dir.path(), "server.toml", &toml)?;
    ServerConfig::load(&config_path)
}

#[test]
fn config_defaults_and_overrides() -> Result<()> {
    let dir = TempDir::new()?;
    let config = seeded_config(&dir)?;
    assert_eq!(config.multi_scan_interval_secs, 5);
    assert_eq!(config.window_idle_secs, 3600);
    assert_eq!(config.judge.realarm_steps, 4);
    assert_eq!(config.judge.simplify_ok_after, 3);

    let empty = write(dir.path(), "empty.toml", "")?;
    let config = ServerConfig::load(&empty)?;
    assert_eq!(config.strategies_path, "config/strategies.json");
    assert!(config.multi_strategies_path.is_none());

    assert!(ServerConfig::load(&dir.path().join("missing.toml").to_string_lossy()).is_err());
    Ok(())
}

#[test]
fn seed_files_load_and_skip_invalid_strategies() -> Result<()> {
    let dir = TempDir::new()?;
    let config = seeded_config(&dir)?;
    assert_eq!(load_strategies(&config.strategies_path)?.len(), 2);

    let judger = Judger::new(config.judge.clone());
    let closed = reload_judger(&config, &judger)?;
    assert!(closed.is_empty());
    assert_eq!(judger.unit_count(), 1);
    assert_eq!(judger.multi_count(), 1);

    let bad = write(dir.path(), "bad.json", "{ not json")?;
    assert!(load_strategies(&bad).is_err());
    Ok(())
}

#[tokio::test]
async fn replayed_lines_produce_events() -> Result<()> {
    let dir = TempDir::new()?;
    let config = seeded_config(&dir)?;
    let judger = Arc::new(Judger::new(config.judge.clone()));
    reload_judger(&config, &judger)?;

    let (publisher, mut rx) = EventPublisher::channel();
    let input = [
        r#"{"name":"cpu","value":95,"endpoint":"web-01","timestamp":1}"#,
        r#"[{"name":"cpu","value":95,"endpoint":"web-01","timestamp":2},{"name":"load","value":8,"endpoint":"web-01","timestamp":2}]"#,
        r#"{"name":"cpu","value":-1,"endpoint":"web-01","timestamp":3}"#,
    ];
    for line in input {
        publisher.publish(judger.judge(&parse_batch(line)?));
    }

    let scheduler = MultiScanScheduler::new(Arc::clone(&judger), publisher.clone(), 5, 0);
    assert_eq!(scheduler.run_once(), 1);
    drop(scheduler);
    drop(publisher);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    let simple: Vec<(i64, EventStatus)> = events.iter().map(|e| (e.strategy_id, e.status)).collect();
    // cpu strategy: Problem at t=2, Ok at t=3; composite: cpu cleared at t=3, load still 20
    assert_eq!(
        simple,
        vec![(1, EventStatus::Problem), (1, EventStatus::Ok), (7, EventStatus::Ok)]
    );
    assert_eq!(events[2].left_value, 20.0);
    Ok(())
}

#[tokio::test]
async fn idle_eviction_follows_metric_time() -> Result<()> {
    let dir = TempDir::new()?;
    let config = seeded_config(&dir)?;
    let judger = Arc::new(Judger::new(config.judge.clone()));
    reload_judger(&config, &judger)?;
    let (publisher, _rx) = EventPublisher::channel();
    let scheduler = MultiScanScheduler::new(Arc::clone(&judger), publisher, 5, 3600);

    // historical samples far behind the wall clock survive a scan
    judger.judge(&parse_batch(r#"{"name":"cpu","value":5,"endpoint":"web-01","timestamp":1000}"#)?);
    scheduler.run_once();
    let cpu = judger.unit(1).map(|u| u.window_count());
    assert_eq!(cpu, Some(1));

    // an hour of metric time later the idle window goes
    judger.judge(&parse_batch(r#"{"name":"cpu","value":5,"endpoint":"web-02","timestamp":5000}"#)?);
    scheduler.run_once();
    assert_eq!(judger.unit(1).map(|u| u.window_count()), Some(1));
    assert_eq!(judger.latest_timestamp(), 5000);
    Ok(())
}
