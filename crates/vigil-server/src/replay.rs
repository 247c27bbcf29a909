use anyhow::Result;
use vigil_common::types::{Event, Metric};

/// Parses one input line: a JSON metric object or an array of them.
/// Blank lines yield an empty batch.
pub fn parse_batch(line: &str) -> Result<Vec<Metric>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Vec::new());
    }
    if line.starts_with('[') {
        serde_json::from_str(line).map_err(|e| anyhow::anyhow!("invalid metric batch: {e}"))
    } else {
        let metric: Metric =
            serde_json::from_str(line).map_err(|e| anyhow::anyhow!("invalid metric: {e}"))?;
        Ok(vec![metric])
    }
}

/// Renders an event as one JSON line.
pub fn render_event(event: &Event) -> Result<String> {
    serde_json::to_string(event).map_err(|e| anyhow::anyhow!("failed to encode event: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_metric_and_arrays() {
        let one = parse_batch(r#"{"name":"cpu","value":1.5,"endpoint":"a","timestamp":3}"#).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].value, 1.5);
        assert_eq!(one[0].timestamp, 3);

        let many = parse_batch(r#"[{"name":"cpu","value":1},{"name":"mem","value":2}]"#).unwrap();
        assert_eq!(many.len(), 2);
        assert_eq!(many[1].name, "mem");

        assert!(parse_batch("   ").unwrap().is_empty());
        assert!(parse_batch("{not json").is_err());
    }
}
