use std::fs::{File, OpenOptions};
use std::io::Write;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::types::ZoneIndex;

/// How poll responses are written to the message log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLogMode {
    /// Every response body verbatim.
    Full,
    /// First response in full, then only the paths that changed.
    Diffed,
}

/// NDJSON capture of the traffic exchanged with the controller.
pub(crate) struct MessageLogger {
    mode: MessageLogMode,
    file: File,
    last_poll: Option<Value>,
}

impl MessageLogger {
    pub fn open(mode: MessageLogMode, path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            mode,
            file,
            last_poll: None,
        })
    }

    pub fn log_request(&mut self, method: &str, path: &str, body: &Value) {
        self.write_line(json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "req",
            "method": method,
            "path": path,
            "body": body,
        }));
    }

    pub fn log_command(&mut self, action: &str, zone: ZoneIndex, body: &Value) {
        self.write_line(json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "cmd",
            "action": action,
            "zone": zone,
            "body": body,
        }));
    }

    pub fn log_poll(&mut self, status: u16, body: &Value) {
        let mut entry = Map::new();
        entry.insert("ts".into(), json!(Utc::now().to_rfc3339()));
        entry.insert("dir".into(), json!("poll"));
        entry.insert("status".into(), json!(status));

        match (self.mode, self.last_poll.as_ref()) {
            (MessageLogMode::Diffed, Some(previous)) => {
                let mut changes = Vec::new();
                collect_changes(previous, body, "", &mut changes);
                let changes: Vec<Value> = changes
                    .into_iter()
                    .map(|(path, old, new)| json!({ "path": path, "old": old, "new": new }))
                    .collect();
                entry.insert("changes".into(), Value::Array(changes));
            }
            (MessageLogMode::Diffed, None) => {
                entry.insert("full".into(), json!(true));
                entry.insert("body".into(), body.clone());
            }
            (MessageLogMode::Full, _) => {
                entry.insert("body".into(), body.clone());
            }
        }

        if self.mode == MessageLogMode::Diffed {
            self.last_poll = Some(body.clone());
        }
        self.write_line(Value::Object(entry));
    }

    fn write_line(&mut self, entry: Value) {
        if let Err(e) = writeln!(self.file, "{entry}") {
            warn!("failed to write message log entry: {e}");
        }
    }
}

/// Leaf-level differences between two JSON documents, as
/// `(dotted.path, old, new)`. Arrays are indexed by position.
fn collect_changes(
    previous: &Value,
    current: &Value,
    prefix: &str,
    out: &mut Vec<(String, Value, Value)>,
) {
    let join = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}.{key}")
        }
    };

    match (previous, current) {
        (Value::Object(prev), Value::Object(curr)) => {
            for (key, value) in curr {
                let prev_value = prev.get(key).unwrap_or(&Value::Null);
                collect_changes(prev_value, value, &join(key), out);
            }
        }
        (Value::Array(prev), Value::Array(curr)) => {
            for (i, value) in curr.iter().enumerate() {
                let prev_value = prev.get(i).unwrap_or(&Value::Null);
                collect_changes(prev_value, value, &join(&i.to_string()), out);
            }
        }
        (Value::Null, Value::Object(_) | Value::Array(_)) => {
            let empty = if current.is_object() {
                Value::Object(Map::new())
            } else {
                Value::Array(Vec::new())
            };
            collect_changes(&empty, current, prefix, out);
        }
        (prev, curr) if prev != curr => {
            out.push((prefix.to_string(), prev.clone(), curr.clone()));
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn read_lines(path: &std::path::Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn request_written_as_ndjson() {
        let tmp = NamedTempFile::new().unwrap();
        let mut logger =
            MessageLogger::open(MessageLogMode::Full, tmp.path().to_str().unwrap()).unwrap();
        logger.log_request("POST", "/api/v1/hvac", &json!({"systemID": 1, "zoneID": 0}));

        let lines = read_lines(tmp.path());
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["dir"], "req");
        assert_eq!(lines[0]["method"], "POST");
        assert_eq!(lines[0]["body"]["zoneID"], 0);
        assert!(lines[0]["ts"].as_str().is_some());
    }

    #[test]
    fn command_captures_zone() {
        let tmp = NamedTempFile::new().unwrap();
        let mut logger =
            MessageLogger::open(MessageLogMode::Full, tmp.path().to_str().unwrap()).unwrap();
        logger.log_command("set_power", 1, &json!({"on": 0}));

        let lines = read_lines(tmp.path());
        assert_eq!(lines[0]["dir"], "cmd");
        assert_eq!(lines[0]["action"], "set_power");
        assert_eq!(lines[0]["zone"], 1);
    }

    #[test]
    fn diffed_mode_records_changed_paths() {
        let tmp = NamedTempFile::new().unwrap();
        let mut logger =
            MessageLogger::open(MessageLogMode::Diffed, tmp.path().to_str().unwrap()).unwrap();

        logger.log_poll(200, &json!({"data": [{"zoneID": 1, "roomTemp": 21.0}]}));
        logger.log_poll(200, &json!({"data": [{"zoneID": 1, "roomTemp": 21.5}]}));
        logger.log_poll(200, &json!({"data": [{"zoneID": 1, "roomTemp": 21.5}]}));

        let lines = read_lines(tmp.path());
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["full"], true);
        let changes = lines[1]["changes"].as_array().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0]["path"], "data.0.roomTemp");
        assert_eq!(changes[0]["new"], 21.5);
        assert!(lines[2]["changes"].as_array().unwrap().is_empty());
    }

    #[test]
    fn full_mode_keeps_every_body() {
        let tmp = NamedTempFile::new().unwrap();
        let mut logger =
            MessageLogger::open(MessageLogMode::Full, tmp.path().to_str().unwrap()).unwrap();
        let body = json!({"data": []});
        logger.log_poll(200, &body);
        logger.log_poll(200, &body);

        let lines = read_lines(tmp.path());
        assert!(lines.iter().all(|l| l["body"] == body));
    }

    #[test]
    fn new_subtree_reports_leaves() {
        let mut changes = Vec::new();
        collect_changes(&json!({}), &json!({"a": {"b": 1}}), "", &mut changes);
        assert_eq!(changes, vec![("a.b".to_string(), Value::Null, json!(1))]);
    }
}
