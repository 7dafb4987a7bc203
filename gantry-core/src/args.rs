//! Pipeline argument model
//!
//! Arguments travel as declared-shape JSON: a positional list plus a keyword
//! map. Both the control-plane API and the worker RPC carry this structure
//! verbatim, so a pipeline body sees exactly what the caller sent.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Arguments for one task invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskArgs {
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: HashMap<String, Value>,
}

impl TaskArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Positional-only arguments.
    pub fn positional(args: Vec<Value>) -> Self {
        Self {
            args,
            kwargs: HashMap::new(),
        }
    }

    pub fn with_arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn with_kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder() {
        let args = TaskArgs::new()
            .with_arg(1)
            .with_arg("two")
            .with_kwarg("flag", true);

        assert_eq!(args.args, vec![json!(1), json!("two")]);
        assert_eq!(args.kwargs.get("flag"), Some(&json!(true)));
        assert!(!args.is_empty());
    }

    #[test]
    fn test_missing_fields_default() {
        let args: TaskArgs = serde_json::from_str("{}").unwrap();
        assert!(args.is_empty());

        let args: TaskArgs = serde_json::from_str(r#"{"args": [3]}"#).unwrap();
        assert_eq!(args.args, vec![json!(3)]);
        assert!(args.kwargs.is_empty());
    }

    #[test]
    fn test_round_trip() {
        let args = TaskArgs::positional(vec![json!("a"), json!(2)]).with_kwarg("k", "v");
        let encoded = serde_json::to_string(&args).unwrap();
        let decoded: TaskArgs = serde_json::from_str(&encoded).unwrap();
        assert_eq!(args, decoded);
    }
}
