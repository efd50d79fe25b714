// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ema_model::ToolSchema;

use crate::Tool;

/// Name-keyed set of the tools available to one agent run.
pub struct ToolSet {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Schemas for all registered tools, sorted by name for a stable
    /// request shape.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ToolSet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ToolSet").field(&self.names()).finish()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use ema_model::ToolResult;
    use serde_json::{json, Value};

    use super::*;
    use crate::ToolArgs;

    struct EchoTool {
        name: &'static str,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        async fn execute(&self, args: &ToolArgs) -> anyhow::Result<ToolResult> {
            Ok(ToolResult::ok(format!("echo:{}", Value::Object(args.clone()))))
        }
    }

    #[test]
    fn register_and_get() {
        let mut set = ToolSet::new();
        set.register(EchoTool { name: "echo" });
        assert!(set.get("echo").is_some());
    }

    #[test]
    fn get_unknown_returns_none() {
        let set = ToolSet::new();
        assert!(set.get("nope").is_none());
    }

    #[test]
    fn schemas_sorted_by_name() {
        let mut set = ToolSet::new();
        set.register(EchoTool { name: "zeta" });
        set.register(EchoTool { name: "alpha" });
        let schemas = set.schemas();
        assert_eq!(schemas[0].name, "alpha");
        assert_eq!(schemas[1].name, "zeta");
    }

    #[test]
    fn registering_same_name_twice_overwrites() {
        let mut set = ToolSet::new();
        set.register(EchoTool { name: "t" });
        set.register(EchoTool { name: "t" });
        assert_eq!(set.names().len(), 1);
    }

    #[test]
    fn debug_lists_names() {
        let mut set = ToolSet::new();
        set.register(EchoTool { name: "t" });
        assert!(format!("{set:?}").contains("\"t\""));
    }
}
