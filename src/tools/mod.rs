mod count_rows;
mod describe_table;
mod list_tables;
mod run_query;
mod sample_rows;

pub use count_rows::CountRows;
pub use describe_table::DescribeTable;
pub use list_tables::ListTables;
pub use run_query::RunQuery;
pub use sample_rows::SampleRows;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, warn};

use crate::db::{Cursor, Database};
use crate::error::AgentError;
use crate::llm::{ToolCall, ToolDefinition};

/// A read-only operation the model can ask for.
pub trait SqlTool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn parameters(&self) -> Value;
    fn call(&self, cursor: &Cursor<'_>, arguments: Value) -> Result<String, AgentError>;
}

/// Outcome of one tool invocation, as fed back to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub name: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(call: &ToolCall, content: String) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            name: call.name.clone(),
            content,
            is_error: false,
        }
    }

    pub fn failure(call: &ToolCall, reason: impl std::fmt::Display) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            name: call.name.clone(),
            content: format!("Error: {}", reason),
            is_error: true,
        }
    }
}

/// The fixed set of tools, in the order they are shown to the model.
pub struct ToolRegistry {
    database: Database,
    tools: Vec<Box<dyn SqlTool>>,
    definitions: Vec<ToolDefinition>,
}

impl ToolRegistry {
    pub fn new(database: Database) -> Self {
        let tools: Vec<Box<dyn SqlTool>> = vec![
            Box::new(ListTables),
            Box::new(DescribeTable),
            Box::new(SampleRows),
            Box::new(CountRows),
            Box::new(RunQuery),
        ];
        let definitions = tools
            .iter()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect();

        Self {
            database,
            tools,
            definitions,
        }
    }

    pub fn list_tools(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    fn get(&self, name: &str) -> Option<&dyn SqlTool> {
        self.tools
            .iter()
            .find(|tool| tool.name() == name)
            .map(|tool| tool.as_ref())
    }

    /// Run a tool by name against a fresh connection.
    pub fn execute(&self, name: &str, arguments: Value) -> Result<String, AgentError> {
        let tool = self.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.tools.iter().map(|t| t.name()).collect();
            AgentError::UnknownTool(format!(
                "'{}' (available tools: {})",
                name,
                known.join(", ")
            ))
        })?;
        self.database.with_cursor(|cursor| tool.call(cursor, arguments))
    }

    /// Run a requested call. Tool-level failures come back as an error result;
    /// only an unreachable database is returned as `Err`.
    pub fn invoke(&self, call: &ToolCall) -> Result<ToolResult, AgentError> {
        info!(tool = %call.name, arguments = %call.arguments, "Invoking tool");
        match self.execute(&call.name, call.arguments.clone()) {
            Ok(content) => Ok(ToolResult::success(call, content)),
            Err(err) if err.is_recoverable() => {
                warn!(tool = %call.name, error = %err, "Tool call rejected");
                Ok(ToolResult::failure(call, &err))
            }
            Err(err) => Err(err),
        }
    }
}

/// JSON schema for a parameter struct, trimmed to what function-calling APIs expect.
pub(crate) fn schema_for<P: JsonSchema>() -> Value {
    let mut schema = serde_json::to_value(schemars::schema_for!(P)).unwrap_or_default();
    if let Some(object) = schema.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
        object
            .entry("properties")
            .or_insert_with(|| Value::Object(Default::default()));
    }
    schema
}

pub(crate) fn parse_arguments<P: DeserializeOwned>(tool: &str, arguments: Value) -> Result<P, AgentError> {
    let arguments = if arguments.is_null() {
        Value::Object(Default::default())
    } else {
        arguments
    };
    serde_json::from_value(arguments)
        .map_err(|e| AgentError::InvalidQuery(format!("invalid arguments for {}: {}", tool, e)))
}

pub(crate) fn require_table(cursor: &Cursor<'_>, table: &str) -> Result<(), AgentError> {
    if cursor.table_exists(table)? {
        return Ok(());
    }
    Err(AgentError::InvalidQuery(format!(
        "table '{}' does not exist (tables: {})",
        table,
        cursor.table_names()?.join(", ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures::shop_database;
    use serde_json::json;

    fn call(name: &str, arguments: Value) -> ToolCall {
        ToolCall {
            id: format!("call_{}", name),
            name: name.to_string(),
            arguments,
        }
    }

    #[test]
    fn test_tools_in_stable_order() {
        let (_dir, db) = shop_database();
        let registry = ToolRegistry::new(db);
        let names: Vec<&str> = registry.list_tools().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["list_tables", "describe_table", "sample_rows", "count_rows", "run_query"]
        );

        for def in registry.list_tools() {
            assert_eq!(def.parameters["type"], "object");
            assert!(def.parameters.get("properties").is_some());
            assert!(def.parameters.get("$schema").is_none());
            assert!(!def.description.is_empty());
        }
    }

    #[test]
    fn test_unknown_tool_is_reported_as_content() {
        let (_dir, db) = shop_database();
        let registry = ToolRegistry::new(db);
        let result = registry.invoke(&call("drop_everything", json!({}))).unwrap();
        assert!(result.is_error);
        assert_eq!(result.tool_call_id, "call_drop_everything");
        assert!(result.content.starts_with("Error: Unknown tool"));
        assert!(result.content.contains("list_tables"));
    }

    #[test]
    fn test_unknown_tool_does_not_touch_database() {
        let registry = ToolRegistry::new(Database::open("/missing/db.sqlite"));
        let result = registry.invoke(&call("nope", json!({}))).unwrap();
        assert!(result.is_error);
    }

    #[test]
    fn test_drop_table_is_rejected_and_tables_unchanged() {
        let (_dir, db) = shop_database();
        let registry = ToolRegistry::new(db.clone());
        let before = db.with_cursor(|c| c.table_names()).unwrap();

        let result = registry
            .invoke(&call("run_query", json!({"sql": "DROP TABLE users;"})))
            .unwrap();
        assert!(result.is_error);
        assert!(result.content.contains("Invalid query"));

        assert_eq!(db.with_cursor(|c| c.table_names()).unwrap(), before);
        assert_eq!(db.with_cursor(|c| c.count_rows("users")).unwrap(), 3);
    }

    #[test]
    fn test_bad_arguments_are_reported_as_content() {
        let (_dir, db) = shop_database();
        let registry = ToolRegistry::new(db);
        let result = registry
            .invoke(&call("count_rows", json!({"table": "users"})))
            .unwrap();
        assert!(result.is_error);
        assert!(result.content.contains("invalid arguments for count_rows"));
    }

    #[test]
    fn test_unavailable_database_propagates() {
        let registry = ToolRegistry::new(Database::open("/missing/db.sqlite"));
        let err = registry.invoke(&call("list_tables", json!({}))).unwrap_err();
        assert!(matches!(err, AgentError::DatabaseUnavailable(_)));
    }

    #[test]
    fn test_successful_invocation() {
        let (_dir, db) = shop_database();
        let registry = ToolRegistry::new(db);
        let result = registry.invoke(&call("list_tables", Value::Null)).unwrap();
        assert!(!result.is_error);
        assert_eq!(result.content, "orders, users");
    }
}
