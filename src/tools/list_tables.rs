use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use super::{parse_arguments, schema_for, SqlTool};
use crate::db::Cursor;
use crate::error::AgentError;

#[derive(Deserialize, JsonSchema)]
pub struct ListTablesParams {}

pub struct ListTables;

impl SqlTool for ListTables {
    fn name(&self) -> &'static str {
        "list_tables"
    }

    fn description(&self) -> &'static str {
        "List the names of all tables in the database, separated by commas. \
         Call this first when you do not know which tables exist."
    }

    fn parameters(&self) -> Value {
        schema_for::<ListTablesParams>()
    }

    fn call(&self, cursor: &Cursor<'_>, arguments: Value) -> Result<String, AgentError> {
        let _: ListTablesParams = parse_arguments(self.name(), arguments)?;
        let tables = cursor.table_names()?;
        if tables.is_empty() {
            return Ok("The database has no tables.".to_string());
        }
        Ok(tables.join(", "))
    }
}
