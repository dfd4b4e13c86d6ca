use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use super::{parse_arguments, require_table, schema_for, SqlTool};
use crate::db::Cursor;
use crate::error::AgentError;

#[derive(Deserialize, JsonSchema)]
pub struct DescribeTableParams {
    #[schemars(description = "Name of the table to describe")]
    table_name: String,
}

pub struct DescribeTable;

impl SqlTool for DescribeTable {
    fn name(&self) -> &'static str {
        "describe_table"
    }

    fn description(&self) -> &'static str {
        "Show the schema of a table: its CREATE TABLE statement followed by one line per column \
         with the column type and constraints. Use it before writing a query against the table."
    }

    fn parameters(&self) -> Value {
        schema_for::<DescribeTableParams>()
    }

    fn call(&self, cursor: &Cursor<'_>, arguments: Value) -> Result<String, AgentError> {
        let params: DescribeTableParams = parse_arguments(self.name(), arguments)?;
        require_table(cursor, &params.table_name)?;

        let mut out = cursor.table_sql(&params.table_name)?.unwrap_or_default();
        out.push_str("\n\nColumns:");
        for column in cursor.columns(&params.table_name)? {
            out.push_str(&format!("\n- {} {}", column.name, column.data_type));
            if column.primary_key {
                out.push_str(" PRIMARY KEY");
            }
            if column.not_null {
                out.push_str(" NOT NULL");
            }
        }
        Ok(out)
    }
}
