use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use super::{parse_arguments, require_table, schema_for, SqlTool};
use crate::db::Cursor;
use crate::error::AgentError;

#[derive(Deserialize, JsonSchema)]
pub struct CountRowsParams {
    #[schemars(description = "Name of the table to count")]
    table_name: String,
}

pub struct CountRows;

impl SqlTool for CountRows {
    fn name(&self) -> &'static str {
        "count_rows"
    }

    fn description(&self) -> &'static str {
        "Return the number of rows in a table."
    }

    fn parameters(&self) -> Value {
        schema_for::<CountRowsParams>()
    }

    fn call(&self, cursor: &Cursor<'_>, arguments: Value) -> Result<String, AgentError> {
        let params: CountRowsParams = parse_arguments(self.name(), arguments)?;
        require_table(cursor, &params.table_name)?;
        Ok(cursor.count_rows(&params.table_name)?.to_string())
    }
}
