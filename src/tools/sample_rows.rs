use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use super::{parse_arguments, require_table, schema_for, SqlTool};
use crate::db::{quote_identifier, Cursor};
use crate::error::AgentError;

const DEFAULT_SAMPLE_SIZE: usize = 5;
const MAX_SAMPLE_SIZE: usize = 50;

#[derive(Deserialize, JsonSchema)]
pub struct SampleRowsParams {
    #[schemars(description = "Name of the table to sample")]
    table_name: String,

    #[schemars(
        description = "Number of rows to return, between 1 and 50 (default 5). Values outside \
                       that range are clamped to it",
        range(min = 1, max = 50)
    )]
    row_sample_size: Option<usize>,
}

pub struct SampleRows;

impl SqlTool for SampleRows {
    fn name(&self) -> &'static str {
        "sample_rows"
    }

    fn description(&self) -> &'static str {
        "Return the first rows of a table as a pipe separated table with a header line. \
         Useful to see what the values in each column look like."
    }

    fn parameters(&self) -> Value {
        schema_for::<SampleRowsParams>()
    }

    fn call(&self, cursor: &Cursor<'_>, arguments: Value) -> Result<String, AgentError> {
        let params: SampleRowsParams = parse_arguments(self.name(), arguments)?;
        require_table(cursor, &params.table_name)?;

        let size = params
            .row_sample_size
            .unwrap_or(DEFAULT_SAMPLE_SIZE)
            .clamp(1, MAX_SAMPLE_SIZE);
        let sql = format!(
            "SELECT * FROM {} LIMIT {}",
            quote_identifier(&params.table_name),
            size
        );
        Ok(cursor.query(&sql, size)?.to_text())
    }
}
