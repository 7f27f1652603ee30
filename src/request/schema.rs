use anyhow::{anyhow, Result};
use jsonschema::{Draft, JSONSchema};
use log::debug;
use serde_json::Value;

/// Job manifest schema, bundled with the binary
static JOB_SCHEMA: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/schema/job.json"));

pub fn load_schema() -> Result<JSONSchema> {
    let schema: Value = serde_json::from_str(JOB_SCHEMA)?;
    compile_schema(&schema)
}

fn compile_schema(schema: &Value) -> Result<JSONSchema> {
    debug!("Compiling job manifest schema");
    JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(schema)
        .map_err(|err| anyhow!("invalid job manifest schema: {err}"))
}
