use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use schemars::schema_for;

use api::ClusterConfig;

pub fn main() -> Result<()> {
    let schema_file =
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../target/schema/clusterconfig.json");
    println!("Creating config schema at {:?}", schema_file);
    let parent = schema_file
        .parent()
        .context("Schema path has no parent directory")?;
    fs::create_dir_all(parent)?;

    let schema = schema_for!(ClusterConfig);
    let contents = serde_json::to_string_pretty(&schema).context("Failed to serialize schema")?;
    fs::write(schema_file, contents).context("Failed to write file")
}
