//! `modelrpc schema`: print or write the compiled demo schema.

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use modelrpc_core::json_schema::tool_descriptors;
use modelrpc_core::render::{render_proto, write_proto_files};
use modelrpc_core::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SchemaFormat {
    /// proto3 text, one file per package
    Proto,
    /// The compiled schema document as JSON
    Json,
    /// One JSON tool descriptor per method
    Tools,
}

/// Render the schema in the requested format.
///
/// `package` limits proto output to one package.
pub fn render(
    state: &AppState,
    format: SchemaFormat,
    package: Option<&str>,
) -> Result<String, String> {
    match format {
        SchemaFormat::Proto => {
            let files = render_proto(&state.schema);
            match package {
                Some(package) => files
                    .get(package)
                    .cloned()
                    .ok_or_else(|| format!("Unknown package: {}", package)),
                None => Ok(files.into_values().collect::<Vec<_>>().join("\n")),
            }
        }
        SchemaFormat::Json => serde_json::to_string_pretty(state.schema.as_ref())
            .map_err(|e| format!("Failed to serialize schema: {}", e)),
        SchemaFormat::Tools => serde_json::to_string_pretty(&tool_descriptors(&state.schema))
            .map_err(|e| format!("Failed to serialize tools: {}", e)),
    }
}

/// Write the schema under `dir`: `<package>.proto` files for proto output,
/// `schema.json` or `tools.json` otherwise.
pub fn write(state: &AppState, format: SchemaFormat, dir: &Path) -> Result<Vec<PathBuf>, String> {
    let file_name = match format {
        SchemaFormat::Proto => {
            return write_proto_files(&state.schema, dir)
                .map_err(|e| format!("Failed to write proto files to {}: {}", dir.display(), e));
        }
        SchemaFormat::Json => "schema.json",
        SchemaFormat::Tools => "tools.json",
    };
    let text = render(state, format, None)?;
    std::fs::create_dir_all(dir)
        .map_err(|e| format!("Failed to create {}: {}", dir.display(), e))?;
    let path = dir.join(file_name);
    std::fs::write(&path, text).map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
    tracing::info!("[Schema] Wrote {:?} schema to {}", format, path.display());
    Ok(vec![path])
}

pub fn run(
    state: &AppState,
    format: SchemaFormat,
    package: Option<&str>,
    out: Option<&str>,
) -> Result<(), String> {
    match out {
        Some(dir) => {
            for path in write(state, format, Path::new(dir))? {
                println!("Wrote {}", path.display());
            }
        }
        None => print!("{}", render(state, format, package)?),
    }
    Ok(())
}
