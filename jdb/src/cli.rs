//! CLI argument parsing for jdb

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

use crate::record::Document;

#[derive(Parser, Debug)]
#[command(name = "jdb")]
#[command(author, version, about = "Inspect and edit jsondb collections", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    /// Collection directory (overrides config and JSONDB_BASE_DIR)
    #[arg(short = 'd', long, global = true)]
    pub base_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List collections
    List,

    /// Print every record in a collection
    All {
        /// Collection name
        collection: String,
    },

    /// Print records matching field equality filters
    Find {
        /// Collection name
        collection: String,

        /// Filter as key=value; value is parsed as JSON, else taken as a string
        #[arg(short = 'w', long = "where", value_parser = parse_filter)]
        filters: Vec<(String, Value)>,
    },

    /// Print one record by id
    Get {
        /// Collection name
        collection: String,

        /// Record id
        id: String,
    },

    /// Add a record from a JSON object
    Add {
        /// Collection name
        collection: String,

        /// Record fields as a JSON object
        #[arg(value_parser = parse_object)]
        fields: Document,
    },

    /// Merge a JSON object into a record
    Update {
        /// Collection name
        collection: String,

        /// Record id
        id: String,

        /// Fields to change as a JSON object
        #[arg(value_parser = parse_object)]
        patch: Document,
    },

    /// Delete a record by id
    Delete {
        /// Collection name
        collection: String,

        /// Record id
        id: String,
    },

    /// Count records, optionally filtered
    Count {
        /// Collection name
        collection: String,

        /// Filter as key=value; value is parsed as JSON, else taken as a string
        #[arg(short = 'w', long = "where", value_parser = parse_filter)]
        filters: Vec<(String, Value)>,
    },

    /// Remove every record from a collection
    Clear {
        /// Collection name
        collection: String,

        /// Confirm the operation
        #[arg(long)]
        yes: bool,
    },

    /// Delete a collection's file
    Drop {
        /// Collection name
        collection: String,

        /// Confirm the operation
        #[arg(long)]
        yes: bool,
    },
}

/// Parse `key=value`, reading the value as JSON when possible
pub fn parse_filter(s: &str) -> Result<(String, Value), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("missing key in '{}'", s));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

/// Parse a JSON object argument
pub fn parse_object(s: &str) -> Result<Document, String> {
    match serde_json::from_str(s) {
        Ok(Value::Object(doc)) => Ok(doc),
        Ok(_) => Err("expected a JSON object".to_string()),
        Err(e) => Err(format!("invalid JSON: {}", e)),
    }
}

/// Build an equality pattern from parsed filters
pub fn filters_to_pattern(filters: Vec<(String, Value)>) -> Document {
    filters.into_iter().collect()
}
