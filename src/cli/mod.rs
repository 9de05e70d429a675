//! CLI command handlers

pub mod commands;

pub use commands::{functions, resolve, risk, run, schema_export, stats, stem, validate};

use clap::ValueEnum;
use std::path::PathBuf;
use std::str::FromStr;

/// Output encoding of `run`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Yaml,
    Csv,
}

/// Output encoding of `stats`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

/// `<name>=<file>[,<file>...]`: the files loaded for one source in one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFiles {
    pub name: String,
    pub files: Vec<PathBuf>,
}

impl FromStr for SourceFiles {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, files) = s
            .split_once('=')
            .ok_or_else(|| format!("expected <name>=<file>[,<file>...], got '{}'", s))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("missing source name in '{}'", s));
        }
        let files: Vec<PathBuf> = files
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(PathBuf::from)
            .collect();
        if files.is_empty() {
            return Err(format!("no files given for source '{}'", name));
        }
        Ok(Self {
            name: name.to_string(),
            files,
        })
    }
}
