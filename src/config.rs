use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::chunk::ChunkType;
use crate::framing::{MAX_CHUNK_LEN, PngCodec};
use crate::record::TextKind;

/// Command line entry point
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub config: Config,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the first matching text record as JSON
    Get {
        /// PNG file to read
        input: PathBuf,

        /// Exact keyword to look for
        #[arg(short, long, conflicts_with = "pattern")]
        keyword: Option<String>,

        /// Regular expression the keyword must match
        #[arg(short, long)]
        pattern: Option<String>,

        /// Only consider these chunk types (tEXt, zTXt, iTXt), repeatable
        #[arg(short = 't', long = "type")]
        types: Vec<String>,
    },

    /// Copy a PNG file with one text record inserted, replaced or removed
    Set {
        /// PNG file to read
        input: PathBuf,

        /// Where to write the patched PNG file
        output: PathBuf,

        #[arg(short, long)]
        keyword: String,

        /// New value for the keyword
        #[arg(short, long, required_unless_present = "delete", conflicts_with = "delete")]
        value: Option<String>,

        /// Remove every record with this keyword
        #[arg(long)]
        delete: bool,

        /// Chunk type to write, overrides the configured default
        #[arg(short = 't', long = "type")]
        kind: Option<ChunkType>,

        /// Compress the value (always on for zTXt)
        #[arg(long)]
        compressed: bool,

        /// iTXt language tag
        #[arg(long)]
        language: Option<String>,

        /// iTXt translated keyword
        #[arg(long)]
        translated: Option<String>,
    },
}

/// Defaults applied to every command, from CLI flags or a TOML file
///
/// Example configuration file content
/// # png-itxt configuration
/// default_type = "iTXt"        # Options: "tEXt", "zTXt" or "iTXt"
/// default_compress = true
/// default_language = "en"
/// replace_all = false
/// max_chunk_len = 16777216
#[derive(Debug, Clone, Serialize, Deserialize, Args)]
#[serde(default)]
pub struct Config {
    /// Chunk type written when a record names none
    #[arg(long, default_value_t = default_type())]
    #[serde(default = "default_type")]
    pub default_type: ChunkType,

    /// Compress iTXt values unless told otherwise
    #[arg(long)]
    pub default_compress: bool,

    /// Language tag for new iTXt records
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_language: Option<String>,

    /// Replace the keyword across tEXt, zTXt and iTXt chunks, not only the written type
    #[arg(long)]
    pub replace_all: bool,

    /// Largest chunk accepted while reading
    #[arg(long, default_value_t = default_max_chunk_len())]
    #[serde(default = "default_max_chunk_len")]
    pub max_chunk_len: u32,

    /// Configuration file path
    #[arg(short, long)]
    #[serde(skip)]
    pub config: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_type: default_type(),
            default_compress: false,
            default_language: None,
            replace_all: false,
            max_chunk_len: default_max_chunk_len(),
            config: None,
        }
    }
}

impl Cli {
    /// Parse CLI args, optionally merging with a config file
    pub fn load() -> Result<Self> {
        let mut cli = Cli::parse();

        if let Some(config_path) = &cli.config.config {
            let file_config = Config::from_file(Path::new(config_path))?;
            cli.config = cli.config.merge_with_file(file_config);
        }

        cli.config.validate()?;
        Ok(cli)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Merge with file config, CLI args take precedence
    fn merge_with_file(mut self, file_config: Config) -> Self {
        // If CLI value is default, use file value
        if self.default_type == default_type() {
            self.default_type = file_config.default_type;
        }
        if !self.default_compress {
            self.default_compress = file_config.default_compress;
        }
        if !self.replace_all {
            self.replace_all = file_config.replace_all;
        }
        if self.max_chunk_len == default_max_chunk_len() {
            self.max_chunk_len = file_config.max_chunk_len;
        }

        // For Option fields, CLI takes precedence if Some
        if self.default_language.is_none() {
            self.default_language = file_config.default_language;
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        TextKind::try_from(self.default_type)
            .context("default_type must be one of tEXt, zTXt or iTXt")?;

        if self.max_chunk_len == 0 || self.max_chunk_len > MAX_CHUNK_LEN {
            return Err(anyhow::anyhow!(
                "max_chunk_len must be between 1 and {MAX_CHUNK_LEN}"
            ));
        }

        if let Some(language) = &self.default_language
            && language.as_bytes().contains(&0)
        {
            return Err(anyhow::anyhow!("default_language cannot contain NUL bytes"));
        }

        Ok(())
    }

    pub fn codec(&self) -> PngCodec {
        PngCodec::with_max_chunk_len(self.max_chunk_len)
    }
}

// Default value functions
fn default_type() -> ChunkType {
    ChunkType::ITXT
}

fn default_max_chunk_len() -> u32 {
    MAX_CHUNK_LEN
}
