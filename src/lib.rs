pub mod chunk;
pub mod config;
pub mod deflate;
pub mod error;
pub mod framing;
pub mod patch;
pub mod query;
pub mod record;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use tokio::fs::{self, File};
use tokio_util::codec::FramedRead;
use tracing::info;

//
// Re-export
//
pub use chunk::{Chunk, ChunkType, field_end, split_keyword};
pub use config::{Cli, Command, Config};
pub use error::{ChunkError, TextError};
pub use framing::{PngCodec, read_chunks, write_chunks};
pub use patch::{TextPatch, set_text};
pub use query::{KeywordMatcher, Lookup, LookupResult, TextQuery, find_text, get_text};
pub use record::{TextKind, TextRecord, TextUpdate, create_chunk};

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let Cli { config, command } = cli;

    match command {
        Command::Get {
            input,
            keyword,
            pattern,
            types,
        } => {
            let query = match (keyword, pattern) {
                (Some(keyword), _) => TextQuery::keyword(keyword),
                (None, Some(pattern)) => TextQuery::pattern(&pattern)?,
                (None, None) => TextQuery::new(),
            };
            let query = if types.is_empty() {
                query
            } else {
                query.only_named(&types)
            };

            let file = File::open(&input)
                .await
                .with_context(|| format!("Failed to open {}", input.display()))?;
            let record = find_text(FramedRead::new(file, config.codec()), query)
                .await
                .with_context(|| format!("Failed to read text chunk from {}", input.display()))?;

            match record {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => bail!("No matching text chunk in {}", input.display()),
            }
        }
        Command::Set {
            input,
            output,
            keyword,
            value,
            delete,
            kind,
            compressed,
            language,
            translated,
        } => {
            let source = fs::canonicalize(&input)
                .await
                .with_context(|| format!("Failed to open {}", input.display()))?;
            if let Ok(target) = fs::canonicalize(&output).await
                && target == source
            {
                bail!("Input and output must be different files");
            }

            let update = TextUpdate {
                kind: Some(kind.unwrap_or(config.default_type)),
                keyword,
                compressed: compressed || config.default_compress,
                language: language.or_else(|| config.default_language.clone()),
                translated,
                value: if delete { None } else { value },
            };
            let patch = TextPatch::new(update)?.replace_all(config.replace_all);
            let kind = patch.kind();
            let deleting = patch.is_delete();

            let reader = File::open(&input)
                .await
                .with_context(|| format!("Failed to open {}", input.display()))?;
            // The output only appears once it is complete
            let staging = staging_path(&output);
            let written: anyhow::Result<()> = async {
                let writer = File::create(&staging)
                    .await
                    .with_context(|| format!("Failed to create {}", staging.display()))?;
                write_chunks(writer, patch.apply(FramedRead::new(reader, config.codec())))
                    .await
                    .with_context(|| format!("Failed to patch {}", input.display()))?;
                fs::rename(&staging, &output)
                    .await
                    .with_context(|| format!("Failed to move output to {}", output.display()))
            }
            .await;
            if written.is_err() {
                let _ = fs::remove_file(&staging).await;
            }
            written?;

            info!(%kind, deleting, output = %output.display(), "Wrote patched image");
        }
    }

    Ok(())
}

/// Hidden sibling of `output` the patched image is written to before being moved into place.
fn staging_path(output: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(output.file_name().unwrap_or_else(|| "png-itxt".as_ref()));
    name.push(".tmp");
    output.with_file_name(name)
}
