use std::pin::pin;

use async_stream::stream;
use futures::{Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use crate::chunk::{Chunk, ChunkType};
use crate::error::{ChunkError, TextError};
use crate::framing::{read_chunks, write_chunks};
use crate::record::{TextKind, TextUpdate, keyword_field};

/// Replaces, inserts or deletes one text record in a chunk stream.
///
/// The first chunk carrying the target keyword is replaced in place, later ones are dropped.
/// When the keyword is absent the new chunk goes right before the terminal marker.
#[derive(Debug, Clone)]
pub struct TextPatch {
    kind: TextKind,
    keyword: Vec<u8>,
    replacement: Option<Chunk>,
    replace_all: bool,
}

impl TextPatch {
    /// Resolves the record type and encodes the replacement up front, so an unsupported
    /// type fails here rather than mid-stream.
    pub fn new(update: TextUpdate) -> Result<Self, TextError> {
        let kind = update.resolve_kind()?;
        let replacement = update.to_record()?.map(|record| record.to_chunk());
        Ok(Self {
            kind,
            keyword: keyword_field(&update.keyword).to_vec(),
            replacement,
            replace_all: false,
        })
    }

    /// Also match the keyword in text chunks of the other two types.
    pub fn replace_all(mut self, replace_all: bool) -> Self {
        self.replace_all = replace_all;
        self
    }

    pub fn kind(&self) -> TextKind {
        self.kind
    }

    pub fn is_delete(&self) -> bool {
        self.replacement.is_none()
    }

    fn targets(&self, chunk_type: ChunkType) -> bool {
        chunk_type == self.kind.chunk_type() || (self.replace_all && chunk_type.is_textual())
    }

    pub fn apply<S, E>(self, input: S) -> impl Stream<Item = Result<Chunk, E>>
    where
        S: Stream<Item = Result<Chunk, E>>,
    {
        stream! {
            let mut input = pin!(input);
            let mut replaced = false;
            while let Some(item) = input.next().await {
                let chunk = match item {
                    Ok(chunk) => chunk,
                    Err(error) => {
                        yield Err(error);
                        continue;
                    }
                };

                if chunk.is_terminal() && !replaced {
                    replaced = true;
                    if let Some(new_chunk) = &self.replacement {
                        debug!(kind = %self.kind, "Inserting text chunk before terminal marker");
                        yield Ok(new_chunk.clone());
                    }
                    yield Ok(chunk);
                } else if self.targets(chunk.chunk_type) && chunk.keyword_bytes() == self.keyword {
                    if replaced {
                        debug!(chunk_type = %chunk.chunk_type, "Dropping duplicate text chunk");
                        continue;
                    }
                    replaced = true;
                    match &self.replacement {
                        Some(new_chunk) => {
                            debug!(chunk_type = %chunk.chunk_type, "Replacing text chunk");
                            yield Ok(new_chunk.clone());
                        }
                        None => debug!(chunk_type = %chunk.chunk_type, "Deleting text chunk"),
                    }
                } else {
                    yield Ok(chunk);
                }
            }

            if !replaced && !self.is_delete() {
                warn!(
                    kind = %self.kind,
                    "Chunk stream ended without a terminal marker, text chunk not inserted"
                );
            }
        }
    }
}

/// Streams a PNG from `reader` to `writer` with `patch` applied.
pub async fn set_text<R, W>(reader: R, writer: W, patch: TextPatch) -> Result<(), ChunkError>
where
    R: AsyncRead,
    W: AsyncWrite + Unpin,
{
    write_chunks(writer, patch.apply(read_chunks(reader))).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::TextRecord;
    use std::convert::Infallible;

    fn header() -> Chunk {
        Chunk::new(ChunkType(*b"IHDR"), vec![0u8; 13])
    }

    fn image_data() -> Chunk {
        Chunk::new(ChunkType(*b"IDAT"), vec![9u8; 4])
    }

    async fn patch(patch: TextPatch, chunks: Vec<Chunk>) -> Vec<Chunk> {
        patch
            .apply(futures::stream::iter(chunks.into_iter().map(Ok::<_, Infallible>)))
            .map(|item| item.unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_insert_before_terminal_marker() {
        let input = vec![
            header(),
            TextRecord::plain("Title", "Example").to_chunk(),
            image_data(),
            Chunk::terminal(),
        ];
        let update = TextUpdate::new("Software", "png-itxt");
        let expected_chunk = update.to_record().unwrap().unwrap().to_chunk();

        let output = patch(TextPatch::new(update).unwrap(), input.clone()).await;
        assert_eq!(output.len(), 5);
        assert_eq!(&output[..3], &input[..3]);
        assert_eq!(output[3], expected_chunk);
        assert!(output[4].is_terminal());
    }

    #[tokio::test]
    async fn test_replace_first_and_drop_duplicates() {
        let input = vec![
            header(),
            TextRecord::plain("Title", "Old").to_chunk(),
            TextRecord::plain("Other", "Keep").to_chunk(),
            TextRecord::plain("Title", "Older").to_chunk(),
            Chunk::terminal(),
        ];
        let update = TextUpdate::new("Title", "New").with_kind(TextKind::Plain);

        let output = patch(TextPatch::new(update).unwrap(), input.clone()).await;
        assert_eq!(
            output,
            vec![
                header(),
                TextRecord::plain("Title", "New").to_chunk(),
                TextRecord::plain("Other", "Keep").to_chunk(),
                Chunk::terminal(),
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_removes_every_occurrence() {
        let input = vec![
            header(),
            TextRecord::international("Title", "a").to_chunk(),
            image_data(),
            TextRecord::international("Title", "b").to_chunk(),
            Chunk::terminal(),
        ];
        let patcher = TextPatch::new(TextUpdate::delete("Title")).unwrap();
        assert!(patcher.is_delete());

        let output = patch(patcher, input).await;
        assert_eq!(output, vec![header(), image_data(), Chunk::terminal()]);
    }

    #[tokio::test]
    async fn test_delete_absent_keyword_is_passthrough() {
        let input = vec![
            header(),
            TextRecord::plain("Title", "Example").to_chunk(),
            Chunk::terminal(),
        ];
        let patcher = TextPatch::new(TextUpdate::delete("Missing")).unwrap();
        assert_eq!(patch(patcher, input.clone()).await, input);
    }

    #[tokio::test]
    async fn test_other_types_untouched_without_replace_all() {
        let plain = TextRecord::plain("Title", "Plain").to_chunk();
        let input = vec![header(), plain.clone(), Chunk::terminal()];
        let update = TextUpdate::new("Title", "International");
        let new_chunk = update.to_record().unwrap().unwrap().to_chunk();

        let output = patch(TextPatch::new(update).unwrap(), input).await;
        assert_eq!(output, vec![header(), plain, new_chunk, Chunk::terminal()]);
    }

    #[tokio::test]
    async fn test_replace_all_matches_every_text_type() {
        let input = vec![
            header(),
            TextRecord::plain("Title", "Plain").to_chunk(),
            TextRecord::compressed("Title", "Compressed").to_chunk(),
            TextRecord::international("Title", "International").to_chunk(),
            Chunk::terminal(),
        ];
        let update = TextUpdate::new("Title", "Replaced")
            .with_kind(TextKind::Compressed)
            .with_compression(true);
        let new_chunk = update.to_record().unwrap().unwrap().to_chunk();
        let patcher = TextPatch::new(update).unwrap().replace_all(true);
        assert_eq!(patcher.kind(), TextKind::Compressed);

        let output = patch(patcher, input).await;
        assert_eq!(output, vec![header(), new_chunk, Chunk::terminal()]);
    }

    #[tokio::test]
    async fn test_long_keyword_matches_truncated_form() {
        let keyword = "k".repeat(90);
        let input = vec![
            TextRecord::plain(keyword.as_str(), "old").to_chunk(),
            Chunk::terminal(),
        ];
        let update = TextUpdate::new(keyword, "new").with_kind(TextKind::Plain);
        let output = patch(TextPatch::new(update).unwrap(), input).await;
        assert_eq!(output.len(), 2);
        assert!(output[0].data.ends_with(b"\0new"));
    }

    #[tokio::test]
    async fn test_missing_terminal_marker_leaves_stream_unchanged() {
        let input = vec![
            header(),
            TextRecord::plain("Title", "Example").to_chunk(),
            image_data(),
        ];
        let patcher = TextPatch::new(TextUpdate::new("Software", "png-itxt")).unwrap();
        assert_eq!(patch(patcher, input.clone()).await, input);
    }

    #[test]
    fn test_unsupported_type_fails_at_construction() {
        let update = TextUpdate {
            kind: Some(ChunkType(*b"tIME")),
            ..TextUpdate::new("Title", "x")
        };
        assert!(matches!(
            TextPatch::new(update),
            Err(TextError::UnsupportedKind(_))
        ));
    }

    #[tokio::test]
    async fn test_upstream_errors_are_forwarded() {
        let input = futures::stream::iter(vec![
            Ok(header()),
            Err("truncated"),
            Ok(Chunk::terminal()),
        ]);
        let patcher = TextPatch::new(TextUpdate::new("Title", "x")).unwrap();
        let output: Vec<Result<Chunk, &str>> = patcher.apply(input).collect().await;
        assert_eq!(output.len(), 4);
        assert_eq!(output[1], Err("truncated"));
        assert!(output[3].as_ref().unwrap().is_terminal());
    }
}
