use std::future::Future;
use std::pin::{Pin, pin};
use std::task::{Context, Poll};

use async_stream::stream;
use futures::channel::oneshot;
use futures::{Stream, StreamExt};
use regex::Regex;
use tokio::io::AsyncRead;
use tracing::{debug, warn};

use crate::chunk::{Chunk, ChunkType, split_keyword};
use crate::error::{ChunkError, TextError};
use crate::framing::read_chunks;
use crate::record::{TextKind, TextRecord};

/// Outcome of a lookup: the first matching record, `None` when nothing matched.
pub type LookupResult = Result<Option<TextRecord>, TextError>;

#[derive(Debug, Clone)]
pub enum KeywordMatcher {
    /// Literal, full-string comparison.
    Exact(String),
    Pattern(Regex),
}

impl KeywordMatcher {
    pub fn is_match(&self, keyword: &str) -> bool {
        match self {
            KeywordMatcher::Exact(expected) => expected == keyword,
            KeywordMatcher::Pattern(regex) => regex.is_match(keyword),
        }
    }
}

/// Locates the first text record matching a keyword and type filter while passing every
/// chunk through untouched.
#[derive(Debug, Clone, Default)]
pub struct TextQuery {
    matcher: Option<KeywordMatcher>,
    kinds: Option<Vec<TextKind>>,
}

impl TextQuery {
    /// Matches the first text record of any type and keyword.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keyword(keyword: impl Into<String>) -> Self {
        Self {
            matcher: Some(KeywordMatcher::Exact(keyword.into())),
            kinds: None,
        }
    }

    pub fn pattern(pattern: &str) -> Result<Self, TextError> {
        Ok(Self::matching(Regex::new(pattern)?))
    }

    pub fn matching(regex: Regex) -> Self {
        Self {
            matcher: Some(KeywordMatcher::Pattern(regex)),
            kinds: None,
        }
    }

    pub fn itxt(keyword: impl Into<String>) -> Self {
        Self::keyword(keyword).only([TextKind::International])
    }

    pub fn ztxt(keyword: impl Into<String>) -> Self {
        Self::keyword(keyword).only([TextKind::Compressed])
    }

    pub fn text(keyword: impl Into<String>) -> Self {
        Self::keyword(keyword).only([TextKind::Plain])
    }

    /// Restricts the lookup to the given record types. An empty set is an invalid filter.
    pub fn only(mut self, kinds: impl IntoIterator<Item = TextKind>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    /// Restricts the lookup to chunk type names such as `"iTXt"`. Unknown names are
    /// ignored; a filter with no known name is invalid.
    pub fn only_named<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let kinds = names.into_iter().filter_map(|name| {
            let kind = name
                .as_ref()
                .parse::<ChunkType>()
                .ok()
                .and_then(TextKind::from_chunk_type);
            if kind.is_none() {
                debug!(name = name.as_ref(), "Ignoring unknown text chunk type in filter");
            }
            kind
        });
        self.only(kinds.collect::<Vec<_>>())
    }

    fn allows(&self, chunk_type: ChunkType) -> Option<TextKind> {
        let kind = TextKind::from_chunk_type(chunk_type)?;
        match &self.kinds {
            Some(kinds) if !kinds.contains(&kind) => None,
            _ => Some(kind),
        }
    }

    /// Returns a result once `chunk` settles the lookup.
    fn examine(&self, chunk: &Chunk) -> Option<LookupResult> {
        let Some(kind) = self.allows(chunk.chunk_type) else {
            return chunk.is_terminal().then_some(Ok(None));
        };

        let (keyword, rest) = split_keyword(&chunk.data);
        if let Some(matcher) = &self.matcher
            && !matcher.is_match(&keyword)
        {
            return None;
        }

        debug!(%kind, %keyword, "Found matching text chunk");
        let result = kind.decode(keyword, &rest);
        if let Err(error) = &result {
            warn!(%error, "Failed to decode text chunk");
        }
        Some(result.map(Some))
    }

    /// Passes `input` through unchanged, calling `on_complete` exactly once: with the first
    /// matching record, with `None` at the terminal marker (or end of input) when nothing
    /// matched, or immediately with [`TextError::InvalidFilter`].
    ///
    /// Dropping the returned stream before completion drops `on_complete` uncalled.
    pub fn inspect<S, E, F>(self, input: S, on_complete: F) -> impl Stream<Item = Result<Chunk, E>>
    where
        S: Stream<Item = Result<Chunk, E>>,
        F: FnOnce(LookupResult),
    {
        let mut on_complete = Some(on_complete);
        if self.kinds.as_ref().is_some_and(Vec::is_empty) {
            warn!("Invalid text chunk filter, passing chunks through unexamined");
            if let Some(callback) = on_complete.take() {
                callback(Err(TextError::InvalidFilter));
            }
        }

        stream! {
            let mut input = pin!(input);
            while let Some(item) = input.next().await {
                if on_complete.is_some()
                    && let Ok(chunk) = &item
                    && let Some(result) = self.examine(chunk)
                    && let Some(callback) = on_complete.take()
                {
                    callback(result);
                }
                yield item;
            }

            if let Some(callback) = on_complete.take() {
                debug!("Chunk stream ended without a terminal marker");
                callback(Ok(None));
            }
        }
    }

    /// Like [`TextQuery::inspect`], reporting through the returned [`Lookup`] future.
    pub fn apply<S, E>(self, input: S) -> (impl Stream<Item = Result<Chunk, E>>, Lookup)
    where
        S: Stream<Item = Result<Chunk, E>>,
    {
        let (tx, rx) = oneshot::channel();
        let chunks = self.inspect(input, move |result| {
            // The receiver may already be gone
            let _ = tx.send(result);
        });
        (chunks, Lookup { rx })
    }
}

/// One-shot completion of a [`TextQuery`].
#[derive(Debug)]
pub struct Lookup {
    rx: oneshot::Receiver<LookupResult>,
}

impl Future for Lookup {
    type Output = LookupResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or_else(|_| Err(TextError::Abandoned)))
    }
}

/// Drains a tokenized chunk stream and returns the first record matching `query`.
pub async fn find_text<S>(input: S, query: TextQuery) -> LookupResult
where
    S: Stream<Item = Result<Chunk, ChunkError>>,
{
    let (chunks, lookup) = query.apply(input);
    let mut chunks = pin!(chunks);
    while let Some(chunk) = chunks.next().await {
        chunk?;
    }
    lookup.await
}

/// Reads a whole PNG byte stream and returns the first record matching `query`.
pub async fn get_text<R: AsyncRead>(reader: R, query: TextQuery) -> LookupResult {
    find_text(read_chunks(reader), query).await
}
