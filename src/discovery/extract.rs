//! Lazy-chunk reference extraction
//!
//! Scrapes the host's minified source for its lazy-load idiom. This is the
//! part most sensitive to host build changes, so it sits behind
//! [`ChunkExtractor`] and nothing else in the engine looks at source text.

use once_cell::sync::Lazy;
use regex::Regex;

use super::ChunkGroup;
use crate::host::{ChunkId, ModuleId};

/// Matches a minified identifier
const IDENT: &str = r"(?:[A-Za-z_$][\w$]*)";

/// `[Promise.all([]n.e("1"),n.e("2")[])].then(n.bind(n,"3"))`
static LAZY_CHUNK_REGEX: Lazy<Regex> = Lazy::new(|| {
    let pattern = r#"(?:(?:Promise\.all\(\[)?((?:\i\.)?e\("?[^)]+?"?\)[^\]]*?)(?:\]\))?)\.then\(\i\.bind\(\i,"?([^)]+?)"?\)\)"#
        .replace(r"\i", IDENT);
    Regex::new(&pattern).expect("lazy chunk pattern is valid")
});

/// `("abc")` or `(123)`; variable references like `(r)` are not ids
static CHUNK_ID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\((?:"([^"]+?)"|(\d+))\)"#).expect("chunk id pattern is valid")
});

/// Quoted numeric ids (unless followed by `,` or `}`) or bare `id:` keys
static MANIFEST_ID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:"([\deE]+)"([,}])?)|(?:([\deE]+):)"#).expect("manifest id pattern is valid")
});

/// Extracts chunk groups from a factory's source text
pub trait ChunkExtractor: Send + Sync {
    fn extract(&self, source: &str) -> Vec<ChunkGroup>;
}

/// Default extractor for webpack's `Promise.all([...]).then(require.bind(...))` idiom
#[derive(Debug, Default, Clone, Copy)]
pub struct LazyChunkPattern;

impl ChunkExtractor for LazyChunkPattern {
    fn extract(&self, source: &str) -> Vec<ChunkGroup> {
        LAZY_CHUNK_REGEX
            .captures_iter(source)
            .filter_map(|cap| {
                let raw_ids = cap.get(1)?.as_str();
                let entry_point = cap.get(2)?.as_str();

                let chunks: Vec<ChunkId> = CHUNK_ID_REGEX
                    .captures_iter(raw_ids)
                    .filter_map(|id| id.get(1).or_else(|| id.get(2)))
                    .map(|id| ChunkId::from(id.as_str()))
                    .collect();

                if chunks.is_empty() {
                    return None;
                }

                Some(ChunkGroup::new(chunks, ModuleId::from(entry_point)))
            })
            .collect()
    }
}

/// Every chunk id mentioned by the loader's id -> asset path function, deduplicated
pub fn manifest_chunk_ids(source: &str) -> Vec<ChunkId> {
    let mut ids: Vec<ChunkId> = Vec::new();

    for cap in MANIFEST_ID_REGEX.captures_iter(source) {
        // quoted value followed by `,` or `}` is a hash, not a key
        if cap.get(2).is_some() {
            continue;
        }

        if let Some(id) = cap.get(1).or_else(|| cap.get(3)) {
            let id = ChunkId::from(id.as_str());
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }

    ids
}
