//! Recursive character chunking.
//!
//! Text is split on the first separator (in priority order) that occurs in it: paragraph break,
//! line break, sentence terminator, comma. Adjacent pieces are then merged back together while
//! they fit in `max_size` characters; pieces that are still too large are split again with the
//! remaining separators, and pieces that survive every separator are cut at the size boundary.
//!
//! Separators stay attached to the start of the piece that follows them, so merging restores the
//! original spacing. Every emitted chunk is trimmed, and empty chunks are dropped. Sizes are
//! counted in Unicode scalar values.

use super::types::ChunkingError;

/// Separators tried in order, from coarsest to finest.
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", ".", ","];

/// Chunker configuration.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    max_size: usize,
    overlap: usize,
    separators: Vec<String>,
}

impl TextSplitter {
    /// Build a splitter with the default separator hierarchy.
    ///
    /// `overlap` is clamped below `max_size`.
    pub fn new(max_size: usize, overlap: usize) -> Result<Self, ChunkingError> {
        if max_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        Ok(Self {
            max_size,
            overlap: overlap.min(max_size - 1),
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Maximum chunk length in characters.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Split `text` into ordered chunks of at most `max_size` characters.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let separators: Vec<&str> = self.separators.iter().map(String::as_str).collect();
        self.split_with(text, &separators)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let Some(position) = separators.iter().position(|sep| text.contains(sep)) else {
            return hard_cut(text, self.max_size);
        };
        let separator = separators[position];
        let remaining = &separators[position + 1..];

        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) <= self.max_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting));
                fitting.clear();
            }
            if remaining.is_empty() {
                chunks.extend(hard_cut(piece, self.max_size));
            } else {
                chunks.extend(self.split_with(piece, remaining));
            }
        }

        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting));
        }
        chunks
    }

    /// Greedily join pieces (each within budget) into chunks, carrying up to `overlap`
    /// characters of trailing pieces into the next chunk.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: Vec<(&str, usize)> = Vec::new();
        let mut total = 0;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.max_size && !window.is_empty() {
                push_trimmed(&mut chunks, &window);
                while total > self.overlap || (total + len > self.max_size && total > 0) {
                    let (_, dropped) = window.remove(0);
                    total -= dropped;
                }
            }
            window.push((piece, len));
            total += len;
        }

        if !window.is_empty() {
            push_trimmed(&mut chunks, &window);
        }
        chunks
    }
}

fn push_trimmed(chunks: &mut Vec<String>, window: &[(&str, usize)]) {
    let joined: String = window.iter().map(|(piece, _)| *piece).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Split `text` at every occurrence of `separator`, attaching the separator to the start of the
/// following piece.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut pieces = Vec::new();
    let mut start = 0;

    for (index, _) in text.match_indices(separator) {
        if index > start {
            pieces.push(&text[start..index]);
        }
        start = index;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

/// Cut a separator-free run into consecutive pieces of at most `max_size` characters.
fn hard_cut(text: &str, max_size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_size)
        .map(|window| window.iter().collect::<String>())
        .filter_map(|piece| {
            let trimmed = piece.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .collect()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter(max_size: usize) -> TextSplitter {
        TextSplitter::new(max_size, 0).expect("valid size")
    }

    #[test]
    fn rejects_zero_chunk_size() {
        assert!(matches!(
            TextSplitter::new(0, 0),
            Err(ChunkingError::InvalidChunkSize)
        ));
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        assert_eq!(splitter(100).split("  Cells are small.  "), vec!["Cells are small."]);
    }

    #[test]
    fn whitespace_only_text_yields_nothing() {
        assert!(splitter(10).split(" \n\n \t").is_empty());
        assert!(splitter(10).split("").is_empty());
    }

    #[test]
    fn paragraphs_are_merged_up_to_the_limit() {
        let text = "aaaa\n\nbbbb\n\ncccc";
        // Pieces: "aaaa" (4), "\n\nbbbb" (6), "\n\ncccc" (6).
        assert_eq!(splitter(9).split(text), vec!["aaaa", "bbbb", "cccc"]);
        assert_eq!(splitter(10).split(text), vec!["aaaa\n\nbbbb", "cccc"]);
    }

    #[test]
    fn oversized_paragraph_falls_through_to_finer_separators() {
        let text = "Intro\n\nOne. Two. Three";
        let chunks = splitter(8).split(text);
        assert_eq!(chunks, vec!["Intro", "One", ". Two", ". Three"]);
    }

    #[test]
    fn separator_free_runs_are_cut_at_the_boundary() {
        assert_eq!(splitter(4).split("abcdefghij"), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn comma_is_the_last_separator_before_cutting() {
        let chunks = splitter(6).split("red,green,blue");
        assert_eq!(chunks, vec!["red", ",green", ",blue"]);
    }

    #[test]
    fn chunks_never_exceed_limit_and_are_never_blank() {
        let text = "The mitochondrion is the powerhouse of the cell.\nIt produces ATP, \
                    which stores energy.\n\n\nPhotosynthesis happens in chloroplasts, \
                    using light, water, and carbon dioxide. Supercalifragilisticexpialidocious!";
        for max_size in [5, 12, 30, 80] {
            for chunk in splitter(max_size).split(text) {
                assert!(chunk.chars().count() <= max_size, "{chunk:?} > {max_size}");
                assert!(!chunk.trim().is_empty());
            }
        }
    }

    #[test]
    fn splitting_is_deterministic() {
        let text = "Alpha beta.\nGamma, delta.\n\nEpsilon zeta eta theta.";
        let splitter = splitter(15);
        assert_eq!(splitter.split(text), splitter.split(text));
    }

    #[test]
    fn counts_characters_not_bytes() {
        let chunks = splitter(3).split("ééé,ààà");
        assert_eq!(chunks, vec!["ééé", ",àà", "à"]);
    }

    #[test]
    fn overlap_carries_trailing_pieces_forward() {
        let splitter = TextSplitter::new(10, 4).expect("valid");
        // Pieces on ",": "aa" (2), ",bb" (3), ",cc" (3), ",dd" (3).
        let chunks = splitter.split("aa,bb,cc,dd");
        assert_eq!(chunks, vec!["aa,bb,cc", ",cc,dd"]);
    }

    #[test]
    fn overlap_is_clamped_below_chunk_size() {
        let splitter = TextSplitter::new(3, 10).expect("valid");
        assert_eq!(splitter.overlap, 2);
    }

    #[test]
    fn split_keeping_separator_attaches_to_following_piece() {
        assert_eq!(split_keeping_separator("a.b.c", "."), vec!["a", ".b", ".c"]);
        assert_eq!(split_keeping_separator(".a", "."), vec![".a"]);
        assert_eq!(split_keeping_separator("a..b", "."), vec!["a", ".", ".b"]);
    }
}
