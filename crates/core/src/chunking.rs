use crate::error::IngestError;
use crate::models::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};

/// Sliding-window splitter settings. Sizes are counted in `char`s.
///
/// `separators` are tried in order when choosing where a window ends; the
/// first one found inside the window wins, otherwise the window is cut hard
/// at `chunk_size`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            separators: vec!["\n\n".to_string(), "\n".to_string(), " ".to_string()],
        }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk size must be greater than zero".to_string(),
            ));
        }

        if self.chunk_overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }

        Ok(())
    }
}

/// Splits `text` into chunks of at most `chunk_size` chars where each chunk
/// starts `chunk_overlap` chars before the previous one ended.
///
/// Dropping the first `chunk_overlap` chars of every chunk after the first and
/// concatenating gives back `text` exactly (see [`merge_chunks`]).
pub fn split_text(text: &str, config: &ChunkingConfig) -> Result<Vec<String>, IngestError> {
    config.validate()?;

    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Ok(Vec::new());
    }

    let separators: Vec<Vec<char>> = config
        .separators
        .iter()
        .filter(|separator| !separator.is_empty())
        .map(|separator| separator.chars().collect())
        .collect();

    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        if chars.len() - start <= config.chunk_size {
            chunks.push(chars[start..].iter().collect());
            break;
        }

        let limit = start + config.chunk_size;
        let floor = start + config.chunk_overlap;
        let end = preferred_break(&chars, start, floor, limit, &separators).unwrap_or(limit);

        chunks.push(chars[start..end].iter().collect());
        // end > floor, so the window always advances.
        start = end - config.chunk_overlap;
    }

    Ok(chunks)
}

/// Inverse of [`split_text`] for a known overlap.
pub fn merge_chunks(chunks: &[String], overlap: usize) -> String {
    let mut merged = String::new();
    for (index, chunk) in chunks.iter().enumerate() {
        if index == 0 {
            merged.push_str(chunk);
        } else {
            merged.extend(chunk.chars().skip(overlap));
        }
    }
    merged
}

/// End offset (exclusive) just past the last occurrence of the most preferred
/// separator that ends inside `(floor, limit]`.
fn preferred_break(
    chars: &[char],
    start: usize,
    floor: usize,
    limit: usize,
    separators: &[Vec<char>],
) -> Option<usize> {
    for separator in separators {
        let width = separator.len();
        if width > limit - start {
            continue;
        }

        let lowest = start.max((floor + 1).saturating_sub(width));
        let mut position = limit - width;
        loop {
            if chars[position..position + width] == separator[..] {
                return Some(position + width);
            }
            if position <= lowest {
                break;
            }
            position -= 1;
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_text() -> String {
        let mut text = String::new();
        for section in 0..12 {
            text.push_str(&format!("Section {section}\n\n"));
            for line in 0..7 {
                text.push_str(&format!(
                    "Line {line} of section {section} talks about pressure, flow and ünïcödé.\n"
                ));
            }
            text.push('\n');
        }
        text
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunks = split_text("", &ChunkingConfig::default()).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = split_text("tiny", &ChunkingConfig::new(10, 2)).unwrap();
        assert_eq!(chunks, vec!["tiny".to_string()]);
    }

    #[test]
    fn merging_reconstructs_input_for_many_configs() {
        let text = sample_text();
        for (size, overlap) in [(10, 0), (10, 9), (64, 8), (100, 30), (257, 100), (4000, 1)] {
            let config = ChunkingConfig::new(size, overlap);
            let chunks = split_text(&text, &config).unwrap();
            assert_eq!(merge_chunks(&chunks, overlap), text, "size={size} overlap={overlap}");
        }
    }

    #[test]
    fn chunks_respect_size_and_share_exact_overlap() {
        let text = sample_text();
        let config = ChunkingConfig::new(120, 25);
        let chunks = split_text(&text, &config).unwrap();

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 120);
        }
        for pair in chunks.windows(2) {
            let left: Vec<char> = pair[0].chars().collect();
            let right: Vec<char> = pair[1].chars().collect();
            assert_eq!(left[left.len() - 25..], right[..25]);
        }
    }

    proptest! {
        #[test]
        fn any_text_survives_split_and_merge(
            text in "[a-zé \n]{0,300}",
            chunk_size in 1usize..48,
            overlap_seed in 0usize..48,
        ) {
            let chunk_overlap = overlap_seed % chunk_size;
            let config = ChunkingConfig::new(chunk_size, chunk_overlap);
            let chunks = split_text(&text, &config).unwrap();

            prop_assert_eq!(merge_chunks(&chunks, chunk_overlap), text);
            for chunk in &chunks {
                prop_assert!(chunk.chars().count() <= chunk_size);
            }
            for pair in chunks.windows(2) {
                let left: Vec<char> = pair[0].chars().collect();
                let right: Vec<char> = pair[1].chars().collect();
                prop_assert_eq!(&left[left.len() - chunk_overlap..], &right[..chunk_overlap]);
            }
        }
    }

    #[test]
    fn windows_end_on_preferred_separator() {
        let config = ChunkingConfig::new(10, 2);
        let chunks = split_text("hello world foo bar baz", &config).unwrap();
        assert_eq!(chunks[0], "hello ");
        assert_eq!(chunks.last().map(String::as_str), Some("r baz"));
    }

    #[test]
    fn text_without_separators_is_cut_hard() {
        let config = ChunkingConfig::new(4, 1);
        let chunks = split_text("abcdefghij", &config).unwrap();
        assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn default_config_matches_original_sizes() {
        let config = ChunkingConfig::default();
        assert_eq!(config.chunk_size, 10_000);
        assert_eq!(config.chunk_overlap, 1_000);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        assert!(matches!(
            split_text("abc", &ChunkingConfig::new(0, 0)),
            Err(IngestError::InvalidChunkConfig(_))
        ));
        assert!(matches!(
            split_text("abc", &ChunkingConfig::new(5, 5)),
            Err(IngestError::InvalidChunkConfig(_))
        ));
    }
}
