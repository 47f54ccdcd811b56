//! Names of sprite sheets inside the sprite directory.

use std::path::{Path, PathBuf};

use thiserror::Error;

const MAX_KEY_LEN: usize = 128;
const SHEET_EXTENSION: &str = "png";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpriteKeyError {
    #[error("sprite key must not be empty")]
    Empty,
    #[error("sprite key is {len} bytes long; the limit is {MAX_KEY_LEN}")]
    TooLong { len: usize },
    #[error("segment {index} of the sprite key is empty")]
    EmptySegment { index: usize },
    #[error("sprite key segment '{segment}' is reserved")]
    ReservedSegment { segment: String },
    #[error("sprite key contains invalid character '{character}' at byte {offset}")]
    InvalidCharacter { character: char, offset: usize },
}

/// Slash-separated sheet name such as `units/villager`, always relative to the
/// sprite directory and without the `.png` extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpriteKey(String);

impl SpriteKey {
    pub fn parse(key: &str) -> Result<Self, SpriteKeyError> {
        if key.is_empty() {
            return Err(SpriteKeyError::Empty);
        }
        if key.len() > MAX_KEY_LEN {
            return Err(SpriteKeyError::TooLong { len: key.len() });
        }
        if let Some((offset, character)) = key.char_indices().find(|(_, ch)| !is_key_char(*ch)) {
            return Err(SpriteKeyError::InvalidCharacter { character, offset });
        }
        for (index, segment) in key.split('/').enumerate() {
            if segment.is_empty() {
                return Err(SpriteKeyError::EmptySegment { index });
            }
            if segment.chars().all(|ch| ch == '.') {
                return Err(SpriteKeyError::ReservedSegment {
                    segment: segment.to_string(),
                });
            }
        }
        Ok(Self(key.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn sheet_path(&self, sprite_dir: &Path) -> PathBuf {
        let mut path = sprite_dir.to_path_buf();
        path.extend(self.0.split('/'));
        path.set_extension(SHEET_EXTENSION);
        path
    }
}

fn is_key_char(ch: char) -> bool {
    ch.is_ascii_lowercase() || ch.is_ascii_digit() || matches!(ch, '_' | '-' | '/' | '.')
}
