/// Short-code generation and the reserved-code set
///
/// Codes are drawn uniformly from a 62-symbol alphanumeric alphabet using
/// the operating system CSPRNG. Codes that collide with a reserved static
/// page are redrawn a bounded number of times.

use crate::{Error, Result};
use bytes::Bytes;
use rand::rngs::OsRng;
use rand::RngCore;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

const ALPHABET: &[u8; 62] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Largest multiple of the alphabet size that fits in a byte. Random bytes
/// at or above it are rejected so every symbol stays equally likely.
const ACCEPT_BELOW: u8 = (256 - 256 % ALPHABET.len()) as u8;

/// Draws made by [`CodeGenerator::generate_unique`] before giving up
pub const UNIQUE_ATTEMPTS: usize = 5;

pub const MIN_CODE_LEN: usize = 4;
pub const MAX_CODE_LEN: usize = 6;

/// Returns true if `code` has the shape of a generated code.
pub fn is_valid_code(code: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[a-zA-Z0-9]{4,6}$").expect("code pattern is valid"))
        .is_match(code)
}

/// Generates a random code of exactly `length` characters.
pub fn generate_code(length: usize) -> Result<String> {
    let mut code = String::with_capacity(length);
    let mut buf = [0u8; 32];

    while code.len() < length {
        OsRng
            .try_fill_bytes(&mut buf)
            .map_err(|e| Error::RandomSource(e.to_string()))?;

        for &byte in buf.iter().filter(|&&b| b < ACCEPT_BELOW) {
            if code.len() == length {
                break;
            }
            code.push(ALPHABET[byte as usize % ALPHABET.len()] as char);
        }
    }

    Ok(code)
}

/// Codes owned by static site pages.
///
/// Loaded once at startup and never modified afterwards. Membership is an
/// exact, case-sensitive match.
#[derive(Debug, Clone, Default)]
pub struct ReservedCodes {
    pages: HashMap<String, Bytes>,
}

impl ReservedCodes {
    /// No reserved codes
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from `(code, content)` pairs
    pub fn from_pages<I, K, V>(pages: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Bytes>,
    {
        Self {
            pages: pages
                .into_iter()
                .map(|(code, content)| (code.into(), content.into()))
                .collect(),
        }
    }

    /// Load every `*.txt` file in `dir`; the file stem becomes the code.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let mut pages = HashMap::new();

        for entry in fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("txt") {
                continue;
            }
            let Some(code) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let content = fs::read(&path)?;
            pages.insert(code.to_string(), Bytes::from(content));
        }

        debug!("Loaded {} reserved codes from {:?}", pages.len(), dir.as_ref());
        Ok(Self { pages })
    }

    pub fn contains(&self, code: &str) -> bool {
        self.pages.contains_key(code)
    }

    /// Page content for a reserved code
    pub fn content(&self, code: &str) -> Option<Bytes> {
        self.pages.get(code).cloned()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Produces candidate codes that avoid the reserved set
#[derive(Debug, Clone)]
pub struct CodeGenerator {
    reserved: Arc<ReservedCodes>,
}

impl CodeGenerator {
    pub fn new(reserved: Arc<ReservedCodes>) -> Self {
        Self { reserved }
    }

    pub fn reserved(&self) -> &ReservedCodes {
        &self.reserved
    }

    pub fn generate(&self, length: usize) -> Result<String> {
        generate_code(length)
    }

    /// Generates a code that is not reserved.
    ///
    /// After [`UNIQUE_ATTEMPTS`] reserved draws the last draw is returned
    /// unchecked. A reserved hit is vanishingly rare for random codes and
    /// failing the request over it is worse than the collision.
    pub fn generate_unique(&self, length: usize) -> Result<String> {
        let mut code = self.generate(length)?;
        for _ in 1..UNIQUE_ATTEMPTS {
            if !self.reserved.contains(&code) {
                return Ok(code);
            }
            debug!("Generated reserved code {}, redrawing", code);
            code = self.generate(length)?;
        }

        if self.reserved.contains(&code) {
            warn!(
                "Returning reserved code {} after {} draws",
                code, UNIQUE_ATTEMPTS
            );
        }
        Ok(code)
    }
}
