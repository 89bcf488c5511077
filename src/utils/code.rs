// src/utils/code.rs

use rand::Rng;
use regex::Regex;
use std::sync::OnceLock;

/// Alphabet for join codes. Excludes 0/O/1/I/L to keep codes easy to read
/// aloud and type from a projector slide.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Generates one random join-code candidate of the given length.
/// Uniqueness among open contests is checked by the caller, which retries on
/// collision.
pub fn generate_join_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..CODE_ALPHABET.len());
            CODE_ALPHABET[idx] as char
        })
        .collect()
}

/// Canonical form of a client-supplied code: trimmed and uppercased, so codes
/// are case-insensitive on entry.
pub fn normalize_join_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Cheap shape check before touching the database.
pub fn is_well_formed(code: &str, length: usize) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| Regex::new("^[A-Z0-9]+$").unwrap());
    code.len() == length && re.is_match(code)
}
