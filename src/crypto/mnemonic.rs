//! Recovery phrase generation and validation.
//!
//! Phrases are standard BIP-39 English mnemonics. New identities get 12
//! words (128 bits of entropy plus a 4-bit checksum); restores accept 12 or
//! 24 words.
//!
//! Validation is deliberately strict about separators: words must be
//! separated by exactly one ASCII space. Callers trim leading and trailing
//! whitespace before validating, nothing else is normalized, so a phrase with
//! a doubled space or a tab between words is rejected.

use bip39::{Language, Mnemonic};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

use crate::types::IdentityError;

/// Entropy drawn for a freshly generated phrase (128 bits)
pub const ENTROPY_BYTES: usize = 16;

/// Word counts accepted on restore
pub const ACCEPTED_WORD_COUNTS: [usize; 2] = [12, 24];

/// Reasons a phrase fails validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MnemonicError {
    #[error("expected 12 or 24 words, got {0}")]
    WordCount(usize),

    #[error("empty word at position {0} (words must be separated by a single space)")]
    EmptyWord(usize),

    #[error("word at position {0} is not in the wordlist")]
    UnknownWord(usize),

    #[error("checksum mismatch")]
    Checksum,

    #[error("entropy encoding failed: {0}")]
    Encoding(String),
}

impl From<MnemonicError> for IdentityError {
    fn from(err: MnemonicError) -> Self {
        IdentityError::InvalidSeed(err.to_string())
    }
}

/// A recovery phrase held in memory.
///
/// The words are zeroized on drop and never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct SeedPhrase(Zeroizing<String>);

impl SeedPhrase {
    /// Wrap a phrase that has already passed [`check`].
    pub(crate) fn from_validated(phrase: String) -> Self {
        Self(Zeroizing::new(phrase))
    }

    /// Parse and validate a user-supplied phrase.
    ///
    /// Only leading/trailing whitespace is trimmed.
    pub fn parse(input: &str) -> Result<Self, MnemonicError> {
        let trimmed = input.trim();
        check(trimmed)?;
        Ok(Self::from_validated(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn word_count(&self) -> usize {
        self.0.split(' ').count()
    }
}

impl std::fmt::Debug for SeedPhrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedPhrase")
            .field("word_count", &self.word_count())
            .field("phrase", &"[REDACTED]")
            .finish()
    }
}

/// Generate a new 12-word phrase from 128 bits of OS randomness.
pub fn generate() -> Result<SeedPhrase, MnemonicError> {
    let mut entropy = [0u8; ENTROPY_BYTES];
    OsRng.fill_bytes(&mut entropy);

    let result = Mnemonic::from_entropy_in(Language::English, &entropy)
        .map_err(|e| MnemonicError::Encoding(e.to_string()));
    entropy.zeroize();

    Ok(SeedPhrase::from_validated(result?.to_string()))
}

/// Whether `phrase` is a valid recovery phrase.
pub fn validate(phrase: &str) -> bool {
    check(phrase).is_ok()
}

/// Validate word count, wordlist membership and checksum.
pub fn check(phrase: &str) -> Result<(), MnemonicError> {
    let words: Vec<&str> = phrase.split(' ').collect();

    if !ACCEPTED_WORD_COUNTS.contains(&words.len()) {
        return Err(MnemonicError::WordCount(words.len()));
    }

    let wordlist = Language::English.word_list();
    for (i, word) in words.iter().enumerate() {
        if word.is_empty() {
            return Err(MnemonicError::EmptyWord(i + 1));
        }
        if !wordlist.iter().any(|w| w == word) {
            return Err(MnemonicError::UnknownWord(i + 1));
        }
    }

    // Structure is already known good, so the only remaining failure is the checksum.
    Mnemonic::parse_in_normalized(Language::English, phrase)
        .map(|_| ())
        .map_err(|_| MnemonicError::Checksum)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Standard BIP-39 test vectors, never use for real identities
    const VALID_12: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
    const VALID_24: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon art";

    #[test]
    fn test_generate_is_valid_and_twelve_words() {
        let phrase = generate().unwrap();
        assert_eq!(phrase.word_count(), 12);
        assert!(validate(phrase.as_str()));
    }

    #[test]
    fn test_generate_differs_each_call() {
        let a = generate().unwrap();
        let b = generate().unwrap();
        assert_ne!(a.as_str(), b.as_str());
    }

    #[test]
    fn test_known_vectors_validate() {
        assert!(validate(VALID_12));
        assert!(validate(VALID_24));
    }

    #[test]
    fn test_rejects_wrong_word_count() {
        let fifteen = format!("{} abandon abandon abandon", VALID_12);
        assert_eq!(check(&fifteen), Err(MnemonicError::WordCount(15)));
        assert_eq!(check("abandon"), Err(MnemonicError::WordCount(1)));
    }

    #[test]
    fn test_rejects_unknown_word() {
        let phrase = VALID_12.replacen("abandon", "abandonx", 1);
        assert_eq!(check(&phrase), Err(MnemonicError::UnknownWord(1)));
    }

    #[test]
    fn test_rejects_bad_checksum() {
        let phrase = VALID_12.replace("about", "abandon");
        assert_eq!(check(&phrase), Err(MnemonicError::Checksum));
    }

    #[test]
    fn test_rejects_internal_double_space() {
        let phrase = VALID_12.replacen(' ', "  ", 1);
        assert!(!validate(&phrase));
        assert_eq!(check(&phrase).unwrap_err(), MnemonicError::WordCount(13));
    }

    #[test]
    fn test_rejects_tab_separator() {
        let phrase = VALID_12.replacen(' ', "\t", 1);
        assert!(!validate(&phrase));
    }

    #[test]
    fn test_parse_trims_outer_whitespace_only() {
        let padded = format!("  {}\n", VALID_12);
        let phrase = SeedPhrase::parse(&padded).unwrap();
        assert_eq!(phrase.as_str(), VALID_12);
    }

    #[test]
    fn test_debug_redacts_words() {
        let phrase = SeedPhrase::parse(VALID_12).unwrap();
        let debug = format!("{:?}", phrase);
        assert!(!debug.contains("abandon"));
        assert!(debug.contains("REDACTED"));
    }
}
