// ── Random tokens for passwords and database names ──

use rand::Rng;
use rand::seq::index;

use crate::error::CoreError;

pub const DEFAULT_LENGTH: usize = 24;
pub const ALPHANUMERIC: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// How characters are drawn from the alphabet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Sampling {
    /// Every character at most once; output is capped at the alphabet size.
    #[default]
    Distinct,
    /// Independent draws; output always has the requested length.
    WithReplacement,
}

/// Random token builder.
///
/// ```
/// use wo_core::token::TokenGenerator;
/// let password = TokenGenerator::new().generate().unwrap();
/// assert_eq!(password.len(), 24);
/// ```
#[derive(Debug, Clone)]
pub struct TokenGenerator {
    length: usize,
    alphabet: Vec<char>,
    sampling: Sampling,
}

impl Default for TokenGenerator {
    fn default() -> Self {
        Self {
            length: DEFAULT_LENGTH,
            alphabet: ALPHANUMERIC.chars().collect(),
            sampling: Sampling::Distinct,
        }
    }
}

impl TokenGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }

    /// Replace the alphabet. Repeated characters are dropped.
    pub fn alphabet(mut self, alphabet: &str) -> Self {
        let mut chars: Vec<char> = Vec::with_capacity(alphabet.len());
        for c in alphabet.chars() {
            if !chars.contains(&c) {
                chars.push(c);
            }
        }
        self.alphabet = chars;
        self
    }

    pub fn sampling(mut self, sampling: Sampling) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn generate(&self) -> Result<String, CoreError> {
        if self.length == 0 {
            return Err(CoreError::validation("token length must be positive"));
        }
        if self.alphabet.is_empty() {
            return Err(CoreError::validation("token alphabet is empty"));
        }

        let mut rng = rand::rng();
        let token = match self.sampling {
            Sampling::Distinct => {
                let amount = self.length.min(self.alphabet.len());
                index::sample(&mut rng, self.alphabet.len(), amount)
                    .into_iter()
                    .map(|i| self.alphabet[i])
                    .collect()
            }
            Sampling::WithReplacement => (0..self.length)
                .map(|_| self.alphabet[rng.random_range(0..self.alphabet.len())])
                .collect(),
        };
        Ok(token)
    }
}

/// A 24-character alphanumeric token without repeated characters.
pub fn generate() -> Result<String, CoreError> {
    TokenGenerator::new().generate()
}

/// A token of `length` alphanumeric characters without repeats.
pub fn generate_len(length: usize) -> Result<String, CoreError> {
    TokenGenerator::new().length(length).generate()
}
