//! CSRF token generation.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::rngs::OsRng;
use rand::{RngCore, SeedableRng};
use subtle::ConstantTimeEq;

/// Random bytes per token: 128 bits.
pub const TOKEN_BYTES: usize = 16;

/// Produces fresh, unguessable tokens.
///
/// Injected into [`Csrf`](super::Csrf) so tests can use a seeded generator.
/// Any `Fn() -> String` works as a source too.
pub trait TokenSource: Send + Sync + 'static {
    fn generate(&self) -> String;
}

impl<F> TokenSource for F
where
    F: Fn() -> String + Send + Sync + 'static,
{
    fn generate(&self) -> String {
        self()
    }
}

/// Encodes [`TOKEN_BYTES`] from an RNG as unpadded URL-safe base64.
pub struct RngTokens<R> {
    rng: Mutex<R>,
}

impl<R: RngCore + Send + 'static> RngTokens<R> {
    pub fn new(rng: R) -> Self {
        Self { rng: Mutex::new(rng) }
    }
}

impl RngTokens<OsRng> {
    /// Tokens from the operating system's CSPRNG. The default.
    pub fn os() -> Self {
        Self::new(OsRng)
    }
}

impl<R: RngCore + SeedableRng + Send + 'static> RngTokens<R> {
    /// A deterministic source, for tests.
    pub fn seeded(seed: u64) -> Self {
        Self::new(R::seed_from_u64(seed))
    }
}

impl<R: RngCore + Send + 'static> TokenSource for RngTokens<R> {
    fn generate(&self) -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

impl<R> fmt::Debug for RngTokens<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RngTokens").finish_non_exhaustive()
    }
}

/// Byte-exact comparison whose running time does not depend on where the
/// inputs first differ.
pub(crate) fn tokens_match(expected: &str, submitted: &str) -> bool {
    let (a, b) = (expected.as_bytes(), submitted.as_bytes());
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn os_tokens_are_128_bit_and_distinct() {
        let source = RngTokens::os();
        let a = source.generate();
        let b = source.generate();
        assert_eq!(a.len(), 22);
        assert_ne!(a, b);
        assert!(a.bytes().all(|c| c.is_ascii_alphanumeric() || c == b'-' || c == b'_'));
    }

    #[test]
    fn seeded_tokens_are_reproducible() {
        let a = RngTokens::<StdRng>::seeded(7);
        let b = RngTokens::<StdRng>::seeded(7);
        assert_eq!(a.generate(), b.generate());
        assert_eq!(a.generate(), b.generate());
    }

    #[test]
    fn closures_are_sources() {
        let source = || "fixed".to_owned();
        assert_eq!(source.generate(), "fixed");
    }

    #[test]
    fn comparison_is_exact() {
        assert!(tokens_match("abc123", "abc123"));
        assert!(!tokens_match("abc123", "ABC123"));
        assert!(!tokens_match("abc123", "abc123 "));
        assert!(!tokens_match("abc123", ""));
    }

    #[test]
    fn prefixes_and_last_byte_differences_do_not_match() {
        let token = RngTokens::<StdRng>::seeded(3).generate();
        assert!(tokens_match(&token, &token.clone()));
        assert!(!tokens_match(&token, &token[..token.len() - 1]));
        assert!(!tokens_match(&token[..token.len() - 1], &token));

        let mut flipped = token.clone().into_bytes();
        let last = flipped.len() - 1;
        flipped[last] = if flipped[last] == b'A' { b'B' } else { b'A' };
        let flipped = String::from_utf8(flipped).unwrap();
        assert!(!tokens_match(&token, &flipped));
    }
}
