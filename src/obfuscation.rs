//! Helpers for evaluating obfuscated configuration payloads.
//!
//! Obfuscated payloads replace attribute names and string comparison values
//! with MD5 digests (lowercase hex), so that client bundles never expose the
//! plaintext targeting rules. The evaluator hashes the candidate value with
//! the same algorithm before comparing.

/// Lowercase hex MD5 digest of the input, matching the digests the server
/// embeds in obfuscated payloads.
pub(crate) fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input))
}
