//! Deterministic subject-to-bucket mapping.
//!
//! Sharding must produce identical results across all SDK implementations, so
//! the hash is fully specified: MD5 over the input bytes, big-endian `u32`
//! from the first four digest bytes, modulo the number of shards.

/// Maps an arbitrary input string to a shard in `[0, total_shards)`.
pub trait Sharder {
    /// Shard of `input` in `[0, total_shards)`.
    fn get_shard(&self, input: impl AsRef<[u8]>, total_shards: u64) -> u64;
}

/// The default (and only) sharder.
pub struct Md5Sharder;

impl Sharder for Md5Sharder {
    fn get_shard(&self, input: impl AsRef<[u8]>, total_shards: u64) -> u64 {
        let hash = md5::compute(input);
        let value = u32::from_be_bytes(hash[0..4].try_into().unwrap());
        (value as u64) % total_shards
    }
}

#[cfg(test)]
mod tests {
    use super::{Md5Sharder, Sharder};

    #[test]
    fn known_shard_values() {
        // md5("test-input") = 9d17... => 0x9d17... % 10000
        let input = "test-input";
        let digest = md5::compute(input);
        let expected =
            (u32::from_be_bytes(digest[0..4].try_into().unwrap()) as u64) % 10_000;
        assert_eq!(Md5Sharder.get_shard(input, 10_000), expected);
    }

    #[test]
    fn deterministic() {
        assert_eq!(
            Md5Sharder.get_shard("alice-some-salt", 10_000),
            Md5Sharder.get_shard("alice-some-salt", 10_000),
        );
    }

    #[test]
    fn shard_is_always_in_range() {
        for i in 0..1000 {
            let shard = Md5Sharder.get_shard(format!("subject-{i}"), 10_000);
            assert!(shard < 10_000);
        }
    }
}
