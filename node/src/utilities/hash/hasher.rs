use sha3::Digest;

pub struct Hasher {}

impl Hasher {
    /// Do a keccak 256-bit hash and return result.
    pub fn keccak_256(data: &[u8]) -> [u8; 32] {
        let mut output = [0u8; 32];
        output.copy_from_slice(sha3::Keccak256::digest(data).as_slice());
        output
    }

    /// Keccak 256-bit hash over the concatenation of all `parts`.
    pub fn keccak_256_concat(parts: &[&[u8]]) -> [u8; 32] {
        let mut hasher = sha3::Keccak256::new();
        for part in parts {
            hasher.update(part);
        }
        let mut output = [0u8; 32];
        output.copy_from_slice(hasher.finalize().as_slice());
        output
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_keccak_of_empty_input() {
        let hash = Hasher::keccak_256(b"");
        assert_eq!(
            crate::utilities::to_hex(hash),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_concat_matches_single_buffer() {
        let joined = Hasher::keccak_256(b"shutter-keyper");
        let parts = Hasher::keccak_256_concat(&[b"shutter", b"-", b"keyper"]);
        assert_eq!(joined, parts);
    }
}
