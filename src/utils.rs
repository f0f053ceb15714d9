use sha2::{Digest, Sha256};

/// First 8 bytes of sha256("namespace:name"), the anchor instruction
/// dispatch prefix.
pub fn anchor_discriminator(namespace: &str, name: &str) -> [u8; 8] {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update(b":");
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_base_input_discriminator_matches_reference() {
        // Raydium CPMM swap_base_input, well-known anchor hash.
        assert_eq!(
            anchor_discriminator("global", "swap_base_input"),
            [143, 190, 90, 218, 196, 30, 51, 222]
        );
    }

    #[test]
    fn dlmm_swap2_discriminator_matches_reference() {
        assert_eq!(
            anchor_discriminator("global", "swap2"),
            [65, 75, 63, 76, 235, 91, 91, 136]
        );
    }
}
