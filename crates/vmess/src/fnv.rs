const OFFSET_BASIS: u32 = 0x811c_9dc5;
const PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a, the checksum used by command and chunk framing.
pub fn fnv1a(data: &[u8]) -> u32 {
    data.iter()
        .fold(OFFSET_BASIS, |hash, b| (hash ^ *b as u32).wrapping_mul(PRIME))
}

#[cfg(test)]
mod test {
    use super::fnv1a;

    #[test]
    fn test_known_vectors() {
        assert_eq!(fnv1a(b""), 0x811c9dc5);
        assert_eq!(fnv1a(b"a"), 0xe40c292c);
        assert_eq!(fnv1a(b"foobar"), 0xbf9cf968);
    }

    #[test]
    fn test_single_bit_flip() {
        let data = b"vmess chunk payload".to_vec();
        let sum = fnv1a(&data);
        assert_eq!(sum, fnv1a(&data));
        for i in 0..data.len() {
            for bit in 0..8 {
                let mut flipped = data.clone();
                flipped[i] ^= 1 << bit;
                assert_ne!(sum, fnv1a(&flipped), "byte {} bit {}", i, bit);
            }
        }
    }
}
