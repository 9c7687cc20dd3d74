//! RFC 1071 internet checksum, computed incrementally.
//!
//! The receive path of the raw socket sees a datagram in pieces (header,
//! retained payload, drained overflow), so the sum is kept open across calls
//! and only folded at the end.

/// Running one's-complement sum of big-endian 16-bit words.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Accumulator {
    sum: u32,
    /// High byte of a word whose low byte has not arrived yet.
    pending: Option<u8>,
}

impl Accumulator {
    pub const fn new() -> Accumulator {
        Accumulator {
            sum: 0,
            pending: None,
        }
    }

    /// Forget everything summed so far.
    pub fn reset(&mut self) {
        self.sum = 0;
        self.pending = None;
    }

    /// Fold `data` into the sum as big-endian words.
    ///
    /// An odd trailing byte is carried over and paired with the first byte of
    /// the next call.
    pub fn add_bytes(&mut self, mut data: &[u8]) {
        if let Some(high) = self.pending.take() {
            match data.split_first() {
                Some((&low, rest)) => {
                    self.add_word(high, low);
                    data = rest;
                }
                None => {
                    self.pending = Some(high);
                    return;
                }
            }
        }

        let mut words = data.chunks_exact(2);
        for word in &mut words {
            self.add_word(word[0], word[1]);
        }
        if let [last] = words.remainder() {
            self.pending = Some(*last);
        }
    }

    /// Add a single word given as its two octets.
    pub fn add_word(&mut self, high: u8, low: u8) {
        self.sum = self.sum.wrapping_add(u16::from_be_bytes([high, low]) as u32);
    }

    /// Fold the carries back in twice and return the complemented sum.
    ///
    /// A carried-over odd byte is padded with a zero octet.
    pub fn finish(&self) -> u16 {
        let mut sum = self.sum;
        if let Some(high) = self.pending {
            sum = sum.wrapping_add((high as u32) << 8);
        }
        sum = (sum >> 16) + (sum & 0xffff);
        sum += sum >> 16;
        !(sum as u16)
    }
}

/// Compute the complete checksum of a single buffer.
pub fn data(data: &[u8]) -> u16 {
    let mut accum = Accumulator::new();
    accum.add_bytes(data);
    accum.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    #[test]
    fn zeros_and_ones() {
        assert_eq!(data(&[0u8; 20]), 0xffff);
        assert_eq!(data(&[0xffu8; 20]), 0x0000);
    }

    #[test]
    fn rfc1071_example() {
        // Section 3 of RFC 1071: the folded sum of these words is 0xddf2.
        let bytes = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        assert_eq!(data(&bytes), !0xddf2u16);
    }

    #[test]
    fn echo_request_from_capture() {
        // type 8, code 0, id 0x0001, seq 0x0001, payload "abcd"
        let mut packet = [
            0x08, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x61, 0x62, 0x63, 0x64,
        ];
        let sum = data(&packet);
        assert_eq!(sum, 0x3337);
        packet[2..4].copy_from_slice(&sum.to_be_bytes());
        assert_eq!(data(&packet), 0);
    }

    #[test]
    fn double_fold_handles_large_sums() {
        let mut accum = Accumulator::new();
        for _ in 0..0x1_0001 {
            accum.add_word(0xff, 0xff);
        }
        // 0x10001 * 0xffff = 0xffff_ffff, which folds to 0xffff.
        assert_eq!(accum.finish(), 0x0000);
    }

    #[test]
    fn odd_bytes_carry_across_calls() {
        let bytes = [0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xde];
        let whole = data(&bytes);

        let mut split = Accumulator::new();
        split.add_bytes(&bytes[..3]);
        split.add_bytes(&[]);
        split.add_bytes(&bytes[3..4]);
        split.add_bytes(&bytes[4..]);
        assert_eq!(split.finish(), whole);
    }

    #[test]
    fn words_and_bytes_agree() {
        let mut by_word = Accumulator::new();
        by_word.add_word(0x45, 0x00);
        by_word.add_word(0x00, 0x3c);

        let mut by_bytes = Accumulator::new();
        by_bytes.add_bytes(&[0x45, 0x00, 0x00, 0x3c]);
        assert_eq!(by_word, by_bytes);
    }

    #[test]
    fn reset_clears_pending_byte() {
        let mut accum = Accumulator::new();
        accum.add_bytes(&[0xaa, 0xbb, 0xcc]);
        accum.reset();
        assert_eq!(accum, Accumulator::new());
        assert_eq!(accum.finish(), 0xffff);
    }

    #[test]
    fn embedded_checksum_verifies() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x1071);
        for len in (4..200).step_by(2) {
            let mut bytes: std::vec::Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            bytes[2] = 0;
            bytes[3] = 0;
            let sum = data(&bytes);
            bytes[2..4].copy_from_slice(&sum.to_be_bytes());

            // Verification zeroes the field again and must reproduce it.
            let received = u16::from_be_bytes([bytes[2], bytes[3]]);
            bytes[2] = 0;
            bytes[3] = 0;
            let mut accum = Accumulator::new();
            accum.add_bytes(&bytes[..len / 2]);
            accum.add_bytes(&bytes[len / 2..]);
            assert_eq!(accum.finish(), received, "length {}", len);
        }
    }
}
