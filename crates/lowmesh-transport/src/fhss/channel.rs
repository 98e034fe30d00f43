//! Channel functions.
//!
//! A [`HoppingSequence`] maps `(slot, offset)` to a channel and is a pure
//! function of its construction inputs: every node that builds it from the
//! same band plan and seed selects the same channel for the same slot.

use lowmesh_core::Channel;

use crate::error::FhssError;

/// How channels are chosen from the allowed list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelFunction {
    /// Always the same channel.
    Fixed(u8),
    /// Pseudo-random permutation of the allowed channels, walked slot by slot.
    Tr51,
    /// Direct hash of slot and offset into the allowed channels.
    Dh1cf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoppingSequence {
    function: ChannelFunction,
    /// Allowed channels in ascending order.
    allowed: Vec<u8>,
    /// TR51 permutation of `allowed`; empty for the other functions.
    permutation: Vec<u8>,
    seed: u16,
}

impl HoppingSequence {
    /// Build the sequence for channels `0..channel_count` minus `excluded`.
    pub fn build(
        function: ChannelFunction,
        channel_count: u8,
        excluded: &[u8],
        seed: u16,
    ) -> Result<Self, FhssError> {
        let allowed: Vec<u8> = (0..channel_count).filter(|c| !excluded.contains(c)).collect();
        if allowed.is_empty() {
            return Err(FhssError::Uninitialized {
                reason: "every channel is excluded",
            });
        }
        if let ChannelFunction::Fixed(ch) = function
            && !allowed.contains(&ch)
        {
            return Err(FhssError::Uninitialized {
                reason: "fixed channel is not an allowed channel",
            });
        }
        let permutation = match function {
            ChannelFunction::Tr51 => tr51_permutation(&allowed, seed),
            _ => Vec::new(),
        };
        Ok(Self {
            function,
            allowed,
            permutation,
            seed,
        })
    }

    pub fn function(&self) -> ChannelFunction {
        self.function
    }

    pub fn allowed(&self) -> &[u8] {
        &self.allowed
    }

    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }

    /// Channel for `slot` under schedule offset `offset`.
    #[must_use]
    pub fn channel(&self, slot: u16, offset: u16) -> Channel {
        let n = self.allowed.len();
        match self.function {
            ChannelFunction::Fixed(ch) => Channel(ch),
            ChannelFunction::Tr51 => {
                let idx = (usize::from(slot) + usize::from(offset)) % n;
                Channel(self.permutation[idx])
            }
            ChannelFunction::Dh1cf => {
                let mut input = [0u8; 6];
                input[..2].copy_from_slice(&slot.to_be_bytes());
                input[2..4].copy_from_slice(&offset.to_be_bytes());
                input[4..].copy_from_slice(&self.seed.to_be_bytes());
                let idx = one_at_a_time(&input) as usize % n;
                Channel(self.allowed[idx])
            }
        }
    }
}

/// Jenkins one-at-a-time hash.
#[must_use]
pub fn one_at_a_time(data: &[u8]) -> u32 {
    let mut h: u32 = 0;
    for &b in data {
        h = h.wrapping_add(u32::from(b));
        h = h.wrapping_add(h << 10);
        h ^= h >> 6;
    }
    h = h.wrapping_add(h << 3);
    h ^= h >> 11;
    h.wrapping_add(h << 15)
}

/// Permutation of `allowed` from the congruential walk
/// `x(k+1) = (x(k) + step) mod p` over the smallest prime `p >= n`,
/// keeping only values below `n`.
fn tr51_permutation(allowed: &[u8], seed: u16) -> Vec<u8> {
    let n = allowed.len();
    let p = next_prime(n.max(2));
    let step = 1 + usize::from(seed) % (p - 1);
    let mut x = usize::from(seed) % p;
    let mut out = Vec::with_capacity(n);
    for _ in 0..p {
        if x < n {
            out.push(allowed[x]);
        }
        x = (x + step) % p;
    }
    out
}

fn next_prime(from: usize) -> usize {
    (from..).find(|&c| is_prime(c)).unwrap_or(from)
}

fn is_prime(n: usize) -> bool {
    if n < 2 {
        return false;
    }
    let mut d = 2;
    while d * d <= n {
        if n % d == 0 {
            return false;
        }
        d += 1;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_band_is_uninitialized() {
        let all: Vec<u8> = (0..4).collect();
        assert!(matches!(
            HoppingSequence::build(ChannelFunction::Tr51, 4, &all, 1),
            Err(FhssError::Uninitialized { .. })
        ));
        assert!(HoppingSequence::build(ChannelFunction::Tr51, 0, &[], 1).is_err());
    }

    #[test]
    fn test_fixed_channel_must_be_allowed() {
        assert!(HoppingSequence::build(ChannelFunction::Fixed(3), 8, &[3], 0).is_err());
        let seq = HoppingSequence::build(ChannelFunction::Fixed(3), 8, &[], 0).unwrap();
        assert_eq!(seq.channel(100, 7), Channel(3));
    }

    #[test]
    fn test_tr51_is_a_permutation_of_allowed() {
        let seq = HoppingSequence::build(ChannelFunction::Tr51, 20, &[0, 5, 19], 0xBEEF).unwrap();
        let mut seen: Vec<u8> = (0..17u16).map(|s| seq.channel(s, 0).0).collect();
        seen.sort_unstable();
        assert_eq!(seen, seq.allowed().to_vec());
    }

    #[test]
    fn test_tr51_offset_shifts_the_walk() {
        let seq = HoppingSequence::build(ChannelFunction::Tr51, 11, &[], 42).unwrap();
        for slot in 0..30u16 {
            assert_eq!(seq.channel(slot, 3), seq.channel(slot + 3, 0));
        }
    }

    #[test]
    fn test_dh1cf_stays_in_allowed_set() {
        let excluded = [1, 2, 3];
        let seq = HoppingSequence::build(ChannelFunction::Dh1cf, 16, &excluded, 9).unwrap();
        for slot in 0..500u16 {
            let ch = seq.channel(slot, 77).0;
            assert!(ch < 16 && !excluded.contains(&ch));
        }
    }

    #[test]
    fn test_one_at_a_time_known_value() {
        // Reference value of the one-at-a-time hash for "a".
        assert_eq!(one_at_a_time(b"a"), 0xCA2E_9442);
        assert_eq!(one_at_a_time(b""), 0);
    }

    #[test]
    fn test_next_prime() {
        assert_eq!(next_prime(2), 2);
        assert_eq!(next_prime(8), 11);
        assert_eq!(next_prime(129), 131);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn function() -> impl Strategy<Value = ChannelFunction> {
            prop_oneof![
                Just(ChannelFunction::Tr51),
                Just(ChannelFunction::Dh1cf),
                (0u8..8).prop_map(ChannelFunction::Fixed),
            ]
        }

        proptest! {
            #[test]
            fn selection_is_deterministic(
                f in function(),
                count in 8u8..=129,
                seed in any::<u16>(),
                slot in any::<u16>(),
                offset in any::<u16>(),
            ) {
                let a = HoppingSequence::build(f, count, &[], seed).unwrap();
                let b = HoppingSequence::build(f, count, &[], seed).unwrap();
                let first = a.channel(slot, offset);
                prop_assert_eq!(first, a.channel(slot, offset));
                prop_assert_eq!(first, b.channel(slot, offset));
                prop_assert!(a.allowed().contains(&first.0));
            }
        }
    }
}
