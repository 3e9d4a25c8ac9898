//! Message fragmentation.
//!
//! A logical message is split into consecutive payloads of at most
//! `packet_size - HEADER_SIZE` bytes. Every fragment but the last carries
//! [`Flag::More`].

use super::packet::{Flag, HEADER_SIZE};

/// Returns the number of fragments needed for a message of `len` bytes.
///
/// # Arguments
///
/// * `len` - Message length
/// * `packet_size` - Negotiated packet size including the header
pub fn fragment_count(len: usize, packet_size: usize) -> usize {
    let max_payload = packet_size.saturating_sub(HEADER_SIZE).max(1);
    len.div_ceil(max_payload)
}

/// One fragment of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment<'a> {
    /// Payload bytes.
    pub payload: &'a [u8],

    /// Continuation flag.
    pub flag: Flag,
}

/// Iterator over the fragments of a message.
#[derive(Debug, Clone)]
pub struct Fragments<'a> {
    rest: &'a [u8],
    max_payload: usize,
}

impl<'a> Fragments<'a> {
    /// Creates an iterator splitting `message` for the given packet size.
    pub fn new(message: &'a [u8], packet_size: usize) -> Self {
        Self {
            rest: message,
            max_payload: packet_size.saturating_sub(HEADER_SIZE).max(1),
        }
    }
}

impl<'a> Iterator for Fragments<'a> {
    type Item = Fragment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }

        let take = self.rest.len().min(self.max_payload);
        let (payload, rest) = self.rest.split_at(take);
        self.rest = rest;

        let flag = if rest.is_empty() { Flag::Last } else { Flag::More };
        Some(Fragment { payload, flag })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(3000, 1024, 3)]
    #[case(1020, 1024, 1)]
    #[case(1021, 1024, 2)]
    #[case(1, 5, 1)]
    #[case(10, 5, 10)]
    #[case(0, 1024, 0)]
    fn test_fragment_count(#[case] len: usize, #[case] packet_size: usize, #[case] expected: usize) {
        assert_eq!(fragment_count(len, packet_size), expected);
        let message = vec![0u8; len];
        assert_eq!(Fragments::new(&message, packet_size).count(), expected);
    }

    #[test]
    fn test_fragment_sizes_and_flags() {
        let message: Vec<u8> = (0..3000u32).map(|i| i as u8).collect();
        let fragments: Vec<_> = Fragments::new(&message, 1024).collect();

        let sizes: Vec<usize> = fragments.iter().map(|f| f.payload.len()).collect();
        assert_eq!(sizes, vec![1020, 1020, 960]);

        let flags: Vec<Flag> = fragments.iter().map(|f| f.flag).collect();
        assert_eq!(flags, vec![Flag::More, Flag::More, Flag::Last]);

        // Fragments cover the message in order.
        let joined: Vec<u8> = fragments.iter().flat_map(|f| f.payload.iter().copied()).collect();
        assert_eq!(joined, message);
    }
}
