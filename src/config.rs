//! ## Configuration
//!
//! Per-session settings of the transport engine.
//!

use std::time::Duration;

use crate::constants::misc;

/// ### Tag Policy
///
/// How strictly a DEV_DEP_MSG_IN header's bTag is checked against the
/// REQUEST_DEV_DEP_MSG_IN that solicited it.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TagPolicy {
    /// Accept any tag whose inverse is consistent
    #[default]
    ComplementOnly,
    /// The tag must also equal the request's tag
    MatchRequest,
}

/// ### Session Config
///
/// Settings a `Session` is created with.
///
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Capacity of the outbound and inbound scratch buffers, header included
    pub buffer_size: usize,
    /// Per-transfer timeout used by the instrument layer
    pub default_timeout: Duration,
    /// Tag checking on inbound headers
    pub tag_policy: TagPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            buffer_size: misc::DEFAULT_BUFFER_SIZE,
            default_timeout: misc::DEFAULT_TIMEOUT_DURATION,
            tag_policy: TagPolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Scratch buffer size. Values that cannot hold a header and one
    /// aligned payload word are raised to that minimum.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(misc::USBTMC_HEADER_SIZE + misc::TRANSFER_ALIGNMENT);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_tag_policy(mut self, tag_policy: TagPolicy) -> Self {
        self.tag_policy = tag_policy;
        self
    }

    /// Largest payload a single IN request asks for.
    pub fn read_chunk_size(&self) -> usize {
        let chunk = self.buffer_size.saturating_sub(misc::USBTMC_HEADER_SIZE);
        chunk - chunk % misc::TRANSFER_ALIGNMENT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(256, 244)]
    #[case(64, 52)]
    #[case(30, 16)]
    #[case(16, 4)]
    fn chunks_are_aligned_and_leave_room_for_the_header(
        #[case] buffer_size: usize,
        #[case] chunk: usize,
    ) {
        let config = SessionConfig::default().with_buffer_size(buffer_size);
        assert_eq!(config.read_chunk_size(), chunk);
    }

    #[test]
    fn tiny_buffers_are_raised_to_the_minimum() {
        let config = SessionConfig::default().with_buffer_size(3);
        assert_eq!(config.buffer_size, 16);
        assert_eq!(config.read_chunk_size(), 4);
    }

    #[test]
    fn defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.buffer_size, 256);
        assert_eq!(config.default_timeout, Duration::from_millis(1000));
        assert_eq!(config.tag_policy, TagPolicy::ComplementOnly);
    }
}
