//! Every tunable knob the engine, flow-control manager and HPACK codec are
//! constructed with, gathered in one place so a caller configures a
//! connection once at construction rather than threading individual values
//! through every constructor.

use std::time::Duration;

/// Connection-wide configuration. `..Config::default()` is the idiomatic
/// way to override a handful of fields.
#[derive(Debug, Clone)]
pub struct Config {
    /// SETTINGS_MAX_CONCURRENT_STREAMS this endpoint advertises.
    pub max_concurrent_streams: u32,
    /// SETTINGS_INITIAL_WINDOW_SIZE this endpoint advertises.
    pub initial_window_size: u32,
    /// SETTINGS_MAX_FRAME_SIZE this endpoint advertises.
    pub max_frame_size: u32,
    /// SETTINGS_MAX_HEADER_LIST_SIZE this endpoint advertises.
    pub max_header_list_size: u32,
    /// SETTINGS_HEADER_TABLE_SIZE this endpoint advertises.
    pub header_table_size: u32,
    /// How long to wait for the transport to connect before giving up.
    pub connect_timeout: Duration,
    /// How long to wait for a response before cancelling the request.
    pub request_timeout: Duration,

    /// Maximum length of a single header name the HPACK decoder will accept.
    pub max_header_name_len: usize,
    /// Maximum length of a single header value the HPACK decoder will accept.
    pub max_header_value_len: usize,
    /// Maximum number of headers in one decoded header list.
    pub max_header_count: usize,
    /// Maximum Huffman output/input ratio before a block is rejected as a
    /// likely compression bomb.
    pub huffman_max_ratio: u32,

    /// Accepted for interface parity with transport-layer configuration;
    /// this core never dials a connection or inspects certificates, so the
    /// field is inert here and is simply passed through to whatever
    /// transport layer the caller constructs.
    pub verify_peer_identity: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_streams: 100,
            initial_window_size: 65_535,
            max_frame_size: 16_384,
            max_header_list_size: 32_768,
            header_table_size: 4096,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),

            max_header_name_len: 8 * 1024,
            max_header_value_len: 8 * 1024,
            max_header_count: 128,
            huffman_max_ratio: 10,

            verify_peer_identity: true,
        }
    }
}

impl Config {
    #[must_use]
    pub fn decode_limits(&self) -> crate::hpack::DecodeLimits {
        crate::hpack::DecodeLimits {
            max_header_list_size: self.max_header_list_size as usize,
            max_header_name_len: self.max_header_name_len,
            max_header_value_len: self.max_header_value_len,
            max_header_count: self.max_header_count,
            huffman_max_ratio: self.huffman_max_ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_conservative() {
        let config = Config::default();
        assert_eq!(config.max_concurrent_streams, 100);
        assert_eq!(config.max_header_list_size, 32_768);
    }
}
