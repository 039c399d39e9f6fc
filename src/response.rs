//! The inbound response façade. `status == 0` distinguishes a transport or
//! protocol failure from a real HTTP status.

use crate::types::HeaderList;
use bytes::Bytes;

#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: HeaderList,
    pub body: Bytes,
    pub trailers: Option<HeaderList>,
    pub protocol: &'static str,
}

impl Response {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(n, _)| n.as_ref() == name.as_bytes())
            .map(|(_, v)| v.as_ref())
    }

    /// `false` for `status == 0`, which marks a transport/protocol failure
    /// rather than a real HTTP status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }
}
