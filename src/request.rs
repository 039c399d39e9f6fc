//! The outbound request façade. Building the RFC 7540 §8.1.2.3
//! pseudo-headers from these fields is the connection layer's job; this
//! type is deliberately transport- and wire-format-agnostic.

use crate::types::HeaderList;
use bytes::Bytes;

#[derive(Debug, Clone, derive_more::Display)]
pub enum Method {
    #[display(fmt = "GET")]
    Get,
    #[display(fmt = "POST")]
    Post,
    #[display(fmt = "PUT")]
    Put,
    #[display(fmt = "DELETE")]
    Delete,
    #[display(fmt = "HEAD")]
    Head,
    #[display(fmt = "PATCH")]
    Patch,
    #[display(fmt = "OPTIONS")]
    Options,
    #[display(fmt = "{}", _0)]
    Other(String),
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub scheme: String,
    pub authority: String,
    pub path: String,
    pub headers: HeaderList,
    pub body: Bytes,
    pub trailers: Option<HeaderList>,
}

impl Request {
    #[must_use]
    pub fn new(
        method: Method,
        scheme: impl Into<String>,
        authority: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            method,
            scheme: scheme.into(),
            authority: authority.into(),
            path: path.into(),
            headers: HeaderList::new(),
            body: Bytes::new(),
            trailers: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn get(scheme: impl Into<String>, authority: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(Method::Get, scheme, authority, path)
    }

    #[inline]
    #[must_use]
    pub fn post(
        scheme: impl Into<String>,
        authority: impl Into<String>,
        path: impl Into<String>,
        body: impl Into<Bytes>,
    ) -> Self {
        let mut request = Self::new(Method::Post, scheme, authority, path);
        request.body = body.into();
        request
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// RFC 7540 §8.1.2.1: pseudo-headers must precede regular fields.
    /// Returns the full header list the encoder should compress, followed
    /// by the body and any trailers.
    pub(crate) fn into_parts(self) -> (HeaderList, Bytes, Option<HeaderList>) {
        let mut list = HeaderList::with_capacity(self.headers.len() + 4);
        list.push((Bytes::from_static(b":method"), Bytes::from(self.method.to_string())));
        list.push((Bytes::from_static(b":scheme"), Bytes::from(self.scheme)));
        list.push((Bytes::from_static(b":authority"), Bytes::from(self.authority)));
        list.push((Bytes::from_static(b":path"), Bytes::from(self.path)));
        list.extend(self.headers);
        (list, self.body, self.trailers)
    }
}
