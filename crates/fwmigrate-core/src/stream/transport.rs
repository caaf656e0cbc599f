//! Network transport contract
//!
//! The engine does not own a network stack. A host supplies a [`Transport`]
//! that opens a URL and then delivers, in order, one reply carrying the status
//! line, any number of body chunks of arbitrary length, and a close.

use core::fmt::Write;

use crate::error::TransportFailure;

/// Longest URL the engine will follow
pub const MAX_URL_LEN: usize = 512;

/// Owned, fixed-capacity URL
pub type Url = heapless::String<MAX_URL_LEN>;

/// One event from the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent<'a> {
    /// Status line and headers of the reply
    Reply {
        /// HTTP status code
        status: u16,
        /// `Location` header, if present
        location: Option<&'a str>,
        /// `Content-Length` header, if present
        content_length: Option<u32>,
    },
    /// A piece of the body
    Chunk(&'a [u8]),
    /// The connection was closed by the peer after the body
    Close,
}

/// A connection-oriented byte source
///
/// `next_event` blocks until the next event is available. Implementations
/// enforce their own read timeout and report it as `TransportFailure::Timeout`.
pub trait Transport {
    /// Open a connection to `url`
    fn connect(&mut self, url: &str) -> Result<(), TransportFailure>;

    /// Wait for the next event of the open connection
    fn next_event(&mut self) -> Result<TransportEvent<'_>, TransportFailure>;

    /// Close the open connection, if any
    fn close(&mut self);
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn connect(&mut self, url: &str) -> Result<(), TransportFailure> {
        (**self).connect(url)
    }

    fn next_event(&mut self) -> Result<TransportEvent<'_>, TransportFailure> {
        (**self).next_event()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Copy `s` into an owned [`Url`], rejecting anything that is not http(s)
pub fn parse_url(s: &str) -> Result<Url, TransportFailure> {
    let s = s.trim();
    if !is_usable(s) || scheme_len(s).is_none() {
        return Err(TransportFailure::MalformedLocation);
    }
    let mut url = Url::new();
    url.push_str(s)
        .map_err(|_| TransportFailure::MalformedLocation)?;
    Ok(url)
}

/// Resolve a `Location` header against the URL that produced it
///
/// Absolute, scheme-relative (`//host/path`), absolute-path (`/path`) and
/// relative-path targets are accepted.
pub fn resolve_location(current: &str, location: &str) -> Result<Url, TransportFailure> {
    let location = location.trim();
    if !is_usable(location) {
        return Err(TransportFailure::MalformedLocation);
    }
    if scheme_len(location).is_some() {
        return parse_url(location);
    }

    let scheme_end = scheme_len(current).ok_or(TransportFailure::MalformedLocation)?;
    let authority_end = current[scheme_end..]
        .find('/')
        .map(|i| scheme_end + i)
        .unwrap_or(current.len());

    let mut url = Url::new();
    let result = if let Some(rest) = location.strip_prefix("//") {
        // keep "http:" / "https:"
        write!(url, "{}//{}", &current[..scheme_end - 2], rest)
    } else if location.starts_with('/') {
        write!(url, "{}{}", &current[..authority_end], location)
    } else {
        let path_end = current[authority_end..]
            .find(['?', '#'])
            .map(|i| authority_end + i)
            .unwrap_or(current.len());
        match current[authority_end..path_end].rfind('/') {
            Some(i) => write!(url, "{}{}", &current[..authority_end + i + 1], location),
            None => write!(url, "{}/{}", &current[..authority_end], location),
        }
    };
    result.map_err(|_| TransportFailure::MalformedLocation)?;
    Ok(url)
}

/// Length of the `scheme://` prefix for http and https
fn scheme_len(s: &str) -> Option<usize> {
    ["http://", "https://"]
        .iter()
        .find(|p| {
            s.len() > p.len()
                && s.get(..p.len())
                    .is_some_and(|head| head.eq_ignore_ascii_case(p))
        })
        .map(|p| p.len())
}

fn is_usable(s: &str) -> bool {
    !s.is_empty() && !s.chars().any(|c| c.is_whitespace() || c.is_control())
}
