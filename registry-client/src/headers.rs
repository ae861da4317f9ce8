//! Ordered request headers, and merging caller headers with protocol headers.

use http::header::{self, HeaderMap, HeaderName, HeaderValue};

use crate::error::RegistryError;

/// Headers which belong to the transport and may never come from a caller.
fn is_reserved(name: &HeaderName) -> bool {
    *name == header::AUTHORIZATION
        || *name == header::CONTENT_LENGTH
        || *name == header::HOST
        || *name == header::TRANSFER_ENCODING
}

/// An ordered list of request headers.
///
/// Order is preserved when the headers are applied to a request, and
/// repeated names are sent as repeated headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(HeaderName, HeaderValue)>);

impl Headers {
    /// An empty header list.
    pub fn new() -> Self {
        Self::default()
    }

    /// A `Range` header selecting the bytes `first..=last`.
    pub fn byte_range(first: u64, last: u64) -> Self {
        let value = HeaderValue::from_str(&format!("bytes={first}-{last}"))
            .expect("formatted integers are a valid header value");
        Headers(vec![(header::RANGE, value)])
    }

    /// Add a header, returning the list.
    pub fn with(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.push(name, value);
        self
    }

    /// Add a header at the end of the list.
    pub fn push(&mut self, name: HeaderName, value: HeaderValue) {
        self.0.push((name, value));
    }

    /// Returns true if a header with this name is present.
    pub fn contains(&self, name: &HeaderName) -> bool {
        self.0.iter().any(|(n, _)| n == name)
    }

    /// The first value for a header name.
    pub fn get(&self, name: &HeaderName) -> Option<&HeaderValue> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Iterate over the headers in order.
    pub fn iter(&self) -> impl Iterator<Item = &(HeaderName, HeaderValue)> {
        self.0.iter()
    }

    /// The number of headers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no headers.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge caller headers after the protocol-mandated ones.
    ///
    /// A caller header that names a protocol header, or one of the headers
    /// owned by the transport, is rejected.
    pub fn merge(protocol: Headers, caller: &Headers) -> Result<Headers, RegistryError> {
        let mut merged = protocol;
        for (name, _) in caller.iter() {
            if merged.contains(name) || is_reserved(name) {
                return Err(RegistryError::HeaderConflict(name.clone()));
            }
        }

        merged.0.extend(caller.0.iter().cloned());
        Ok(merged)
    }

    pub(crate) fn into_header_map(self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.0.len());
        for (name, value) in self.0 {
            map.append(name, value);
        }
        map
    }
}

impl FromIterator<(HeaderName, HeaderValue)> for Headers {
    fn from_iter<T: IntoIterator<Item = (HeaderName, HeaderValue)>>(iter: T) -> Self {
        Headers(iter.into_iter().collect())
    }
}

impl Extend<(HeaderName, HeaderValue)> for Headers {
    fn extend<T: IntoIterator<Item = (HeaderName, HeaderValue)>>(&mut self, iter: T) {
        self.0.extend(iter)
    }
}

impl IntoIterator for Headers {
    type Item = (HeaderName, HeaderValue);
    type IntoIter = std::vec::IntoIter<(HeaderName, HeaderValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
