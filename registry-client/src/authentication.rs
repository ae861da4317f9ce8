//! Authentication for registry requests.
//!
//! Registries are accessed anonymously. Implement [`Authentication`] to
//! attach credentials just before a request is sent.

/// Trait to represent authenticating with a registry.
pub trait Authentication: Clone + Send + Sync + 'static {
    /// Called by the transport for every outgoing request.
    fn authenticate(&self, request: &mut reqwest::Request);
}

/// No authentication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoAuthentication;

impl Authentication for NoAuthentication {
    fn authenticate(&self, _request: &mut reqwest::Request) {}
}
