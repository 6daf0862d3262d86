//! Identifier type and stream endpoint construction

use std::fmt;

use url::Url;

use crate::error::{Result, StatusStreamError};

/// Fixed path segments that precede the identifier in a stream URL
const STREAM_PATH: [&str; 2] = ["service", "stream"];

/// Opaque token naming the service whose status is observed
///
/// The contents are never interpreted. The only requirement is that the
/// token is non-empty; reserved characters are percent-encoded when the
/// token is placed in a URL path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceIdentifier(String);

impl ServiceIdentifier {
    /// Create an identifier, rejecting empty tokens
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(StatusStreamError::invalid_identifier(
                "identifier must not be empty",
            ));
        }
        Ok(Self(id))
    }

    /// The identifier as given by the caller
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build `<base>/service/stream/<identifier>`
    ///
    /// Any path already on `base` is kept as a prefix, so a server mounted
    /// under `/status` yields `/status/service/stream/<identifier>`. The
    /// identifier always lands in exactly one path segment.
    pub fn stream_url(&self, base: &Url) -> Result<Url> {
        let mut url = base.clone();
        url.set_query(None);
        url.set_fragment(None);
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StatusStreamError::CannotBeABase(base.to_string()))?;
            segments.pop_if_empty();
            segments.extend(STREAM_PATH);
            segments.push(&self.0);
        }
        Ok(url)
    }
}

impl fmt::Display for ServiceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ServiceIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for ServiceIdentifier {
    type Error = StatusStreamError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<String> for ServiceIdentifier {
    type Error = StatusStreamError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}
