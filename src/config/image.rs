//! Bundle image references.

use std::fmt;
use std::str::FromStr;

use crate::controller::error::Error;

/// A `registry/repository:tag` image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry host, with optional port
    pub registry: String,
    /// Repository path inside the registry
    pub repository: String,
    /// Tag or digest
    pub reference: String,
}

impl FromStr for ImageReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |why: &str| Error::Configuration(format!("invalid bundle image {:?}: {}", s, why));

        let (registry, rest) = s
            .split_once('/')
            .ok_or_else(|| invalid("missing registry"))?;
        if registry.is_empty() {
            return Err(invalid("missing registry"));
        }

        let (repository, reference) = if let Some((repo, digest)) = rest.split_once('@') {
            (repo, digest)
        } else {
            // A ':' after the last '/' separates the tag
            let tag_start = rest
                .rfind(':')
                .filter(|&i| rest.get(i..).is_some_and(|t| !t.contains('/')));
            match tag_start {
                Some(i) => (rest.get(..i).unwrap_or_default(), rest.get(i + 1..).unwrap_or_default()),
                None => return Err(invalid("missing tag")),
            }
        };

        if repository.is_empty() {
            return Err(invalid("missing repository"));
        }
        if reference.is_empty() {
            return Err(invalid("missing tag"));
        }

        Ok(Self {
            registry: registry.to_string(),
            repository: repository.to_string(),
            reference: reference.to_string(),
        })
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reference.contains(':') {
            write!(f, "{}/{}@{}", self.registry, self.repository, self.reference)
        } else {
            write!(f, "{}/{}:{}", self.registry, self.repository, self.reference)
        }
    }
}
