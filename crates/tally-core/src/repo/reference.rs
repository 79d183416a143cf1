use std::fmt;

use crate::errors::FetchError;

/// `owner/name` of a hosted repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    /// Accepts `https://github.com/o/r`, `.../r.git`, trailing slashes and
    /// `git@github.com:o/r.git`.
    pub fn parse(url: &str) -> Result<Self, FetchError> {
        let invalid = |reason: &str| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = url.trim();
        let path = if let Some(rest) = trimmed.strip_prefix("git@") {
            let (host, path) = rest.split_once(':').ok_or_else(|| invalid("missing ':' after host"))?;
            if host.is_empty() {
                return Err(invalid("missing host"));
            }
            path.to_string()
        } else {
            let parsed = url::Url::parse(trimmed).map_err(|e| invalid(&e.to_string()))?;
            if !matches!(parsed.scheme(), "https" | "http") {
                return Err(invalid("unsupported scheme"));
            }
            if parsed.host_str().is_none() {
                return Err(invalid("missing host"));
            }
            parsed.path().to_string()
        };

        let path = path.trim_matches('/');
        let path = path.strip_suffix(".git").unwrap_or(path);
        let mut parts = path.split('/').filter(|p| !p.is_empty());
        let owner = parts.next().ok_or_else(|| invalid("missing owner"))?;
        let name = parts.next().ok_or_else(|| invalid("missing repository name"))?;
        if parts.next().is_some() {
            return Err(invalid("expected exactly owner/name"));
        }
        let valid = |s: &str| {
            s.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };
        if !valid(owner) || !valid(name) {
            return Err(invalid("invalid characters in owner/name"));
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_forms() {
        for url in [
            "https://github.com/alice/calc",
            "https://github.com/alice/calc.git",
            "https://github.com/alice/calc/",
            "https://github.com/alice/calc.git/",
            "git@github.com:alice/calc.git",
            "git@github.com:alice/calc",
            "  https://github.com/alice/calc  ",
        ] {
            let r = RepoRef::parse(url).unwrap_or_else(|e| panic!("{url}: {e}"));
            assert_eq!(r.to_string(), "alice/calc", "{url}");
        }
    }

    #[test]
    fn rejects_malformed_urls() {
        for url in [
            "",
            "not a url",
            "https://github.com/alice",
            "https://github.com/alice/calc/tree/main",
            "ftp://github.com/alice/calc",
            "git@github.com",
            "https://github.com/al ice/calc",
        ] {
            let err = RepoRef::parse(url).unwrap_err();
            assert!(matches!(err, FetchError::InvalidUrl { .. }), "{url}");
        }
    }
}
