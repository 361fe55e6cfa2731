//! The fixed list of resources a generation must hold after install.

use url::Url;

use crate::Error;

/// Ordered, immutable list of absolute URLs to seed at install time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceManifest {
    entries: Vec<Url>,
}

impl ResourceManifest {
    /// Resolve root-relative and absolute entries against the app origin.
    ///
    /// Order is preserved and duplicates are dropped.
    pub fn resolve<S: AsRef<str>>(origin: &Url, entries: &[S]) -> Result<Self, Error> {
        let mut resolved: Vec<Url> = Vec::with_capacity(entries.len());
        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                return Err(Error::InvalidUrl("empty manifest entry".into()));
            }
            let mut url = origin
                .join(entry)
                .map_err(|e| Error::InvalidUrl(format!("{entry}: {e}")))?;
            url.set_fragment(None);
            if !resolved.contains(&url) {
                resolved.push(url);
            }
        }
        Ok(Self { entries: resolved })
    }

    pub fn entries(&self) -> &[Url] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Url {
        Url::parse("https://app.test").unwrap()
    }

    #[test]
    fn test_resolve_mixed_entries() {
        let manifest = ResourceManifest::resolve(
            &origin(),
            &["/", "/index.html", "https://fonts.googleapis.com/css2?family=Inter"],
        )
        .unwrap();

        let urls: Vec<&str> = manifest.entries().iter().map(Url::as_str).collect();
        assert_eq!(
            urls,
            vec![
                "https://app.test/",
                "https://app.test/index.html",
                "https://fonts.googleapis.com/css2?family=Inter",
            ]
        );
    }

    #[test]
    fn test_resolve_drops_duplicates() {
        let manifest = ResourceManifest::resolve(&origin(), &["/", "https://app.test/", "/#top"]).unwrap();
        assert_eq!(manifest.len(), 1);
    }

    #[test]
    fn test_resolve_rejects_empty_entry() {
        let result = ResourceManifest::resolve(&origin(), &["/", "  "]);
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_empty_manifest() {
        let manifest = ResourceManifest::resolve::<&str>(&origin(), &[]).unwrap();
        assert!(manifest.is_empty());
    }
}
