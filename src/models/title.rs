use once_cell::sync::Lazy;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use url::Url;

use crate::error::TrackingError;

static SEPARATORS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\s_]+").expect("Invalid separator regex")
});

// Characters escaped when a title is written back into an article path
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

const ARTICLE_PATH_PREFIX: &str = "/wiki/";

// NewType pattern for type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Site(String);

impl Site {
    pub fn new(raw: &str) -> Result<Self, TrackingError> {
        let host = raw.trim().to_lowercase();
        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(TrackingError::InvalidTitle(format!("invalid site {:?}", raw)));
        }
        Ok(Site(host))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical identity of an article.
///
/// Two titles are equal when they name the same article on the same site,
/// regardless of percent-encoding, underscores versus spaces, repeated
/// whitespace or letter case. The display text keeps the casing it was
/// constructed with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "TitleRecord", into = "TitleRecord")]
pub struct Title {
    site: Site,
    text: String,
    key: String,
}

#[derive(Serialize, Deserialize)]
struct TitleRecord {
    site: String,
    text: String,
}

impl Title {
    pub fn new(site: &str, raw_name: &str) -> Result<Self, TrackingError> {
        let decoded = percent_decode_str(raw_name).decode_utf8_lossy();
        Self::from_text(site, &decoded)
    }

    /// Builds a title from display text that was already decoded, such as
    /// the text of a stored title. Separators are collapsed and the name is
    /// trimmed, but percent signs are kept literally, so
    /// `Title::from_text(site, title.text())` always gives back `title`.
    pub fn from_text(site: &str, name: &str) -> Result<Self, TrackingError> {
        let site = Site::new(site)?;
        let text = SEPARATORS.replace_all(name, " ").trim().to_string();
        if text.is_empty() {
            return Err(TrackingError::InvalidTitle(format!(
                "empty article name {:?}",
                name
            )));
        }
        let key = text.to_lowercase();
        Ok(Self { site, text, key })
    }

    /// Parses an article URL such as `https://en.wikipedia.org/wiki/Foo_bar#History`.
    /// The fragment is not part of the identity and is dropped.
    pub fn from_url(raw: &str) -> Result<Self, TrackingError> {
        let url = Url::parse(raw)
            .map_err(|e| TrackingError::InvalidTitle(format!("{}: {}", raw, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| TrackingError::InvalidTitle(format!("{}: missing host", raw)))?;
        let name = url.path().strip_prefix(ARTICLE_PATH_PREFIX).ok_or_else(|| {
            TrackingError::InvalidTitle(format!("{}: not an article path", raw))
        })?;
        Self::new(host, name)
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    /// Human readable name, spaces instead of underscores.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Case-folded identity key, used for equality, hashing and storage keys.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn url(&self) -> String {
        let path_name = self.text.replace(' ', "_");
        format!(
            "https://{}{}{}",
            self.site,
            ARTICLE_PATH_PREFIX,
            utf8_percent_encode(&path_name, PATH_SEGMENT)
        )
    }
}

impl PartialEq for Title {
    fn eq(&self, other: &Self) -> bool {
        self.site == other.site && self.key == other.key
    }
}

impl Eq for Title {}

impl Hash for Title {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.site.hash(state);
        self.key.hash(state);
    }
}

impl fmt::Display for Title {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.site, self.text)
    }
}

impl TryFrom<TitleRecord> for Title {
    type Error = TrackingError;

    fn try_from(record: TitleRecord) -> Result<Self, Self::Error> {
        Title::from_text(&record.site, &record.text)
    }
}

impl From<Title> for TitleRecord {
    fn from(title: Title) -> Self {
        TitleRecord {
            site: title.site.0,
            text: title.text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn differently_formatted_names_are_the_same_article() {
        let a = Title::new("en.wikipedia.org", "Albert_Einstein").unwrap();
        let b = Title::new("EN.wikipedia.org ", "albert%20einstein").unwrap();
        let c = Title::new("en.wikipedia.org", "  Albert   Einstein ").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);

        let set: HashSet<_> = [a.clone(), b, c].into_iter().collect();
        assert_eq!(set.len(), 1);
        assert_eq!(a.text(), "Albert Einstein");
    }

    #[test]
    fn same_name_on_different_sites_differs() {
        let en = Title::new("en.wikipedia.org", "Paris").unwrap();
        let fr = Title::new("fr.wikipedia.org", "Paris").unwrap();
        assert_ne!(en, fr);
    }

    #[test]
    fn rejects_empty_names_and_sites() {
        assert!(Title::new("en.wikipedia.org", "___").is_err());
        assert!(Title::new("", "Paris").is_err());
        assert!(Title::new("en wikipedia", "Paris").is_err());
    }

    #[test]
    fn parses_article_urls_and_drops_fragment() {
        let title = Title::from_url("https://en.wikipedia.org/wiki/Caf%C3%A9_society#History").unwrap();
        assert_eq!(title.site().as_str(), "en.wikipedia.org");
        assert_eq!(title.text(), "Café society");
        assert_eq!(title.url(), "https://en.wikipedia.org/wiki/Caf%C3%A9_society");

        assert!(Title::from_url("https://en.wikipedia.org/w/index.php").is_err());
        assert!(Title::from_url("not a url").is_err());
    }

    #[test]
    fn deserialization_normalizes() {
        let title: Title =
            serde_json::from_str(r#"{"site":"en.wikipedia.org","text":"Rust_(programming_language)"}"#)
                .unwrap();
        assert_eq!(title.text(), "Rust (programming language)");

        let json = serde_json::to_string(&title).unwrap();
        assert_eq!(json, r#"{"site":"en.wikipedia.org","text":"Rust (programming language)"}"#);
    }

    #[test]
    fn escaped_percent_signs_survive_serde() {
        let title = Title::new("en.wikipedia.org", "A%2541").unwrap();
        assert_eq!(title.text(), "A%41");

        let json = serde_json::to_string(&title).unwrap();
        let back: Title = serde_json::from_str(&json).unwrap();
        assert_eq!(back, title);
        assert_eq!(back.text(), "A%41");
        assert_eq!(back.key(), "a%41");
    }

    #[test]
    fn from_text_keeps_decoded_names_intact() {
        for raw in ["%255F", "A%2541", "100%25_Pure", "Albert_Einstein"] {
            let title = Title::new("en.wikipedia.org", raw).unwrap();
            let rebuilt = Title::from_text("en.wikipedia.org", title.text()).unwrap();
            assert_eq!(rebuilt, title);
            assert_eq!(rebuilt.text(), title.text());
        }
        assert_eq!(Title::new("en.wikipedia.org", "%255F").unwrap().text(), "%5F");
        assert!(Title::from_text("en.wikipedia.org", " _ ").is_err());
    }
}
