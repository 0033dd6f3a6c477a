use serde::{Deserialize, Serialize};
use std::fmt;

/// How the user arrived at an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMethod {
    Search,
    Link,
    Random,
    History,
    Saved,
    External,
    Unknown,
}

impl DiscoveryMethod {
    pub const ALL: [DiscoveryMethod; 7] = [
        DiscoveryMethod::Search,
        DiscoveryMethod::Link,
        DiscoveryMethod::Random,
        DiscoveryMethod::History,
        DiscoveryMethod::Saved,
        DiscoveryMethod::External,
        DiscoveryMethod::Unknown,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            DiscoveryMethod::Search => "search",
            DiscoveryMethod::Link => "link",
            DiscoveryMethod::Random => "random",
            DiscoveryMethod::History => "history",
            DiscoveryMethod::Saved => "saved",
            DiscoveryMethod::External => "external",
            DiscoveryMethod::Unknown => "unknown",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "search" => Some(DiscoveryMethod::Search),
            "link" => Some(DiscoveryMethod::Link),
            "random" => Some(DiscoveryMethod::Random),
            "history" => Some(DiscoveryMethod::History),
            "saved" => Some(DiscoveryMethod::Saved),
            "external" => Some(DiscoveryMethod::External),
            "unknown" => Some(DiscoveryMethod::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_stable() {
        for method in DiscoveryMethod::ALL {
            assert_eq!(DiscoveryMethod::from_key(method.key()), Some(method));
            let json = serde_json::to_string(&method).unwrap();
            assert_eq!(json, format!("\"{}\"", method.key()));
        }
        assert_eq!(DiscoveryMethod::from_key("bookmark"), None);
    }
}
