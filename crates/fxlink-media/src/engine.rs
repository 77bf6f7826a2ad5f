//! Browser engine detection
//!
//! Some SDP fixes only apply to peers running a specific engine version. The
//! host reports its engine through a user agent string.

use regex::Regex;
use std::sync::LazyLock;

static CHROME_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Chrome/([0-9]+)").expect("valid regex"));

/// First Chrome major version that drops `a=msid-semantic` from its offers
const CHROME_MSID_SEMANTIC_VERSION: u32 = 122;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Chrome { major: u32 },
    Safari,
    Other,
}

impl Engine {
    pub fn from_user_agent(user_agent: &str) -> Self {
        if let Some(major) = CHROME_VERSION
            .captures(user_agent)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
        {
            return Engine::Chrome { major };
        }
        if user_agent.contains("Safari") {
            Engine::Safari
        } else {
            Engine::Other
        }
    }

    /// Whether offers need `a=msid-semantic` restored after the bundle line
    pub fn needs_msid_semantic_fix(&self) -> bool {
        matches!(self, Engine::Chrome { major } if *major >= CHROME_MSID_SEMANTIC_VERSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chrome_version_threshold() {
        let new = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
        let old = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
        assert_eq!(Engine::from_user_agent(new), Engine::Chrome { major: 124 });
        assert!(Engine::from_user_agent(new).needs_msid_semantic_fix());
        assert!(!Engine::from_user_agent(old).needs_msid_semantic_fix());
    }

    #[test]
    fn test_safari_and_other() {
        let safari = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15";
        assert_eq!(Engine::from_user_agent(safari), Engine::Safari);
        assert_eq!(Engine::from_user_agent("fxlink/0.1"), Engine::Other);
        assert!(!Engine::Other.needs_msid_semantic_fix());
    }
}
