// 🔑 Content Fingerprint
// Stricter dedup key for feed-style items whose ids are not stable upstream:
// the same story re-fetched with different casing, spacing or tracking
// parameters must hash to the same value.

use sha2::{Digest, Sha256};
use url::Url;

/// Lower-case and collapse all whitespace runs to a single space
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Drop query string and fragment, lower-case the rest
pub fn normalize_link(link: &str) -> String {
    let trimmed = link.trim();

    match Url::parse(trimmed) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string().to_lowercase()
        }
        Err(_) => {
            let end = trimmed
                .find(|c: char| c == '?' || c == '#')
                .unwrap_or(trimmed.len());
            trimmed[..end].to_lowercase()
        }
    }
}

/// SHA-256 hex of normalized title + normalized link
pub fn content_fingerprint(title: &str, link: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}|{}", normalize_title(title), normalize_link(link)));
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINK: &str = "https://news.example.com/golf/2025/acquisition";

    #[test]
    fn test_fingerprint_is_stable() {
        let a = content_fingerprint("Golf Club Sold", LINK);
        let b = content_fingerprint("Golf Club Sold", LINK);

        assert_eq!(a, b);
        assert_eq!(a.len(), 64, "SHA-256 hash should be 64 hex characters");
    }

    #[test]
    fn test_ignores_case_and_whitespace() {
        let a = content_fingerprint("Golf Club Sold", LINK);
        let b = content_fingerprint("  golf   CLUB\tsold ", &LINK.to_uppercase());

        assert_eq!(a, b);
    }

    #[test]
    fn test_ignores_query_string_and_fragment() {
        let a = content_fingerprint("Golf Club Sold", LINK);
        let b = content_fingerprint(
            "Golf Club Sold",
            &format!("{}?utm_source=rss&utm_medium=feed#top", LINK),
        );

        assert_eq!(a, b);
    }

    #[test]
    fn test_different_titles_differ() {
        let a = content_fingerprint("Golf Club Sold", LINK);
        let b = content_fingerprint("Golf Club Listed", LINK);

        assert_ne!(a, b);
    }

    #[test]
    fn test_different_paths_differ() {
        let a = content_fingerprint("Golf Club Sold", LINK);
        let b = content_fingerprint("Golf Club Sold", "https://news.example.com/golf/2025/merger");

        assert_ne!(a, b);
    }

    #[test]
    fn test_unparsable_link_still_strips_query() {
        assert_eq!(normalize_link("/Relative/Path?x=1"), "/relative/path");
    }
}
