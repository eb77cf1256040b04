use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category tag attached to a blocked destination
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SiteCategory {
    #[default]
    Custom,
    SocialMedia,
    AdultContent,
    Gambling,
    Gaming,
    Violence,
    Drugs,
}

impl SiteCategory {
    pub const ALL: [SiteCategory; 7] = [
        SiteCategory::Custom,
        SiteCategory::SocialMedia,
        SiteCategory::AdultContent,
        SiteCategory::Gambling,
        SiteCategory::Gaming,
        SiteCategory::Violence,
        SiteCategory::Drugs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SiteCategory::Custom => "custom",
            SiteCategory::SocialMedia => "social-media",
            SiteCategory::AdultContent => "adult-content",
            SiteCategory::Gambling => "gambling",
            SiteCategory::Gaming => "gaming",
            SiteCategory::Violence => "violence",
            SiteCategory::Drugs => "drugs",
        }
    }

    /// Sites added when a whole category is blocked at once
    pub fn preset_sites(&self) -> &'static [&'static str] {
        match self {
            SiteCategory::Custom => &[],
            SiteCategory::SocialMedia => &[
                "facebook.com",
                "instagram.com",
                "twitter.com",
                "x.com",
                "tiktok.com",
                "snapchat.com",
                "reddit.com",
                "pinterest.com",
            ],
            SiteCategory::AdultContent => {
                &["pornhub.com", "xvideos.com", "xnxx.com", "xvideosxxx.com"]
            }
            SiteCategory::Gambling => {
                &["bet365.com", "888casino.com", "pokerstars.com", "draftkings.com"]
            }
            SiteCategory::Gaming => &[
                "twitch.tv",
                "roblox.com",
                "minecraft.net",
                "fortnite.com",
                "steam.com",
                "epicgames.com",
            ],
            SiteCategory::Violence => &["liveleak.com", "bestgore.com"],
            SiteCategory::Drugs => &["weedmaps.com", "leafly.com"],
        }
    }
}

impl fmt::Display for SiteCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SiteCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        SiteCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| anyhow::anyhow!("Unknown site category: {}", s))
    }
}

/// A deny-list entry
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedSite {
    pub url: String,
    #[serde(default)]
    pub category: SiteCategory,
    #[serde(with = "chrono::serde::ts_milliseconds", default = "Utc::now")]
    pub added_time: DateTime<Utc>,
    #[serde(default)]
    pub times_blocked: u32,
}

impl BlockedSite {
    pub fn new(url: impl Into<String>, category: SiteCategory, added_time: DateTime<Utc>) -> Self {
        Self {
            url: url.into(),
            category,
            added_time,
            times_blocked: 0,
        }
    }

    /// Uniqueness key of this entry
    pub fn key(&self) -> String {
        normalize(&self.url)
    }
}

/// Normalize a destination identifier for comparison
///
/// Lower-cases the input, strips at most one leading `http://`, `https://`
/// or `www.` (checked in that order) and keeps only the host part before the
/// first `/`.
pub fn normalize(url: &str) -> String {
    let lower = url.to_lowercase();
    let stripped = ["http://", "https://", "www."]
        .iter()
        .find_map(|prefix| lower.strip_prefix(prefix))
        .unwrap_or(lower.as_str());

    match stripped.split_once('/') {
        Some((host, _)) => host.to_string(),
        None => stripped.to_string(),
    }
}

/// Whether `requested` hits the `blocked` entry
///
/// Matching is substring containment on the normalized forms, so
/// `facebook.com.evil.net` matches `facebook.com`. An empty side never
/// matches.
pub fn url_matches(requested: &str, blocked: &str) -> bool {
    let requested = normalize(requested);
    let blocked = normalize(blocked);

    if requested.is_empty() || blocked.is_empty() {
        return false;
    }

    requested.contains(&blocked)
        || requested == blocked
        || requested.ends_with(&format!(".{}", blocked))
}

/// Whether a candidate entry is acceptable for the deny-list
pub fn is_valid_url(url: &str) -> bool {
    let normalized = normalize(url);
    !normalized.is_empty() && (normalized == "localhost" || normalized.contains('.'))
}

/// Configured deny-list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Blocklist<'a> {
    sites: &'a [BlockedSite],
}

impl<'a> Blocklist<'a> {
    pub fn new(sites: &'a [BlockedSite]) -> Self {
        Self { sites }
    }

    /// First entry that matches the destination, if any
    pub fn find_match(&self, destination: &str) -> Option<&'a BlockedSite> {
        self.sites.iter().find(|site| url_matches(destination, &site.url))
    }

    pub fn contains(&self, url: &str) -> bool {
        let key = normalize(url);
        self.sites.iter().any(|site| site.key() == key)
    }
}

/// Add an entry to a deny-list, rejecting invalid and duplicate urls
///
/// Returns `false` when an equivalent entry already exists.
pub fn add_site(sites: &mut Vec<BlockedSite>, site: BlockedSite) -> Result<bool> {
    if !is_valid_url(&site.url) {
        anyhow::bail!("Invalid site: '{}'", site.url);
    }

    if Blocklist::new(sites).contains(&site.url) {
        return Ok(false);
    }

    sites.push(site);
    Ok(true)
}

/// Remove an entry by its normalized url, returning whether one was removed
pub fn remove_site(sites: &mut Vec<BlockedSite>, url: &str) -> bool {
    let key = normalize(url);
    let before = sites.len();
    sites.retain(|site| site.key() != key);
    sites.len() != before
}

/// Add every preset site of a category, returning how many were new
pub fn add_preset(sites: &mut Vec<BlockedSite>, category: SiteCategory, now: DateTime<Utc>) -> usize {
    let mut added = 0;
    for url in category.preset_sites() {
        if let Ok(true) = add_site(sites, BlockedSite::new(*url, category, now)) {
            added += 1;
        }
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_scheme_and_path() {
        assert_eq!(normalize("https://Example.com/path/page"), "example.com");
        assert_eq!(normalize("http://example.com"), "example.com");
        assert_eq!(normalize("www.example.com/"), "example.com");
        assert_eq!(normalize("EXAMPLE.COM"), "example.com");
    }

    #[test]
    fn test_normalize_strips_only_one_prefix() {
        assert_eq!(normalize("https://www.example.com"), "www.example.com");
        assert_eq!(normalize("www.www.example.com"), "www.example.com");
    }

    #[test]
    fn test_url_matches_subdomain() {
        assert!(url_matches("m.facebook.com", "facebook.com"));
        assert!(url_matches("https://www.facebook.com/feed", "facebook.com"));
    }

    #[test]
    fn test_url_matches_exact() {
        assert!(url_matches("facebook.com", "facebook.com"));
        assert!(url_matches("10.1.2.3", "10.1.2.3"));
    }

    #[test]
    fn test_url_matches_over_match_is_preserved() {
        assert!(url_matches("facebook.com.evil.net", "facebook.com"));
        assert!(url_matches("notx.com", "x.com"));
    }

    #[test]
    fn test_url_matches_unrelated() {
        assert!(!url_matches("example.com", "facebook.com"));
        assert!(!url_matches("facebook.co", "facebook.com"));
    }

    #[test]
    fn test_url_matches_empty_never_matches() {
        assert!(!url_matches("example.com", ""));
        assert!(!url_matches("", "example.com"));
        assert!(!url_matches("example.com", "https://"));
    }

    #[test]
    fn test_is_valid_url() {
        assert!(is_valid_url("example.com"));
        assert!(is_valid_url("https://www.example.com/x"));
        assert!(is_valid_url("localhost"));
        assert!(is_valid_url("192.168.1.10"));
        assert!(!is_valid_url(""));
        assert!(!is_valid_url("http://"));
        assert!(!is_valid_url("intranet"));
        assert!(!is_valid_url("/path.html"));
    }

    #[test]
    fn test_add_site_deduplicates_on_normalized_url() {
        let now = Utc::now();
        let mut sites = Vec::new();

        assert!(add_site(&mut sites, BlockedSite::new("example.com", SiteCategory::Custom, now)).unwrap());
        assert!(!add_site(&mut sites, BlockedSite::new("https://EXAMPLE.com/", SiteCategory::Custom, now)).unwrap());
        assert_eq!(sites.len(), 1);
    }

    #[test]
    fn test_add_site_rejects_invalid() {
        let mut sites = Vec::new();
        let result = add_site(&mut sites, BlockedSite::new("nodots", SiteCategory::Custom, Utc::now()));
        assert!(result.is_err());
        assert!(sites.is_empty());
    }

    #[test]
    fn test_remove_site() {
        let now = Utc::now();
        let mut sites = vec![
            BlockedSite::new("example.com", SiteCategory::Custom, now),
            BlockedSite::new("reddit.com", SiteCategory::SocialMedia, now),
        ];

        assert!(remove_site(&mut sites, "www.example.com"));
        assert!(!remove_site(&mut sites, "example.com"));
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].url, "reddit.com");
    }

    #[test]
    fn test_add_preset_skips_existing() {
        let now = Utc::now();
        let mut sites = vec![BlockedSite::new("reddit.com", SiteCategory::Custom, now)];

        let added = add_preset(&mut sites, SiteCategory::SocialMedia, now);
        assert_eq!(added, SiteCategory::SocialMedia.preset_sites().len() - 1);
        assert!(sites.iter().skip(1).all(|s| s.category == SiteCategory::SocialMedia));

        assert_eq!(add_preset(&mut sites, SiteCategory::SocialMedia, now), 0);
        assert_eq!(add_preset(&mut sites, SiteCategory::Custom, now), 0);
    }

    #[test]
    fn test_find_match_returns_first_matching_entry() {
        let now = Utc::now();
        let sites = vec![
            BlockedSite::new("example.com", SiteCategory::Custom, now),
            BlockedSite::new("10.9.8.7", SiteCategory::Custom, now),
        ];
        let blocklist = Blocklist::new(&sites);

        assert_eq!(blocklist.find_match("10.9.8.7").map(|s| s.url.as_str()), Some("10.9.8.7"));
        assert!(blocklist.find_match("10.9.8.6").is_none());
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!("social-media".parse::<SiteCategory>().unwrap(), SiteCategory::SocialMedia);
        assert_eq!("ADULT_CONTENT".parse::<SiteCategory>().unwrap(), SiteCategory::AdultContent);
        assert!("nonsense".parse::<SiteCategory>().is_err());
    }

    #[test]
    fn test_blocked_site_schema() {
        let site = BlockedSite {
            url: "example.com".to_string(),
            category: SiteCategory::SocialMedia,
            added_time: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
            times_blocked: 3,
        };

        let json = serde_json::to_value(&site).unwrap();
        assert_eq!(json["url"], "example.com");
        assert_eq!(json["category"], "SOCIAL_MEDIA");
        assert_eq!(json["addedTime"], 1_700_000_000_000i64);
        assert_eq!(json["timesBlocked"], 3);
    }
}
