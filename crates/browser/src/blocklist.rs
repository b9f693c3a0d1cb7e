//! Static ad-host table for request filtering.
//!
//! List storage is an external concern; this is the compiled-in table the
//! fetch-interception filter consults.

/// Hosts whose requests are aborted when a session requests ad-blocking.
pub(crate) const BLOCKED_AD_HOSTS: &[&str] = &[
    "ad.doubleclick.net",
    "adform.net",
    "adnxs.com",
    "ads.pubmatic.com",
    "adservice.google.com",
    "adsafeprotected.com",
    "amazon-adsystem.com",
    "c.amazon-adsystem.com",
    "casalemedia.com",
    "cdn.taboola.com",
    "criteo.com",
    "criteo.net",
    "doubleclick.net",
    "google-analytics.com",
    "googleadservices.com",
    "googlesyndication.com",
    "googletagmanager.com",
    "googletagservices.com",
    "ib.adnxs.com",
    "moatads.com",
    "openx.net",
    "outbrain.com",
    "pagead2.googlesyndication.com",
    "pixel.quantserve.com",
    "pubmatic.com",
    "quantserve.com",
    "rubiconproject.com",
    "sb.scorecardresearch.com",
    "scorecardresearch.com",
    "secure.adnxs.com",
    "serving-sys.com",
    "ssl.google-analytics.com",
    "static.doubleclick.net",
    "taboola.com",
    "tpc.googlesyndication.com",
    "widgets.outbrain.com",
    "www.google-analytics.com",
    "www.googleadservices.com",
    "www.googletagmanager.com",
    "zedo.com",
];

/// The second `/`-separated segment of a URL, read as the request's domain.
/// For `https://host/path` that is `host`. Kept exactly this loose for
/// compatibility with existing filter semantics.
pub(crate) fn host_segment(url: &str) -> Option<&str> {
    url.split('/').nth(2)
}

/// Whether the request URL's domain appears in the static blocklist.
pub(crate) fn is_blocked(url: &str) -> bool {
    host_segment(url).is_some_and(|host| BLOCKED_AD_HOSTS.contains(&host))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_segment_is_second_slash_segment() {
        assert_eq!(
            host_segment("https://ad.doubleclick.net/ddm/activity"),
            Some("ad.doubleclick.net")
        );
        assert_eq!(host_segment("http://example.com"), Some("example.com"));
        assert_eq!(host_segment("no-scheme-here"), None);
    }

    #[test]
    fn blocklisted_host_is_blocked() {
        assert!(is_blocked("https://ad.doubleclick.net/ddm/activity;src=1"));
        assert!(is_blocked("http://www.google-analytics.com/collect"));
    }

    #[test]
    fn ordinary_host_is_not_blocked() {
        assert!(!is_blocked("https://example.com/index.html"));
        assert!(!is_blocked("https://news.ycombinator.com/"));
    }

    #[test]
    fn unlisted_subdomain_is_not_blocked() {
        // Membership is exact; only listed hosts match.
        assert!(!is_blocked("https://unlisted.doubleclick.net/x"));
    }
}
