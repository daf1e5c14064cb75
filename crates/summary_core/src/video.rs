use url::Url;

/// Extracts the video id from a watch page URL (`https://*.youtube.com/watch?v=<id>`).
///
/// Returns `None` for anything that is not a watch page or has an empty `v`.
pub fn parse_video_id(page_url: &str) -> Option<String> {
    let url = Url::parse(page_url.trim()).ok()?;
    if url.scheme() != "https" {
        return None;
    }
    let host = url.host_str()?;
    if host != "youtube.com" && !host.ends_with(".youtube.com") {
        return None;
    }
    if !url.path().starts_with("/watch") {
        return None;
    }
    url.query_pairs()
        .find(|(key, _)| key == "v")
        .map(|(_, value)| value.trim().to_string())
        .filter(|vid| !vid.is_empty())
}
