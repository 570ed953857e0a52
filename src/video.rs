use serde::Serialize;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoHost {
    YouTube,
    Vimeo,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VideoEmbed {
    pub host: VideoHost,
    pub video_id: String,
    pub embed_url: String,
}

impl VideoEmbed {
    fn youtube(id: &str) -> Option<Self> {
        if !valid_youtube_id(id) {
            return None;
        }
        Some(Self {
            host: VideoHost::YouTube,
            video_id: id.to_string(),
            embed_url: format!("https://www.youtube.com/embed/{id}"),
        })
    }

    fn vimeo(id: &str) -> Option<Self> {
        if id.is_empty() || !id.chars().all(|ch| ch.is_ascii_digit()) {
            return None;
        }
        Some(Self {
            host: VideoHost::Vimeo,
            video_id: id.to_string(),
            embed_url: format!("https://player.vimeo.com/video/{id}"),
        })
    }
}

fn valid_youtube_id(id: &str) -> bool {
    id.len() == 11
        && id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
}

fn sanitize_url(raw: &str) -> String {
    raw.trim().replace("&amp;", "&")
}

/// Recognizes links to known video hosts and returns the canonical embed URL.
pub fn detect(target: &str) -> Option<VideoEmbed> {
    let cleaned = sanitize_url(target);
    let url = Url::parse(&cleaned).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str()?.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let host = host.strip_prefix("m.").unwrap_or(host);
    let mut segments = url.path_segments()?.filter(|segment| !segment.is_empty());

    match host {
        "youtube.com" | "youtube-nocookie.com" | "music.youtube.com" => {
            match segments.next()? {
                "watch" => url
                    .query_pairs()
                    .find(|(key, _)| key == "v")
                    .and_then(|(_, id)| VideoEmbed::youtube(&id)),
                "shorts" | "embed" | "live" | "v" => VideoEmbed::youtube(segments.next()?),
                _ => None,
            }
        }
        "youtu.be" => VideoEmbed::youtube(segments.next()?),
        "vimeo.com" => VideoEmbed::vimeo(segments.next()?),
        "player.vimeo.com" => match segments.next()? {
            "video" => VideoEmbed::vimeo(segments.next()?),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn youtube_watch_links() {
        let embed = detect("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42").unwrap();
        assert_eq!(embed.host, VideoHost::YouTube);
        assert_eq!(embed.embed_url, "https://www.youtube.com/embed/dQw4w9WgXcQ");
    }

    #[test]
    fn youtube_short_forms() {
        for link in [
            "https://youtu.be/dQw4w9WgXcQ",
            "https://m.youtube.com/shorts/dQw4w9WgXcQ",
            "https://www.youtube.com/embed/dQw4w9WgXcQ?rel=0",
        ] {
            let embed = detect(link).unwrap();
            assert_eq!(embed.video_id, "dQw4w9WgXcQ", "link: {link}");
        }
    }

    #[test]
    fn decodes_html_escaped_queries() {
        let embed = detect("https://www.youtube.com/watch?feature=share&amp;v=dQw4w9WgXcQ").unwrap();
        assert_eq!(embed.video_id, "dQw4w9WgXcQ");
    }

    #[test]
    fn vimeo_links() {
        let embed = detect("https://vimeo.com/76979871").unwrap();
        assert_eq!(embed.host, VideoHost::Vimeo);
        assert_eq!(embed.embed_url, "https://player.vimeo.com/video/76979871");
        assert!(detect("https://vimeo.com/channels/staffpicks").is_none());
    }

    #[test]
    fn rejects_other_links() {
        assert!(detect("https://example.com/watch?v=dQw4w9WgXcQ").is_none());
        assert!(detect("https://www.youtube.com/watch?v=short").is_none());
        assert!(detect("page.html").is_none());
        assert!(detect("javascript:alert(1)").is_none());
    }
}
