use lazy_static::lazy_static;
use regex::Regex;

use crate::models::{ChannelKind, ChannelRecord, RawEntry, NOT_GROUP};

/// URL suffixes that mark an entry as on-demand video
const VIDEO_EXTENSIONS: [&str; 4] = [".mkv", ".avi", ".mp4", ".m3u8"];

lazy_static! {
    /// Episode marker at the very end of a title ("Dark S01E02", "Dark S01 E02")
    static ref SHOW_SUFFIX: Regex = Regex::new(r"S\d{2}\s*E\d{2}$").unwrap();
}

/// Turns tokenized playlist entries into typed channel records
pub struct ContentClassifier;

impl ContentClassifier {
    /// Classify one raw entry; `number` becomes the record's sequence number
    pub fn classify(entry: &RawEntry, number: usize) -> ChannelRecord {
        let title = match entry.attribute("tvg-name") {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => recode_latin1(trailing_title(&entry.description)),
        };

        let logo = entry.attribute("tvg-logo").unwrap_or_default();

        let mut group = recode_latin1(entry.attribute("group-title").unwrap_or_default());
        if group.is_empty() {
            group = NOT_GROUP.to_string();
        }

        let tvg_id = entry.attribute("tvg-id").unwrap_or_default();
        let kind = Self::kind_for(&entry.url, &title);

        ChannelRecord::new(number, title, group, logo, entry.url.as_str(), kind).with_tvg_id(tvg_id)
    }

    /// Live unless the URL points at a video file; video files whose title
    /// ends with an episode marker are shows
    pub fn kind_for(url: &str, title: &str) -> ChannelKind {
        if !VIDEO_EXTENSIONS.iter().any(|ext| url.ends_with(ext)) {
            return ChannelKind::Live;
        }

        if SHOW_SUFFIX.is_match(title) {
            ChannelKind::Show
        } else {
            ChannelKind::Movie
        }
    }
}

/// Free text after the last comma of an `#EXTINF` payload
fn trailing_title(description: &str) -> &str {
    description
        .rsplit_once(',')
        .map_or("", |(_, title)| title)
}

/// Repair text whose UTF-8 bytes were decoded as Latin-1 upstream
///
/// Every char must fit in one byte and the resulting bytes must be valid
/// UTF-8, otherwise the input is returned unchanged.
pub fn recode_latin1(text: &str) -> String {
    if text.is_ascii() {
        return text.to_string();
    }

    let bytes: Option<Vec<u8>> = text
        .chars()
        .map(|c| u8::try_from(u32::from(c)).ok())
        .collect();

    bytes
        .and_then(|b| String::from_utf8(b).ok())
        .unwrap_or_else(|| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn entry(url: &str, attrs: &[(&str, &str)], description: &str) -> RawEntry {
        RawEntry {
            url: url.to_string(),
            attributes: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            description: description.to_string(),
        }
    }

    #[test]
    fn test_title_from_tvg_name_verbatim() {
        let e = entry(
            "http://x/live/1.ts",
            &[("tvg-name", "  Globo HD  ")],
            r#"-1 tvg-name="  Globo HD  ",Other"#,
        );
        assert_eq!(ContentClassifier::classify(&e, 0).title, "  Globo HD  ");
    }

    #[test]
    fn test_title_falls_back_to_trailing_field() {
        let e = entry(
            "http://x/live/1.ts",
            &[("group-title", "News")],
            r#"-1 group-title="News",CNN, International"#,
        );
        // kept verbatim so history keys match exactly
        assert_eq!(ContentClassifier::classify(&e, 0).title, " International");
    }

    #[test]
    fn test_empty_tvg_name_falls_back() {
        let e = entry("http://x/1.ts", &[("tvg-name", "")], "-1 tvg-name=\"\",Canal Teste");
        assert_eq!(ContentClassifier::classify(&e, 0).title, "Canal Teste");
    }

    #[test]
    fn test_fallback_title_is_recoded() {
        let e = entry("http://x/1.ts", &[], "-1,Ação");
        assert_eq!(ContentClassifier::classify(&e, 0).title, "Ação");
    }

    #[test]
    fn test_missing_group_uses_sentinel() {
        let e = entry("http://x/1.ts", &[("tvg-logo", "http://logo/1.png")], "-1,Canal");
        let record = ContentClassifier::classify(&e, 3);
        assert_eq!(record.group, NOT_GROUP);
        assert_eq!(record.logo, "http://logo/1.png");
        assert_eq!(record.number, 3);
        assert_eq!(record.url, "http://x/1.ts");
    }

    #[test]
    fn test_group_is_recoded() {
        let e = entry("http://x/1.ts", &[("group-title", "DocumentÃ¡rios")], "-1,Canal");
        assert_eq!(ContentClassifier::classify(&e, 0).group, "Documentários");
    }

    #[test]
    fn test_kind_live_for_stream_urls() {
        assert_eq!(ContentClassifier::kind_for("http://x/live/1.ts", "Dark S01E02"), ChannelKind::Live);
        assert_eq!(ContentClassifier::kind_for("http://x/live/1", "Globo"), ChannelKind::Live);
    }

    #[test]
    fn test_kind_movie_and_show() {
        assert_eq!(ContentClassifier::kind_for("http://x/movie/1.mp4", "Matrix"), ChannelKind::Movie);
        assert_eq!(ContentClassifier::kind_for("http://x/movie/1.mkv", "Matrix (1999)"), ChannelKind::Movie);
        assert_eq!(ContentClassifier::kind_for("http://x/series/1.mp4", "Dark S01E02"), ChannelKind::Show);
        assert_eq!(ContentClassifier::kind_for("http://x/series/1.avi", "Dark S01 E02"), ChannelKind::Show);
        assert_eq!(ContentClassifier::kind_for("http://x/hls/1.m3u8", "Dark S01E02"), ChannelKind::Show);
    }

    #[test]
    fn test_show_marker_must_end_title() {
        assert_eq!(ContentClassifier::kind_for("http://x/1.mp4", "Dark S01E02 Dublado"), ChannelKind::Movie);
        assert_eq!(ContentClassifier::kind_for("http://x/1.mp4", "Dark S1E2"), ChannelKind::Movie);
        assert_eq!(ContentClassifier::kind_for("http://x/1.mp4", "Dark S001E02"), ChannelKind::Movie);
    }

    #[test]
    fn test_classify_is_deterministic() {
        let e = entry(
            "http://x/series/9.mp4",
            &[("tvg-name", "Dark S02E05"), ("tvg-id", "dark"), ("group-title", "Series")],
            "-1,Dark S02E05",
        );
        let a = ContentClassifier::classify(&e, 9);
        let b = ContentClassifier::classify(&e, 9);
        assert_eq!(a, b);
        assert_eq!(a.kind(), ChannelKind::Show);
        assert_eq!(a.number, b.number);
    }

    #[test]
    fn test_recode_latin1() {
        assert_eq!(recode_latin1("plain"), "plain");
        assert_eq!(recode_latin1("Ã©"), "é");
        // already proper UTF-8 that is not mojibake stays put
        assert_eq!(recode_latin1("é"), "é");
        assert_eq!(recode_latin1("日本"), "日本");
    }
}
