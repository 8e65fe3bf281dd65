use futures::future::BoxFuture;
use futures::FutureExt;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::{Client, Response};
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_stream::StreamExt;
use tokio_util::io::StreamReader;

use crate::config::Config;
use crate::error::FetchError;
use crate::models::RawEntry;

// Limits for streamed parsing
const MAX_LINE_BYTES: usize = 32 * 1024;
const READ_LINE_TIMEOUT: Duration = Duration::from_secs(10);

lazy_static! {
    /// Regex to parse EXTINF attributes (tvg-id="...", group-title="...", etc)
    static ref ATTR_REGEX: Regex = Regex::new(r#"(\w+(?:-\w+)*)="([^"]*)""#).unwrap();
}

/// Source of raw playlist entries for a refresh cycle
pub trait PlaylistFetcher: Send + Sync {
    /// Fetch and tokenize the playlist at `url`
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<RawEntry>, FetchError>>;
}

/// Parse the payload of an `#EXTINF:` line into a raw entry skeleton
/// Format: #EXTINF:duration tvg-id="..." tvg-name="..." tvg-logo="..." group-title="...",Title
fn parse_extinf(line: &str) -> Option<RawEntry> {
    let content = line.strip_prefix("#EXTINF:")?;

    let header = attribute_header(content);

    let attributes: HashMap<String, String> = ATTR_REGEX
        .captures_iter(header)
        .filter_map(|caps| Some((caps.get(1)?.as_str().to_string(), caps.get(2)?.as_str().to_string())))
        .collect();

    Some(RawEntry {
        url: String::new(),
        attributes,
        description: content.to_string(),
    })
}

/// Text before the first comma outside double quotes
fn attribute_header(content: &str) -> &str {
    let mut in_quotes = false;
    for (i, c) in content.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => return &content[..i],
            _ => {}
        }
    }
    content
}

/// Decode one raw line; bytes that are not UTF-8 are taken as Latin-1
fn decode_line(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(line) => line,
        Err(e) => e.into_bytes().into_iter().map(char::from).collect(),
    }
}

/// Tokenize an M3U playlist read line by line
///
/// Every `#EXTINF` is paired with the next non-comment line. Bare URL lines
/// become entries without metadata.
pub async fn read_entries<R>(mut reader: R) -> Result<Vec<RawEntry>, FetchError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut current_extinf: Option<RawEntry> = None;
    let mut found_header = false;
    let mut entries = Vec::new();

    loop {
        buf.clear();

        let bytes_read = tokio::time::timeout(READ_LINE_TIMEOUT, reader.read_until(b'\n', &mut buf))
            .await
            .map_err(|_| FetchError::ReadTimeout)??;

        if bytes_read == 0 {
            break;
        }

        if buf.len() > MAX_LINE_BYTES {
            return Err(FetchError::LineTooLong(MAX_LINE_BYTES));
        }

        let line = decode_line(std::mem::take(&mut buf));
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        if trimmed.starts_with("#EXTM3U") {
            found_header = true;
            continue;
        }

        if trimmed.starts_with("#EXTINF:") {
            current_extinf = parse_extinf(trimmed);
            continue;
        }

        // Skip non-EXTINF directives (#EXTGRP, #EXTVLCOPT, ...)
        if trimmed.starts_with('#') {
            continue;
        }

        let mut entry = current_extinf.take().unwrap_or_default();
        entry.url = trimmed.to_string();
        entries.push(entry);
    }

    if !found_header {
        return Err(FetchError::MissingHeader);
    }

    Ok(entries)
}

/// Tokenize an in-memory playlist
pub async fn parse_playlist(content: &str) -> Result<Vec<RawEntry>, FetchError> {
    read_entries(content.as_bytes()).await
}

/// Fetches playlists over HTTP(S) with a single request per refresh
pub struct HttpPlaylistFetcher {
    client: Client,
    max_m3u_size_mb: usize,
}

impl HttpPlaylistFetcher {
    pub fn new(user_agent: &str, timeout_ms: u64, max_m3u_size_mb: usize) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_millis(timeout_ms))
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            max_m3u_size_mb,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        Self::new(&config.user_agent, config.fetch_timeout_ms, config.max_m3u_size_mb)
    }

    async fn send(&self, url: &str) -> Result<Response, FetchError> {
        let parsed = url::Url::parse(url)?;
        let resp = self.client.get(parsed).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = match status {
                reqwest::StatusCode::NOT_FOUND => "Playlist not found (404). Check the URL.".to_string(),
                reqwest::StatusCode::FORBIDDEN => "Access denied (403). The playlist may require authentication.".to_string(),
                reqwest::StatusCode::TOO_MANY_REQUESTS => "Too many requests (429). The playlist server is rate limiting.".to_string(),
                _ => {
                    let reason = status.canonical_reason().unwrap_or("Error");
                    format!("HTTP {}: {}", status.as_u16(), reason)
                }
            };
            return Err(FetchError::Status {
                code: status.as_u16(),
                message,
            });
        }

        if let Some(len) = resp.content_length() {
            let max_bytes = (self.max_m3u_size_mb as u64) * 1024 * 1024;
            if len > max_bytes {
                return Err(FetchError::TooLarge {
                    size_mb: len as f64 / 1024f64 / 1024f64,
                    limit_mb: self.max_m3u_size_mb,
                });
            }
            tracing::info!("Playlist size: {:.2} MB", len as f64 / 1024.0 / 1024.0);
        }

        Ok(resp)
    }

    async fn fetch_entries(&self, url: &str) -> Result<Vec<RawEntry>, FetchError> {
        tracing::info!("Fetching playlist: {}", url);

        let response = self.send(url).await?;

        // Stream the response body line by line
        let bytes_stream = response.bytes_stream();
        let stream_reader = StreamReader::new(
            bytes_stream.map(|result| result.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))),
        );

        let entries = read_entries(BufReader::new(stream_reader)).await?;
        tracing::info!("Tokenized {} playlist entries", entries.len());
        Ok(entries)
    }
}

impl PlaylistFetcher for HttpPlaylistFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<RawEntry>, FetchError>> {
        self.fetch_entries(url).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_extinf() {
        let line = r#"#EXTINF:-1 tvg-id="globo" tvg-name="Globo HD" tvg-logo="http://logo.com/globo.png" group-title="TV",Globo HD"#;
        let entry = parse_extinf(line).unwrap();

        assert_eq!(entry.attribute("tvg-id"), Some("globo"));
        assert_eq!(entry.attribute("tvg-name"), Some("Globo HD"));
        assert_eq!(entry.attribute("group-title"), Some("TV"));
        assert!(entry.description.ends_with(",Globo HD"));
    }

    #[test]
    fn test_parse_extinf_minimal() {
        let entry = parse_extinf("#EXTINF:-1,Canal Teste").unwrap();

        assert_eq!(entry.description, "-1,Canal Teste");
        assert!(entry.attributes.is_empty());
        assert!(entry.has_metadata());
    }

    #[test]
    fn test_parse_extinf_rejects_other_lines() {
        assert!(parse_extinf("#EXTGRP:News").is_none());
        assert!(parse_extinf("http://x/1.ts").is_none());
    }

    #[tokio::test]
    async fn test_read_entries_pairs_extinf_with_url() {
        let content = "#EXTM3U x-tvg-url=\"http://epg\"\n\
            #EXTINF:-1 tvg-name=\"Canal1\" group-title=\"TV\",Canal1\n\
            #EXTVLCOPT:http-user-agent=VLC\n\
            http://x/live/1.ts\n\
            \n\
            #EXTINF:-1 group-title=\"Movies\",Matrix\r\n\
            http://x/movie/2.mp4\r\n\
            http://x/bare/3.ts\n";

        let entries = parse_playlist(content).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].url, "http://x/live/1.ts");
        assert_eq!(entries[0].attribute("tvg-name"), Some("Canal1"));
        assert_eq!(entries[1].url, "http://x/movie/2.mp4");
        assert_eq!(entries[1].description, "-1 group-title=\"Movies\",Matrix");
        assert_eq!(entries[2].url, "http://x/bare/3.ts");
        assert!(!entries[2].has_metadata());
    }

    #[test]
    fn test_parse_extinf_keeps_commas_inside_quotes() {
        let line = r#"#EXTINF:-1 tvg-name="Matrix" group-title="Movies, Action",Matrix, Reloaded"#;
        let entry = parse_extinf(line).unwrap();

        assert_eq!(entry.attribute("group-title"), Some("Movies, Action"));
        assert_eq!(entry.attribute("tvg-name"), Some("Matrix"));
        assert_eq!(entry.attributes.len(), 2);
    }

    #[tokio::test]
    async fn test_read_entries_accepts_latin1_lines() {
        let content: &[u8] = b"#EXTM3U\n#EXTINF:-1 group-title=\"Filmes\",A\xe7\xe3o\nhttp://x/1.mp4\n";
        let entries = read_entries(content).await.unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].description, "-1 group-title=\"Filmes\",A\u{e7}\u{e3}o");
        assert_eq!(entries[0].url, "http://x/1.mp4");

        let record = crate::services::classifier::ContentClassifier::classify(&entries[0], 0);
        assert_eq!(record.title, "Ação");
        assert_eq!(record.group, "Filmes");
    }

    #[test]
    fn test_decode_line() {
        assert_eq!(decode_line("Ação".as_bytes().to_vec()), "Ação");
        assert_eq!(decode_line(vec![b'A', 0xe7, 0xe3, b'o']), "Ação");
    }

    #[tokio::test]
    async fn test_read_entries_requires_header() {
        let err = parse_playlist("#EXTINF:-1,Canal\nhttp://x/1.ts\n").await.unwrap_err();
        assert!(matches!(err, FetchError::MissingHeader));
    }

    #[tokio::test]
    async fn test_read_entries_rejects_long_lines() {
        let content = format!("#EXTM3U\n#EXTINF:-1,{}\nhttp://x/1.ts\n", "a".repeat(MAX_LINE_BYTES + 1));
        let err = parse_playlist(&content).await.unwrap_err();
        assert!(matches!(err, FetchError::LineTooLong(_)));
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let fetcher = HttpPlaylistFetcher::new("test", 1_000, 10).unwrap();
        let err = fetcher.fetch("not a url").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
    }
}
