// Concrete content extraction behind the `MessageParser` boundary.
//
// Feed pages are messy, repetitive HTML; a handful of regexes over known
// markers beats a full DOM parser here and tolerates broken markup the same
// way: a block that cannot be extracted is skipped, not fatal.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use tracing::{debug, warn};

use feedscout_common::error::ParseError;
use feedscout_common::types::{Message, SourceId};

use crate::traits::MessageParser;

pub struct FeedPageParser {
    block_open: Regex,
    post_id: Regex,
    text_div: Regex,
    author: Regex,
    datetime_attr: Regex,
    views: Regex,
    reaction: Regex,
    tag: Regex,
    whitespace: Regex,
    compact_count: Regex,
    mention: Regex,
    hashtag: Regex,
    url: Regex,
}

impl Default for FeedPageParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedPageParser {
    pub fn new() -> Self {
        Self {
            block_open: Regex::new(r#"<div[^>]*class="[^"]*feed-message[^"]*"[^>]*>"#)
                .expect("Invalid message block regex"),
            post_id: Regex::new(r#"data-post-id="(\d+)""#).expect("Invalid post id regex"),
            text_div: Regex::new(r#"(?s)<div[^>]*class="[^"]*text[^"]*"[^>]*>(.*?)</div>"#)
                .expect("Invalid text regex"),
            author: Regex::new(r#"(?s)<(?:a|div|span)[^>]*class="[^"]*(?:author|from)[^"]*"[^>]*>(.*?)</(?:a|div|span)>"#)
                .expect("Invalid author regex"),
            datetime_attr: Regex::new(r#"<time[^>]*datetime="([^"]+)""#)
                .expect("Invalid datetime regex"),
            views: Regex::new(r#"(?s)<span[^>]*class="[^"]*views[^"]*"[^>]*>(.*?)</span>"#)
                .expect("Invalid views regex"),
            reaction: Regex::new(r#"(?s)<span[^>]*class="[^"]*reaction[^"]*"[^>]*>(.*?)</span>"#)
                .expect("Invalid reaction regex"),
            tag: Regex::new(r"<[^>]+>").expect("Invalid tag regex"),
            whitespace: Regex::new(r"\s+").expect("Invalid whitespace regex"),
            compact_count: Regex::new(r"([\d.,]+)\s*([KMB])?").expect("Invalid count regex"),
            mention: Regex::new(r"@([A-Za-z0-9_]+)").expect("Invalid mention regex"),
            hashtag: Regex::new(r"#([A-Za-z0-9_]+)").expect("Invalid hashtag regex"),
            url: Regex::new(r"https?://[^\s<]+").expect("Invalid URL regex"),
        }
    }

    /// Strip markup and collapse whitespace into single spaces.
    fn clean_text(&self, html: &str) -> String {
        let stripped = self.tag.replace_all(html, " ");
        let decoded = decode_entities(&stripped);
        self.whitespace.replace_all(&decoded, " ").trim().to_string()
    }

    /// Parse a human-abbreviated count: "10.5K" is 10500, "2M" is 2000000,
    /// "1,234" is 1234. Unparseable text counts as zero.
    fn parse_compact_count(&self, text: &str) -> u64 {
        let Some(captures) = self.compact_count.captures(text) else {
            return 0;
        };
        let number: f64 = match captures[1].replace(',', "").parse() {
            Ok(n) => n,
            Err(_) => return 0,
        };
        let multiplier = match captures.get(2).map(|m| m.as_str()) {
            Some("K") => 1_000.0,
            Some("M") => 1_000_000.0,
            Some("B") => 1_000_000_000.0,
            _ => 1.0,
        };
        (number * multiplier) as u64
    }

    /// ISO-8601 (with or without offset) or a unix timestamp.
    fn parse_timestamp(&self, raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
            return Some(Utc.from_utc_datetime(&naive));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
            return Some(Utc.from_utc_datetime(&naive));
        }
        if let Ok(unix) = raw.parse::<i64>() {
            return Utc.timestamp_opt(unix, 0).single();
        }
        None
    }

    /// First-occurrence-ordered unique captures of `pattern` group 1.
    fn extract_unique(&self, pattern: &Regex, text: &str) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for captures in pattern.captures_iter(text) {
            let value = captures
                .get(1)
                .map_or_else(|| captures[0].to_string(), |m| m.as_str().to_string());
            if seen.insert(value.clone()) {
                out.push(value);
            }
        }
        out
    }

    fn parse_block(&self, block: &str, index: usize, source: &SourceId) -> Option<Message> {
        let text = match self.text_div.captures(block) {
            Some(captures) => self.clean_text(&captures[1]),
            None => String::new(),
        };
        if text.is_empty() {
            warn!(source = %source, index, "Skipping message block with no text");
            return None;
        }

        let id = self
            .post_id
            .captures(block)
            .map_or_else(|| index.to_string(), |c| c[1].to_string());

        let author = self
            .author
            .captures(block)
            .map(|c| self.clean_text(&c[1]))
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| "unknown".to_string());

        let timestamp = self
            .datetime_attr
            .captures(block)
            .and_then(|c| self.parse_timestamp(&c[1]))
            .unwrap_or_else(|| {
                warn!(source = %source, id, "Message has no parseable timestamp");
                Utc::now()
            });

        let views = self
            .views
            .captures(block)
            .map_or(0, |c| self.parse_compact_count(&self.clean_text(&c[1])));

        let reactions = self
            .reaction
            .captures_iter(block)
            .map(|c| self.parse_compact_count(&self.clean_text(&c[1])))
            .sum();

        Some(Message {
            id,
            source_id: source.clone(),
            mentions: self.extract_unique(&self.mention, &text),
            hashtags: self.extract_unique(&self.hashtag, &text),
            urls: self.url.find_iter(&text).fold(Vec::new(), |mut urls, m| {
                if !urls.iter().any(|u| u == m.as_str()) {
                    urls.push(m.as_str().to_string());
                }
                urls
            }),
            edited: block.contains(r#"class="edited""#),
            pinned: block.contains(r#"class="pinned""#),
            text,
            author,
            timestamp,
            views,
            reactions,
        })
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

#[async_trait]
impl MessageParser for FeedPageParser {
    async fn parse(
        &self,
        content: &[u8],
        source: &SourceId,
    ) -> Result<Vec<Message>, ParseError> {
        let html = std::str::from_utf8(content)
            .map_err(|e| ParseError::Invalid(format!("content is not valid UTF-8: {e}")))?;
        if html.trim().is_empty() {
            return Err(ParseError::EmptyText);
        }

        // Blocks run from each open marker to the next; feed markup is not
        // nested, so balanced-tag tracking buys nothing here.
        let starts: Vec<usize> = self.block_open.find_iter(html).map(|m| m.start()).collect();
        let mut messages = Vec::with_capacity(starts.len());
        for (index, &start) in starts.iter().enumerate() {
            let end = starts.get(index + 1).copied().unwrap_or(html.len());
            if let Some(message) = self.parse_block(&html[start..end], index, source) {
                messages.push(message);
            }
        }

        debug!(
            source = %source,
            blocks = starts.len(),
            messages = messages.len(),
            "Parsed feed page"
        );
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> SourceId {
        SourceId::new("https://example.org/feed")
    }

    fn page(blocks: &str) -> String {
        format!("<html><body><div class=\"feed\">{blocks}</div></body></html>")
    }

    const FULL_MESSAGE: &str = r#"
        <div class="feed-message" data-post-id="42">
          <div class="from">Tech Desk</div>
          <time datetime="2025-06-15T09:30:00Z"></time>
          <div class="text">Big <b>rust</b> release today #rust #news @core_team
            details at https://example.org/post &amp; more</div>
          <span class="views">10.5K</span>
          <span class="reaction">1.2K</span>
          <span class="reaction">300</span>
        </div>"#;

    #[tokio::test]
    async fn extracts_a_full_message() {
        let html = page(FULL_MESSAGE);
        let messages = FeedPageParser::new()
            .parse(html.as_bytes(), &source())
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);

        let message = &messages[0];
        assert_eq!(message.id, "42");
        assert_eq!(message.author, "Tech Desk");
        assert_eq!(
            message.text,
            "Big rust release today #rust #news @core_team details at https://example.org/post & more"
        );
        assert_eq!(message.views, 10_500);
        assert_eq!(message.reactions, 1_500);
        assert_eq!(message.hashtags, vec!["rust", "news"]);
        assert_eq!(message.mentions, vec!["core_team"]);
        assert_eq!(message.urls, vec!["https://example.org/post"]);
        assert_eq!(
            message.timestamp,
            Utc.with_ymd_and_hms(2025, 6, 15, 9, 30, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn blocks_without_text_are_skipped() {
        let html = page(
            r#"<div class="feed-message" data-post-id="1"><div class="text">kept</div></div>
               <div class="feed-message" data-post-id="2"><span class="views">5</span></div>"#,
        );
        let messages = FeedPageParser::new()
            .parse(html.as_bytes(), &source())
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, "1");
    }

    #[tokio::test]
    async fn page_without_message_blocks_is_an_empty_feed() {
        let html = page("<p>nothing here</p>");
        let messages = FeedPageParser::new()
            .parse(html.as_bytes(), &source())
            .await
            .unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn empty_content_is_an_error() {
        let err = FeedPageParser::new()
            .parse(b"   ", &source())
            .await
            .unwrap_err();
        assert!(matches!(err, ParseError::EmptyText));
    }

    #[tokio::test]
    async fn non_utf8_content_is_invalid() {
        let err = FeedPageParser::new()
            .parse(&[0xff, 0xfe, 0x00], &source())
            .await
            .unwrap_err();
        assert!(matches!(err, ParseError::Invalid(_)));
    }

    #[tokio::test]
    async fn missing_post_id_falls_back_to_block_index() {
        let html = page(
            r#"<div class="feed-message"><div class="text">first</div></div>
               <div class="feed-message"><div class="text">second</div></div>"#,
        );
        let messages = FeedPageParser::new()
            .parse(html.as_bytes(), &source())
            .await
            .unwrap();
        assert_eq!(messages[0].id, "0");
        assert_eq!(messages[1].id, "1");
    }

    #[tokio::test]
    async fn edited_and_pinned_markers_are_detected() {
        let html = page(
            r#"<div class="feed-message">
                 <div class="text">note</div>
                 <span class="edited">edited</span>
                 <span class="pinned">pinned</span>
               </div>"#,
        );
        let messages = FeedPageParser::new()
            .parse(html.as_bytes(), &source())
            .await
            .unwrap();
        assert!(messages[0].edited);
        assert!(messages[0].pinned);
    }

    #[tokio::test]
    async fn tags_and_mentions_are_deduplicated_in_order() {
        let html = page(
            r#"<div class="feed-message">
                 <div class="text">#b #a #b @x @y @x https://a.example https://a.example</div>
               </div>"#,
        );
        let messages = FeedPageParser::new()
            .parse(html.as_bytes(), &source())
            .await
            .unwrap();
        assert_eq!(messages[0].hashtags, vec!["b", "a"]);
        assert_eq!(messages[0].mentions, vec!["x", "y"]);
        assert_eq!(messages[0].urls, vec!["https://a.example"]);
    }

    #[test]
    fn compact_counts_cover_the_suffixes() {
        let parser = FeedPageParser::new();
        assert_eq!(parser.parse_compact_count("10.5K"), 10_500);
        assert_eq!(parser.parse_compact_count("2M"), 2_000_000);
        assert_eq!(parser.parse_compact_count("1B"), 1_000_000_000);
        assert_eq!(parser.parse_compact_count("1,234"), 1_234);
        assert_eq!(parser.parse_compact_count("987"), 987);
        assert_eq!(parser.parse_compact_count("no digits"), 0);
    }

    #[test]
    fn unix_timestamps_parse() {
        let parser = FeedPageParser::new();
        let parsed = parser.parse_timestamp("1750000000").unwrap();
        assert_eq!(parsed.timestamp(), 1_750_000_000);
        assert!(parser.parse_timestamp("not a time").is_none());
    }
}
