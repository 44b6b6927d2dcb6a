//! RSS 2.0 rendering.

use std::borrow::Cow;

use alog_core::{Log, LogUrlBuilder};
use time::format_description::well_known::Rfc2822;

use crate::config::ChannelConfig;
use crate::error::FeedError;

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8" ?>"#;

/// Escapes the five XML special characters.
#[must_use]
pub fn escape_xml(input: &str) -> Cow<'_, str> {
    if !input.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len() + 16);
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Renders logs into a complete RSS document.
#[derive(Debug, Clone)]
pub struct RssRenderer {
    channel: ChannelConfig,
    urls: LogUrlBuilder,
}

impl RssRenderer {
    #[must_use]
    pub fn new(channel: ChannelConfig, urls: LogUrlBuilder) -> Self {
        Self { channel, urls }
    }

    #[must_use]
    pub fn urls(&self) -> &LogUrlBuilder {
        &self.urls
    }

    /// Renders `logs`, which are expected newest first.
    ///
    /// `lastBuildDate` is the creation time of the newest log and is omitted
    /// for an empty channel. A log without hydrated authors has no
    /// canonical URL and is rendered without `<link>`.
    pub fn render(&self, logs: &[Log]) -> Result<String, FeedError> {
        let mut xml = String::with_capacity(512 + logs.len() * 512);
        xml.push_str(XML_DECLARATION);
        xml.push_str(r#"<rss version="2.0"><channel>"#);
        push_element(&mut xml, "title", &self.channel.title);
        push_element(&mut xml, "link", &self.channel.link);
        push_element(&mut xml, "description", &self.channel.description);
        push_element(&mut xml, "copyright", &self.channel.copyright);
        push_element(&mut xml, "ttl", &self.channel.ttl.to_string());

        if let Some(newest) = logs.iter().map(|l| l.created_at).max() {
            push_element(&mut xml, "lastBuildDate", &newest.format(&Rfc2822)?);
        }

        for log in logs {
            self.push_item(&mut xml, log)?;
        }

        xml.push_str("</channel></rss>");
        Ok(xml)
    }

    fn push_item(&self, xml: &mut String, log: &Log) -> Result<(), FeedError> {
        xml.push_str("<item>");
        push_element(xml, "title", &log.title);
        push_element(xml, "description", &log.description);
        xml.push_str(&format!(r#"<guid isPermaLink="false">{:X}</guid>"#, log.id));
        match self.urls.build(log) {
            Some(url) => push_element(xml, "link", &url),
            None => tracing::warn!(log_id = log.id, "log has no authors, omitting link"),
        }
        push_element(xml, "pubDate", &log.created_at.format(&Rfc2822)?);
        xml.push_str("</item>");
        Ok(())
    }
}

fn push_element(xml: &mut String, name: &str, text: &str) {
    xml.push('<');
    xml.push_str(name);
    xml.push('>');
    xml.push_str(&escape_xml(text));
    xml.push_str("</");
    xml.push_str(name);
    xml.push('>');
}

#[cfg(test)]
mod tests {
    use super::*;
    use alog_core::Author;
    use time::macros::datetime;

    fn renderer() -> RssRenderer {
        RssRenderer::new(
            ChannelConfig::default(),
            LogUrlBuilder::new("https://log.ana.st/{handle}/{slug}"),
        )
    }

    fn log(id: i64, title: &str, created_at: time::OffsetDateTime) -> Log {
        Log {
            id,
            title: title.to_string(),
            content: String::new(),
            pre_rendered: String::new(),
            description: "A & B <summary>".to_string(),
            topics: vec![],
            generations: vec![],
            logged_by: vec![7],
            authors: vec![Author {
                id: 7,
                name: "Kim".into(),
                handle: "kim".into(),
            }],
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("plain"), "plain");
        assert!(matches!(escape_xml("plain"), Cow::Borrowed(_)));
        assert_eq!(
            escape_xml(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &apos;Jerry&apos;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_empty_channel() {
        let xml = renderer().render(&[]).unwrap();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<title>Analog</title>"));
        assert!(xml.contains("<ttl>60</ttl>"));
        assert!(!xml.contains("lastBuildDate"));
        assert!(!xml.contains("<item>"));
        assert!(xml.ends_with("</channel></rss>"));
    }

    #[test]
    fn test_items() {
        let logs = vec![
            log(255, "Second <Post>", datetime!(2026-03-02 09:00 UTC)),
            log(1, "Help Me", datetime!(2026-03-01 09:00 UTC)),
        ];
        let xml = renderer().render(&logs).unwrap();

        assert!(xml.contains("<lastBuildDate>Mon, 02 Mar 2026 09:00:00 +0000</lastBuildDate>"));
        assert!(xml.contains("<title>Second &lt;Post&gt;</title>"));
        assert!(xml.contains("<description>A &amp; B &lt;summary&gt;</description>"));
        assert!(xml.contains(r#"<guid isPermaLink="false">FF</guid>"#));
        assert!(xml.contains("<link>https://log.ana.st/kim/Help-Me-1</link>"));
        assert!(xml.contains("<pubDate>Sun, 01 Mar 2026 09:00:00 +0000</pubDate>"));
        assert_eq!(xml.matches("<item>").count(), 2);

        let first = xml.find("Second").unwrap();
        let second = xml.find("Help Me").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_item_without_authors_has_no_link() {
        let mut entry = log(3, "Orphan", datetime!(2026-03-01 09:00 UTC));
        entry.authors.clear();
        let xml = renderer().render(&[entry]).unwrap();
        assert!(xml.contains("<title>Orphan</title>"));
        assert!(!xml.contains("Orphan-3"));
    }
}
