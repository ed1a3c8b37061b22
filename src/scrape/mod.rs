//! Page fetching and best-effort candidate extraction.
//!
//! The third-party page is an untrusted data source whose only contract is
//! "produces zero or more observations or fails". Extraction is heuristic
//! text scanning: strip the markup, keep lines that mention migration, and
//! let the time parser dig the countdown out of whatever noise remains. A
//! fetch failure means "unknown state", never "zero migrations": the
//! caller skips the whole cycle.

use crate::detect::RawObservation;
use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, info};

/// Lines mentioning any of these are migration candidates.
const KEYWORDS: &[&str] = &["migrat", "graduat"];

/// Longest line we consider; anything bigger is layout noise.
const MAX_LINE: usize = 400;

const MAX_NAME: usize = 48;

/// HTTP page fetcher producing raw migration candidates.
pub struct PageFetcher {
    client: reqwest::Client,
    url: String,
}

impl PageFetcher {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self { client, url })
    }

    /// Fetch the page and extract candidates. Timeout and navigation
    /// errors surface as errors; an empty page is not one.
    pub async fn fetch(&self) -> Result<Vec<RawObservation>> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("page fetch failed")?;

        if !resp.status().is_success() {
            bail!("page returned status {}", resp.status());
        }

        let body = resp.text().await.context("failed to read page body")?;
        let observations = extract_observations(&body);
        info!(
            url = %self.url,
            candidates = observations.len(),
            "page scanned"
        );
        Ok(observations)
    }
}

/// Turn a raw HTML body into candidate observations. When nothing
/// structured matches but the page had text, a single fallback
/// observation is emitted so the cycle is observably non-empty.
pub fn extract_observations(body: &str) -> Vec<RawObservation> {
    let now = Utc::now();
    let text = strip_tags(body);
    let mut observations = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.len() > MAX_LINE {
            continue;
        }
        let lower = line.to_lowercase();
        if !KEYWORDS.iter().any(|k| lower.contains(k)) {
            continue;
        }

        let identifier = find_address(line);
        let display_name = candidate_name(line, identifier.as_deref());
        debug!(name = %display_name, line = %line, "migration candidate");
        observations.push(RawObservation::new(
            identifier,
            display_name,
            line,
            Some(line.to_string()),
            now,
        ));
    }

    if observations.is_empty() && !text.trim().is_empty() {
        observations.push(RawObservation::page_fallback(text.trim(), now));
    }

    observations
}

/// Strip markup down to text, one line per element. Script and style
/// bodies are dropped entirely.
pub fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len() / 2);
    let bytes = html.as_bytes();
    // Byte offsets must line up with `html`, so ASCII-only lowering.
    let lower = html.to_ascii_lowercase();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'<' {
            // Skip script/style along with their contents.
            let skipped = ["script", "style"].iter().find_map(|tag| {
                if lower[i + 1..].starts_with(tag) {
                    lower[i..].find(&format!("</{}", tag)).and_then(|close| {
                        lower[i + close..].find('>').map(|gt| i + close + gt + 1)
                    })
                } else {
                    None
                }
            });
            if let Some(next) = skipped {
                i = next;
                continue;
            }
            match html[i..].find('>') {
                Some(gt) => {
                    out.push('\n');
                    i += gt + 1;
                }
                None => break, // truncated tag at end of body
            }
        } else {
            let ch = html[i..].chars().next().unwrap_or('\u{FFFD}');
            out.push(ch);
            i += ch.len_utf8();
        }
    }

    out.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&#39;", "'")
}

/// Find an address-like token: `0x` + 40 hex, or a base58 run of 32-44
/// chars (Solana mint shape). Returns the first match.
pub fn find_address(line: &str) -> Option<String> {
    for token in line.split(|c: char| !c.is_ascii_alphanumeric()) {
        if token.len() == 42
            && token.starts_with("0x")
            && token[2..].bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Some(token.to_string());
        }
        if (32..=44).contains(&token.len()) && token.bytes().all(is_base58) {
            return Some(token.to_string());
        }
    }
    None
}

fn is_base58(b: u8) -> bool {
    b.is_ascii_alphanumeric() && !matches!(b, b'0' | b'O' | b'I' | b'l')
}

/// Best-effort display name: the text before the migration keyword, minus
/// any embedded address, squeezed and truncated.
fn candidate_name(line: &str, identifier: Option<&str>) -> String {
    let lower = line.to_ascii_lowercase();
    let cut = KEYWORDS
        .iter()
        .filter_map(|k| lower.find(k))
        .min()
        .unwrap_or(line.len());

    let mut head = line[..cut].to_string();
    if let Some(id) = identifier {
        head = head.replace(id, " ");
    }
    let name: String = head
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_string();

    if name.is_empty() {
        "unknown".to_string()
    } else if name.len() > MAX_NAME {
        let cut = (0..=MAX_NAME)
            .rev()
            .find(|&i| name.is_char_boundary(i))
            .unwrap_or(0);
        name[..cut].to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_tags() {
        let html = "<html><script>var x = 1;</script><body>\
                    <div>PEPE migrating in 5m</div><style>.a{}</style>\
                    <span>DOGE &amp; friends</span></body></html>";
        let text = strip_tags(html);
        assert!(text.contains("PEPE migrating in 5m"));
        assert!(text.contains("DOGE & friends"));
        assert!(!text.contains("var x"));
        assert!(!text.contains(".a{}"));
    }

    #[test]
    fn test_find_address() {
        assert_eq!(
            find_address("PEPE 7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU 5m"),
            Some("7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU".to_string())
        );
        assert_eq!(
            find_address("pool 0xAbCdEf0123456789abcdef0123456789ABCDEF01 soon"),
            Some("0xAbCdEf0123456789abcdef0123456789ABCDEF01".to_string())
        );
        // 0/O/I/l are not base58; short runs don't qualify.
        assert_eq!(find_address("HELLO0WORLD token 12m"), None);
    }

    #[test]
    fn test_extract_candidates() {
        let html = "<div>PEPE 7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU migrating in 5m</div>\
                    <div>DOGE graduates in 2 hours</div>\
                    <div>unrelated row</div>";
        let obs = extract_observations(html);
        assert_eq!(obs.len(), 2);

        assert_eq!(obs[0].display_name, "PEPE");
        assert_eq!(
            obs[0].identifier.as_deref(),
            Some("7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU")
        );
        assert!(!obs[0].fallback);

        assert_eq!(obs[1].display_name, "DOGE");
        assert_eq!(obs[1].identifier, None);
    }

    #[test]
    fn test_fallback_when_nothing_matches() {
        let obs = extract_observations("<div>just a page about frogs</div>");
        assert_eq!(obs.len(), 1);
        assert!(obs[0].fallback);
    }

    #[test]
    fn test_empty_page_yields_nothing() {
        assert!(extract_observations("").is_empty());
        assert!(extract_observations("<script>x</script>").is_empty());
    }
}
