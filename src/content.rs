//! Parsing and cleaning of generated content.
//!
//! The language model is asked for JSON but frequently wraps it in a fenced
//! code block or adds chatter around it. Anything that cannot be turned into
//! the expected shape is a data error: retrying the parse would not help.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use scraper::Html;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::ApiError;
use crate::publisher::Poll;

/// Mastodon's limit for a single poll option.
pub const MAX_POLL_OPTION_CHARS: usize = 50;
/// Mastodon's default limit for the number of poll options.
pub const MAX_POLL_OPTIONS: usize = 4;

const GENERATOR: &str = "OpenAI";

fn pattern(cell: &'static OnceLock<Option<Regex>>, source: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(source).ok()).as_ref()
}

/// `💬` when the job was given a prompt or topic, `🦜` when the parrot made it up.
pub fn status_prefix(prompt: &str) -> &'static str {
    if prompt.trim().is_empty() {
        "🦜"
    } else {
        "💬"
    }
}

/// Finds the JSON document in a generated answer.
///
/// An answer starting with `{` is taken as-is, otherwise the first fenced
/// block is used with its language tag removed.
pub fn extract_json_block(content: &str) -> Option<&str> {
    let trimmed = content.trim();
    if trimmed.starts_with('{') {
        return Some(trimmed);
    }
    static FENCED: OnceLock<Option<Regex>> = OnceLock::new();
    let re = pattern(&FENCED, r"```[A-Za-z0-9_-]*[ \t]*\r?\n?([\s\S]*?)```")?;
    let block = re.captures(trimmed)?.get(1)?.as_str().trim();
    (!block.is_empty()).then_some(block)
}

/// Extracts and deserializes the JSON document of a generated answer.
pub fn parse_json_content<T: DeserializeOwned>(content: &str) -> Result<T, ApiError> {
    let block = extract_json_block(content)
        .ok_or_else(|| ApiError::data(GENERATOR, "No JSON returned from OpenAI"))?;
    serde_json::from_str(block)
        .map_err(|e| ApiError::data(GENERATOR, format!("Invalid JSON returned from OpenAI: {}", e)))
}

/// A generated poll question.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PollContent {
    pub question: String,
    pub answers: Vec<String>,
}

impl PollContent {
    /// Validates the answers and builds the poll attachment.
    pub fn into_poll(self, expires_in: u64) -> Result<(String, Poll), ApiError> {
        let options: Vec<String> = self
            .answers
            .iter()
            .map(|answer| answer.trim())
            .filter(|answer| !answer.is_empty())
            .take(MAX_POLL_OPTIONS)
            .map(|answer| answer.chars().take(MAX_POLL_OPTION_CHARS).collect())
            .collect();
        if options.len() < 2 {
            return Err(ApiError::data(
                GENERATOR,
                format!("Poll needs at least 2 answers, got {}", options.len()),
            ));
        }
        let question = self.question.trim().to_string();
        if question.is_empty() {
            return Err(ApiError::data(GENERATOR, "Poll question is empty"));
        }
        Ok((
            question,
            Poll {
                options,
                expires_in,
            },
        ))
    }
}

/// Generated text for a video template.
#[derive(Debug, Clone, Deserialize)]
pub struct VideoContent {
    #[serde(alias = "story")]
    pub body: Vec<String>,
    #[serde(default, alias = "hashtag")]
    pub hashtags: Option<serde_json::Value>,
    #[serde(default, rename = "introText", alias = "intro_text")]
    pub intro_text: Option<String>,
}

impl VideoContent {
    /// Template modifications: `Text-1..N` for the body lines plus `Intro-Text`.
    pub fn modifications(&self) -> BTreeMap<String, String> {
        let mut modifications: BTreeMap<String, String> = self
            .body
            .iter()
            .enumerate()
            .map(|(i, line)| (format!("Text-{}", i + 1), line.clone()))
            .collect();
        if let Some(intro) = &self.intro_text {
            modifications.insert("Intro-Text".to_string(), intro.clone());
        }
        modifications
    }

    /// Hashtags as a single space separated string, whatever shape the model used.
    pub fn hashtags(&self) -> String {
        match &self.hashtags {
            Some(serde_json::Value::String(tags)) => tags.trim().to_string(),
            Some(serde_json::Value::Array(tags)) => tags
                .iter()
                .filter_map(|tag| tag.as_str())
                .map(|tag| {
                    if tag.starts_with('#') {
                        tag.to_string()
                    } else {
                        format!("#{}", tag)
                    }
                })
                .collect::<Vec<_>>()
                .join(" "),
            _ => String::new(),
        }
    }

    /// All text shown in the video, used as the media description.
    pub fn description(&self) -> String {
        self.modifications()
            .values()
            .cloned()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Removes HTML tags and any character that is not a letter, a mark, ASCII
/// or an emoji, so text-to-speech does not read out symbols.
pub fn sanitize_string(text: &str) -> String {
    let stripped = fragment_text(text).replace('\u{A0}', " ");
    static UNSPEAKABLE: OnceLock<Option<Regex>> = OnceLock::new();
    match pattern(
        &UNSPEAKABLE,
        r"[^\p{L}\p{M}\x00-\x7F\x{10000}-\x{10FFFF}]",
    ) {
        Some(re) => re.replace_all(&stripped, "").into_owned(),
        None => stripped,
    }
}

/// Converts status HTML into plain text.
///
/// Line breaks become `\n` and paragraphs are separated by a blank line.
/// Entities, named or numeric, are decoded by the HTML parser.
pub fn html_to_text(html: &str) -> String {
    static BREAKS: OnceLock<Option<Regex>> = OnceLock::new();
    static PARAGRAPHS: OnceLock<Option<Regex>> = OnceLock::new();

    let mut text = html.to_string();
    if let Some(re) = pattern(&PARAGRAPHS, r"(?i)</p>\s*<p[^>]*>") {
        text = re.replace_all(&text, "\n\n").into_owned();
    }
    if let Some(re) = pattern(&BREAKS, r"(?i)<br\s*/?>") {
        text = re.replace_all(&text, "\n").into_owned();
    }
    fragment_text(&text).trim().to_string()
}

fn fragment_text(html: &str) -> String {
    Html::parse_fragment(html)
        .root_element()
        .text()
        .collect::<String>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_status_prefix() {
        assert_eq!(status_prefix("tell me about otters"), "💬");
        assert_eq!(status_prefix(" "), "🦜");
        assert_eq!(status_prefix(""), "🦜");
    }

    #[test]
    fn test_extract_plain_json() {
        let content = "  {\"question\": \"Tea?\"}  ";
        assert_eq!(extract_json_block(content), Some("{\"question\": \"Tea?\"}"));
    }

    #[test]
    fn test_extract_fenced_json() {
        let content = "Here you go:\n```json\n{\"question\": \"Tea?\"}\n```\nEnjoy!";
        assert_eq!(extract_json_block(content), Some("{\"question\": \"Tea?\"}"));

        let bare = "```\n{\"a\": 1}\n```";
        assert_eq!(extract_json_block(bare), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_missing_json_is_a_data_error() {
        assert_eq!(extract_json_block("no json at all"), None);

        let err = parse_json_content::<PollContent>("no json at all").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Data);

        let err = parse_json_content::<PollContent>("{\"question\": 3}").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Data);
    }

    #[test]
    fn test_poll_content_into_poll() {
        let content: PollContent = parse_json_content(
            r#"```json
{"question": " Best bird? ", "answers": ["Parrot", "Crow", "", "Penguin", "Owl", "Emu"]}
```"#,
        )
        .unwrap();
        let (question, poll) = content.into_poll(3600).unwrap();

        assert_eq!(question, "Best bird?");
        assert_eq!(poll.options, vec!["Parrot", "Crow", "Penguin", "Owl"]);
        assert_eq!(poll.expires_in, 3600);
    }

    #[test]
    fn test_poll_answers_are_truncated_and_validated() {
        let long = PollContent {
            question: "Q".to_string(),
            answers: vec!["x".repeat(80), "y".to_string()],
        };
        let (_, poll) = long.into_poll(60).unwrap();
        assert_eq!(poll.options[0].chars().count(), MAX_POLL_OPTION_CHARS);

        let single = PollContent {
            question: "Q".to_string(),
            answers: vec!["only".to_string()],
        };
        assert_eq!(single.into_poll(60).unwrap_err().kind, ErrorKind::Data);
    }

    #[test]
    fn test_video_content_modifications() {
        let content: VideoContent = parse_json_content(
            r##"{"story": ["one", "two"], "hashtag": ["#facts", "parrots"], "introText": "Hello"}"##,
        )
        .unwrap();

        let modifications = content.modifications();
        assert_eq!(modifications["Text-1"], "one");
        assert_eq!(modifications["Text-2"], "two");
        assert_eq!(modifications["Intro-Text"], "Hello");
        assert_eq!(content.hashtags(), "#facts #parrots");
        assert_eq!(content.description(), "Hello one two");
    }

    #[test]
    fn test_sanitize_string() {
        assert_eq!(sanitize_string("<h1>Hello world</h1>"), "Hello world");
        assert_eq!(sanitize_string("<p>Tom &amp; Jerry</p>"), "Tom & Jerry");
        assert_eq!(sanitize_string(""), "");
        assert_eq!(sanitize_string("Hello world"), "Hello world");
        assert_eq!(sanitize_string("Héllo\u{A0}wörld! 😀 ☃™"), "Héllo wörld! 😀 ");
    }

    #[test]
    fn test_html_to_text() {
        let html = "<p>Hello <a href=\"https://x\">@you</a><br />second &amp; line</p><p>Next</p>";
        assert_eq!(html_to_text(html), "Hello @you\nsecond & line\n\nNext");
    }

    #[test]
    fn test_html_to_text_decodes_entities() {
        assert_eq!(
            html_to_text("<p>It&#8217;s a parrot&#x2019;s &hellip; day</p>"),
            "It\u{2019}s a parrot\u{2019}s \u{2026} day"
        );
        assert_eq!(html_to_text("<p>1 &lt; 2&nbsp;&amp;&quot;3&quot;</p>"), "1 < 2\u{A0}&\"3\"");
    }
}
