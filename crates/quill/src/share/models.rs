//! Share data models.

use serde::{Deserialize, Serialize};

/// A social platform a finalized answer can be posted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitter,
    Linkedin,
    Facebook,
    Reddit,
}

impl Platform {
    /// Human-readable platform name for notices.
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Twitter => "Twitter",
            Platform::Linkedin => "LinkedIn",
            Platform::Facebook => "Facebook",
            Platform::Reddit => "Reddit",
        }
    }

    /// Build the web share-intent URL for this platform from the formatted
    /// post text and an optional session link.
    pub fn intent_url(&self, text: &str, link: Option<&str>) -> String {
        let text_enc = urlencoding::encode(text);
        match self {
            Platform::Twitter => match link {
                Some(link) => format!(
                    "https://twitter.com/intent/tweet?text={text_enc}&url={}",
                    urlencoding::encode(link)
                ),
                None => format!("https://twitter.com/intent/tweet?text={text_enc}"),
            },
            Platform::Linkedin => match link {
                Some(link) => format!(
                    "https://www.linkedin.com/sharing/share-offsite/?url={}",
                    urlencoding::encode(link)
                ),
                None => format!("https://www.linkedin.com/feed/?shareActive=true&text={text_enc}"),
            },
            Platform::Facebook => match link {
                Some(link) => format!(
                    "https://www.facebook.com/sharer/sharer.php?u={}&quote={text_enc}",
                    urlencoding::encode(link)
                ),
                None => format!("https://www.facebook.com/sharer/sharer.php?quote={text_enc}"),
            },
            Platform::Reddit => {
                let title: String = text.chars().take(120).collect();
                let title_enc = urlencoding::encode(&title);
                match link {
                    Some(link) => format!(
                        "https://www.reddit.com/submit?url={}&title={title_enc}",
                        urlencoding::encode(link)
                    ),
                    None => format!(
                        "https://www.reddit.com/submit?title={title_enc}&selftext={text_enc}"
                    ),
                }
            }
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Twitter => write!(f, "twitter"),
            Platform::Linkedin => write!(f, "linkedin"),
            Platform::Facebook => write!(f, "facebook"),
            Platform::Reddit => write!(f, "reddit"),
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "twitter" | "x" => Ok(Platform::Twitter),
            "linkedin" => Ok(Platform::Linkedin),
            "facebook" => Ok(Platform::Facebook),
            "reddit" => Ok(Platform::Reddit),
            _ => Err(format!("unknown platform: {s}")),
        }
    }
}

/// Formatted post content: a single post or a thread of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PreviewContent {
    Single(String),
    Thread(Vec<String>),
}

impl PreviewContent {
    /// Full text of the post(s), thread segments joined with blank lines.
    pub fn joined(&self) -> String {
        match self {
            PreviewContent::Single(text) => text.clone(),
            PreviewContent::Thread(parts) => parts.join("\n\n"),
        }
    }
}

/// Platform-specific rendering of an answer, produced by the formatting
/// backend. Cached per (message, platform) for the process lifetime; never
/// stale because finalized content never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharePreview {
    pub platform: Platform,
    pub content: PreviewContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_count: Option<u32>,
    #[serde(default)]
    pub hashtags: Vec<String>,
}

/// Transient state of converting one assistant message into a social post.
/// Exactly one instance is active; switching message or platform replaces it.
#[derive(Debug, Clone)]
pub struct ShareSession {
    pub message_id: String,
    pub platform: Platform,
    pub preview: Option<SharePreview>,
    pub loading: bool,
    pub posting: bool,
    pub link_loading: bool,
    pub error: Option<String>,
    pub success: Option<String>,
}

impl ShareSession {
    pub fn new(message_id: &str, platform: Platform) -> Self {
        Self {
            message_id: message_id.to_string(),
            platform,
            preview: None,
            loading: false,
            posting: false,
            link_loading: false,
            error: None,
            success: None,
        }
    }
}
