use serde::{Deserialize, Serialize};

/// Off-chain token metadata, uploaded once per launch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub description: String,
    /// Local file path or remote URL.
    pub image: Option<String>,
    pub twitter: Option<String>,
    pub telegram: Option<String>,
    pub website: Option<String>,
    #[serde(default = "default_show_name")]
    pub show_name: bool,
}

fn default_show_name() -> bool {
    true
}

impl TokenMetadata {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            description: description.into(),
            image: None,
            twitter: None,
            telegram: None,
            website: None,
            show_name: true,
        }
    }
}
