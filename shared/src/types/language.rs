//! Language and internationalization types

use serde::{Deserialize, Serialize};

/// Language used for SMS texts sent to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Language {
    #[default]
    #[serde(rename = "en")]
    English,
    #[serde(rename = "ru")]
    Russian,
    #[serde(rename = "uz")]
    Uzbek,
}

impl Language {
    /// Extract language from Accept-Language header
    pub fn from_accept_language(header: &str) -> Self {
        let header_lower = header.to_lowercase();
        let primary = header_lower
            .split(',')
            .next()
            .unwrap_or_default()
            .split(['-', ';'])
            .next()
            .unwrap_or_default()
            .trim();
        primary.parse().unwrap_or_default()
    }

    /// Get language code (ISO 639-1)
    pub fn code(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Russian => "ru",
            Language::Uzbek => "uz",
        }
    }

    /// Get native language name
    pub fn native_name(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Russian => "Русский",
            Language::Uzbek => "O'zbekcha",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en" | "eng" | "english" => Ok(Language::English),
            "ru" | "rus" | "russian" => Ok(Language::Russian),
            "uz" | "uzb" | "uzbek" => Ok(Language::Uzbek),
            _ => Err(format!("Unsupported language: {}", s)),
        }
    }
}
