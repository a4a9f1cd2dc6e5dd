//! Answer languages accepted by the summarizer

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Language the summary should be written in
///
/// `Auto` asks the server to answer in the language of the question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryLanguage {
    #[default]
    Auto,
    Eng,
    Deu,
    Fra,
    Zho,
    Kor,
    Ara,
    Rus,
    Tha,
    Nld,
    Ita,
    Por,
    Spa,
    Jpn,
    Pol,
    Tur,
}

impl SummaryLanguage {
    pub const ALL: [SummaryLanguage; 16] = [
        Self::Auto,
        Self::Eng,
        Self::Deu,
        Self::Fra,
        Self::Zho,
        Self::Kor,
        Self::Ara,
        Self::Rus,
        Self::Tha,
        Self::Nld,
        Self::Ita,
        Self::Por,
        Self::Spa,
        Self::Jpn,
        Self::Pol,
        Self::Tur,
    ];

    /// Wire code sent as `responseLang`
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Eng => "eng",
            Self::Deu => "deu",
            Self::Fra => "fra",
            Self::Zho => "zho",
            Self::Kor => "kor",
            Self::Ara => "ara",
            Self::Rus => "rus",
            Self::Tha => "tha",
            Self::Nld => "nld",
            Self::Ita => "ita",
            Self::Por => "por",
            Self::Spa => "spa",
            Self::Jpn => "jpn",
            Self::Pol => "pol",
            Self::Tur => "tur",
        }
    }

    /// Name shown to people picking a language
    #[must_use]
    pub fn humanize(&self) -> &'static str {
        match self {
            Self::Auto => "Same as query",
            Self::Eng => "English",
            Self::Deu => "German",
            Self::Fra => "French",
            Self::Zho => "Chinese",
            Self::Kor => "Korean",
            Self::Ara => "Arabic",
            Self::Rus => "Russian",
            Self::Tha => "Thai",
            Self::Nld => "Dutch",
            Self::Ita => "Italian",
            Self::Por => "Portuguese",
            Self::Spa => "Spanish",
            Self::Jpn => "Japanese",
            Self::Pol => "Polish",
            Self::Tur => "Turkish",
        }
    }
}

impl fmt::Display for SummaryLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown summary language: {0}")]
pub struct UnknownLanguage(pub String);

impl FromStr for SummaryLanguage {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|lang| lang.code() == wanted)
            .ok_or_else(|| UnknownLanguage(s.to_string()))
    }
}
