//! Capability types
//!
//! Modalities and languages understood by the gateway.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Kind of text an OCR backend is trained on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    /// Printed documents
    Printed,
    /// Handwritten documents
    Handwritten,
    /// Text in natural scene photographs
    Scenetext,
}

impl Modality {
    /// All modalities, in declaration order
    pub const ALL: [Modality; 3] = [Self::Printed, Self::Handwritten, Self::Scenetext];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Printed => "printed",
            Self::Handwritten => "handwritten",
            Self::Scenetext => "scenetext",
        }
    }
}

impl Default for Modality {
    fn default() -> Self {
        Self::Printed
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Modality {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| GatewayError::InvalidModality(s.to_string()))
    }
}

/// Language of the text in an image, identified by its short code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Hi,
    Mr,
    Ta,
    Te,
    Kn,
    Gu,
    Pa,
    Bn,
    Ml,
    Asa,
    Ori,
    Mni,
    Ur,
    Brx,
    Doi,
    Ks,
    Kok,
    Mai,
    Ne,
    Sa,
    Sat,
    Sd,
}

impl Language {
    /// Every supported language
    pub const ALL: [Language; 23] = [
        Self::En,
        Self::Hi,
        Self::Mr,
        Self::Ta,
        Self::Te,
        Self::Kn,
        Self::Gu,
        Self::Pa,
        Self::Bn,
        Self::Ml,
        Self::Asa,
        Self::Ori,
        Self::Mni,
        Self::Ur,
        Self::Brx,
        Self::Doi,
        Self::Ks,
        Self::Kok,
        Self::Mai,
        Self::Ne,
        Self::Sa,
        Self::Sat,
        Self::Sd,
    ];

    /// Short code used in requests and worker names
    pub fn code(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Hi => "hi",
            Self::Mr => "mr",
            Self::Ta => "ta",
            Self::Te => "te",
            Self::Kn => "kn",
            Self::Gu => "gu",
            Self::Pa => "pa",
            Self::Bn => "bn",
            Self::Ml => "ml",
            Self::Asa => "asa",
            Self::Ori => "ori",
            Self::Mni => "mni",
            Self::Ur => "ur",
            Self::Brx => "brx",
            Self::Doi => "doi",
            Self::Ks => "ks",
            Self::Kok => "kok",
            Self::Mai => "mai",
            Self::Ne => "ne",
            Self::Sa => "sa",
            Self::Sat => "sat",
            Self::Sd => "sd",
        }
    }

    /// Full English name of the language
    pub fn name(&self) -> &'static str {
        match self {
            Self::En => "english",
            Self::Hi => "hindi",
            Self::Mr => "marathi",
            Self::Ta => "tamil",
            Self::Te => "telugu",
            Self::Kn => "kannada",
            Self::Gu => "gujarati",
            Self::Pa => "punjabi",
            Self::Bn => "bengali",
            Self::Ml => "malayalam",
            Self::Asa => "assamese",
            Self::Ori => "oriya",
            Self::Mni => "manipuri",
            Self::Ur => "urdu",
            Self::Brx => "bodo",
            Self::Doi => "dogri",
            Self::Ks => "kashmiri",
            Self::Kok => "konkani",
            Self::Mai => "maithili",
            Self::Ne => "nepali",
            Self::Sa => "sanskrit",
            Self::Sat => "santali",
            Self::Sd => "sindhi",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|l| l.code() == s)
            .ok_or_else(|| GatewayError::InvalidLanguage(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_codes_round_trip() {
        for language in Language::ALL {
            assert_eq!(language.code().parse::<Language>().unwrap(), language);
        }
        assert_eq!(Language::Asa.name(), "assamese");
    }

    #[test]
    fn test_unknown_language_is_invalid() {
        let err = "xx".parse::<Language>().unwrap_err();
        assert!(matches!(err, GatewayError::InvalidLanguage(code) if code == "xx"));

        // Codes are case sensitive, like the worker names built from them
        assert!("EN".parse::<Language>().is_err());
    }

    #[test]
    fn test_modality_parsing() {
        assert_eq!("scenetext".parse::<Modality>().unwrap(), Modality::Scenetext);
        assert!(matches!(
            "scene_text".parse::<Modality>(),
            Err(GatewayError::InvalidModality(_))
        ));
    }

    #[test]
    fn test_serde_matches_codes() {
        let json = serde_json::to_string(&Language::Kok).unwrap();
        assert_eq!(json, "\"kok\"");
        let modality: Modality = serde_json::from_str("\"handwritten\"").unwrap();
        assert_eq!(modality, Modality::Handwritten);
    }
}
