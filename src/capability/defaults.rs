//! Built-in capability table
//!
//! Every version the gateway serves is listed literally, so anything else is
//! an unknown version. Versions are grouped by model line; each group shares
//! one set of clauses.

use super::rules::{CapabilityRule, Clause, Constraint};
use super::types::{Language, Modality};

use Language::*;

/// Languages served by the first generation of models
const CORE: &[Language] = &[En, Hi, Mr, Ta, Te, Kn, Gu, Pa, Bn, Ml, Asa, Mni, Ori, Ur];

/// Core languages without English
const INDIC: &[Language] = &[Hi, Mr, Ta, Te, Kn, Gu, Pa, Bn, Ml, Asa, Mni, Ori, Ur];

/// Sanskrit-focused finetunes
const SANSKRIT: &[Language] = &[Sa, Hi, Mr];

/// Eastern script finetunes
const EASTERN: &[Language] = &[Asa, Bn, Mni];

fn clause(modalities: &[Modality], languages: &[Language]) -> Clause {
    Clause {
        modality: Constraint::OneOf(modalities.to_vec()),
        language: Constraint::OneOf(languages.to_vec()),
    }
}

fn printed(languages: &[Language]) -> Vec<Clause> {
    vec![clause(&[Modality::Printed], languages)]
}

fn printed_any_language() -> Vec<Clause> {
    vec![Clause {
        modality: Constraint::OneOf(vec![Modality::Printed]),
        language: Constraint::Any,
    }]
}

/// One exact rule per version, all sharing the same clauses
fn line(versions: &[&str], allow: Vec<Clause>) -> Vec<CapabilityRule> {
    versions
        .iter()
        .map(|version| CapabilityRule::exact(version, allow.clone()))
        .collect()
}

/// The rule table used when no table file is configured
pub fn default_rules() -> Vec<CapabilityRule> {
    use Modality::*;

    [
        line(&["v0"], vec![clause(&[Printed, Handwritten, Scenetext], CORE)]),
        line(&["v1_iitb"], printed(&[Hi, Mr, Sa, Ne, Kok])),
        line(&["v2_iitb"], printed(&[Hi, Mr, Sa, Ne, Kok, Mai, Doi])),
        line(&["v1_pu"], printed(&[Pa])),
        line(
            &["v1_st_iitj"],
            vec![clause(&[Scenetext], &[En, Hi, Mr, Ta, Te, Kn, Gu, Pa, Bn, Ml, Ori])],
        ),
        line(&["lipikar"], printed(INDIC)),
        line(&["v2", "v2_bilingual", "v2_robust", "v2.1_robust"], printed(CORE)),
        line(&["v3_st"], vec![clause(&[Scenetext], CORE)]),
        line(
            &[
                "v3",
                "v3_post",
                "v3_robust",
                "v3.1_robust",
                "v3_bilingual",
                "v3.1_bilingual",
            ],
            printed(CORE),
        ),
        line(&["v4_hw"], vec![clause(&[Handwritten], CORE)]),
        line(
            &["v4", "v4_robust", "v4_bilingual", "v4_robustbilingual"],
            printed(CORE),
        ),
        line(
            &[
                "v4.1",
                "v4.1_robust",
                "v4.1_bilingual",
                "v4.1_robustbilingual",
                "v4.2",
                "v4.2_robust",
                "v4.2_bilingual",
                "v4.2_robustbilingual",
            ],
            printed(CORE),
        ),
        line(
            &["v4.3u", "v4.3u_robust", "v4.3u_bilingual", "v4.3u_robustbilingual"],
            printed(SANSKRIT),
        ),
        line(
            &["v4.4l", "v4.4l_robust", "v4.4l_bilingual", "v4.4l_robustbilingual"],
            printed(INDIC),
        ),
        line(
            &["v4.5u", "v4.5u_robust", "v4.5u_bilingual", "v4.5u_robustbilingual"],
            printed(SANSKRIT),
        ),
        line(&["v4.6_robust"], printed(CORE)),
        line(
            &[
                "v4.7u",
                "v4.7u_robust",
                "v4.8u",
                "v4.8u_robust",
                "v4.9u",
                "v4.9u_robust",
                "v4.10u",
                "v4.10u_robust",
            ],
            printed(SANSKRIT),
        ),
        line(
            &["v4.11l", "v4.11l_robust", "v4.11l_bilingual", "v4.11l_robustbilingual"],
            printed(INDIC),
        ),
        line(&["v4.12u"], printed(SANSKRIT)),
        line(&["v4.13"], printed(CORE)),
        line(&["v4.14u", "v4.14u_robust"], printed(SANSKRIT)),
        line(
            &["v4.15a_robust", "v4.16a_robust", "v4.17a_robust"],
            printed(EASTERN),
        ),
        line(
            &[
                "v5",
                "v5_robust",
                "v5_bilingual",
                "v5_robustbilingual",
                "v5_robuster",
                "v5_robusterbilingual",
            ],
            printed_any_language(),
        ),
        line(
            &["v5_urdu1", "v5_urdu2", "v5_urdu3", "v5_urdur1", "v5_urdur2"],
            printed(&[Ur]),
        ),
        line(
            &[
                "v5.1.1u",
                "v5.1.2u",
                "v5.1.3u",
                "v5.1.1u_robust",
                "v5.1.2u_robust",
                "v5.1.1u_bilingual",
                "v5.1.2u_bilingual",
                "v5.1.3u_bilingual",
                "v5.1.1u_robustbilingual",
                "v5.1.2u_robustbilingual",
            ],
            printed(SANSKRIT),
        ),
        line(&["tesseract", "tesseract_bi"], printed_any_language()),
    ]
    .into_iter()
    .flatten()
    .collect()
}
