//! The catalog's test-type vocabulary.
//!
//! Catalog listings mark each product with one or more single-letter keys. The crawler stores
//! the full label; the LLM extractor produces short phrases ("cognitive ability",
//! "personality test"). Both sides canonicalise through [`TestType::parse`] before matching.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TestType {
    AbilityAptitude,
    BiodataSituational,
    Competencies,
    Development360,
    AssessmentExercises,
    KnowledgeSkills,
    PersonalityBehavior,
    Simulations,
}

/// Normalised phrases that name a catalog key. A phrase must equal one of these after
/// normalisation; partial overlaps ("adaptability", "software development skills") do not
/// count.
const ALIASES: &[(&str, TestType)] = &[
    ("ability & aptitude", TestType::AbilityAptitude),
    ("cognitive ability", TestType::AbilityAptitude),
    ("cognitive", TestType::AbilityAptitude),
    ("aptitude", TestType::AbilityAptitude),
    ("general ability", TestType::AbilityAptitude),
    ("numerical reasoning", TestType::AbilityAptitude),
    ("verbal reasoning", TestType::AbilityAptitude),
    ("inductive reasoning", TestType::AbilityAptitude),
    ("deductive reasoning", TestType::AbilityAptitude),
    ("logical reasoning", TestType::AbilityAptitude),
    ("biodata & situational judgement", TestType::BiodataSituational),
    ("biodata & situational judgment", TestType::BiodataSituational),
    ("situational judgement", TestType::BiodataSituational),
    ("situational judgment", TestType::BiodataSituational),
    ("biodata", TestType::BiodataSituational),
    ("competencies", TestType::Competencies),
    ("competency", TestType::Competencies),
    ("development & 360", TestType::Development360),
    ("360 feedback", TestType::Development360),
    ("assessment exercises", TestType::AssessmentExercises),
    ("knowledge & skills", TestType::KnowledgeSkills),
    ("technical skills", TestType::KnowledgeSkills),
    ("technical knowledge", TestType::KnowledgeSkills),
    ("personality & behavior", TestType::PersonalityBehavior),
    ("personality & behaviour", TestType::PersonalityBehavior),
    ("personality", TestType::PersonalityBehavior),
    ("simulations", TestType::Simulations),
    ("simulation", TestType::Simulations),
];

/// Lowercases, collapses whitespace, spells "and" as "&" and drops a trailing
/// "test"/"tests"/"assessment"/"assessments".
fn normalize_phrase(raw: &str) -> String {
    let lower = raw.to_lowercase();
    let mut words: Vec<&str> = lower
        .split_whitespace()
        .map(|w| if w == "and" { "&" } else { w })
        .collect();
    if words.len() > 1
        && matches!(
            words.last().copied(),
            Some("test" | "tests" | "assessment" | "assessments")
        )
    {
        words.pop();
    }
    words.join(" ")
}

impl TestType {
    pub const ALL: [TestType; 8] = [
        TestType::AbilityAptitude,
        TestType::BiodataSituational,
        TestType::Competencies,
        TestType::Development360,
        TestType::AssessmentExercises,
        TestType::KnowledgeSkills,
        TestType::PersonalityBehavior,
        TestType::Simulations,
    ];

    /// Single-letter key shown in the catalog listing.
    pub fn code(self) -> char {
        match self {
            TestType::AbilityAptitude => 'A',
            TestType::BiodataSituational => 'B',
            TestType::Competencies => 'C',
            TestType::Development360 => 'D',
            TestType::AssessmentExercises => 'E',
            TestType::KnowledgeSkills => 'K',
            TestType::PersonalityBehavior => 'P',
            TestType::Simulations => 'S',
        }
    }

    /// Full catalog label. This is what gets stored in `AssessmentRecord::test_types`.
    pub fn label(self) -> &'static str {
        match self {
            TestType::AbilityAptitude => "Ability & Aptitude",
            TestType::BiodataSituational => "Biodata & Situational Judgement",
            TestType::Competencies => "Competencies",
            TestType::Development360 => "Development & 360",
            TestType::AssessmentExercises => "Assessment Exercises",
            TestType::KnowledgeSkills => "Knowledge & Skills",
            TestType::PersonalityBehavior => "Personality & Behavior",
            TestType::Simulations => "Simulations",
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        let upper = code.to_ascii_uppercase();
        Self::ALL.into_iter().find(|t| t.code() == upper)
    }

    /// Canonicalises a code, a label or a known alias. Anything else is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let mut chars = trimmed.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return Self::from_code(c);
        }

        let phrase = normalize_phrase(trimmed);
        if phrase.is_empty() {
            return None;
        }
        ALIASES
            .iter()
            .find(|(alias, _)| *alias == phrase)
            .map(|(_, t)| *t)
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_letter_codes() {
        assert_eq!(TestType::parse("K"), Some(TestType::KnowledgeSkills));
        assert_eq!(TestType::parse("p"), Some(TestType::PersonalityBehavior));
        assert_eq!(TestType::parse("Z"), None);
    }

    #[test]
    fn test_parse_catalog_labels() {
        for t in TestType::ALL {
            assert_eq!(TestType::parse(t.label()), Some(t), "label {}", t.label());
        }
    }

    #[test]
    fn test_cognitive_ability_maps_to_ability_aptitude() {
        assert_eq!(TestType::parse("cognitive ability"), Some(TestType::AbilityAptitude));
        assert_eq!(TestType::parse("Cognitive Ability Test"), Some(TestType::AbilityAptitude));
        assert_eq!(
            TestType::parse("numerical reasoning"),
            Some(TestType::AbilityAptitude)
        );
    }

    #[test]
    fn test_parse_unknown_phrase_is_none() {
        assert_eq!(TestType::parse("typing speed"), None);
        assert_eq!(TestType::parse("   "), None);
    }

    #[test]
    fn test_overlapping_words_do_not_map() {
        for phrase in [
            "Adaptability",
            "software development skills",
            "behavioral competencies",
            "stability under pressure",
            "skills",
            "test",
        ] {
            assert_eq!(TestType::parse(phrase), None, "{phrase}");
        }
    }

    #[test]
    fn test_parse_accepts_and_spelling_and_suffixes() {
        assert_eq!(
            TestType::parse("Knowledge and Skills"),
            Some(TestType::KnowledgeSkills)
        );
        assert_eq!(
            TestType::parse("personality  assessment"),
            Some(TestType::PersonalityBehavior)
        );
    }
}
