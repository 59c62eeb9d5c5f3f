//! In-process relevance scoring.
//!
//! Mirrors the provisioned SQL functions: weighted token similarity over the
//! title (A), path (B) and description (C) fields, normalized as `r / (r + 1)`,
//! plus a boost for every field that contains the query verbatim.

use scanvault_core::defaults::{
    EXACT_DESCRIPTION_BOOST, EXACT_NAME_BOOST, EXACT_PATH_BOOST, WEIGHT_DESCRIPTION, WEIGHT_NAME,
    WEIGHT_PATH,
};
use scanvault_core::MatchType;

/// Rank and classification of one matching record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scored {
    pub rank: f32,
    pub match_type: MatchType,
}

/// Lowercased alphanumeric tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// A parsed, non-blank query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryTerms {
    /// Trimmed, lowercased query for substring checks.
    pub needle: String,
    pub tokens: Vec<String>,
}

impl QueryTerms {
    /// `None` for a blank query.
    pub fn parse(query: &str) -> Option<Self> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        Some(Self {
            tokens: tokenize(&needle),
            needle,
        })
    }

    /// Share of query tokens that prefix some token of `field`.
    fn coverage(&self, field: &str) -> f32 {
        if self.tokens.is_empty() {
            return 0.0;
        }
        let field_tokens = tokenize(field);
        let matched = self
            .tokens
            .iter()
            .filter(|q| field_tokens.iter().any(|f| f.starts_with(q.as_str())))
            .count();
        matched as f32 / self.tokens.len() as f32
    }

    fn contained_in(&self, field: &str) -> bool {
        field.to_lowercase().contains(&self.needle)
    }
}

/// Score a record's fields; `None` when nothing matches.
pub fn score(
    terms: &QueryTerms,
    title: Option<&str>,
    path: Option<&str>,
    description: Option<&str>,
) -> Option<Scored> {
    let title = title.unwrap_or_default();
    let path = path.unwrap_or_default();
    let description = description.unwrap_or_default();

    let raw = WEIGHT_NAME * terms.coverage(title)
        + WEIGHT_PATH * terms.coverage(path)
        + WEIGHT_DESCRIPTION * terms.coverage(description);
    let similarity = raw / (raw + 1.0);

    let exact = [
        (terms.contained_in(title), EXACT_NAME_BOOST, MatchType::ExactName),
        (terms.contained_in(path), EXACT_PATH_BOOST, MatchType::ExactPath),
        (
            terms.contained_in(description),
            EXACT_DESCRIPTION_BOOST,
            MatchType::ExactDescription,
        ),
    ];

    let boost: f32 = exact
        .iter()
        .filter(|(hit, _, _)| *hit)
        .map(|(_, boost, _)| boost)
        .sum();
    let match_type = exact
        .iter()
        .find(|(hit, _, _)| *hit)
        .map(|(_, _, match_type)| *match_type);

    match match_type {
        Some(match_type) => Some(Scored {
            rank: similarity + boost,
            match_type,
        }),
        None if raw > 0.0 => Some(Scored {
            rank: similarity,
            match_type: MatchType::Semantic,
        }),
        None => None,
    }
}
