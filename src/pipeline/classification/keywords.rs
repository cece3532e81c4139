//! Category keyword table and the substring scorer.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::CategoryLabel;
use crate::pipeline::extraction::clean_text;

/// Keywords longer than this (in characters) weigh double.
pub const LONG_KEYWORD_CHARS: usize = 5;

#[derive(Error, Debug)]
pub enum KeywordTableError {
    #[error("Failed to read keyword table {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid keyword table JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Category {0} listed more than once")]
    DuplicateCategory(CategoryLabel),

    #[error("The fallback category {0} cannot carry keywords")]
    FallbackHasKeywords(CategoryLabel),

    #[error("Empty keyword in category {category} (entry {position})")]
    EmptyKeyword {
        category: CategoryLabel,
        position: usize,
    },
}

/// A normalized keyword and the weight each occurrence contributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyword {
    pub text: String,
    pub weight: u32,
}

impl Keyword {
    /// Normalize through `clean_text` and derive the weight from length.
    fn new(raw: &str) -> Self {
        let text = clean_text(raw);
        let weight = if text.chars().count() > LONG_KEYWORD_CHARS { 2 } else { 1 };
        Self { text, weight }
    }
}

/// One category's entry in a keyword table file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryKeywords {
    pub category: CategoryLabel,
    pub keywords: Vec<String>,
}

/// Category -> keywords, in category order. Read-only after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordTable {
    // Indexed by `CategoryLabel::index()`.
    keywords: Vec<Vec<Keyword>>,
}

const DEFAULT_TABLE: &[(CategoryLabel, &[&str])] = &[
    (
        CategoryLabel::Facture,
        &[
            "facture", "invoice", "total ttc", "ttc", "tva", "paiement", "virement", "montant",
            "échéance", "net à payer", "hors taxe", "billed to", "payment", "due date",
            "quantity", "price", "prix",
        ],
    ),
    (
        CategoryLabel::Contrat,
        &[
            "contrat", "contrat de travail", "signature", "parties", "fait à", "clause",
            "article", "engagement", "durée", "résiliation", "soussigné", "prestataire",
        ],
    ),
    (
        CategoryLabel::BonCommande,
        &[
            "bon de commande", "commande", "livraison", "quantité", "référence", "fournisseur",
            "purchase order", "bon de livraison", "désignation", "prix unitaire",
        ],
    ),
    (
        CategoryLabel::Administratif,
        &[
            "attestation", "préfecture", "mairie", "formulaire", "cerfa", "dossier", "impôts",
            "allocation", "administration", "carte nationale d'identité", "passeport",
            "nationalité", "naissance",
        ],
    ),
    (
        CategoryLabel::Rapport,
        &[
            "rapport", "analyse", "conclusion", "synthèse", "résultats", "recommandations",
            "étude", "bilan", "compte rendu", "objectifs", "annexe",
        ],
    ),
    (
        CategoryLabel::CvLettre,
        &[
            "expérience", "experience", "profil", "formation", "compétences", "curriculum",
            "centres d'intérêt", "lettre de motivation", "cordialement", "langues", "loisirs",
            "madame", "monsieur",
        ],
    ),
    (
        CategoryLabel::Academique,
        &[
            "université", "diplôme", "relevé de notes", "semestre", "étudiant", "mémoire",
            "thèse", "licence", "master", "baccalauréat", "scolarité", "examen",
        ],
    ),
    (
        CategoryLabel::Juridique,
        &[
            "tribunal", "jugement", "avocat", "juridiction", "code civil", "plaignant",
            "défendeur", "huissier", "cour d'appel", "mise en demeure", "assignation", "greffe",
        ],
    ),
    (
        CategoryLabel::Medical,
        &[
            "ordonnance", "médical", "aptitude", "docteur", "patient", "posologie",
            "diagnostic", "traitement", "médecin", "consultation", "mutuelle",
            "certificat médical", "pharmacie",
        ],
    ),
];

impl Default for KeywordTable {
    fn default() -> Self {
        let mut keywords = vec![Vec::new(); CategoryLabel::ALL.len()];
        for (category, words) in DEFAULT_TABLE {
            keywords[category.index()] = words.iter().map(|w| Keyword::new(w)).collect();
        }
        Self { keywords }
    }
}

impl KeywordTable {
    /// Build a validated table. Categories absent from `entries` get no
    /// keywords; duplicate keywords within a category are collapsed.
    pub fn from_entries(entries: Vec<CategoryKeywords>) -> Result<Self, KeywordTableError> {
        let mut keywords: Vec<Option<Vec<Keyword>>> = vec![None; CategoryLabel::ALL.len()];

        for entry in entries {
            let category = entry.category;
            if keywords[category.index()].is_some() {
                return Err(KeywordTableError::DuplicateCategory(category));
            }
            if category.is_fallback() && !entry.keywords.is_empty() {
                return Err(KeywordTableError::FallbackHasKeywords(category));
            }

            let mut normalized: Vec<Keyword> = Vec::with_capacity(entry.keywords.len());
            for (position, raw) in entry.keywords.iter().enumerate() {
                let keyword = Keyword::new(raw);
                if keyword.text.is_empty() {
                    return Err(KeywordTableError::EmptyKeyword { category, position });
                }
                if !normalized.iter().any(|k| k.text == keyword.text) {
                    normalized.push(keyword);
                }
            }
            keywords[category.index()] = Some(normalized);
        }

        Ok(Self {
            keywords: keywords.into_iter().map(Option::unwrap_or_default).collect(),
        })
    }

    /// Parse the JSON list form: `[{"category": "FACTURE", "keywords": [...]}]`.
    pub fn from_json(json: &str) -> Result<Self, KeywordTableError> {
        let entries: Vec<CategoryKeywords> = serde_json::from_str(json)?;
        Self::from_entries(entries)
    }

    pub fn load(path: &Path) -> Result<Self, KeywordTableError> {
        let json = std::fs::read_to_string(path).map_err(|source| KeywordTableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::from_json(&json)?;
        tracing::info!(
            path = %path.display(),
            keywords = table.keyword_count(),
            "Loaded keyword table"
        );
        Ok(table)
    }

    pub fn keywords(&self, category: CategoryLabel) -> &[Keyword] {
        &self.keywords[category.index()]
    }

    pub fn keyword_count(&self) -> usize {
        self.keywords.iter().map(Vec::len).sum()
    }

    /// Score cleaned text. Every occurrence of a keyword, overlapping ones
    /// included, adds its weight to that keyword's category.
    pub fn score(&self, clean: &str) -> CategoryScores {
        let mut scores = [0u32; CATEGORY_COUNT];
        if clean.is_empty() {
            return CategoryScores { scores };
        }

        for (index, keywords) in self.keywords.iter().enumerate() {
            scores[index] = keywords
                .iter()
                .map(|k| count_overlapping(clean, &k.text) as u32 * k.weight)
                .sum();
        }
        CategoryScores { scores }
    }

    /// Serializable list form, in category order.
    pub fn to_entries(&self) -> Vec<CategoryKeywords> {
        CategoryLabel::ALL
            .iter()
            .filter(|c| !c.is_fallback())
            .map(|&category| CategoryKeywords {
                category,
                keywords: self
                    .keywords(category)
                    .iter()
                    .map(|k| k.text.clone())
                    .collect(),
            })
            .collect()
    }
}

const CATEGORY_COUNT: usize = 10;

/// Dense per-category scores. `AUTRE` is always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryScores {
    scores: [u32; CATEGORY_COUNT],
}

impl CategoryScores {
    pub fn get(&self, category: CategoryLabel) -> u32 {
        self.scores[category.index()]
    }

    pub fn total(&self) -> u32 {
        self.scores.iter().sum()
    }

    /// Highest-scoring category; ties go to the earliest in category order.
    pub fn best(&self) -> (CategoryLabel, u32) {
        CategoryLabel::ALL
            .iter()
            .map(|&c| (c, self.get(c)))
            .fold((CategoryLabel::ALL[0], 0), |best, candidate| {
                if candidate.1 > best.1 {
                    candidate
                } else {
                    best
                }
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = (CategoryLabel, u32)> + '_ {
        CategoryLabel::ALL.iter().map(|&c| (c, self.get(c)))
    }
}

fn count_overlapping(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    let mut count = 0;
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(needle) {
        count += 1;
        let at = start + pos;
        // Advance by one character so overlapping matches are counted.
        start = at + haystack[at..].chars().next().map_or(1, char::len_utf8);
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_count_matches_enum() {
        assert_eq!(CATEGORY_COUNT, CategoryLabel::ALL.len());
    }

    #[test]
    fn default_table_covers_every_category_but_fallback() {
        let table = KeywordTable::default();
        for &category in CategoryLabel::ALL {
            assert_eq!(
                table.keywords(category).is_empty(),
                category.is_fallback(),
                "{category}"
            );
        }
    }

    #[test]
    fn default_keywords_are_clean() {
        let table = KeywordTable::default();
        for &category in CategoryLabel::ALL {
            for keyword in table.keywords(category) {
                assert_eq!(clean_text(&keyword.text), keyword.text);
                assert!(!keyword.text.is_empty());
            }
        }
    }

    #[test]
    fn weight_follows_length() {
        assert_eq!(Keyword::new("tva").weight, 1);
        assert_eq!(Keyword::new("fait à").weight, 2); // six characters
        assert_eq!(Keyword::new("prix").weight, 1);
        assert_eq!(Keyword::new("master").weight, 2);
        assert_eq!(Keyword::new("Cour d'appel").text, "cour d appel");
    }

    #[test]
    fn counts_overlapping_occurrences() {
        assert_eq!(count_overlapping("aaaa", "aa"), 3);
        assert_eq!(count_overlapping("facture facture", "facture"), 2);
        assert_eq!(count_overlapping("éé", "é"), 2);
        assert_eq!(count_overlapping("abc", ""), 0);
        assert_eq!(count_overlapping("", "abc"), 0);
    }

    #[test]
    fn scores_invoice() {
        let table = KeywordTable::default();
        let scores = table.score(&clean_text(
            "FACTURE N°12345 TOTAL TTC 100€ TVA 20% PAIEMENT PAR VIREMENT",
        ));
        // facture 2 + total ttc 2 + ttc 1 + tva 1 + paiement 2 + virement 2
        assert_eq!(scores.get(CategoryLabel::Facture), 10);
        assert_eq!(scores.total(), 10);
        assert_eq!(scores.best(), (CategoryLabel::Facture, 10));
    }

    #[test]
    fn scores_contract() {
        let scores = KeywordTable::default().score(&clean_text(
            "CONTRAT DE TRAVAIL Fait à Paris le... Signature des parties...",
        ));
        assert_eq!(scores.get(CategoryLabel::Contrat), 10);
        assert_eq!(scores.total(), 10);
    }

    #[test]
    fn scores_medical() {
        let scores = KeywordTable::default().score(&clean_text(
            "ORDONNANCE MÉDICALE Dr. Martin - Certificat d'aptitude au travail",
        ));
        assert_eq!(scores.get(CategoryLabel::Medical), 6);
        assert_eq!(scores.total(), 6);
    }

    #[test]
    fn autre_always_zero() {
        let scores = KeywordTable::default().score("autre autre divers");
        assert_eq!(scores.get(CategoryLabel::Autre), 0);
    }

    #[test]
    fn ties_go_to_earliest_category() {
        let table = KeywordTable::from_json(
            r#"[{"category": "MEDICAL", "keywords": ["abc"]},
                {"category": "CONTRAT", "keywords": ["abc"]}]"#,
        )
        .unwrap();
        let scores = table.score("abc");
        assert_eq!(scores.best(), (CategoryLabel::Contrat, 1));
        assert_eq!(scores.total(), 2);
    }

    #[test]
    fn empty_text_scores_zero() {
        let scores = KeywordTable::default().score("");
        assert_eq!(scores.total(), 0);
        assert_eq!(scores.best(), (CategoryLabel::Facture, 0));
        assert!(scores.iter().all(|(_, s)| s == 0));
    }

    #[test]
    fn from_json_normalizes_and_dedupes() {
        let table = KeywordTable::from_json(
            r#"[{"category": "FACTURE", "keywords": ["TVA", "tva", " Net à payer "]}]"#,
        )
        .unwrap();
        let words: Vec<&str> = table
            .keywords(CategoryLabel::Facture)
            .iter()
            .map(|k| k.text.as_str())
            .collect();
        assert_eq!(words, vec!["tva", "net à payer"]);
        assert!(table.keywords(CategoryLabel::Contrat).is_empty());
    }

    #[test]
    fn rejects_duplicate_category() {
        let err = KeywordTable::from_json(
            r#"[{"category": "FACTURE", "keywords": ["a"]},
                {"category": "FACTURE", "keywords": ["b"]}]"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            KeywordTableError::DuplicateCategory(CategoryLabel::Facture)
        ));
    }

    #[test]
    fn rejects_fallback_keywords() {
        let err = KeywordTable::from_json(r#"[{"category": "AUTRE", "keywords": ["divers"]}]"#)
            .unwrap_err();
        assert!(matches!(err, KeywordTableError::FallbackHasKeywords(_)));
    }

    #[test]
    fn rejects_empty_keyword() {
        let err = KeywordTable::from_json(r#"[{"category": "RAPPORT", "keywords": ["bilan", "?!"]}]"#)
            .unwrap_err();
        assert!(matches!(
            err,
            KeywordTableError::EmptyKeyword {
                category: CategoryLabel::Rapport,
                position: 1
            }
        ));
    }

    #[test]
    fn rejects_unknown_category() {
        let err = KeywordTable::from_json(r#"[{"category": "DEVIS", "keywords": ["devis"]}]"#)
            .unwrap_err();
        assert!(matches!(err, KeywordTableError::Parse(_)));
    }

    #[test]
    fn entries_round_trip_through_json() {
        let table = KeywordTable::default();
        let json = serde_json::to_string(&table.to_entries()).unwrap();
        assert_eq!(KeywordTable::from_json(&json).unwrap(), table);
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = KeywordTable::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, KeywordTableError::Io { .. }));
    }
}
