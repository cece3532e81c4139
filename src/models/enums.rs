use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when a string does not name a variant of one of the enums below.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {field} value: {value:?}")]
pub struct InvalidEnumValue {
    pub field: String,
    pub value: String,
}

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// Variant order is declaration order and is exposed through `ALL`.
macro_rules! str_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$(Self::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = InvalidEnumValue;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(InvalidEnumValue {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(
    /// Fixed document categories. Declaration order is the tie-break order
    /// of the keyword scorer.
    CategoryLabel {
        Facture => "FACTURE",
        Contrat => "CONTRAT",
        BonCommande => "BON_COMMANDE",
        Administratif => "ADMINISTRATIF",
        Rapport => "RAPPORT",
        CvLettre => "CV_LETTRE",
        Academique => "ACADEMIQUE",
        Juridique => "JURIDIQUE",
        Medical => "MEDICAL",
        Autre => "AUTRE",
    }
);

impl CategoryLabel {
    /// `AUTRE` is the universal fallback and never carries keywords.
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Autre)
    }

    /// Position in `ALL`, used as a dense index by scorers and models.
    pub fn index(&self) -> usize {
        *self as usize
    }
}

str_enum!(
    /// How the extraction pipeline ended for one input.
    ExtractionOutcome {
        Success => "success",
        Empty => "empty",
        Unreadable => "unreadable",
        UnsupportedFormat => "unsupported-format",
    }
);

str_enum!(
    /// Which strategy produced the accepted text.
    ExtractionMethod {
        PdfDirect => "pdf_direct",
        ImageOcrSoft => "image_ocr_soft",
        ImageOcrHard => "image_ocr_hard",
        PdfRasterizedOcr => "pdf_rasterized_ocr",
    }
);

str_enum!(
    /// Which branch of the arbitration policy decided a classification.
    DecisionSource {
        Rules => "rules",
        Model => "model",
        Corroborated => "corroborated",
        RulesFallback => "rules_fallback",
        NoEvidence => "no_evidence",
    }
);
