use std::sync::LazyLock;

use regex::Regex;

/// Literal two-character escapes (`\n`, `\r`, `\t`) left behind by
/// upstream serializers.
static LITERAL_ESCAPES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\[nrt]").expect("escape pattern is valid"));

/// Sanitize extracted text before quality gates and downstream use.
/// Strips control characters other than newline and tab, turns other
/// whitespace into plain spaces, trims every line and drops blank lines.
pub fn sanitize_extracted_text(raw: &str) -> String {
    raw.chars()
        .filter_map(|c| match c {
            '\n' | '\t' => Some(c),
            c if c.is_whitespace() => Some(' '),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect::<String>()
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Canonical form shared by the keyword scorer and the learned model.
///
/// Lowercase, ASCII letters/digits plus accented Latin letters, single
/// spaces, no leading or trailing whitespace. Idempotent.
pub fn clean_text(text: &str) -> String {
    let unescaped = LITERAL_ESCAPES.replace_all(text, " ");
    unescaped
        .to_lowercase()
        .chars()
        .map(|c| if is_allowed_char(c) { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_allowed_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() || is_accented_latin(c)
}

/// Latin-1 Supplement letters (minus `×` and `÷`) and Latin Extended-A.
fn is_accented_latin(c: char) -> bool {
    matches!(c, '\u{00C0}'..='\u{00D6}' | '\u{00D8}'..='\u{00F6}' | '\u{00F8}'..='\u{017F}')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_null_bytes() {
        let raw = "Facture\x00 N°42";
        let clean = sanitize_extracted_text(raw);
        assert!(!clean.contains('\x00'));
        assert_eq!(clean, "Facture N°42");
    }

    #[test]
    fn collapses_blank_lines() {
        let raw = "Line one\n\n\n\nLine two\n\n\nLine three";
        let clean = sanitize_extracted_text(raw);
        assert_eq!(clean, "Line one\nLine two\nLine three");
    }

    #[test]
    fn trims_whitespace_per_line() {
        let raw = "  leading spaces  \r\n  trailing too  ";
        let clean = sanitize_extracted_text(raw);
        assert_eq!(clean, "leading spaces\ntrailing too");
    }

    #[test]
    fn form_feed_separates_words() {
        assert_eq!(sanitize_extracted_text("page un\x0Cpage deux"), "page un page deux");
    }

    #[test]
    fn tabs_survive_inside_lines() {
        assert_eq!(sanitize_extracted_text("\tQté\tPrix\t\n"), "Qté\tPrix");
    }

    #[test]
    fn only_control_chars_returns_empty() {
        assert_eq!(sanitize_extracted_text("\x00\x01\x02"), "");
        assert_eq!(sanitize_extracted_text(""), "");
    }

    #[test]
    fn sanitize_preserves_punctuation_and_symbols() {
        let raw = "Coût: 15,50€ «TTC» \u{2014} L\u{2019}acompte";
        assert_eq!(sanitize_extracted_text(raw), raw);
    }

    #[test]
    fn clean_lowercases_and_strips_punctuation() {
        assert_eq!(
            clean_text("FACTURE N°12345 TOTAL TTC 100€ TVA 20%"),
            "facture n 12345 total ttc 100 tva 20"
        );
    }

    #[test]
    fn clean_handles_literal_and_real_newlines() {
        assert_eq!(clean_text("Objet\\nContrat\nde\\tbail\r\n"), "objet contrat de bail");
    }

    #[test]
    fn clean_keeps_accented_letters() {
        assert_eq!(
            clean_text("ORDONNANCE MÉDICALE — Certificat d'aptitude"),
            "ordonnance médicale certificat d aptitude"
        );
        assert_eq!(clean_text("Œuvre à côté"), "œuvre à côté");
    }

    #[test]
    fn clean_drops_non_latin_scripts_and_symbols() {
        assert_eq!(clean_text("prix × 2 ÷ 3 日本"), "prix 2 3");
    }

    #[test]
    fn clean_empty_and_whitespace() {
        assert_eq!(clean_text(""), "");
        assert_eq!(clean_text("   \n\t  "), "");
        assert_eq!(clean_text("!!!"), "");
    }

    #[test]
    fn clean_is_idempotent() {
        let samples = [
            "",
            "FACTURE N°12345 TOTAL TTC 100€",
            "CONTRAT DE TRAVAIL\\nFait à Paris le...",
            "İstanbul ÇA ß Straße ÆØÅ",
            "  mixed\u{00A0}spaces\u{2003}and\ttabs  ",
            "a\\\\n b \\r c",
            "ĀĒĪŌŪ ŉ ĸ ı",
        ];
        for sample in samples {
            let once = clean_text(sample);
            assert_eq!(clean_text(&once), once, "not idempotent for {sample:?}");
        }
    }
}
