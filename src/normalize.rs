//! Plate text normalization.
//!
//! OCR segmentation boundaries are not reliable, so the normalizer never
//! assumes a fixed template. It classifies each character of the raw text
//! into ordered character-class buckets and reassembles them from a
//! declarative locale rule table: locale prefix letters (lowercase in the
//! raw reading), main letters, digits. Locales whose canonical plate omits
//! the prefix drop that bucket through the table, not through code in the
//! comparison path.
//!
//! `normalize` is pure and deterministic: the same raw text always yields
//! the same normalized output, and canonical output is a fixed point.
//! Rejection is not an error; it is the expected steady-state fate of noisy
//! readings.

/// Character classes a raw reading is bucketed into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CharClass {
    /// Locale prefix letters, lowercase in the raw OCR reading.
    PrefixLetter,
    /// Main plate letters, uppercase in the raw reading.
    Letter,
    Digit,
}

/// One ordered group of the locale's canonical plate form.
#[derive(Clone, Copy, Debug)]
pub struct PlateGroup {
    pub class: CharClass,
    /// Excluded groups are still bucketed (their characters must classify),
    /// but do not appear in the canonical form.
    pub include: bool,
}

/// Ordered rule table describing a locale's canonical plate form.
#[derive(Clone, Debug)]
pub struct PlateFormat {
    groups: Vec<PlateGroup>,
}

impl PlateFormat {
    pub fn new(groups: Vec<PlateGroup>) -> Self {
        Self { groups }
    }

    /// prefix letters + main letters + digits, with the prefix group kept or
    /// dropped per locale.
    pub fn standard(keep_prefix: bool) -> Self {
        Self::new(vec![
            PlateGroup {
                class: CharClass::PrefixLetter,
                include: keep_prefix,
            },
            PlateGroup {
                class: CharClass::Letter,
                include: true,
            },
            PlateGroup {
                class: CharClass::Digit,
                include: true,
            },
        ])
    }
}

pub struct PlateNormalizer {
    format: PlateFormat,
}

impl PlateNormalizer {
    pub fn new(format: PlateFormat) -> Self {
        Self { format }
    }

    /// Canonicalize a raw OCR reading, or reject it.
    ///
    /// Returns `None` when the text contains a character no class claims, or
    /// when the assembled form lacks a letter or a digit.
    pub fn normalize(&self, raw: &str) -> Option<String> {
        let mut prefix = String::new();
        let mut letters = String::new();
        let mut digits = String::new();

        for c in raw.chars() {
            match classify(c) {
                Some(CharClass::PrefixLetter) => prefix.push(c.to_ascii_uppercase()),
                Some(CharClass::Letter) => letters.push(c),
                Some(CharClass::Digit) => digits.push(c),
                None if c == '-' => {} // separator, carries no information
                None => return None,
            }
        }

        let mut out = String::new();
        for group in &self.format.groups {
            if !group.include {
                continue;
            }
            match group.class {
                CharClass::PrefixLetter => out.push_str(&prefix),
                CharClass::Letter => out.push_str(&letters),
                CharClass::Digit => out.push_str(&digits),
            }
        }

        let has_letter = out.chars().any(|c| c.is_ascii_alphabetic());
        let has_digit = out.chars().any(|c| c.is_ascii_digit());
        if !has_letter || !has_digit {
            return None;
        }
        Some(out)
    }
}

fn classify(c: char) -> Option<CharClass> {
    if c.is_ascii_lowercase() {
        Some(CharClass::PrefixLetter)
    } else if c.is_ascii_uppercase() {
        Some(CharClass::Letter)
    } else if c.is_ascii_digit() {
        Some(CharClass::Digit)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer(keep_prefix: bool) -> PlateNormalizer {
        PlateNormalizer::new(PlateFormat::standard(keep_prefix))
    }

    #[test]
    fn buckets_are_reassembled_in_group_order() {
        let n = normalizer(true);
        // OCR reads segments out of order; bucketing restores structure.
        assert_eq!(n.normalize("1AB23C4"), Some("ABC1234".to_string()));
    }

    #[test]
    fn prefix_letters_lead_when_kept() {
        let n = normalizer(true);
        assert_eq!(n.normalize("kaAB1234"), Some("KAAB1234".to_string()));
    }

    #[test]
    fn prefix_letters_dropped_by_locale_rule() {
        let n = normalizer(false);
        assert_eq!(n.normalize("kaAB1234"), Some("AB1234".to_string()));
    }

    #[test]
    fn hyphen_is_a_separator() {
        let n = normalizer(true);
        assert_eq!(n.normalize("AB-1234"), Some("AB1234".to_string()));
    }

    #[test]
    fn letters_only_rejected() {
        assert_eq!(normalizer(true).normalize("ABCDEF"), None);
    }

    #[test]
    fn digits_only_rejected() {
        assert_eq!(normalizer(true).normalize("123456"), None);
    }

    #[test]
    fn unclassifiable_character_rejects_the_reading() {
        assert_eq!(normalizer(true).normalize("AB*1234"), None);
    }

    #[test]
    fn dropping_the_prefix_can_reject_a_reading() {
        // All letters were prefix-class; the canonical form loses them.
        assert_eq!(normalizer(false).normalize("ab1234"), None);
    }

    #[test]
    fn normalize_is_deterministic_and_idempotent() {
        let n = normalizer(true);
        let canonical = n.normalize("bKA12-34").expect("valid reading");
        assert_eq!(canonical, "BKA1234");
        assert_eq!(n.normalize(&canonical), Some(canonical.clone()));
        assert_eq!(n.normalize("bKA12-34"), n.normalize("bKA12-34"));
    }
}
