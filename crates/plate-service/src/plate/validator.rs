//! Plate validation and glyph correction.

use lazy_static::lazy_static;
use std::collections::HashMap;

use super::catalog::{is_plate_syllable, is_region_name, is_type_char, PlateShape};

lazy_static! {
    /// Glyphs OCR engines commonly confuse with digits
    static ref GLYPH_SUBSTITUTIONS: HashMap<char, char> = {
        let mut m = HashMap::new();
        for c in ['O', 'o', 'D', 'Q', 'U'] {
            m.insert(c, '0');
        }
        for c in ['I', 'l', 'i', '|', '!'] {
            m.insert(c, '1');
        }
        for c in ['Z', 'z'] {
            m.insert(c, '2');
        }
        for c in ['S', 's', '$'] {
            m.insert(c, '5');
        }
        for c in ['G', 'b'] {
            m.insert(c, '6');
        }
        m.insert('T', '7');
        m.insert('B', '8');
        for c in ['g', 'q'] {
            m.insert(c, '9');
        }
        m
    };
}

/// Replace every confusable glyph with the digit it stands for.
///
/// Applied to the whole string; Hangul and digits pass through unchanged.
pub fn correct_glyphs(raw: &str) -> String {
    raw.chars()
        .map(|c| GLYPH_SUBSTITUTIONS.get(&c).copied().unwrap_or(c))
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct PlateValidator {
    skip_charset_check: bool,
}

impl PlateValidator {
    pub fn new(skip_charset_check: bool) -> Self {
        Self { skip_charset_check }
    }

    /// Correct and validate a raw candidate.
    ///
    /// Returns the corrected plate string, or `None` when the candidate is
    /// not a legal plate after correction.
    pub fn validate(&self, raw: &str) -> Option<String> {
        let corrected = correct_glyphs(raw);

        if !self.skip_charset_check
            && !corrected
                .chars()
                .all(|c| c.is_ascii_digit() || is_plate_syllable(c))
        {
            return None;
        }

        let shape = PlateShape::classify(&corrected)?;
        let chars: Vec<char> = corrected.chars().collect();

        let legal = match shape {
            PlateShape::General => chars
                .get(shape.type_char_index(&corrected))
                .is_some_and(|c| is_type_char(*c)),
            PlateShape::Business => {
                let region: String = chars.iter().take(2).collect();
                is_region_name(&region)
                    && chars
                        .get(shape.type_char_index(&corrected))
                        .is_some_and(|c| is_type_char(*c))
            }
        };

        legal.then_some(corrected)
    }
}
