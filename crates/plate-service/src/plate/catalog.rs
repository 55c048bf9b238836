//! Plate shape catalog.
//!
//! Shapes are structural only: `D` is an ASCII digit, `H` any single Hangul
//! syllable in the type slot, `R` any two Hangul syllables in the region slot.
//! Whether the instantiated `H`/`R` values are legal is decided by the
//! validator against the alphabets below.

use once_cell::sync::Lazy;
use regex::Regex;

/// Type characters allowed in the `H` slot.
///
/// General use, then commercial (바 사 아 자 배), then rental (하 허 호).
pub const TYPE_CHARS: [char; 40] = [
    '가', '나', '다', '라', '마', '거', '너', '더', '러', '머', '버', '서', '어', '저', '고', '노',
    '도', '로', '모', '보', '소', '오', '조', '구', '누', '두', '루', '무', '부', '수', '우', '주',
    '바', '사', '아', '자', '배', '하', '허', '호',
];

/// Region names allowed in the `R` slot of business plates
pub const REGION_NAMES: [&str; 16] = [
    "서울", "부산", "대구", "인천", "광주", "대전", "울산", "경기", "강원", "충북", "충남", "전북",
    "전남", "경북", "경남", "제주",
];

pub fn is_type_char(c: char) -> bool {
    TYPE_CHARS.contains(&c)
}

pub fn is_region_name(s: &str) -> bool {
    REGION_NAMES.contains(&s)
}

/// Any syllable that can legally appear in a plate string
pub fn is_plate_syllable(c: char) -> bool {
    is_type_char(c) || REGION_NAMES.iter().any(|r| r.contains(c))
}

const GENERAL_BODY: &str = r"[0-9]{2,3}[가-힣][0-9]{4}";
const BUSINESS_BODY: &str = r"[가-힣]{2}[0-9]{2}[가-힣][0-9]{4}";

static GENERAL_SEARCH: Lazy<Regex> = Lazy::new(|| compile(GENERAL_BODY, false));
static GENERAL_EXACT: Lazy<Regex> = Lazy::new(|| compile(GENERAL_BODY, true));
static BUSINESS_SEARCH: Lazy<Regex> = Lazy::new(|| compile(BUSINESS_BODY, false));
static BUSINESS_EXACT: Lazy<Regex> = Lazy::new(|| compile(BUSINESS_BODY, true));

#[allow(clippy::expect_used)]
fn compile(body: &str, anchored: bool) -> Regex {
    let pattern = if anchored {
        format!("^{}$", body)
    } else {
        body.to_string()
    };
    // Patterns are compile-time constants
    Regex::new(&pattern).expect("plate shape pattern is valid")
}

/// Structural plate layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlateShape {
    /// `D{2,3} H D{4}` (private, commercial, rental, and other sub-variants)
    General,
    /// `R D{2} H D{4}` with a region prefix
    Business,
}

impl PlateShape {
    /// Every shape in the catalog, most specific first
    pub fn all() -> [PlateShape; 2] {
        [PlateShape::Business, PlateShape::General]
    }

    fn search_regex(self) -> &'static Regex {
        match self {
            PlateShape::General => &GENERAL_SEARCH,
            PlateShape::Business => &BUSINESS_SEARCH,
        }
    }

    fn exact_regex(self) -> &'static Regex {
        match self {
            PlateShape::General => &GENERAL_EXACT,
            PlateShape::Business => &BUSINESS_EXACT,
        }
    }

    /// Substrings of `text` matching this shape
    pub fn find_iter<'t>(self, text: &'t str) -> impl Iterator<Item = &'t str> + 't {
        self.search_regex().find_iter(text).map(|m| m.as_str())
    }

    /// Whether the whole of `text` has this shape
    pub fn matches_exactly(self, text: &str) -> bool {
        self.exact_regex().is_match(text)
    }

    /// The shape `text` has as a whole, if any
    pub fn classify(text: &str) -> Option<PlateShape> {
        Self::all().into_iter().find(|s| s.matches_exactly(text))
    }

    /// Char index of the type character for a string of this shape
    pub fn type_char_index(self, text: &str) -> usize {
        match self {
            PlateShape::Business => 4,
            PlateShape::General => text.chars().take_while(|c| c.is_ascii_digit()).count(),
        }
    }
}

/// All shape matches in `text`, across the whole catalog
pub fn find_all(text: &str) -> Vec<&str> {
    PlateShape::all()
        .into_iter()
        .flat_map(|shape| shape.find_iter(text))
        .collect()
}
