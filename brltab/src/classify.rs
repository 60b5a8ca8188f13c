//! Character classification shared by the compilers and the contraction engine.
use unic_ucd_category::GeneralCategory;

use crate::types::CharacterAttributes;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Case {
    Upper,
    Lower,
    Neither,
}

impl Case {
    #[inline(always)]
    pub fn new(attributes: CharacterAttributes) -> Case {
        if attributes.contains(CharacterAttributes::UPPERCASE) {
            Case::Upper
        } else if attributes.contains(CharacterAttributes::LOWERCASE) {
            Case::Lower
        } else {
            Case::Neither
        }
    }
}

/// Built-in attributes of a character, from its Unicode general category.
pub fn classify(ch: char) -> CharacterAttributes {
    let mut attributes = CharacterAttributes::empty();

    if ch.is_whitespace() {
        attributes |= CharacterAttributes::SPACE;
    }

    let category = GeneralCategory::of(ch);

    if category.is_letter() {
        attributes |= CharacterAttributes::LETTER;

        if category == GeneralCategory::UppercaseLetter
            || category == GeneralCategory::TitlecaseLetter
            || (category != GeneralCategory::LowercaseLetter && ch.is_uppercase())
        {
            attributes |= CharacterAttributes::UPPERCASE;
        } else if category == GeneralCategory::LowercaseLetter || ch.is_lowercase() {
            attributes |= CharacterAttributes::LOWERCASE;
        }
    } else if category == GeneralCategory::DecimalNumber {
        attributes |= CharacterAttributes::DIGIT;
    } else if category.is_punctuation() || category.is_symbol() {
        attributes |= CharacterAttributes::PUNCTUATION;
    }

    attributes
}

#[inline]
fn single(mut mapping: impl Iterator<Item = char>, ch: char) -> char {
    match (mapping.next(), mapping.next()) {
        (Some(c), None) => c,
        _ => ch,
    }
}

/// `(uppercase, lowercase)` forms of a character. Characters whose case
/// mapping expands to more than one character map to themselves.
#[inline]
pub fn case_pair(ch: char) -> (char, char) {
    (single(ch.to_uppercase(), ch), single(ch.to_lowercase(), ch))
}

#[inline(always)]
pub fn to_lower(ch: char) -> char {
    single(ch.to_lowercase(), ch)
}
