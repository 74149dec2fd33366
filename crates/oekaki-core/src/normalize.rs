//! Guess normalization.
//!
//! Guesses are typed on phones and desktop IMEs, so the same answer arrives as
//! full-width or half-width characters, katakana or hiragana, with stray spaces.
//! Everything is folded to one canonical form before comparison:
//!
//! 1. NFKC, which folds full-width ASCII to ASCII and half-width katakana
//!    (including separate voicing marks) to composed full-width katakana.
//! 2. Katakana to hiragana.
//! 3. Lowercase.
//! 4. All whitespace removed.
//! 5. NFC, so a voicing mark left dangling after a removed space (`は゛`,
//!    `は ﾞ`) composes onto the preceding kana.

use unicode_normalization::UnicodeNormalization;

const KATAKANA_START: u32 = 0x30A1; // ァ
const KATAKANA_END: u32 = 0x30F6; // ヶ
const KANA_OFFSET: u32 = 0x60;

fn katakana_to_hiragana(c: char) -> char {
    let code = c as u32;
    if (KATAKANA_START..=KATAKANA_END).contains(&code) {
        char::from_u32(code - KANA_OFFSET).unwrap_or(c)
    } else {
        c
    }
}

/// Fold `input` into the canonical comparison form.
pub fn normalize(input: &str) -> String {
    input
        .nfkc()
        .map(katakana_to_hiragana)
        .flat_map(char::to_lowercase)
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .nfc()
        .collect()
}

/// Whether `guess` names `answer` once both are normalized. Empty input never matches.
pub fn matches_answer(guess: &str, answer: &str) -> bool {
    let guess = normalize(guess);
    !guess.is_empty() && guess == normalize(answer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn katakana_folds_to_hiragana() {
        assert_eq!(normalize("ネコ"), "ねこ");
        assert!(matches_answer("ネコ", "ねこ"));
    }

    #[test]
    fn half_width_katakana_folds() {
        assert_eq!(normalize("ﾈｺ"), "ねこ");
        // Separate half-width voicing mark composes under NFKC.
        assert_eq!(normalize("ｶﾞｯｺｳ"), "がっこう");
    }

    #[test]
    fn full_width_ascii_folds() {
        assert_eq!(normalize("ＣＡＴ"), "cat");
        assert!(matches_answer("Ｃａｔ", "cat"));
    }

    #[test]
    fn whitespace_including_ideographic_space_is_ignored() {
        assert!(matches_answer(" ね　こ ", "ねこ"));
    }

    #[test]
    fn standalone_voicing_marks_compose() {
        // U+309B decomposes to a space plus the combining mark under NFKC.
        assert_eq!(normalize("は\u{309B}"), "ば");
        assert_eq!(normalize("ハ\u{309B}"), "ば");
        assert_eq!(normalize("は\u{3000}\u{FF9E}"), "ば");
        assert_eq!(normalize("ﾊ\u{309C}"), "ぱ");
        assert!(matches_answer("は゛", "ば"));
        assert!(matches_answer("ﾊﾞﾅﾅ", "バナナ"));
    }

    #[test]
    fn long_vowel_mark_is_kept() {
        assert_eq!(normalize("ケーキ"), "けーき");
        assert!(!matches_answer("けき", "ケーキ"));
    }

    #[test]
    fn empty_guess_never_matches() {
        assert!(!matches_answer("", ""));
        assert!(!matches_answer("   ", ""));
    }

    #[test]
    fn different_words_do_not_match() {
        assert!(!matches_answer("いぬ", "ねこ"));
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(s in "[a-zA-Z0-9ａ-ｚＡ-Ｚぁ-ゖァ-ヶｦ-ﾟ 　]{0,24}") {
            let once = normalize(&s);
            prop_assert_eq!(normalize(&once), once);
        }

        #[test]
        fn katakana_and_hiragana_spellings_agree(
            codes in proptest::collection::vec(0x3041u32..=0x3096, 1..8)
        ) {
            let hira: String = codes.iter().filter_map(|&c| char::from_u32(c)).collect();
            let kata: String = codes
                .iter()
                .filter_map(|&c| char::from_u32(c + KANA_OFFSET))
                .collect();
            prop_assert!(matches_answer(&kata, &hira));
        }
    }
}
