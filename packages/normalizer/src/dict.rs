//! Spelling variant tables.
//!
//! Place names in the gazetteer and in user input disagree on a handful
//! of look-alike characters (kana vs. kanji, old vs. new kanji forms,
//! hiragana spellings of rare kanji). These tables are used when a name
//! is compiled into a match pattern so that every written variant of a
//! character matches, and once on raw input to fix well-known OCR
//! misreads.

use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Multi-character spellings that are interchangeable as a whole.
const WORD_VARIANTS: &[&[&str]] = &[
    &["三栄町", "四谷三栄町"],
    &["鬮野川", "くじ野川", "くじの川"],
    &["柿碕町", "柿さき町"],
    &["通り", "とおり"],
    &["埠頭", "ふ頭"],
    &["番町", "番丁"],
    &["大冝", "大宜"],
    &["穝", "さい"],
    &["杁", "えぶり"],
    &["薭", "稗", "ひえ", "ヒエ"],
];

/// Single characters that are written interchangeably.
const CHAR_VARIANTS: &[&str] = &[
    "之ノの",
    "ヶケが",
    "ヵカか力",
    "ッツっつ",
    "ニ二",
    "ハ八",
    "塚塚",
    "釜竈",
    "條条",
    "狛拍",
    "藪薮",
    "渕淵",
    "エヱえ",
    "曾曽",
    "舟船",
    "莵菟",
    "市巿",
    "澤沢",
    "邊辺邉",
    "濱浜",
    "櫻桜",
    "廣広",
    "龍竜",
    "髙高",
    "﨑崎嵜碕",
    "德徳",
    "藏蔵",
    "國国",
    "學学",
    "寶宝",
    "團団",
    "鐵鉄",
    "靜静",
    "榮栄",
    "舘館",
    "檜桧",
    "槇槙",
    "鷗鴎",
];

/// Known OCR misreads of chōme numbers, fixed before matching.
const OCR_CORRECTIONS: &[(&str, &str)] = &[
    ("ニ丁目", "二丁目"),
    ("ー丁目", "一丁目"),
    ("ハ丁目", "八丁目"),
    ("十〇丁目", "十丁目"),
];

/// Each variant character mapped to the regex class covering its group.
static CHAR_CLASSES: LazyLock<BTreeMap<char, String>> = LazyLock::new(|| {
    let mut map = BTreeMap::new();
    for group in CHAR_VARIANTS {
        let class = format!("[{group}]");
        for c in group.chars() {
            map.entry(c).or_insert_with(|| class.clone());
        }
    }
    map
});

/// Word variants flattened and ordered longest first, each paired with
/// the alternation covering its group.
static WORD_ALTERNATIONS: LazyLock<Vec<(&'static str, String)>> = LazyLock::new(|| {
    let mut words: Vec<(&'static str, String)> = WORD_VARIANTS
        .iter()
        .flat_map(|group| {
            let alternation = format!(
                "(?:{})",
                group
                    .iter()
                    .map(|w| regex::escape(w))
                    .collect::<Vec<_>>()
                    .join("|")
            );
            group.iter().map(move |w| (*w, alternation.clone()))
        })
        .collect();
    words.sort_by_key(|(w, _)| std::cmp::Reverse(w.chars().count()));
    words
});

/// Returns the pattern fragment for the text at the start of `rest` and
/// the number of bytes it covers.
///
/// Word variants win over character variants; anything else is escaped
/// literally one character at a time. `rest` must be non-empty.
#[must_use]
pub fn variant_at(rest: &str) -> (String, usize) {
    for (word, alternation) in WORD_ALTERNATIONS.iter() {
        if rest.starts_with(word) {
            return (alternation.clone(), word.len());
        }
    }

    let Some(c) = rest.chars().next() else {
        return (String::new(), 0);
    };

    CHAR_CLASSES.get(&c).map_or_else(
        || (regex::escape(c.encode_utf8(&mut [0; 4])), c.len_utf8()),
        |class| (class.clone(), c.len_utf8()),
    )
}

/// Compiles a place name into a regex fragment tolerant of spelling
/// variants. The result is unanchored.
#[must_use]
pub fn to_regex_pattern(name: &str) -> String {
    let mut pattern = String::with_capacity(name.len() * 2);
    let mut pos = 0;
    while pos < name.len() {
        let (fragment, len) = variant_at(&name[pos..]);
        pattern.push_str(&fragment);
        pos += len.max(1);
    }
    pattern
}

/// Fixes well-known OCR misreads in raw input.
#[must_use]
pub fn apply_alias_corrections(input: &str) -> String {
    OCR_CORRECTIONS
        .iter()
        .fold(input.to_string(), |acc, (from, to)| acc.replace(from, to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    fn matches(name: &str, input: &str) -> bool {
        Regex::new(&format!("^{}$", to_regex_pattern(name)))
            .unwrap()
            .is_match(input)
    }

    #[test]
    fn plain_names_match_themselves() {
        assert!(matches("千代田区", "千代田区"));
        assert!(!matches("千代田区", "千代田"));
    }

    #[test]
    fn kana_lookalikes_are_interchangeable() {
        assert!(matches("丸の内", "丸ノ内"));
        assert!(matches("丸の内", "丸之内"));
        assert!(matches("霞ヶ関", "霞ケ関"));
        assert!(matches("霞ヶ関", "霞が関"));
    }

    #[test]
    fn old_and_new_kanji_are_interchangeable() {
        assert!(matches("長澤", "長沢"));
        assert!(matches("渡辺", "渡邉"));
        assert!(matches("一條", "一条"));
    }

    #[test]
    fn word_variants_are_interchangeable() {
        assert!(matches("中央通り", "中央とおり"));
        assert!(matches("大井埠頭", "大井ふ頭"));
        assert!(matches("一番町", "一番丁"));
    }

    #[test]
    fn regex_metacharacters_are_escaped() {
        assert!(matches("a.b", "a.b"));
        assert!(!matches("a.b", "axb"));
    }

    #[test]
    fn corrects_ocr_misreads() {
        assert_eq!(apply_alias_corrections("本町ニ丁目"), "本町二丁目");
        assert_eq!(apply_alias_corrections("本町ー丁目"), "本町一丁目");
        assert_eq!(apply_alias_corrections("本町十〇丁目"), "本町十丁目");
        assert_eq!(apply_alias_corrections("本町三丁目"), "本町三丁目");
    }
}
