//! Text rewriting around the matching stages.
//!
//! [`prenormalize`] runs once on raw input before any gazetteer lookup.
//! [`postprocess_residual`] rewrites whatever follows the matched town
//! into the canonical `N-M` block/house form. [`BlockNumbers`] keeps
//! block/house fragments away from the town patterns while the town is
//! being matched.

use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::dict;
use crate::numeral::{self, DASH_CLASS};

/// Any numeral run that may appear in block/house numbers.
const NUMERAL: &str = "[0-9〇一二三四五六七八九十百千]";

/// [`NUMERAL`] plus full-width digits, for text not yet narrowed.
const ANY_NUMERAL: &str = "[0-9０-９〇一二三四五六七八九十百千]";

static SPACES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[ \u{3000}]+").expect("valid regex"));

/// Text up to and including the first town/number marker.
static TOWN_MARKER_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("^(.+?)(丁目?|番町|番地|番丁|条|軒|線|の町|ノ町|地割)").expect("valid regex")
});

/// Text up to and including the first numeral followed by a dash.
static NUMERAL_DASH_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^.+?[0-9一二三四五六七八九〇十百千]{DASH_CLASS}")).expect("valid regex")
});

/// A dash glyph with a digit on either side.
static DIGIT_DASH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        "[0-9０-９一二三四五六七八九〇十百千]{DASH_CLASS}|{DASH_CLASS}[0-9０-９一二三四五六七八九〇十]"
    ))
    .expect("valid regex")
});

static LEADING_DASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^-").expect("valid regex"));

static ARABIC_CHOME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("([0-9]+)(丁目)").expect("valid regex"));

static BANCHI_GO_TRAILER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(({NUMERAL}+)(番地?)({NUMERAL}+)号)\s*(.+)")).expect("valid regex")
});

static BANCHI_GO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("({NUMERAL}+)(番地?)({NUMERAL}+)号?")).expect("valid regex")
});

static BANCHI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("({NUMERAL}+)番地?")).expect("valid regex"));

static NO_SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("({NUMERAL}+)の")).expect("valid regex"));

static NUMERAL_BEFORE_DASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("({NUMERAL}+){DASH_CLASS}")).expect("valid regex"));

static NUMERAL_AFTER_DASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("{DASH_CLASS}({NUMERAL}+)")).expect("valid regex"));

static NUMERAL_HYPHEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("({NUMERAL}+)-")).expect("valid regex"));

static HYPHEN_NUMERAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("-({NUMERAL}+)")).expect("valid regex"));

static HYPHEN_TEXT_NUMERAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("-[^0-9]+({NUMERAL}+)")).expect("valid regex"));

static TRAILING_NUMERAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("({NUMERAL}+)$")).expect("valid regex"));

/// Block/house number shapes held aside during town matching:
/// `N番M-K号`, `N番地M-K号室`, `N-M-K号` and `N番M号`.
static BLOCK_NUMBER_RES: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(&format!(
            "{ANY_NUMERAL}+(?:番地?|-){ANY_NUMERAL}+(?:号|-){ANY_NUMERAL}+号室?"
        ))
        .expect("valid regex"),
        Regex::new(&format!("{ANY_NUMERAL}+番{ANY_NUMERAL}+号")).expect("valid regex"),
    ]
});

/// First placeholder code point; placeholders come from the private use
/// area and never occur in gazetteer names.
const PLACEHOLDER_BASE: u32 = 0xE000;

fn unify_dashes(text: &str) -> String {
    text.chars()
        .map(|c| if numeral::is_dash(c) { '-' } else { c })
        .collect()
}

fn without_spaces(caps: &Captures) -> String {
    caps[0].replace(' ', "")
}

/// Cleans raw input before matching.
///
/// In order: OCR alias corrections, whitespace collapsed to single
/// spaces, full-width letters and digits narrowed, spaces removed up to
/// the first town marker and up to the first numeral-dash, dashes next
/// to a digit unified to `-`, then trimmed.
#[must_use]
pub fn prenormalize(input: &str) -> String {
    let text = dict::apply_alias_corrections(input);
    let text = SPACES_RE.replace_all(&text, " ");
    let text = numeral::zenkaku_to_hankaku(&text);
    let text = TOWN_MARKER_PREFIX_RE.replace(&text, without_spaces);
    let text = NUMERAL_DASH_PREFIX_RE.replace(&text, without_spaces);
    let text = DIGIT_DASH_RE.replace_all(&text, |caps: &Captures| unify_dashes(&caps[0]));

    text.trim().to_string()
}

fn arabic_with_hyphen(caps: &Captures) -> String {
    unify_dashes(&numeral::kanji_to_arabic(&caps[0]))
}

/// Rewrites the text left after the town match into canonical form.
///
/// Arabic chōme numbers become kanji (`1丁目` → `一丁目`), `N番M号` and
/// `N番地M` become `N-M`, `の` between numbers becomes `-`, and kanji
/// numerals next to a dash or at the end become Arabic digits. Free
/// text after a house number is kept after a single space.
#[must_use]
pub fn postprocess_residual(addr: &str) -> String {
    let addr = LEADING_DASH_RE.replace(addr, "");
    let addr = ARABIC_CHOME_RE.replace_all(&addr, |caps: &Captures| {
        caps[1].parse::<u64>().map_or_else(
            |_| caps[0].to_string(),
            |n| format!("{}{}", numeral::number_to_kanji(n), &caps[2]),
        )
    });
    let addr = BANCHI_GO_TRAILER_RE.replace(&addr, "${1} ${5}");
    let addr = BANCHI_GO_RE.replace(&addr, "${1}-${3}");
    let addr = BANCHI_RE.replace(&addr, "${1}");
    let addr = NO_SEPARATOR_RE.replace_all(&addr, "${1}-");
    let addr = NUMERAL_BEFORE_DASH_RE.replace_all(&addr, arabic_with_hyphen);
    let addr = NUMERAL_AFTER_DASH_RE.replace_all(&addr, arabic_with_hyphen);
    let addr = NUMERAL_HYPHEN_RE.replace(&addr, |caps: &Captures| {
        numeral::kanji_to_arabic(&caps[0])
    });
    let addr = HYPHEN_NUMERAL_RE.replace(&addr, |caps: &Captures| {
        numeral::kanji_to_arabic(&caps[0])
    });
    let addr = HYPHEN_TEXT_NUMERAL_RE.replace(&addr, |caps: &Captures| {
        numeral::kanji_to_arabic(&numeral::zenkaku_to_hankaku(&caps[0]))
    });
    let addr = TRAILING_NUMERAL_RE.replace(&addr, |caps: &Captures| {
        numeral::kanji_to_arabic(&caps[0])
    });

    addr.trim().to_string()
}

/// Block/house fragments replaced by placeholders.
#[derive(Debug, Default)]
pub struct BlockNumbers {
    held: Vec<String>,
}

impl BlockNumbers {
    /// Replaces every block/house-shaped fragment of `addr` with a
    /// placeholder character.
    #[must_use]
    pub fn hold_aside(addr: &str) -> (String, Self) {
        let mut held = Vec::new();
        let mut text = addr.to_string();

        for re in BLOCK_NUMBER_RES.iter() {
            text = re
                .replace_all(&text, |caps: &Captures| {
                    let placeholder = u32::try_from(held.len())
                        .ok()
                        .and_then(|i| char::from_u32(PLACEHOLDER_BASE + i));
                    match placeholder {
                        Some(placeholder) => {
                            held.push(caps[0].to_string());
                            placeholder.to_string()
                        }
                        None => caps[0].to_string(),
                    }
                })
                .into_owned();
        }

        (text, Self { held })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Puts the held fragments back in place of their placeholders.
    #[must_use]
    pub fn restore(&self, text: &str) -> String {
        text.chars()
            .map(|c| {
                u32::from(c)
                    .checked_sub(PLACEHOLDER_BASE)
                    .and_then(|i| usize::try_from(i).ok())
                    .and_then(|i| self.held.get(i))
                    .map_or_else(|| c.to_string(), Clone::clone)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prenormalize_narrows_and_unifies() {
        assert_eq!(
            prenormalize("東京都千代田区丸の内１丁目２－３"),
            "東京都千代田区丸の内1丁目2-3"
        );
        assert_eq!(prenormalize("千代田1ー1"), "千代田1-1");
        assert_eq!(prenormalize("千代田一―一"), "千代田一-一");
    }

    #[test]
    fn prenormalize_keeps_long_vowel_mark_in_words() {
        assert_eq!(prenormalize("流通センター"), "流通センター");
    }

    #[test]
    fn prenormalize_collapses_and_trims_spaces() {
        assert_eq!(prenormalize("　東京都　 千代田区  "), "東京都 千代田区");
    }

    #[test]
    fn prenormalize_removes_spaces_before_first_marker() {
        assert_eq!(
            prenormalize("東京都 千代田区 丸の内 一丁目 2 番 3 号"),
            "東京都千代田区丸の内一丁目 2 番 3 号"
        );
    }

    #[test]
    fn prenormalize_removes_spaces_before_first_numeral_dash() {
        assert_eq!(prenormalize("東京都 千代田区 千代田 1-1"), "東京都千代田区千代田1-1");
        assert_eq!(prenormalize("東京都 千代田区 千代田 1ー1"), "東京都千代田区千代田1-1");
    }

    #[test]
    fn prenormalize_with_both_triggers() {
        assert_eq!(
            prenormalize("東京都 千代田区 丸の内 一丁目 2-3 ビル 5F"),
            "東京都千代田区丸の内一丁目2-3 ビル 5F"
        );
    }

    #[test]
    fn prenormalize_fixes_ocr_misreads() {
        assert_eq!(prenormalize("丸の内ニ丁目"), "丸の内二丁目");
    }

    #[test]
    fn postprocess_converts_chome_to_kanji() {
        assert_eq!(postprocess_residual("1丁目"), "一丁目");
        assert_eq!(postprocess_residual("16丁目5"), "十六丁目5");
    }

    #[test]
    fn postprocess_collapses_banchi_go() {
        assert_eq!(postprocess_residual("2番3号"), "2-3");
        assert_eq!(postprocess_residual("2番地3"), "2-3");
        assert_eq!(postprocess_residual("二番三号"), "2-3");
        assert_eq!(postprocess_residual("2番3号 ビル5F"), "2-3 ビル5F");
    }

    #[test]
    fn postprocess_drops_trailing_banchi() {
        assert_eq!(postprocess_residual("12番地"), "12");
    }

    #[test]
    fn postprocess_converts_no_separator() {
        assert_eq!(postprocess_residual("1の2"), "1-2");
    }

    #[test]
    fn postprocess_converts_numerals_near_dashes() {
        assert_eq!(postprocess_residual("-1-2"), "1-2");
        assert_eq!(postprocess_residual("十二-三"), "12-3");
        assert_eq!(postprocess_residual("一二三"), "123");
    }

    #[test]
    fn postprocess_keeps_free_text() {
        assert_eq!(postprocess_residual(""), "");
        assert_eq!(postprocess_residual("ビル"), "ビル");
    }

    #[test]
    fn holds_aside_block_numbers() {
        let (text, held) = BlockNumbers::hold_aside("丸の内一丁目2番3-4号室");
        assert_eq!(text, "丸の内一丁目\u{E000}");
        assert!(!held.is_empty());
        assert_eq!(held.restore(&text), "丸の内一丁目2番3-4号室");

        let (text, held) = BlockNumbers::hold_aside("千代田1番1号");
        assert_eq!(text, "千代田\u{E000}");
        assert_eq!(held.restore("\u{E000}"), "1番1号");
    }

    #[test]
    fn hold_aside_without_block_numbers_is_identity() {
        let (text, held) = BlockNumbers::hold_aside("千代田1-1");
        assert_eq!(text, "千代田1-1");
        assert!(held.is_empty());
        assert_eq!(held.restore("1-1"), "1-1");
    }
}
