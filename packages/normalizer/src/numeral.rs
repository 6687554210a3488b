//! Numeral and glyph conversions.
//!
//! Kanji numerals (`二十三`, `一〇二`), full-width digits and Latin
//! letters, and the many dash glyphs found in typed or OCR'd addresses.
//! Everything here is pure; conversions that cannot interpret their
//! input return it unchanged.

use unicode_normalization::UnicodeNormalization as _;

/// Every dash-like glyph treated as a separator next to a number.
pub const DASH_CHARS: &[char] = &[
    '-', '－', '﹣', '−', '‐', '⁃', '‑', '‒', '–', '—', '﹘', '―', '⎯', '⏤', 'ー', 'ｰ', '─', '━',
];

/// Regex character class matching any of [`DASH_CHARS`].
pub const DASH_CLASS: &str = r"[\-－﹣−‐⁃‑‒–—﹘―⎯⏤ーｰ─━]";

const DIGITS: [char; 10] = ['〇', '一', '二', '三', '四', '五', '六', '七', '八', '九'];

/// Returns `true` for any dash-like glyph.
#[must_use]
pub fn is_dash(c: char) -> bool {
    DASH_CHARS.contains(&c)
}

fn kanji_digit(c: char) -> Option<u64> {
    match c {
        '〇' | '零' => Some(0),
        '一' | '壱' => Some(1),
        '二' | '弐' => Some(2),
        '三' | '参' => Some(3),
        '四' => Some(4),
        '五' => Some(5),
        '六' => Some(6),
        '七' => Some(7),
        '八' => Some(8),
        '九' => Some(9),
        _ => None,
    }
}

const fn small_unit(c: char) -> Option<u64> {
    match c {
        '十' | '拾' => Some(10),
        '百' => Some(100),
        '千' => Some(1_000),
        _ => None,
    }
}

const fn large_unit(c: char) -> Option<u64> {
    match c {
        '万' => Some(10_000),
        '億' => Some(100_000_000),
        '兆' => Some(1_000_000_000_000),
        _ => None,
    }
}

/// Returns `true` for characters that can appear in a kanji numeral.
#[must_use]
pub fn is_kanji_numeral_char(c: char) -> bool {
    kanji_digit(c).is_some() || small_unit(c).is_some() || large_unit(c).is_some()
}

/// Parses a kanji numeral into a number.
///
/// Accepts positional notation (`二十三`, `千二百`, `三万五千`) and plain
/// digit sequences (`一〇二`). Returns `None` for empty input, characters
/// outside the numeral set, or overflow.
#[must_use]
pub fn parse_kanji_number(s: &str) -> Option<u64> {
    if s.is_empty() {
        return None;
    }

    if s.chars().all(|c| kanji_digit(c).is_some()) {
        return s.chars().try_fold(0u64, |acc, c| {
            acc.checked_mul(10)?.checked_add(kanji_digit(c)?)
        });
    }

    let mut total = 0u64;
    let mut section = 0u64;
    let mut current: Option<u64> = None;

    for c in s.chars() {
        if let Some(d) = kanji_digit(c) {
            current = Some(match current {
                Some(n) => n.checked_mul(10)?.checked_add(d)?,
                None => d,
            });
        } else if let Some(unit) = small_unit(c) {
            section = section.checked_add(current.unwrap_or(1).checked_mul(unit)?)?;
            current = None;
        } else if let Some(unit) = large_unit(c) {
            let block = section.checked_add(current.unwrap_or(0))?;
            if block == 0 {
                return None;
            }
            total = total.checked_add(block.checked_mul(unit)?)?;
            section = 0;
            current = None;
        } else {
            return None;
        }
    }

    total.checked_add(section)?.checked_add(current.unwrap_or(0))
}

/// Renders a number below 10,000 in positional kanji (`十六`, `二百五`).
fn section_to_kanji(n: u64, out: &mut String) {
    for (unit, ch) in [(1_000, '千'), (100, '百'), (10, '十')] {
        let d = (n / unit) % 10;
        if d == 0 {
            continue;
        }
        if d > 1 {
            out.push(DIGITS[usize::try_from(d).unwrap_or(0)]);
        }
        out.push(ch);
    }
    let ones = n % 10;
    if ones > 0 {
        out.push(DIGITS[usize::try_from(ones).unwrap_or(0)]);
    }
}

/// Renders a number as a positional kanji numeral.
///
/// `0` becomes `〇`; `16` becomes `十六`; `20_000` becomes `二万`.
#[must_use]
pub fn number_to_kanji(n: u64) -> String {
    if n == 0 {
        return DIGITS[0].to_string();
    }

    let mut out = String::new();
    for (unit, ch) in [
        (1_000_000_000_000, Some('兆')),
        (100_000_000, Some('億')),
        (10_000, Some('万')),
        (1, None),
    ] {
        let block = (n / unit) % 10_000;
        if block == 0 {
            continue;
        }
        section_to_kanji(block, &mut out);
        if let Some(ch) = ch {
            out.push(ch);
        }
    }
    out
}

/// Replaces every kanji numeral run in `s` with Arabic digits.
///
/// Runs that cannot be parsed are kept as written, so `kanji_to_arabic`
/// never loses text.
#[must_use]
pub fn kanji_to_arabic(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut run = String::new();

    let flush = |run: &mut String, out: &mut String| {
        if run.is_empty() {
            return;
        }
        let normalized = run.replace("一千", "千");
        match parse_kanji_number(&normalized) {
            Some(n) => out.push_str(&n.to_string()),
            None => out.push_str(run),
        }
        run.clear();
    };

    for c in s.chars() {
        if is_kanji_numeral_char(c) {
            run.push(c);
        } else {
            flush(&mut run, &mut out);
            out.push(c);
        }
    }
    flush(&mut run, &mut out);

    out
}

/// Converts full-width digits and Latin letters to their ASCII forms.
///
/// Only these characters go through NFKC; half-width katakana and other
/// compatibility glyphs are left as they are.
#[must_use]
pub fn zenkaku_to_hankaku(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '０'..='９' | 'Ａ'..='Ｚ' | 'ａ'..='ｚ' => out.extend(std::iter::once(c).nfkc()),
            _ => out.push(c),
        }
    }
    out
}

/// Converts ASCII digits and Latin letters to their full-width forms.
#[must_use]
pub fn hankaku_to_zenkaku(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                char::from_u32(u32::from(c) + 0xFEE0).unwrap_or(c)
            } else {
                c
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_positional_numerals() {
        assert_eq!(parse_kanji_number("十"), Some(10));
        assert_eq!(parse_kanji_number("十六"), Some(16));
        assert_eq!(parse_kanji_number("二十三"), Some(23));
        assert_eq!(parse_kanji_number("百五"), Some(105));
        assert_eq!(parse_kanji_number("千二百三十四"), Some(1234));
        assert_eq!(parse_kanji_number("三万五千"), Some(35_000));
    }

    #[test]
    fn parses_digit_sequences() {
        assert_eq!(parse_kanji_number("一〇二"), Some(102));
        assert_eq!(parse_kanji_number("〇"), Some(0));
        assert_eq!(parse_kanji_number("壱"), Some(1));
    }

    #[test]
    fn rejects_non_numerals() {
        assert_eq!(parse_kanji_number(""), None);
        assert_eq!(parse_kanji_number("丁目"), None);
        assert_eq!(parse_kanji_number("万"), None);
    }

    #[test]
    fn renders_kanji() {
        assert_eq!(number_to_kanji(0), "〇");
        assert_eq!(number_to_kanji(1), "一");
        assert_eq!(number_to_kanji(10), "十");
        assert_eq!(number_to_kanji(16), "十六");
        assert_eq!(number_to_kanji(205), "二百五");
        assert_eq!(number_to_kanji(1_000), "千");
        assert_eq!(number_to_kanji(20_010), "二万十");
    }

    #[test]
    fn kanji_to_arabic_replaces_each_run() {
        assert_eq!(kanji_to_arabic("三-十二"), "3-12");
        assert_eq!(kanji_to_arabic("一丁目"), "1丁目");
        assert_eq!(kanji_to_arabic("一千二百"), "1200");
        assert_eq!(kanji_to_arabic("ビル"), "ビル");
    }

    #[test]
    fn kanji_to_arabic_keeps_unparsable_runs() {
        assert_eq!(kanji_to_arabic("万-1"), "万-1");
    }

    #[test]
    fn converts_width() {
        assert_eq!(zenkaku_to_hankaku("１２３ＡＢｃ"), "123ABc");
        assert_eq!(zenkaku_to_hankaku("千代田"), "千代田");
        assert_eq!(zenkaku_to_hankaku("ｶﾀｶﾅｰ１"), "ｶﾀｶﾅｰ1");
        assert_eq!(zenkaku_to_hankaku("１－２"), "1－2");
        assert_eq!(hankaku_to_zenkaku("12a"), "１２ａ");
    }

    #[test]
    fn recognizes_dashes() {
        for c in DASH_CHARS {
            assert!(is_dash(*c));
        }
        assert!(!is_dash('の'));
    }
}
