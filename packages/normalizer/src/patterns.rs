//! Match pattern generation for each pipeline stage.
//!
//! Every stage tries an ordered list of [`MatchPattern`]s against the
//! unmatched remainder of the input and takes the first hit, so the
//! order produced here is part of the matching semantics:
//!
//! - cities and towns are tried longest name first, so a short name
//!   never shadows a longer one it is a prefix of;
//! - towns starting with `大字` count two characters shorter, so
//!   `XXYY` beats `大字XX` when both would match;
//! - numbered towns (`一丁目`, `三条`, `五番町`, …) accept kanji and
//!   Arabic numerals and every written form of their unit.
//!
//! The functions here are pure; caching lives in [`crate::cache`].

use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::sync::LazyLock;

use ja_address_normalizer_models::{PrefectureTable, TownRecord};
use regex::Regex;

use crate::dict;
use crate::numeral::{self, DASH_CLASS};

/// A canonical entity paired with the pattern that recognizes it at the
/// start of the remaining input.
#[derive(Debug, Clone)]
pub struct MatchPattern<T> {
    /// What a match resolves to.
    pub entity: T,
    /// Compiled pattern, anchored at the start of the input.
    pub pattern: Regex,
}

/// Prefecture name and its pattern.
pub type PrefecturePattern = MatchPattern<String>;

/// City name and its pattern.
pub type CityPattern = MatchPattern<String>;

/// Town record (possibly a derived alias) and its pattern.
pub type TownPattern = MatchPattern<TownRecord>;

/// `{pref}{city}` replacement text and the pattern recognizing the bare
/// city name.
pub type SameNamedPattern = MatchPattern<String>;

/// A kanji numeral followed by a numbered-area unit inside a town name.
static NUMBERED_UNIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([壱一二三四五六七八九十]+)(丁目?|番町|番丁|条|軒|線|の町|ノ町|地割|号)")
        .expect("valid regex")
});

/// Every written form a numbered-area unit may take in input text.
static UNIT_VARIANTS: LazyLock<String> = LazyLock::new(|| {
    format!("(?:(?:丁|町)目?|番(?:町|丁)|条|軒|線|[之ノの]町?|地割|号|{DASH_CLASS})")
});

const PREFECTURE_SUFFIXES: &[char] = &['都', '道', '府', '県'];

/// Strips the trailing 都/道/府/県 from a prefecture name.
#[must_use]
pub fn prefecture_stem(pref: &str) -> &str {
    pref.strip_suffix(PREFECTURE_SUFFIXES).unwrap_or(pref)
}

/// Builds prefecture patterns in the given order. The legal suffix is
/// optional so `東京` matches `東京都`.
///
/// # Errors
///
/// Returns an error if a pattern fails to compile.
pub fn prefecture_patterns<'a>(
    prefs: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<PrefecturePattern>, regex::Error> {
    prefs
        .into_iter()
        .map(|pref| {
            let pattern = format!("^{}(?:都|道|府|県)?", regex::escape(prefecture_stem(pref)));
            Ok(MatchPattern {
                entity: pref.to_string(),
                pattern: Regex::new(&pattern)?,
            })
        })
        .collect()
}

/// Builds city patterns, longest name first.
///
/// For towns and villages (`…町`, `…村`) the county part (`…郡`) is
/// optional since it is routinely left out.
///
/// # Errors
///
/// Returns an error if a pattern fails to compile.
pub fn city_patterns(cities: &[String]) -> Result<Vec<CityPattern>, regex::Error> {
    let mut sorted: Vec<&String> = cities.iter().collect();
    sorted.sort_by_key(|city| Reverse(city.chars().count()));

    sorted
        .into_iter()
        .map(|city| {
            Ok(MatchPattern {
                entity: city.clone(),
                pattern: Regex::new(&format!("^{}", city_pattern_source(city)))?,
            })
        })
        .collect()
}

fn city_pattern_source(city: &str) -> String {
    if city.ends_with('町') || city.ends_with('村') {
        if let Some(idx) = city.find('郡').filter(|&idx| idx > 0) {
            let county = &city[..idx];
            let rest = &city[idx + '郡'.len_utf8()..];
            return format!(
                "(?:{}郡)?{}",
                dict::to_regex_pattern(county),
                dict::to_regex_pattern(rest)
            );
        }
    }
    dict::to_regex_pattern(city)
}

/// Returns `true` if the first `X町` pair of a town name has a kanji
/// numeral as `X` (e.g. `十六町`). Such names are never abbreviated.
fn is_kanji_numeral_followed_by_cho(town: &str) -> bool {
    let chars: Vec<char> = town.chars().collect();
    chars
        .windows(2)
        .find(|pair| pair[1] == '町')
        .is_some_and(|pair| numeral::is_kanji_numeral_char(pair[0]))
}

/// Removes every `町` from a town name except a leading one.
fn abbreviate_town(town: &str) -> String {
    town.char_indices()
        .filter(|&(i, c)| c != '町' || i == 0)
        .map(|(_, c)| c)
        .collect()
}

fn effective_length(town: &str) -> usize {
    let len = town.chars().count();
    if town.starts_with("大字") {
        len.saturating_sub(2)
    } else {
        len
    }
}

/// Expands gazetteer records with `町`-less aliases and sorts them into
/// match order.
///
/// An alias `○○` of `○○町` is added only when no record named `○○` or
/// `大字○○` exists and the name is not a numeral county such as `十六町`.
#[must_use]
pub fn town_candidates(records: &[TownRecord]) -> Vec<TownRecord> {
    let names: BTreeSet<&str> = records.iter().map(|r| r.town.as_str()).collect();
    let mut candidates = Vec::with_capacity(records.len() * 2);

    for record in records {
        candidates.push(record.clone());

        if !record.town.contains('町') {
            continue;
        }

        let abbreviated = abbreviate_town(&record.town);
        if abbreviated == record.town
            || abbreviated.is_empty()
            || names.contains(abbreviated.as_str())
            || names.contains(format!("大字{abbreviated}").as_str())
            || is_kanji_numeral_followed_by_cho(&record.town)
        {
            continue;
        }

        candidates.push(TownRecord {
            town: abbreviated,
            original_town: Some(record.town.clone()),
            ..record.clone()
        });
    }

    candidates.sort_by_key(|r| Reverse(effective_length(&r.town)));
    candidates
}

/// Pattern for the alternation of a numbered unit, e.g. `三丁目` becomes
/// `(?:三|3)` followed by every written form of the unit.
fn numbered_unit_pattern(kanji: &str) -> String {
    let mut forms = vec![dict::to_regex_pattern(kanji)];

    if kanji.starts_with('壱') {
        forms.extend(["一", "1", "１"].map(String::from));
    } else {
        let arabic = numeral::kanji_to_arabic(kanji);
        if arabic != kanji {
            forms.push(regex::escape(&arabic));
        }
    }

    format!("(?:{}){}", forms.join("|"), *UNIT_VARIANTS)
}

/// Pattern for literal town-name text: dashes collapse into one class,
/// `大字`/`字` become optional, and look-alike characters are widened.
fn town_literal_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() * 2);
    let mut pos = 0;

    while pos < text.len() {
        let rest = &text[pos..];

        if let Some(c) = rest.chars().next().filter(|c| numeral::is_dash(*c)) {
            pattern.push_str(DASH_CLASS);
            pos += c.len_utf8();
        } else if rest.starts_with("大字") {
            pattern.push_str("(?:大?字)?");
            pos += "大字".len();
        } else if rest.starts_with('字') {
            pattern.push_str("(?:大?字)?");
            pos += '字'.len_utf8();
        } else {
            let (fragment, len) = dict::variant_at(rest);
            pattern.push_str(&fragment);
            pos += len.max(1);
        }
    }

    pattern
}

/// Unanchored pattern source for one town name.
#[must_use]
pub fn town_pattern_source(town: &str) -> String {
    let mut pattern = String::new();
    let mut last = 0;

    for caps in NUMBERED_UNIT_RE.captures_iter(town) {
        let (Some(whole), Some(kanji)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        pattern.push_str(&town_literal_pattern(&town[last..whole.start()]));
        pattern.push_str(&numbered_unit_pattern(kanji.as_str()));
        last = whole.end();
    }
    pattern.push_str(&town_literal_pattern(&town[last..]));

    pattern
}

/// Builds town patterns for one city in match order.
///
/// Patterns are anchored at the start of the remainder, except in Kyoto
/// city where addresses customarily put street directions (`…通…上る`)
/// before the town name, so any prefix is allowed.
///
/// # Errors
///
/// Returns an error if a pattern fails to compile.
pub fn town_patterns(city: &str, records: &[TownRecord]) -> Result<Vec<TownPattern>, regex::Error> {
    let prefix = if city.starts_with("京都市") { "^.*" } else { "^" };

    town_candidates(records)
        .into_iter()
        .map(|record| {
            let pattern = Regex::new(&format!("{prefix}{}", town_pattern_source(&record.town)))?;
            Ok(MatchPattern {
                entity: record,
                pattern,
            })
        })
        .collect()
}

/// Builds the patterns that restore an omitted prefecture whose name
/// collides with the start of a city name (e.g. `千葉市…` → `千葉県千葉市…`,
/// `石川郡石川町` → `福島県石川郡石川町`).
///
/// # Errors
///
/// Returns an error if a pattern fails to compile.
pub fn same_named_prefecture_city_patterns(
    table: &PrefectureTable,
) -> Result<Vec<SameNamedPattern>, regex::Error> {
    let stems: Vec<&str> = table.prefectures().map(prefecture_stem).collect();
    let mut patterns = Vec::new();

    for (pref, cities) in table.iter() {
        for city in cities {
            for stem in &stems {
                if city.starts_with(stem) {
                    patterns.push(MatchPattern {
                        entity: format!("{pref}{city}"),
                        pattern: Regex::new(&format!("^{}", regex::escape(city)))?,
                    });
                }
            }
        }
    }

    Ok(patterns)
}
