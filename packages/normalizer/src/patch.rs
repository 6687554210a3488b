//! One-off fixes for residual address text.
//!
//! A few towns have residual text that the generic post-processing gets
//! wrong because the gazetteer spells a numbered sub-area in a way no
//! rule can recover. Each patch is keyed by the exact resolved
//! prefecture, city, and town.

use regex::Regex;
use std::sync::LazyLock;

struct AddrPatch {
    pref: &'static str,
    city: &'static str,
    town: &'static str,
    pattern: Regex,
    result: &'static str,
}

static PATCHES: LazyLock<Vec<AddrPatch>> = LazyLock::new(|| {
    [
        ("香川県", "仲多度郡まんのう町", "勝浦", "^字?家6", "家六"),
        ("愛知県", "あま市", "西今宿", "^梶村1", "梶村一"),
        ("香川県", "丸亀市", "原田町", "^東三分1", "東三分一"),
    ]
    .into_iter()
    .map(|(pref, city, town, pattern, result)| AddrPatch {
        pref,
        city,
        town,
        pattern: Regex::new(pattern).expect("valid regex"),
        result,
    })
    .collect()
});

/// Applies every patch registered for `(pref, city, town)` to `addr`.
#[must_use]
pub fn patch_addr(pref: &str, city: &str, town: &str, addr: &str) -> String {
    let mut patched = addr.to_string();
    for patch in PATCHES
        .iter()
        .filter(|p| p.pref == pref && p.city == city && p.town == town)
    {
        patched = patch.pattern.replace(&patched, patch.result).into_owned();
    }
    patched
}
