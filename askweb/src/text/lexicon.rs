//! Fixed dictionaries consulted by the tokenizer.

use std::collections::HashSet;
use std::sync::LazyLock;

/// Abbreviations and dotted proper names that must stay one token.
pub const ABBREVIATIONS: &[&str] = &[
    "M.City", "V.I.P", "PGS.Ts", "MRS.", "Mrs.", "Man.United", "Mr.", "SHB.ĐN", "Gs.Bs", "U.S.A",
    "TMN.CSG", "Kts.Ts", "R.Madrid", "Tp.", "T.Ư", "D.C", "Gs.Tskh", "PGS.KTS", "GS.BS", "KTS.TS",
    "PGS-TS", "Co.", "S.H.E", "Ths.Bs", "T&T.HN", "MR.", "Ms.", "T.T.P", "TT.", "TP.", "ĐH.QGHN",
    "Gs.Kts", "Man.Utd", "GD-ĐT", "T.W", "Corp.", "ĐT.LA", "Dr.", "T&T", "HN.ACB", "GS.KTS", "MS.",
    "Prof.", "GS.TS", "PGs.Ts", "PGS.BS", "BT.", "Ltd.", "ThS.BS", "Gs.Ts", "SL.NA", "Th.S", "Gs.Vs",
    "PGs.Bs", "T.O.P", "PGS.TS", "HN.T&T", "SG.XT", "O.T.C", "TS.BS", "Yahoo!", "MISS.", "HA.GL",
    "GS.Ts", "TBT.", "GS.VS", "GS.TSKH", "Ts.Bs", "M.U", "Gs.TSKH", "U.S", "Miss.", "GD.ĐT",
    "PGs.Kts", "St.", "Ng.", "Inc.", "Th.", "N.O.V.A",
];

/// Unit tokens, model names and hyphenated names that contain punctuation
/// but are never split.
pub const EXCEPTIONS: &[&str] = &[
    "Wi-fi", "17+", "km/h", "M7", "M8", "21+", "G3", "M9", "G4", "km3", "m/s", "km2", "5g", "4G",
    "8K", "3g", "E9", "U21", "4K", "U23", "Z1", "Z2", "Z3", "Z4", "Z5", "Jong-un", "u19", "5s",
    "wi-fi", "18+", "Wi-Fi", "m2", "16+", "m3", "V-League", "Geun-hye", "5G", "4g", "Z3+", "3G",
    "km/s", "6+", "u21", "WI-FI", "u23", "U19", "6s", "4s",
];

static ABBREVIATION_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| ABBREVIATIONS.iter().copied().collect());

static EXCEPTION_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| EXCEPTIONS.iter().copied().collect());

/// Abbreviations then exceptions, each group longest first, so a substring
/// scan always prefers "Man.United" over "M.U" style prefixes.
static PROTECTED_BY_LENGTH: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    let mut abbreviations: Vec<&'static str> = ABBREVIATIONS.to_vec();
    abbreviations.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    let mut exceptions: Vec<&'static str> = EXCEPTIONS.to_vec();
    exceptions.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    abbreviations.into_iter().chain(exceptions).collect()
});

/// Whether the token is exactly a known abbreviation.
#[must_use]
pub fn is_abbreviation(token: &str) -> bool {
    ABBREVIATION_SET.contains(token)
}

/// Whether the token is exactly a known exception term.
#[must_use]
pub fn is_exception(token: &str) -> bool {
    EXCEPTION_SET.contains(token)
}

/// Finds the first protected term contained in the token.
///
/// Returns the byte span of its first occurrence.
#[must_use]
pub fn find_protected(token: &str) -> Option<(usize, usize)> {
    PROTECTED_BY_LENGTH
        .iter()
        .find_map(|term| token.find(term).map(|start| (start, start + term.len())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_membership() {
        assert!(is_abbreviation("Dr."));
        assert!(is_abbreviation("TP."));
        assert!(!is_abbreviation("dr."));
        assert!(is_exception("km/h"));
        assert!(is_exception("V-League"));
        assert!(!is_exception("km"));
    }

    #[test]
    fn test_find_protected_prefers_longest() {
        assert_eq!(find_protected("(Man.United)"), Some((1, 11)));
        assert_eq!(find_protected("120km/h"), Some((3, 7)));
        assert_eq!(find_protected("bình thường"), None);
    }
}
