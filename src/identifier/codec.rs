//! Serial number <-> URL token codec
//!
//! Each marked character becomes `-` followed by a lowercase marker word.
//! The hyphen itself is marked, so every `-` in an encoded token starts a
//! marker and decoding is exact. The marker words are prefix-free.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::models::{EquipmentLinks, Regime};

const MARKERS: [(char, &str); 9] = [
    ('#', "hash"),
    ('/', "slash"),
    (' ', "space"),
    ('-', "dash"),
    ('\\', "backslash"),
    ('?', "question"),
    ('&', "and"),
    ('%', "percent"),
    ('+', "plus"),
];

/// Upper bound on legacy reconstructions returned by [`candidates`]
pub const MAX_CANDIDATES: usize = 256;

/// Characters escaped when a token is placed in a path segment
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn marker_for(c: char) -> Option<&'static str> {
    MARKERS.iter().find(|(m, _)| *m == c).map(|(_, word)| *word)
}

/// Serial -> URL token. Serials without marked characters are returned unchanged.
pub fn encode(serial: &str) -> String {
    let mut out = String::with_capacity(serial.len() + 8);
    for c in serial.chars() {
        match marker_for(c) {
            Some(word) => {
                out.push('-');
                out.push_str(word);
            }
            None => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    /// A `-` not followed by any marker word
    Hyphen,
}

fn segments(token: &str) -> Vec<Segment> {
    let mut out = Vec::new();
    let mut text = String::new();
    let mut rest = token;

    while let Some(c) = rest.chars().next() {
        if c == '-' {
            let after = &rest[1..];
            if let Some((decoded, word)) = MARKERS.iter().find(|(_, w)| after.starts_with(w)) {
                text.push(*decoded);
                rest = &after[word.len()..];
            } else {
                if !text.is_empty() {
                    out.push(Segment::Text(std::mem::take(&mut text)));
                }
                out.push(Segment::Hyphen);
                rest = after;
            }
        } else {
            text.push(c);
            rest = &rest[c.len_utf8()..];
        }
    }
    if !text.is_empty() {
        out.push(Segment::Text(text));
    }
    out
}

fn join(segments: &[Segment], hyphens: &[char]) -> String {
    let mut out = String::new();
    let mut next = hyphens.iter();
    for segment in segments {
        match segment {
            Segment::Text(t) => out.push_str(t),
            Segment::Hyphen => out.push(next.next().copied().unwrap_or('-')),
        }
    }
    out
}

/// URL token -> serial. Unmarked hyphens are kept as `-`.
pub fn decode(token: &str) -> String {
    join(&segments(token), &[])
}

/// Alternative serials a legacy token may stand for.
///
/// The old encoder wrote `/`, space and `-` all as `-`. Every unmarked hyphen
/// is expanded to each of those, starting with the whole-token patterns
/// (all spaces, all slashes, space then slashes, slashes then space) followed
/// by the per-hyphen combinations, capped at [`MAX_CANDIDATES`]. The plain
/// [`decode`] result is not repeated.
pub fn candidates(token: &str) -> Vec<String> {
    let segments = segments(token);
    let hyphens = segments
        .iter()
        .filter(|s| matches!(s, Segment::Hyphen))
        .count();
    if hyphens == 0 {
        return Vec::new();
    }

    let mut patterns: Vec<Vec<char>> = vec![vec![' '; hyphens], vec!['/'; hyphens]];
    if hyphens >= 2 {
        let mut space_then_slashes = vec!['/'; hyphens];
        space_then_slashes[0] = ' ';
        patterns.push(space_then_slashes);

        let mut slashes_then_space = vec!['/'; hyphens];
        slashes_then_space[hyphens - 1] = ' ';
        patterns.push(slashes_then_space);
    }

    const CHOICES: [char; 3] = ['-', '/', ' '];
    let combinations = u32::try_from(hyphens)
        .ok()
        .and_then(|n| 3usize.checked_pow(n))
        .unwrap_or(usize::MAX)
        .min(MAX_CANDIDATES);
    for mut n in 0..combinations {
        let mut choice = Vec::with_capacity(hyphens);
        for _ in 0..hyphens {
            choice.push(CHOICES[n % 3]);
            n /= 3;
        }
        patterns.push(choice);
    }

    let plain = join(&segments, &[]);
    let mut out: Vec<String> = Vec::new();
    for pattern in patterns {
        let candidate = join(&segments, &pattern);
        if candidate != plain && !out.contains(&candidate) {
            out.push(candidate);
        }
        if out.len() >= MAX_CANDIDATES {
            break;
        }
    }
    out
}

/// API paths for a record, built from its encoded serial.
pub fn links(regime: Regime, serial: &str) -> EquipmentLinks {
    let token = encode(serial);
    let segment = utf8_percent_encode(&token, PATH_SEGMENT);
    let detail = format!("/api/v1/equipment/{}/{}", regime, segment);
    EquipmentLinks {
        history: format!("{}/history", detail),
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_known_serials() {
        assert_eq!(encode("SW3266#"), "SW3266-hash");
        assert_eq!(encode("EU 2017/745"), "EU-space2017-slash745");
        assert_eq!(encode("N-A 243"), "N-dashA-space243");
        assert_eq!(encode("A&B+C%D?E\\F"), "A-andB-plusC-percentD-questionE-backslashF");
    }

    #[test]
    fn test_identity_without_marked_characters() {
        for serial in ["Normal123", "", "ÄÖÜfree", "x.y_z~", "MRI9000"] {
            assert_eq!(encode(serial), serial);
            assert_eq!(decode(serial), serial);
        }
    }

    #[test]
    fn test_round_trip_on_awkward_serials() {
        for serial in [
            "SW3266#",
            "SW3266-hash",
            "-hash-",
            "--",
            "a-dash b",
            "ABC/DEF#123",
            "trailing-",
            "#/ -\\?&%+",
            "naïve/ünïcode",
        ] {
            assert_eq!(decode(&encode(serial)), serial, "serial {:?}", serial);
        }
    }

    #[test]
    fn test_encoded_token_is_url_safe() {
        let token = encode("EU 2017/745#A&B");
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
    }

    #[test]
    fn test_decode_keeps_unmarked_hyphens() {
        assert_eq!(decode("EU-2017-745"), "EU-2017-745");
        assert_eq!(decode("ABC-DEF-hash123"), "ABC-DEF#123");
        assert_eq!(decode("-"), "-");
        assert_eq!(decode("x-Hash"), "x-Hash");
    }

    #[test]
    fn test_candidates_cover_legacy_patterns() {
        let c = candidates("EU-2017-745");
        assert_eq!(c[0], "EU 2017 745");
        assert_eq!(c[1], "EU/2017/745");
        assert_eq!(c[2], "EU 2017/745");
        assert_eq!(c[3], "EU/2017 745");
        assert!(c.contains(&"EU-2017 745".to_string()));
        assert!(!c.contains(&"EU-2017-745".to_string()));
        assert_eq!(c.len(), 8);
    }

    #[test]
    fn test_candidates_keep_markers() {
        let c = candidates("ABC-DEF-hash123");
        assert!(c.contains(&"ABC/DEF#123".to_string()));
        assert!(candidates("SW3266-hash").is_empty());
        assert!(candidates("Normal123").is_empty());
    }

    #[test]
    fn test_candidates_are_bounded() {
        let token = "a-".repeat(40);
        assert!(candidates(&token).len() <= MAX_CANDIDATES);
    }

    #[test]
    fn test_links_use_token() {
        let l = links(Regime::Ocm, "SW3266#");
        assert_eq!(l.detail, "/api/v1/equipment/ocm/SW3266-hash");
        assert_eq!(l.history, "/api/v1/equipment/ocm/SW3266-hash/history");

        let l = links(Regime::Ppm, "ü 1");
        assert_eq!(l.detail, "/api/v1/equipment/ppm/%C3%BC-space1");
    }

    #[test]
    fn test_round_trip_every_short_serial() {
        const ALPHABET: [char; 6] = ['a', '1', '#', '/', ' ', '-'];
        let mut layer = vec![String::new()];
        let mut checked = 0;
        for _ in 0..=5 {
            let mut next = Vec::with_capacity(layer.len() * ALPHABET.len());
            for serial in &layer {
                assert_eq!(decode(&encode(serial)), *serial, "token {}", encode(serial));
                checked += 1;
                for c in ALPHABET {
                    let mut longer = serial.clone();
                    longer.push(c);
                    next.push(longer);
                }
            }
            layer = next;
        }
        assert_eq!(checked, 9331);
    }
}
