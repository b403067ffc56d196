//! Record locator: external identifier -> canonical record
//!
//! Resolution order, first hit wins:
//! 1. exact match on the raw serial
//! 2. match on the decoded token
//! 3. when percent escapes remain, percent-decode once and retry 1-2
//! 4. legacy reconstructions, accepted only when they name a single record
//!
//! The locator is pure: it looks at a snapshot of one regime's records.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use regex::Regex;

use super::codec::{candidates, decode};
use crate::error::{AppError, AppResult};
use crate::models::EquipmentRecord;

static PERCENT_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%[0-9A-Fa-f]{2}").expect("static regex"));

/// Which resolution step produced the match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    Exact,
    Decoded,
    PercentDecoded,
    Legacy,
}

/// A resolved record and its index in the searched slice
#[derive(Debug, Clone, Copy)]
pub struct Located<'a, T> {
    pub record: &'a T,
    pub index: usize,
    pub strategy: MatchStrategy,
}

fn position<T: AsRef<EquipmentRecord>>(records: &[T], serial: &str) -> Option<usize> {
    records.iter().position(|r| r.as_ref().serial == serial)
}

fn exact_or_decoded<T: AsRef<EquipmentRecord>>(
    records: &[T],
    identifier: &str,
) -> Option<(usize, bool)> {
    if let Some(i) = position(records, identifier) {
        return Some((i, false));
    }
    let decoded = decode(identifier);
    if decoded != identifier {
        if let Some(i) = position(records, &decoded) {
            return Some((i, true));
        }
    }
    None
}

/// Resolve `identifier` against `records`, or `None` when nothing (or more
/// than one legacy reconstruction) matches.
pub fn locate<'a, T: AsRef<EquipmentRecord>>(
    identifier: &str,
    records: &'a [T],
) -> Option<Located<'a, T>> {
    let found = move |index: usize, strategy: MatchStrategy| {
        tracing::debug!(
            "Resolved identifier {:?} to serial {:?} ({:?})",
            identifier,
            records[index].as_ref().serial,
            strategy
        );
        Located {
            record: &records[index],
            index,
            strategy,
        }
    };

    if let Some((index, decoded)) = exact_or_decoded(records, identifier) {
        let strategy = if decoded {
            MatchStrategy::Decoded
        } else {
            MatchStrategy::Exact
        };
        return Some(found(index, strategy));
    }

    let mut normalized: Cow<'_, str> = Cow::Borrowed(identifier);
    if PERCENT_ESCAPE.is_match(identifier) {
        if let Ok(unescaped) = percent_decode_str(identifier).decode_utf8() {
            if unescaped != identifier {
                if let Some((index, _)) = exact_or_decoded(records, &unescaped) {
                    return Some(found(index, MatchStrategy::PercentDecoded));
                }
                normalized = Cow::Owned(unescaped.into_owned());
            }
        }
    }

    let mut matches: Vec<usize> = Vec::new();
    for candidate in candidates(&normalized) {
        if let Some(i) = position(records, &candidate) {
            if !matches.contains(&i) {
                matches.push(i);
            }
        }
    }
    match matches.as_slice() {
        [index] => Some(found(*index, MatchStrategy::Legacy)),
        [] => None,
        many => {
            tracing::warn!(
                "Identifier {:?} is ambiguous, it matches {} records: {:?}",
                identifier,
                many.len(),
                many.iter()
                    .map(|i| records[*i].as_ref().serial.as_str())
                    .collect::<Vec<_>>()
            );
            None
        }
    }
}

/// Like [`locate`], mapping a miss to `EquipmentNotFound`.
pub fn find<'a, T: AsRef<EquipmentRecord>>(
    identifier: &str,
    records: &'a [T],
) -> AppResult<Located<'a, T>> {
    locate(identifier, records).ok_or_else(|| AppError::EquipmentNotFound(identifier.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::encode;
    use crate::models::{Maintenance, MaintenanceStatus, Regime};

    fn record(serial: &str) -> EquipmentRecord {
        EquipmentRecord {
            serial: serial.to_string(),
            regime: Regime::Ocm,
            name: None,
            department: "ICU".to_string(),
            model: "M".to_string(),
            manufacturer: "X".to_string(),
            log_number: format!("LOG-{}", serial),
            installation_date: None,
            warranty_end: None,
            maintenance: Maintenance::Ocm {
                service_date: None,
                next_maintenance: None,
                engineer: None,
            },
            status: MaintenanceStatus::Upcoming,
            has_history: false,
        }
    }

    #[test]
    fn test_all_identifier_forms_resolve_to_canonical_serial() {
        let records = vec![record("ABC"), record("SW3266#")];
        for identifier in ["SW3266#", "SW3266-hash", "SW3266%23"] {
            let located = find(identifier, &records).unwrap();
            assert_eq!(located.record.serial, "SW3266#", "identifier {}", identifier);
            assert_eq!(located.index, 1);
        }
        assert_eq!(
            find("SW3266%23", &records).unwrap().strategy,
            MatchStrategy::PercentDecoded
        );
    }

    #[test]
    fn test_exact_match_wins_over_decoding() {
        let records = vec![record("SW3266#"), record("SW3266-hash")];
        let located = find("SW3266-hash", &records).unwrap();
        assert_eq!(located.record.serial, "SW3266-hash");
        assert_eq!(located.strategy, MatchStrategy::Exact);

        let located = find(&encode("SW3266-hash"), &records).unwrap();
        assert_eq!(located.record.serial, "SW3266-hash");
        assert_eq!(located.strategy, MatchStrategy::Decoded);
    }

    #[test]
    fn test_every_encoded_serial_resolves() {
        let serials = ["EU 2017/745", "N-A 243", "ABC/DEF#123", "a&b+c", "50%"];
        let records: Vec<_> = serials.iter().map(|s| record(s)).collect();
        for serial in serials {
            assert_eq!(find(&encode(serial), &records).unwrap().record.serial, serial);
        }
    }

    #[test]
    fn test_legacy_tokens_resolve_when_unambiguous() {
        let records = vec![record("EU 2017/745"), record("ABC/DEF#123"), record("N-A 243")];
        assert_eq!(find("EU-2017-745", &records).unwrap().record.serial, "EU 2017/745");
        assert_eq!(find("ABC-DEF-hash123", &records).unwrap().record.serial, "ABC/DEF#123");
        let located = find("N-A-243", &records).unwrap();
        assert_eq!(located.record.serial, "N-A 243");
        assert_eq!(located.strategy, MatchStrategy::Legacy);
    }

    #[test]
    fn test_ambiguous_legacy_token_is_not_found() {
        let records = vec![record("EU 2017/745"), record("EU/2017 745")];
        assert!(matches!(
            find("EU-2017-745", &records),
            Err(AppError::EquipmentNotFound(_))
        ));
    }

    #[test]
    fn test_unknown_and_garbage_identifiers() {
        let records = vec![record("ABC")];
        assert!(locate("XYZ", &records).is_none());
        assert!(locate("%zz%", &records).is_none());
        assert!(locate("%FF", &records).is_none());
        assert!(locate("", &records).is_none());
        assert!(locate::<EquipmentRecord>("ABC", &[]).is_none());
    }
}
