//! Severity ranking
//!
//! Orders sites by descending severity and keeps the top N. Equal severities
//! are ordered by ascending `geo_id`; records that still compare equal
//! (duplicate ids in an ad hoc slice) keep their input order because the
//! sort is stable.

use std::cmp::Ordering;

use types::site::SiteRecord;

/// Number of sites pushed per snapshot.
pub const DEFAULT_TOP_N: usize = 30;

/// Urgency order: higher severity first, then lexicographic geo id.
pub fn compare_by_urgency(a: &SiteRecord, b: &SiteRecord) -> Ordering {
    b.severity
        .cmp(&a.severity)
        .then_with(|| a.geo_id.cmp(&b.geo_id))
}

/// Return references to the `n` most urgent records, most urgent first.
///
/// Never copies records and never fails; the result length is
/// `min(n, records.len())`.
pub fn rank_top_n(records: &[SiteRecord], n: usize) -> Vec<&SiteRecord> {
    let mut ranked: Vec<&SiteRecord> = records.iter().collect();
    ranked.sort_by(|a, b| compare_by_urgency(a, b));
    ranked.truncate(n);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use types::numeric::Severity;

    fn site(id: &str, severity: f64) -> SiteRecord {
        SiteRecord::new(id, Severity::new(severity).unwrap(), "Dallas", "CQI", None)
    }

    fn ids(ranked: &[&SiteRecord]) -> Vec<String> {
        ranked.iter().map(|s| s.geo_id.to_string()).collect()
    }

    #[test]
    fn test_top_two_of_three() {
        let records = vec![site("A", 5.0), site("B", 1.0), site("C", 9.0)];
        let ranked = rank_top_n(&records, 2);
        assert_eq!(ids(&ranked), vec!["C", "A"]);
    }

    #[test]
    fn test_fewer_records_than_n() {
        let records = vec![site("A", 5.0), site("B", 1.0), site("C", 9.0)];
        let ranked = rank_top_n(&records, DEFAULT_TOP_N);
        assert_eq!(ranked.len(), 3);
        assert_eq!(ids(&ranked), vec!["C", "A", "B"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(rank_top_n(&[], DEFAULT_TOP_N).is_empty());
    }

    #[test]
    fn test_zero_n() {
        let records = vec![site("A", 5.0)];
        assert!(rank_top_n(&records, 0).is_empty());
    }

    #[test]
    fn test_ties_break_on_geo_id() {
        let records = vec![site("DAL016", 3.0), site("CHI003", 3.0), site("OKL044", 3.0)];
        let ranked = rank_top_n(&records, 3);
        assert_eq!(ids(&ranked), vec!["CHI003", "DAL016", "OKL044"]);
    }

    #[test]
    fn test_duplicate_ids_keep_input_order() {
        let first = SiteRecord::new("X", Severity::new(2.0).unwrap(), "first", "CQI", None);
        let second = SiteRecord::new("X", Severity::new(2.0).unwrap(), "second", "CQI", None);
        let records = vec![first, second];
        let ranked = rank_top_n(&records, 2);
        assert_eq!(ranked[0].market(), Some("first"));
        assert_eq!(ranked[1].market(), Some("second"));
    }

    #[test]
    fn test_negative_and_fractional_severities() {
        let records = vec![site("A", -1.5), site("B", 0.25), site("C", 0.2)];
        let ranked = rank_top_n(&records, 3);
        assert_eq!(ids(&ranked), vec!["B", "C", "A"]);
    }

    proptest! {
        #[test]
        fn prop_sorted_descending_and_bounded(
            severities in proptest::collection::vec(-100.0f64..100.0, 0..80),
            n in 0usize..50,
        ) {
            let records: Vec<SiteRecord> = severities
                .iter()
                .enumerate()
                .map(|(i, s)| site(&format!("S{:03}", i), *s))
                .collect();

            let ranked = rank_top_n(&records, n);

            prop_assert_eq!(ranked.len(), n.min(records.len()));
            for pair in ranked.windows(2) {
                prop_assert!(pair[0].severity >= pair[1].severity);
            }

            // nothing left out ranks above the weakest included record
            if let Some(last) = ranked.last() {
                let included: Vec<&str> = ranked.iter().map(|s| s.geo_id.as_str()).collect();
                for r in records.iter().filter(|r| !included.contains(&r.geo_id.as_str())) {
                    prop_assert!(r.severity <= last.severity);
                }
            }
        }
    }
}
