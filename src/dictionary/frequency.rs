use crate::core::{
    utils::{
        escape_html,
        group_thousands,
    },
    FrequencyPair,
    RankValue,
};

/// Stand-in rank for a missing value, "effectively unranked".
pub const UNRANKED: u64 = 9_999_999;

/// Largest float that still converts to i64 exactly
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Parses each pair's raw value into a positive rank, `None` where it cannot.
pub fn extract_ranks(pairs: &[FrequencyPair]) -> Vec<Option<f64>> {
    pairs.iter().map(|pair| parse_rank(&pair.value)).collect()
}

/// Accepts positive numbers, numeric strings and `numerator/denominator` strings
/// (only the numerator counts). Zero, negatives and non-finite values are rejected.
pub fn parse_rank(value: &RankValue) -> Option<f64> {
    let rank = match value {
        RankValue::Number(n) => *n,
        RankValue::Text(text) => {
            let numerator = text.split('/').next().unwrap_or_default();
            numerator.trim().parse::<f64>().ok()?
        }
        RankValue::Flag(_) | RankValue::Null => return None,
    };
    (rank.is_finite() && rank > 0.0).then_some(rank)
}

/// Harmonic mean of the ranks, rounded. Missing ranks count as [`UNRANKED`] so that
/// absent data pulls the aggregate towards "rare" rather than towards zero.
pub fn harmonic_rank(ranks: &[Option<f64>]) -> u64 {
    let values: Vec<f64> = ranks.iter().map(|r| r.unwrap_or(UNRANKED as f64)).collect();

    match values.as_slice() {
        [] => UNRANKED,
        [single] => single.round() as u64,
        _ => {
            let reciprocal_sum: f64 = values.iter().map(|v| 1.0 / v).sum();
            (values.len() as f64 / reciprocal_sum).round() as u64
        }
    }
}

/// Display list of the raw pairs. Whole numbers get thousands separators; every other
/// value is shown as written.
pub fn format_list(pairs: &[FrequencyPair]) -> String {
    if pairs.is_empty() {
        return String::new();
    }

    let items: String = pairs
        .iter()
        .map(|pair| {
            format!(
                "<li>{}: {}</li>",
                escape_html(&pair.source),
                escape_html(&display_value(&pair.value))
            )
        })
        .collect();
    format!("<ul class=\"jreader-frequency\">{}</ul>", items)
}

fn display_value(value: &RankValue) -> String {
    match value {
        RankValue::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_EXACT_INTEGER => {
            group_thousands(*n as i64)
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn pair(source: &str, value: RankValue) -> FrequencyPair {
        FrequencyPair::new(source, value)
    }

    #[test]
    fn test_extract_ranks() {
        let pairs = vec![
            pair("JPDB", RankValue::Number(1234.0)),
            pair("Novels", RankValue::Text("5678".to_string())),
            pair("Anime", RankValue::Text("42/1000".to_string())),
            pair("Broken", RankValue::Text("㋕".to_string())),
            pair("Zero", RankValue::Number(0.0)),
            pair("Negative", RankValue::Text("-3".to_string())),
            pair("Flag", RankValue::Flag(true)),
            pair("Null", RankValue::Null),
            pair("Infinite", RankValue::Text("inf".to_string())),
        ];

        assert_eq!(
            extract_ranks(&pairs),
            vec![Some(1234.0), Some(5678.0), Some(42.0), None, None, None, None, None, None]
        );
        assert!(extract_ranks(&[]).is_empty());
    }

    #[test]
    fn test_harmonic_rank() {
        assert_eq!(harmonic_rank(&[Some(100.0)]), 100);
        assert_eq!(harmonic_rank(&[]), UNRANKED);
        assert_eq!(harmonic_rank(&[None]), UNRANKED);
        assert_eq!(harmonic_rank(&[Some(100.0), Some(300.0)]), 150);

        let expected = (3.0_f64 / (1.0 / 100.0 + 1.0 / 9_999_999.0 + 1.0 / 300.0)).round() as u64;
        let with_gap = harmonic_rank(&[Some(100.0), None, Some(300.0)]);
        assert_eq!(with_gap, expected);
        assert!(with_gap > harmonic_rank(&[Some(100.0), Some(300.0)]));
        assert!(with_gap < 300);
    }

    #[test]
    fn test_format_list() {
        let pairs = vec![
            pair("JPDB", RankValue::Number(12345.0)),
            pair("Novels", RankValue::Text("5/12".to_string())),
            pair("Ratio", RankValue::Number(2.5)),
            pair("Flag", RankValue::Flag(false)),
            pair("<Odd>", RankValue::Null),
        ];

        assert_eq!(
            format_list(&pairs),
            "<ul class=\"jreader-frequency\">\
             <li>JPDB: 12,345</li>\
             <li>Novels: 5/12</li>\
             <li>Ratio: 2.5</li>\
             <li>Flag: false</li>\
             <li>&lt;Odd&gt;: null</li>\
             </ul>"
        );
        assert_eq!(format_list(&[]), "");
    }

    proptest! {
        #[test]
        fn prop_harmonic_rank_stays_within_bounds(ranks in prop::collection::vec(1u32..5_000_000, 1..12)) {
            let as_ranks: Vec<Option<f64>> = ranks.iter().map(|r| Some(*r as f64)).collect();
            let min = *ranks.iter().min().unwrap() as u64;
            let max = *ranks.iter().max().unwrap() as u64;
            let rank = harmonic_rank(&as_ranks);
            prop_assert!(rank >= min && rank <= max);
        }
    }
}
