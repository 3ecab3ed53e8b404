//! Reduction of overlapping score values to one value per variant.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How the values of several score rows are reduced to one.
///
/// Each value is paired with its overlap count. `mean` and `median` weigh a
/// value by its count, `max` and `min` ignore counts.
#[derive(
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Debug,
    Clone,
    Copy,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
)]
#[serde(try_from = "String", into = "String")]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
pub enum Aggregator {
    Mean,
    Max,
    Min,
    Median,
}

impl Aggregator {
    pub fn aggregate<I>(&self, values: I) -> Option<f64>
    where
        I: IntoIterator<Item = (i64, Option<f64>)>,
    {
        match self {
            Aggregator::Mean => weighted_mean(values),
            Aggregator::Max => max(values.into_iter().map(|(_, value)| value)),
            Aggregator::Min => min(values.into_iter().map(|(_, value)| value)),
            Aggregator::Median => weighted_median(values),
        }
    }
}

impl TryFrom<String> for Aggregator {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Aggregator::from_str(&value).map_err(|_| format!("unknown aggregator {:?}", value))
    }
}

impl From<Aggregator> for String {
    fn from(value: Aggregator) -> Self {
        value.to_string()
    }
}

/// Mean of the present values weighted by their overlap counts.
///
/// Missing values contribute neither to the numerator nor to the weight sum.
/// Returns `None` when no value is present.
pub fn weighted_mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = (i64, Option<f64>)>,
{
    let (sum, weight) = values
        .into_iter()
        .filter_map(|(count, value)| value.map(|value| (count as f64, value)))
        .fold((0f64, 0f64), |(sum, weight), (count, value)| {
            (sum + count * value, weight + count)
        });
    if weight > 0.0 {
        Some(sum / weight)
    } else {
        None
    }
}

/// Median of the present values, each repeated by its count.
///
/// For an even total count this is the mean of the two middle values.
pub fn weighted_median<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = (i64, Option<f64>)>,
{
    let mut present = values
        .into_iter()
        .filter_map(|(count, value)| value.filter(|v| !v.is_nan()).map(|v| (count.max(0), v)))
        .filter(|(count, _)| *count > 0)
        .collect::<Vec<_>>();
    present.sort_by(|(_, a), (_, b)| a.total_cmp(b));
    let total: i64 = present.iter().map(|(count, _)| count).sum();
    if total == 0 {
        return None;
    }

    // 0-based ranks of the middle element(s)
    let value_at = |rank: i64| {
        let mut seen = 0i64;
        present.iter().find_map(|(count, value)| {
            seen += *count;
            (rank < seen).then_some(*value)
        })
    };
    let upper = value_at(total / 2)?;
    if total % 2 == 1 {
        Some(upper)
    } else {
        Some((value_at(total / 2 - 1)? + upper) / 2.0)
    }
}

/// Maximum of the present values.
pub fn max<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    values
        .into_iter()
        .flatten()
        .filter(|value| !value.is_nan())
        .fold(None, |acc: Option<f64>, value| {
            Some(acc.map_or(value, |acc| acc.max(value)))
        })
}

/// Minimum of the present values.
pub fn min<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    values
        .into_iter()
        .flatten()
        .filter(|value| !value.is_nan())
        .fold(None, |acc: Option<f64>, value| {
            Some(acc.map_or(value, |acc| acc.min(value)))
        })
}

/// Render an aggregated value for output.
pub fn format_value(value: f64) -> String {
    value.to_string()
}

#[cfg(test)]
mod test {
    use float_cmp::approx_eq;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn weighted_mean_by_count() {
        let value = weighted_mean(vec![(3, Some(5.0)), (1, Some(9.0))]).unwrap();

        assert!(approx_eq!(f64, value, 6.0, ulps = 2));
    }

    #[test]
    fn weighted_mean_skips_missing() {
        let value = weighted_mean(vec![(3, None), (1, Some(9.0)), (2, None)]).unwrap();

        assert!(approx_eq!(f64, value, 9.0, ulps = 2));
        assert_eq!(weighted_mean(vec![(3, None), (1, None)]), None);
        assert_eq!(weighted_mean(Vec::<(i64, Option<f64>)>::new()), None);
    }

    #[test]
    fn min_and_max() {
        let values = vec![Some(0.5), None, Some(0.8), Some(-1.0)];

        assert_eq!(max(values.clone()), Some(0.8));
        assert_eq!(min(values), Some(-1.0));
        assert_eq!(max(vec![None, Some(f64::NAN)]), None);
        assert_eq!(min(Vec::<Option<f64>>::new()), None);
    }

    #[rstest::rstest]
    #[case(vec![(1, Some(3.0)), (1, Some(1.0)), (1, Some(2.0))], Some(2.0))]
    #[case(vec![(1, Some(4.0)), (1, Some(1.0))], Some(2.5))]
    #[case(vec![(3, Some(1.0)), (1, Some(9.0))], Some(1.0))]
    #[case(vec![(2, Some(1.0)), (2, Some(9.0))], Some(5.0))]
    #[case(vec![(2, None), (1, Some(7.0))], Some(7.0))]
    #[case(vec![(2, None)], None)]
    fn median_by_count(#[case] values: Vec<(i64, Option<f64>)>, #[case] expected: Option<f64>) {
        assert_eq!(weighted_median(values), expected);
    }

    #[rstest::rstest]
    #[case(Aggregator::Mean, Some(6.0))]
    #[case(Aggregator::Max, Some(9.0))]
    #[case(Aggregator::Min, Some(5.0))]
    #[case(Aggregator::Median, Some(5.0))]
    fn aggregator_cases(#[case] aggregator: Aggregator, #[case] expected: Option<f64>) {
        let values = vec![(3, Some(5.0)), (1, None), (1, Some(9.0))];

        assert_eq!(aggregator.aggregate(values), expected);
    }

    #[test]
    fn aggregator_names() {
        use strum::IntoEnumIterator;

        for aggregator in Aggregator::iter() {
            assert_eq!(aggregator.to_string().parse::<Aggregator>().unwrap(), aggregator);
        }
        assert_eq!("MAX".parse::<Aggregator>().unwrap(), Aggregator::Max);
        assert!(Aggregator::try_from(String::from("mode")).is_err());
    }

    #[rstest::rstest]
    #[case(0.5, "0.5")]
    #[case(6.0, "6")]
    #[case(-1.25, "-1.25")]
    fn format(#[case] value: f64, #[case] expected: &str) {
        assert_eq!(format_value(value), expected);
    }
}
