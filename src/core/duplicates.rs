//! Duplicate-timestamp resolution for raw sensor streams.
//!
//! After resolution every offset maps to exactly one value and offsets are
//! strictly increasing.

use crate::error::{PipelineError, Result};
use crate::recording::{Datapoint, Prediction, RawSample};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How to treat several values arriving at the same offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DuplicateTimestampStrategy {
    /// Fail on the first duplicate
    RaiseError,
    /// Keep the last-arriving value, drop the rest
    KeepLastValue,
}

/// Anything positioned on a stream's time axis.
pub trait Timestamped {
    fn offset(&self) -> Duration;

    /// Whether the item carries a value. Items without one never replace
    /// a held item that has one.
    fn has_value(&self) -> bool {
        true
    }
}

impl Timestamped for RawSample {
    fn offset(&self) -> Duration {
        self.offset
    }

    fn has_value(&self) -> bool {
        self.value.is_some()
    }
}

impl Timestamped for Datapoint {
    fn offset(&self) -> Duration {
        self.offset
    }
}

impl Timestamped for Prediction {
    fn offset(&self) -> Duration {
        self.offset
    }
}

/// Streaming resolver: holds back one item until a later offset proves it
/// has no duplicate.
#[derive(Debug)]
pub struct DuplicateResolver<T> {
    strategy: DuplicateTimestampStrategy,
    held: Option<T>,
    last_offset: Option<Duration>,
    duplicates_dropped: usize,
}

impl<T: Timestamped> DuplicateResolver<T> {
    pub fn new(strategy: DuplicateTimestampStrategy) -> Self {
        Self {
            strategy,
            held: None,
            last_offset: None,
            duplicates_dropped: 0,
        }
    }

    /// Feed the next item; returns an item whose offset is now settled.
    pub fn push(&mut self, item: T) -> Result<Option<T>> {
        let offset = item.offset();
        match self.last_offset {
            Some(previous) if offset < previous => {
                return Err(PipelineError::OutOfOrder { previous, offset });
            }
            Some(previous) if offset == previous => match self.strategy {
                DuplicateTimestampStrategy::RaiseError => {
                    return Err(PipelineError::DuplicateTimestamp { offset });
                }
                DuplicateTimestampStrategy::KeepLastValue => {
                    let held_has_value = self.held.as_ref().is_some_and(|held| held.has_value());
                    if item.has_value() || !held_has_value {
                        self.held = Some(item);
                    }
                    self.duplicates_dropped += 1;
                    return Ok(None);
                }
            },
            _ => {}
        }
        self.last_offset = Some(offset);
        Ok(self.held.replace(item))
    }

    /// Release the held item at end of input.
    pub fn finish(&mut self) -> Option<T> {
        self.held.take()
    }

    pub fn duplicates_dropped(&self) -> usize {
        self.duplicates_dropped
    }
}

/// Output of [`resolve_duplicates`].
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution<T> {
    pub items: Vec<T>,
    pub duplicates_dropped: usize,
}

/// Resolve duplicate offsets in an ordered stream.
///
/// Offsets must be non-decreasing; a backwards step fails with `OutOfOrder`
/// rather than being re-sorted.
pub fn resolve_duplicates<T: Timestamped>(
    items: Vec<T>,
    strategy: DuplicateTimestampStrategy,
) -> Result<Resolution<T>> {
    let mut resolver = DuplicateResolver::new(strategy);
    let mut resolved: Vec<T> = Vec::with_capacity(items.len());

    for item in items {
        resolved.extend(resolver.push(item)?);
    }
    resolved.extend(resolver.finish());

    Ok(Resolution {
        items: resolved,
        duplicates_dropped: resolver.duplicates_dropped(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::Measurement;

    fn sample(offset_ms: u64, value: f64) -> RawSample {
        RawSample::new(Duration::from_millis(offset_ms), Measurement::scalar(value))
    }

    #[test]
    fn test_keep_last_value() {
        let input = vec![sample(1, 1.0), sample(1, 2.0), sample(2, 3.0)];
        let resolution =
            resolve_duplicates(input, DuplicateTimestampStrategy::KeepLastValue).unwrap();

        assert_eq!(resolution.items, vec![sample(1, 2.0), sample(2, 3.0)]);
        assert_eq!(resolution.duplicates_dropped, 1);
    }

    #[test]
    fn test_absent_value_does_not_replace_held_value() {
        let input = vec![
            sample(1, 1.0),
            RawSample::missing(Duration::from_millis(1)),
            sample(2, 3.0),
        ];
        let resolution =
            resolve_duplicates(input, DuplicateTimestampStrategy::KeepLastValue).unwrap();

        assert_eq!(resolution.items, vec![sample(1, 1.0), sample(2, 3.0)]);
        assert_eq!(resolution.duplicates_dropped, 1);
    }

    #[test]
    fn test_value_replaces_held_absent_value() {
        let input = vec![
            RawSample::missing(Duration::from_millis(1)),
            sample(1, 2.0),
            RawSample::missing(Duration::from_millis(1)),
        ];
        let resolution =
            resolve_duplicates(input, DuplicateTimestampStrategy::KeepLastValue).unwrap();

        assert_eq!(resolution.items, vec![sample(1, 2.0)]);
        assert_eq!(resolution.duplicates_dropped, 2);
    }

    #[test]
    fn test_raise_error_reports_offset() {
        let input = vec![sample(1, 1.0), sample(1, 2.0), sample(2, 3.0)];
        let err = resolve_duplicates(input, DuplicateTimestampStrategy::RaiseError).unwrap_err();

        assert_eq!(
            err,
            PipelineError::DuplicateTimestamp {
                offset: Duration::from_millis(1)
            }
        );
    }

    #[test]
    fn test_triple_duplicate_keeps_last() {
        let input = vec![sample(5, 1.0), sample(5, 2.0), sample(5, 3.0)];
        let resolution =
            resolve_duplicates(input, DuplicateTimestampStrategy::KeepLastValue).unwrap();

        assert_eq!(resolution.items, vec![sample(5, 3.0)]);
        assert_eq!(resolution.duplicates_dropped, 2);
    }

    #[test]
    fn test_out_of_order_fails_fast() {
        let input = vec![sample(10, 1.0), sample(5, 2.0)];
        let err = resolve_duplicates(input, DuplicateTimestampStrategy::KeepLastValue).unwrap_err();
        assert!(matches!(err, PipelineError::OutOfOrder { .. }));
    }

    #[test]
    fn test_no_duplicates_is_identity() {
        let input = vec![sample(0, 1.0), sample(4, 2.0), sample(8, 3.0)];
        for strategy in [
            DuplicateTimestampStrategy::RaiseError,
            DuplicateTimestampStrategy::KeepLastValue,
        ] {
            let resolution = resolve_duplicates(input.clone(), strategy).unwrap();
            assert_eq!(resolution.items, input);
            assert_eq!(resolution.duplicates_dropped, 0);
        }
    }

    #[test]
    fn test_streaming_resolver_holds_one_item() {
        let mut resolver = DuplicateResolver::new(DuplicateTimestampStrategy::KeepLastValue);

        assert_eq!(resolver.push(sample(1, 1.0)).unwrap(), None);
        assert_eq!(resolver.push(sample(1, 2.0)).unwrap(), None);
        assert_eq!(resolver.push(sample(3, 3.0)).unwrap(), Some(sample(1, 2.0)));
        assert_eq!(resolver.finish(), Some(sample(3, 3.0)));
        assert_eq!(resolver.finish(), None);
        assert_eq!(resolver.duplicates_dropped(), 1);
    }

    #[test]
    fn test_strategy_serializes_as_enum_name() {
        let json = serde_json::to_string(&DuplicateTimestampStrategy::KeepLastValue).unwrap();
        assert_eq!(json, "\"KEEP_LAST_VALUE\"");
    }
}
