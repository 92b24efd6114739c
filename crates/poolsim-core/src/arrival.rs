//! Arrival records and helpers over time-sorted arrival streams.

use serde::{Deserialize, Serialize};

use crate::error::InputError;

/// Number of job classes the model serves.
pub const CLASS_COUNT: usize = 3;

/// Job class of an arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum JobClass {
    One,
    Two,
    Three,
}

impl JobClass {
    pub const ALL: [Self; CLASS_COUNT] = [Self::One, Self::Two, Self::Three];

    /// Map a raw class id (1..=3) to a class; anything else is `None`.
    #[must_use]
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Self::One),
            2 => Some(Self::Two),
            3 => Some(Self::Three),
            _ => None,
        }
    }

    /// Raw class id (1..=3).
    #[must_use]
    pub fn id(self) -> u8 {
        self.index() as u8 + 1
    }

    /// Zero-based index for per-class arrays.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::One => 0,
            Self::Two => 1,
            Self::Three => 2,
        }
    }
}

impl TryFrom<u8> for JobClass {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_id(value).ok_or_else(|| format!("job class must be 1, 2 or 3, got {value}"))
    }
}

impl From<JobClass> for u8 {
    fn from(class: JobClass) -> Self {
        class.id()
    }
}

impl std::fmt::Display for JobClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// One job arrival: a timestamp in seconds and its class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Arrival {
    pub time: f64,
    pub class: JobClass,
}

impl Arrival {
    #[must_use]
    pub fn new(time: f64, class: JobClass) -> Self {
        Self { time, class }
    }
}

/// Check that every time is finite and that the stream never goes backwards.
///
/// Equal consecutive timestamps are accepted. The stream is never re-sorted:
/// disorder means the producer is broken and is reported as such.
pub fn validate_stream(arrivals: &[Arrival]) -> Result<(), InputError> {
    let mut previous = f64::NEG_INFINITY;
    for (index, arrival) in arrivals.iter().enumerate() {
        if !arrival.time.is_finite() {
            return Err(InputError::NonFiniteTime {
                index,
                time: arrival.time,
            });
        }
        if arrival.time < previous {
            return Err(InputError::OutOfOrder {
                index,
                time: arrival.time,
                previous,
            });
        }
        previous = arrival.time;
    }
    Ok(())
}

/// Arrivals with `from <= time < to`, found by binary search on a sorted stream.
#[must_use]
pub fn slice_window(arrivals: &[Arrival], from: f64, to: f64) -> &[Arrival] {
    let lo = arrivals.partition_point(|a| a.time < from);
    let hi = arrivals.partition_point(|a| a.time < to);
    if hi <= lo { &[] } else { &arrivals[lo..hi] }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(times: &[f64]) -> Vec<Arrival> {
        times
            .iter()
            .map(|&t| Arrival::new(t, JobClass::One))
            .collect()
    }

    #[test]
    fn class_id_roundtrip() {
        for class in JobClass::ALL {
            assert_eq!(JobClass::from_id(class.id()), Some(class));
        }
        assert_eq!(JobClass::from_id(0), None);
        assert_eq!(JobClass::from_id(4), None);
    }

    #[test]
    fn class_serde_uses_numeric_id() {
        let json = serde_json::to_string(&Arrival::new(1.5, JobClass::Three)).unwrap();
        assert_eq!(json, r#"{"time":1.5,"class":3}"#);
        assert!(serde_json::from_str::<Arrival>(r#"{"time":1.0,"class":9}"#).is_err());
    }

    #[test]
    fn validate_accepts_ties() {
        assert!(validate_stream(&stream(&[0.0, 1.0, 1.0, 2.5])).is_ok());
        assert!(validate_stream(&[]).is_ok());
    }

    #[test]
    fn validate_rejects_disorder() {
        let err = validate_stream(&stream(&[0.0, 2.0, 1.0])).unwrap_err();
        assert_eq!(
            err,
            InputError::OutOfOrder {
                index: 2,
                time: 1.0,
                previous: 2.0
            }
        );
    }

    #[test]
    fn validate_rejects_nan() {
        let err = validate_stream(&stream(&[0.0, f64::NAN])).unwrap_err();
        assert!(matches!(err, InputError::NonFiniteTime { index: 1, .. }));
    }

    #[test]
    fn slice_is_half_open() {
        let arrivals = stream(&[9.0, 10.0, 12.0, 19.99, 20.0, 21.0]);
        let slice = slice_window(&arrivals, 10.0, 20.0);
        let times: Vec<f64> = slice.iter().map(|a| a.time).collect();
        assert_eq!(times, vec![10.0, 12.0, 19.99]);
    }

    #[test]
    fn slice_empty_window() {
        let arrivals = stream(&[1.0, 2.0]);
        assert!(slice_window(&arrivals, 5.0, 15.0).is_empty());
        assert!(slice_window(&arrivals, 2.0, 2.0).is_empty());
    }
}
