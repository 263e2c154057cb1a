use serde::{Serialize, Serializer};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PortRangeError {
    #[error("empty port range")]
    Empty,

    #[error("invalid port '{value}'")]
    NotANumber { value: String },

    #[error("port {port} out of range (1-65535)")]
    OutOfRange { port: u32 },

    #[error("invalid range {first}-{last} (first > last)")]
    Inverted { first: u16, last: u16 },
}

/// SSH and RDP.
pub const DEFAULT_PORTS: [PortRange; 2] = [
    PortRange { first: 22, last: 22 },
    PortRange {
        first: 3389,
        last: 3389,
    },
];

/// Inclusive TCP port range, `1 <= first <= last <= 65535`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PortRange {
    first: u16,
    last: u16,
}

impl PortRange {
    /// # Errors
    ///
    /// Returns an error if either bound is 0 or `first > last`.
    pub const fn new(first: u16, last: u16) -> Result<Self, PortRangeError> {
        if first == 0 {
            return Err(PortRangeError::OutOfRange { port: 0 });
        }
        if first > last {
            return Err(PortRangeError::Inverted { first, last });
        }
        Ok(Self { first, last })
    }

    #[must_use]
    pub const fn first(&self) -> u16 {
        self.first
    }

    #[must_use]
    pub const fn last(&self) -> u16 {
        self.last
    }

    /// Number of ports in the range.
    #[must_use]
    pub const fn len(&self) -> usize {
        (self.last - self.first) as usize + 1
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    #[must_use]
    pub const fn ports(&self) -> RangeInclusive<u16> {
        self.first..=self.last
    }
}

fn parse_port(value: &str) -> Result<u16, PortRangeError> {
    let value = value.trim();
    let port: u32 = value.parse().map_err(|_| PortRangeError::NotANumber {
        value: value.to_string(),
    })?;

    if port == 0 || port > u32::from(u16::MAX) {
        return Err(PortRangeError::OutOfRange { port });
    }

    u16::try_from(port).map_err(|_| PortRangeError::OutOfRange { port })
}

impl FromStr for PortRange {
    type Err = PortRangeError;

    /// `"80"` or `"8000-8100"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PortRangeError::Empty);
        }

        match s.split_once('-') {
            Some((first, last)) => Self::new(parse_port(first)?, parse_port(last)?),
            None => {
                let port = parse_port(s)?;
                Self::new(port, port)
            }
        }
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.first == self.last {
            write!(f, "{}", self.first)
        } else {
            write!(f, "{}-{}", self.first, self.last)
        }
    }
}

impl Serialize for PortRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Parse a comma-separated list such as `"22,80,8000-8100"`.
///
/// # Errors
///
/// Returns the first invalid entry's error; an all-empty list is an error.
pub fn parse_port_ranges(s: &str) -> Result<Vec<PortRange>, PortRangeError> {
    let ranges = s
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::parse)
        .collect::<Result<Vec<PortRange>, _>>()?;

    if ranges.is_empty() {
        return Err(PortRangeError::Empty);
    }

    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_port() {
        assert_eq!("80".parse::<PortRange>(), PortRange::new(80, 80));
        assert_eq!(" 443 ".parse::<PortRange>().map(|r| r.len()), Ok(1));
    }

    #[test]
    fn test_full_range() {
        let range = "1-65535".parse::<PortRange>();
        assert_eq!(range, PortRange::new(1, 65535));
        assert_eq!(range.map(|r| r.len()), Ok(65535));
    }

    #[test]
    fn test_invalid_ranges() {
        assert_eq!(
            "0-100".parse::<PortRange>(),
            Err(PortRangeError::OutOfRange { port: 0 })
        );
        assert_eq!(
            "100-1".parse::<PortRange>(),
            Err(PortRangeError::Inverted { first: 100, last: 1 })
        );
        assert_eq!(
            "70000".parse::<PortRange>(),
            Err(PortRangeError::OutOfRange { port: 70000 })
        );
        assert!(matches!(
            "http".parse::<PortRange>(),
            Err(PortRangeError::NotANumber { .. })
        ));
        assert!("-5".parse::<PortRange>().is_err());
        assert_eq!("".parse::<PortRange>(), Err(PortRangeError::Empty));
    }

    #[test]
    fn test_display_roundtrips_shorthand() {
        assert_eq!(PortRange::new(22, 22).map(|r| r.to_string()), Ok("22".to_string()));
        assert_eq!(
            PortRange::new(22, 23).map(|r| r.to_string()),
            Ok("22-23".to_string())
        );
    }

    #[test]
    fn test_parse_list() {
        let ranges = parse_port_ranges("22, 80,8000-8002,");
        assert_eq!(ranges.as_ref().map(Vec::len), Ok(3));
        assert_eq!(
            ranges.map(|r| r.iter().map(PortRange::len).sum::<usize>()),
            Ok(5)
        );
        assert_eq!(parse_port_ranges(" , "), Err(PortRangeError::Empty));
        assert!(parse_port_ranges("22,0").is_err());
    }

    #[test]
    fn test_ports_iterates_inclusive() {
        let ports: Vec<u16> = PortRange::new(22, 24).map(|r| r.ports().collect()).unwrap_or_default();
        assert_eq!(ports, vec![22, 23, 24]);
    }
}
