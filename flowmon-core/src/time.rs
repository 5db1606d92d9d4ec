use logos::{Lexer, Logos};
use serde::Serialize;
use std::{fmt, ops::Add, str::FromStr, time::Duration};

/// An absolute point in simulated time.
///
/// The simulation clock starts at [`SimTime::ZERO`] and only moves
/// forward. Internally this is the elapsed [`Duration`] since the
/// simulation epoch, so it keeps nanosecond precision.
///
/// ```
/// # use mcast_flowmon_core::SimTime;
/// # use std::time::Duration;
/// let t = SimTime::from_secs(3);
/// assert_eq!(t.duration_since(SimTime::from_secs(1)), Duration::from_secs(2));
/// // never negative
/// assert_eq!(SimTime::ZERO.duration_since(t), Duration::ZERO);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct SimTime(Duration);

impl SimTime {
    pub const ZERO: Self = Self(Duration::ZERO);

    #[inline(always)]
    pub const fn new(since_epoch: Duration) -> Self {
        Self(since_epoch)
    }

    #[inline(always)]
    pub const fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    #[inline(always)]
    pub const fn from_millis(millis: u64) -> Self {
        Self(Duration::from_millis(millis))
    }

    /// elapsed simulated time since the epoch
    #[inline(always)]
    pub fn since_epoch(self) -> Duration {
        self.0
    }

    /// Time elapsed from `earlier` to `self`, saturating at zero.
    #[inline]
    pub fn duration_since(self, earlier: SimTime) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<Duration> for SimTime {
    type Output = SimTime;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0.saturating_add(rhs))
    }
}

impl From<Duration> for SimTime {
    fn from(value: Duration) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{:?}", self.0)
    }
}

impl FromStr for SimTime {
    type Err = DurationParseError;

    /// Parses an offset from the epoch, e.g. `"1s 500ms"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_duration(s).map(Self)
    }
}

/// Error returned by [`parse_duration`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationParseError {
    #[error("empty duration")]
    Empty,
    #[error("failed to parse `{0}'")]
    Invalid(String),
    #[error("expecting duration to start with a number, cannot parse `{0}'")]
    MissingValue(String),
    #[error("expecting a unit after the number in `{0}'")]
    MissingUnit(String),
    #[error("number out of range in `{0}'")]
    Overflow(String),
}

/// Parse a human readable duration.
///
/// A duration is a sequence of `<number><unit>` pairs which are summed.
/// Units are `ns`, `us` (or `μs`), `ms`, `s` and `m`.
///
/// ```
/// # use mcast_flowmon_core::parse_duration;
/// # use std::time::Duration;
/// assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
/// assert_eq!(parse_duration("1s 250ms").unwrap(), Duration::from_millis(1_250));
/// assert!(parse_duration("-1s").is_err());
/// ```
pub fn parse_duration(s: &str) -> Result<Duration, DurationParseError> {
    let mut lex = Lexer::<Token>::new(s);
    let mut total = Duration::ZERO;
    let mut any = false;

    while let Some(next) = lex.next() {
        let number = next.map_err(|()| DurationParseError::Invalid(s.to_owned()))?;
        if number != Token::Value {
            return Err(DurationParseError::MissingValue(s.to_owned()));
        }
        let number: u64 = lex
            .slice()
            .parse()
            .map_err(|_| DurationParseError::Overflow(s.to_owned()))?;

        let Some(Ok(unit)) = lex.next() else {
            return Err(DurationParseError::MissingUnit(s.to_owned()));
        };
        let duration = match unit {
            Token::NanoSeconds => Duration::from_nanos(number),
            Token::MicroSeconds => Duration::from_micros(number),
            Token::MilliSeconds => Duration::from_millis(number),
            Token::Seconds => Duration::from_secs(number),
            Token::Minutes => Duration::from_secs(
                number
                    .checked_mul(60)
                    .ok_or_else(|| DurationParseError::Overflow(s.to_owned()))?,
            ),
            Token::Value => return Err(DurationParseError::MissingUnit(s.to_owned())),
        };
        total = total
            .checked_add(duration)
            .ok_or_else(|| DurationParseError::Overflow(s.to_owned()))?;
        any = true;
    }

    if any {
        Ok(total)
    } else {
        Err(DurationParseError::Empty)
    }
}

#[derive(Logos, Debug, PartialEq)]
#[logos(skip r"[ \t\n\f]+")]
enum Token {
    #[token("ns")]
    NanoSeconds,
    #[regex("us|μs|µs")]
    MicroSeconds,
    #[token("ms")]
    MilliSeconds,
    #[token("s")]
    Seconds,
    #[token("m")]
    Minutes,

    #[regex("[0-9]+")]
    Value,
}
