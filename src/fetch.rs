//! The fetch capability a worker polls on every tick.
//!
//! Workers never know where their numbers come from; the caller hands them
//! something implementing [`Fetch`] when the worker is started.  Plain closures
//! work too:
//!
//! ```
//! use fetch_worker::fetch::{Fetch, FetchError};
//!
//! let fetch = || -> Result<i64, FetchError> { Ok(5) };
//! assert_eq!(fetch.fetch(), Ok(5));
//! ```

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("fetch failed")]
pub struct FetchError;

pub trait Fetch: Send + Sync + 'static {
    fn fetch(&self) -> Result<i64, FetchError>;
}

impl<F> Fetch for F
where
    F: Fn() -> Result<i64, FetchError> + Send + Sync + 'static,
{
    fn fetch(&self) -> Result<i64, FetchError> {
        self()
    }
}

/// random numbers in `1..=max` with an occasional failure
#[derive(Debug, Clone, Copy)]
pub struct Random {
    pub max: i64,
    /// chance of failure, in percent
    pub error_rate: u8,
}

impl Random {
    pub fn new(max: i64, error_rate: u8) -> Random {
        Random {
            max: max.max(1),
            error_rate: error_rate.min(100),
        }
    }
}

impl Default for Random {
    fn default() -> Self {
        Random::new(100, 10)
    }
}

impl Fetch for Random {
    fn fetch(&self) -> Result<i64, FetchError> {
        if fastrand::u8(0..100) < self.error_rate {
            return Err(FetchError);
        }

        Ok(fastrand::i64(1..=self.max))
    }
}

/// always returns the same value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constant(pub i64);

impl Fetch for Constant {
    fn fetch(&self) -> Result<i64, FetchError> {
        Ok(self.0)
    }
}

/// never succeeds
#[derive(Debug, Clone, Copy, Default)]
pub struct Failing;

impl Fetch for Failing {
    fn fetch(&self) -> Result<i64, FetchError> {
        Err(FetchError)
    }
}
