use std::{
    error::Error,
    fmt::{self, Display},
};

use api::BenchErr;
use rand_distr::NormalError;

/// Error returned whenever an initializer is built with an invalid distribution.
#[derive(Debug)]
pub struct RandErr(String);

impl From<NormalError> for RandErr {
    fn from(value: NormalError) -> Self {
        Self(value.to_string())
    }
}

impl From<RandErr> for BenchErr {
    fn from(value: RandErr) -> Self {
        BenchErr::InvalidConfig(format!("invalid initializer: {value}"))
    }
}

impl Display for RandErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Error for RandErr {}
