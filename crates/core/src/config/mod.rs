pub mod strata_config;
pub mod validation;

pub use strata_config::*;
pub use validation::*;
