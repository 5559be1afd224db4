//! Configuration access port.

use crate::domain::error::RebalError;

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;

    /// `Ok(None)` when absent; a present value that is not an integer is
    /// `ConfigInvalid`.
    fn try_int(&self, section: &str, key: &str) -> Result<Option<i64>, RebalError>;

    /// `Ok(None)` when absent; a present value that is not a number is
    /// `ConfigInvalid`.
    fn try_double(&self, section: &str, key: &str) -> Result<Option<f64>, RebalError>;

    /// Keys present in `section`, empty if the section is absent.
    fn keys(&self, section: &str) -> Vec<String>;
}
