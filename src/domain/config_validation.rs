//! Configuration validation.
//!
//! Validates all config fields before a run starts.

use crate::domain::allocation::AllocationMethod;
use crate::domain::error::RebalError;
use crate::domain::ledger::CashPolicy;
use crate::domain::strategies;
use crate::domain::universe::parse_assets;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), RebalError> {
    validate_initial_capital(config)?;
    validate_commissions(config)?;
    validate_periods(config)?;
    validate_n_assets(config)?;
    validate_dates(config)?;
    validate_assets(config)?;
    validate_allocation_method(config)?;
    validate_cash_policy(config)?;
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), RebalError> {
    match config.get_string("strategy", "name") {
        Some(name) if !name.trim().is_empty() => strategies::lookup(&name).map(|_| ()),
        _ => Err(missing("strategy", "name")),
    }
}

pub fn validate_sweep_config(config: &dyn ConfigPort) -> Result<(), RebalError> {
    for key in ["holding_periods", "n_assets"] {
        let raw = config
            .get_string("sweep", key)
            .ok_or_else(|| missing("sweep", key))?;
        parse_positive_list(&raw, "sweep", key)?;
    }
    Ok(())
}

/// Parses `"15, 30, 60"` into positive integers.
pub fn parse_positive_list(raw: &str, section: &str, key: &str) -> Result<Vec<u64>, RebalError> {
    raw.split(',')
        .map(|token| match token.trim().parse::<u64>() {
            Ok(v) if v > 0 => Ok(v),
            _ => Err(RebalError::ConfigInvalid {
                section: section.to_string(),
                key: key.to_string(),
                reason: format!("expected a comma separated list of positive integers, got {raw}"),
            }),
        })
        .collect()
}

pub fn parse_date(value: Option<&str>, field: &str) -> Result<NaiveDate, RebalError> {
    match value {
        None => Err(missing("backtest", field)),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
            RebalError::ConfigInvalid {
                section: "backtest".to_string(),
                key: field.to_string(),
                reason: format!("invalid {} format, expected YYYY-MM-DD", field),
            }
        }),
    }
}

fn missing(section: &str, key: &str) -> RebalError {
    RebalError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

fn invalid(key: &str, reason: &str) -> RebalError {
    RebalError::ConfigInvalid {
        section: "backtest".to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), RebalError> {
    let value = config.try_double("backtest", "initial_capital")?.unwrap_or(0.0);
    if value <= 0.0 {
        return Err(invalid("initial_capital", "initial_capital must be positive"));
    }
    Ok(())
}

fn validate_commissions(config: &dyn ConfigPort) -> Result<(), RebalError> {
    for key in ["commission_buy", "commission_sell"] {
        let rate = config.try_double("backtest", key)?;
        if rate.is_some_and(|r| !(0.0..1.0).contains(&r)) {
            return Err(invalid(key, "commission rate must be in [0, 1)"));
        }
    }
    Ok(())
}

fn validate_periods(config: &dyn ConfigPort) -> Result<(), RebalError> {
    if config.try_int("backtest", "holding_period")?.is_some_and(|v| v < 1) {
        return Err(invalid("holding_period", "holding_period must be at least 1 day"));
    }
    if config.try_int("backtest", "lookback_period")?.is_some_and(|v| v < 0) {
        return Err(invalid("lookback_period", "lookback_period must be non-negative"));
    }
    Ok(())
}

fn validate_n_assets(config: &dyn ConfigPort) -> Result<(), RebalError> {
    if config.try_int("backtest", "n_assets")?.is_some_and(|v| v < 1) {
        return Err(invalid("n_assets", "n_assets must be at least 1"));
    }
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), RebalError> {
    let start_str = config.get_string("backtest", "start_date");
    let end_str = config.get_string("backtest", "end_date");

    let start_date = parse_date(start_str.as_deref(), "start_date")?;
    let end_date = parse_date(end_str.as_deref(), "end_date")?;

    if start_date > end_date {
        return Err(invalid("start_date", "start_date must not be after end_date"));
    }
    Ok(())
}

fn validate_assets(config: &dyn ConfigPort) -> Result<(), RebalError> {
    match config.get_string("backtest", "assets") {
        Some(raw) if !raw.trim().is_empty() => parse_assets(&raw)
            .map(|_| ())
            .map_err(|e| invalid("assets", &e.to_string())),
        _ => Err(missing("backtest", "assets")),
    }
}

fn validate_allocation_method(config: &dyn ConfigPort) -> Result<(), RebalError> {
    match config.get_string("backtest", "allocation_method") {
        None => Ok(()),
        Some(raw) => raw
            .parse::<AllocationMethod>()
            .map(|_| ())
            .map_err(|e| invalid("allocation_method", &e.to_string())),
    }
}

fn validate_cash_policy(config: &dyn ConfigPort) -> Result<(), RebalError> {
    match config.get_string("backtest", "cash_policy") {
        None => Ok(()),
        Some(raw) => raw
            .parse::<CashPolicy>()
            .map(|_| ())
            .map_err(|e| invalid("cash_policy", &e)),
    }
}
