//! INI file configuration adapter.

use crate::domain::error::RebalError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut config = Ini::new();
        config.load(path).map_err(|e| std::io::Error::other(e))?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new();
        config.read(content.to_string())?;
        Ok(Self { config })
    }

    /// Maps a parse failure to `ConfigInvalid` naming the key and the raw text.
    fn strict<T>(
        &self,
        section: &str,
        key: &str,
        expected: &str,
        parsed: Result<Option<T>, String>,
    ) -> Result<Option<T>, RebalError> {
        parsed.map_err(|_| RebalError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: format!(
                "expected {expected}, got {:?}",
                self.config.get(section, key).unwrap_or_default()
            ),
        })
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn try_int(&self, section: &str, key: &str) -> Result<Option<i64>, RebalError> {
        self.strict(section, key, "an integer", self.config.getint(section, key))
    }

    fn try_double(&self, section: &str, key: &str) -> Result<Option<f64>, RebalError> {
        let parsed = self
            .config
            .getfloat(section, key)
            .and_then(|v| match v {
                Some(x) if !x.is_finite() => Err(format!("{x} is not finite")),
                other => Ok(other),
            });
        self.strict(section, key, "a finite number", parsed)
    }

    fn keys(&self, section: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .config
            .get_map_ref()
            .get(&section.to_lowercase())
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn from_string_parses_config() {
        let content = r#"
[data]
path = ./data

[backtest]
initial_capital = 10000.0
assets = AAPL,MSFT

[strategy]
name = price_to_sma_ratio
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(
            adapter.get_string("data", "path"),
            Some("./data".to_string())
        );
        assert_eq!(
            adapter.get_string("strategy", "name"),
            Some("price_to_sma_ratio".to_string())
        );
        assert_eq!(
            adapter.get_string("backtest", "assets"),
            Some("AAPL,MSFT".to_string())
        );
    }

    #[test]
    fn missing_keys_and_sections() {
        let adapter = FileConfigAdapter::from_string("[backtest]\nassets = A\n").unwrap();
        assert_eq!(adapter.get_string("backtest", "missing"), None);
        assert_eq!(adapter.get_string("sweep", "n_assets"), None);
        assert_eq!(adapter.try_int("backtest", "holding_period").unwrap(), None);
        assert_eq!(adapter.try_double("backtest", "commission_buy").unwrap(), None);
    }

    #[test]
    fn typed_getters_parse_run_settings() {
        let adapter = FileConfigAdapter::from_string(
            "[backtest]\nn_assets = 5\nlookback_period = -3\ninitial_capital = 2500.5\n",
        )
        .unwrap();
        assert_eq!(adapter.try_int("backtest", "n_assets").unwrap(), Some(5));
        assert_eq!(adapter.try_int("backtest", "lookback_period").unwrap(), Some(-3));
        assert_eq!(adapter.try_double("backtest", "initial_capital").unwrap(), Some(2500.5));
        assert_eq!(adapter.try_double("backtest", "n_assets").unwrap(), Some(5.0));
    }

    #[test]
    fn strict_getters_reject_malformed_numbers() {
        let adapter = FileConfigAdapter::from_string(
            "[backtest]\ncommission_buy = 1%\nn_assets = five\nholding_period = 2.5\ninitial_capital = inf\ncommission_sell = 0.002\nlookback_period = 90\n",
        )
        .unwrap();

        let err = adapter.try_double("backtest", "commission_buy").unwrap_err();
        assert!(
            matches!(err, RebalError::ConfigInvalid { ref key, ref reason, .. } if key == "commission_buy" && reason.contains("1%"))
        );
        assert!(adapter.try_int("backtest", "n_assets").is_err());
        assert!(adapter.try_int("backtest", "holding_period").is_err());
        assert!(adapter.try_double("backtest", "initial_capital").is_err());

        assert_eq!(adapter.try_double("backtest", "commission_sell").unwrap(), Some(0.002));
        assert_eq!(adapter.try_int("backtest", "lookback_period").unwrap(), Some(90));
        assert_eq!(adapter.try_int("backtest", "missing").unwrap(), None);
        assert_eq!(adapter.try_double("sweep", "missing").unwrap(), None);
    }

    #[test]
    fn from_file_reads_config() {
        let content = "[report]\noutput_dir = /tmp/results\n";
        let file = create_temp_config(content);
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("report", "output_dir"),
            Some("/tmp/results".to_string())
        );
    }

    #[test]
    fn from_file_returns_error_for_missing_file() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/config.ini");
        assert!(result.is_err());
    }

    #[test]
    fn keys_lists_section_entries_sorted() {
        let adapter =
            FileConfigAdapter::from_string("[strategy_params]\nm = 200\nlookback_end = 30\n")
                .unwrap();
        assert_eq!(adapter.keys("strategy_params"), vec!["lookback_end", "m"]);
        assert!(adapter.keys("missing").is_empty());
    }

    #[test]
    fn keys_are_case_insensitive() {
        let adapter = FileConfigAdapter::from_string("[Strategy_Params]\nLookback_Start = 90\n")
            .unwrap();
        assert_eq!(adapter.keys("STRATEGY_PARAMS"), vec!["lookback_start"]);
        assert_eq!(
            adapter.get_string("strategy_params", "lookback_start"),
            Some("90".to_string())
        );
    }

    #[test]
    fn handles_all_config_sections() {
        let content = r#"
[data]
path = /srv/prices

[backtest]
initial_capital = 10000.0
commission_buy = 0.005

[strategy]
name = fip

[strategy_params]
only_sign = false

[sweep]
holding_periods = 15,30

[report]
output_dir = /custom
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();

        assert_eq!(
            adapter.get_string("data", "path"),
            Some("/srv/prices".to_string())
        );
        assert_eq!(
            adapter.try_double("backtest", "initial_capital").unwrap(),
            Some(10000.0)
        );
        assert_eq!(adapter.try_double("backtest", "commission_buy").unwrap(), Some(0.005));
        assert_eq!(
            adapter.get_string("strategy_params", "only_sign"),
            Some("false".to_string())
        );
        assert_eq!(
            adapter.get_string("sweep", "holding_periods"),
            Some("15,30".to_string())
        );
        assert_eq!(
            adapter.get_string("report", "output_dir"),
            Some("/custom".to_string())
        );
    }
}
