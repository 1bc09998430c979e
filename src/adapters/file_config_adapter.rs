//! INI file configuration adapter.

use crate::domain::error::RotatorError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RotatorError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config
            .load(path)
            .map_err(|reason| RotatorError::ConfigParse {
                file: path.display().to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, RotatorError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| RotatorError::ConfigParse {
                file: "<inline>".to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_deref()
            .and_then(Self::parse_bool)
            .unwrap_or(default)
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

    const SAMPLE: &str = r#"
[engine]
initial_capital = 500000.0
symbols = 510300, 510500, 159915
exchange = SH

[momentum]
periods = 20, 60, 120
buy_top_n = 5

[cluster]
enabled = no
linkage = average
"#;

    #[test]
    fn from_string_parses_config() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(
            adapter.get_string("engine", "symbols"),
            Some("510300, 510500, 159915".to_string())
        );
        assert_eq!(
            adapter.get_string("cluster", "linkage"),
            Some("average".to_string())
        );
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(adapter.get_string("engine", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn get_int_reads_value_or_default() {
        let adapter =
            FileConfigAdapter::from_string("[momentum]\nbuy_top_n = 5\nhold = abc\n").unwrap();
        assert_eq!(adapter.get_int("momentum", "buy_top_n", 0), 5);
        assert_eq!(adapter.get_int("momentum", "missing", 42), 42);
        assert_eq!(adapter.get_int("momentum", "hold", 42), 42);
    }

    #[test]
    fn get_double_reads_value_or_default() {
        let adapter = FileConfigAdapter::from_string(
            "[risk]\natr_multiplier = 2.5\nbad = not_a_number\n",
        )
        .unwrap();
        assert_eq!(adapter.get_double("risk", "atr_multiplier", 0.0), 2.5);
        assert_eq!(adapter.get_double("risk", "missing", 99.9), 99.9);
        assert_eq!(adapter.get_double("risk", "bad", 99.9), 99.9);
    }

    #[test]
    fn get_bool_variants() {
        let adapter = FileConfigAdapter::from_string(
            "[cluster]\na = true\nb = yes\nc = 1\nd = off\ne = no\nf = 0\ng = maybe\n",
        )
        .unwrap();
        assert!(adapter.get_bool("cluster", "a", false));
        assert!(adapter.get_bool("cluster", "b", false));
        assert!(adapter.get_bool("cluster", "c", false));
        assert!(!adapter.get_bool("cluster", "d", true));
        assert!(!adapter.get_bool("cluster", "e", true));
        assert!(!adapter.get_bool("cluster", "f", true));
        assert!(adapter.get_bool("cluster", "g", true));
        assert!(!adapter.get_bool("cluster", "missing", false));
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config(SAMPLE);
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(adapter.get_double("engine", "initial_capital", 0.0), 500000.0);
        assert!(!adapter.get_bool("cluster", "enabled", true));
    }

    #[test]
    fn from_file_missing_is_parse_error() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/config.ini");
        assert!(matches!(result, Err(RotatorError::ConfigParse { .. })));
    }
}
