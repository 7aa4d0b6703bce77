use std::path::PathBuf;

/// Runtime settings, read from `HOMESTAY_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    /// In-flight request limit.
    pub max_connections: usize,
    /// Journal appends between compactions.
    pub compact_threshold: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            max_connections: 256,
            compact_threshold: 1000,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable numbers fall back to defaults.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let num = |key: &str| -> Option<u64> { get(key).and_then(|s| s.trim().parse().ok()) };
        Self {
            bind: get("HOMESTAY_BIND").unwrap_or(defaults.bind),
            port: num("HOMESTAY_PORT").map_or(defaults.port, |p| u16::try_from(p).unwrap_or(defaults.port)),
            data_dir: get("HOMESTAY_DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            metrics_port: num("HOMESTAY_METRICS_PORT").and_then(|p| u16::try_from(p).ok()),
            max_connections: num("HOMESTAY_MAX_CONNECTIONS")
                .and_then(|n| usize::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_connections),
            compact_threshold: num("HOMESTAY_COMPACT_THRESHOLD").unwrap_or(defaults.compact_threshold),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("homestay.wal")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = Config::from_lookup(lookup(&[]));
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.addr(), "0.0.0.0:8080");
        assert_eq!(cfg.wal_path(), PathBuf::from("./data/homestay.wal"));
    }

    #[test]
    fn reads_overrides() {
        let cfg = Config::from_lookup(lookup(&[
            ("HOMESTAY_BIND", "127.0.0.1"),
            ("HOMESTAY_PORT", "9000"),
            ("HOMESTAY_DATA_DIR", "/var/lib/homestay"),
            ("HOMESTAY_METRICS_PORT", "9100"),
            ("HOMESTAY_MAX_CONNECTIONS", "64"),
            ("HOMESTAY_COMPACT_THRESHOLD", "50"),
        ]));
        assert_eq!(cfg.addr(), "127.0.0.1:9000");
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/homestay"));
        assert_eq!(cfg.metrics_port, Some(9100));
        assert_eq!(cfg.max_connections, 64);
        assert_eq!(cfg.compact_threshold, 50);
    }

    #[test]
    fn bad_numbers_fall_back() {
        let cfg = Config::from_lookup(lookup(&[
            ("HOMESTAY_PORT", "eighty"),
            ("HOMESTAY_METRICS_PORT", "70000"),
            ("HOMESTAY_MAX_CONNECTIONS", "0"),
        ]));
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.metrics_port, None);
        assert_eq!(cfg.max_connections, 256);
    }
}
