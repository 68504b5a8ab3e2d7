#[cfg(test)]
mod __test__ {
  use crate::compress::Method;
  use crate::config::{Config, ConfigError, RotationMethod, Size};
  use std::io::Write;
  use std::path::PathBuf;
  use std::sync::Arc;
  use std::time::Duration;
  use tempfile::NamedTempFile;

  #[test]
  fn test_empty_file_gives_defaults() {
    let config: Config = "".parse().unwrap();
    assert_eq!(config.listen.to_string(), "0.0.0.0:1466");
    assert_eq!(config.wait_timeout, Duration::from_secs(60));
    assert_eq!(config.key, "key");
    assert_eq!(config.files.root, PathBuf::from("./logs"));
    assert_eq!(config.files.root_mode, 0o755);
    assert_eq!(config.files.file_mode, 0o644);
    assert_eq!(config.buffers.input, Size(128 * 1024));
    assert_eq!(config.buffers.framing, Size(256 * 1024));
    assert_eq!(config.buffers.connections, 1024);
    assert_eq!(config.buffers.dumps, 512);
    assert_eq!(config.buffers.logrotates, 512);
    assert_eq!(config.workers.route, 1024);
    assert_eq!(config.workers.dumper, 24);
    assert_eq!(config.workers.logrotater, 48);
    assert_eq!(config.workers.flusher_sleep, Duration::from_secs(30));
    assert_eq!(config.logrotate.method, RotationMethod::Both);
    assert_eq!(config.compression.method, Method::Raw);
  }

  #[test]
  fn test_size_units() {
    assert_eq!("17".parse::<Size>().unwrap(), Size(17));
    assert_eq!("2Kb".parse::<Size>().unwrap(), Size(2048));
    assert_eq!("3Mb".parse::<Size>().unwrap(), Size(3 * 1024 * 1024));
    assert_eq!("1Gb".parse::<Size>().unwrap(), Size(1024 * 1024 * 1024));
    assert!("Kb".parse::<Size>().is_err());
    assert!("12Tb".parse::<Size>().is_err());
    assert!("12kb".parse::<Size>().is_err());

    assert_eq!(Size(2048).to_string(), "2Kb");
    assert_eq!(Size(1000).to_string(), "1000");
  }

  #[test]
  fn test_full_file() {
    let text = r#"
listen = "127.0.0.1:9000"
wait_timeout = "500ms"
key = "secret"

[files]
root = "/var/log/carrier"
root_mode = 0o700
rotation = "{dir}/{name}.{time:%Y-%m-%d}"

[links]
root = "/var/log/current"

[compression]
method = "zstd"
level = 9

[buffers]
input = "64Kb"
framing = 1048576
dumps = 8

[workers]
dumper = 2
flusher_sleep = "1m"

[logrotate]
method = "guided"
"#;
    let config: Config = text.parse().unwrap();
    assert_eq!(config.listen.port(), 9000);
    assert_eq!(config.wait_timeout, Duration::from_millis(500));
    assert_eq!(config.key, "secret");
    assert_eq!(config.files.root_mode, 0o700);
    assert_eq!(config.compression.method, Method::Zstd);
    assert_eq!(config.compression.level, 9);
    assert_eq!(config.buffers.input, Size::kb(64));
    assert_eq!(config.buffers.framing, Size(1024 * 1024));
    assert_eq!(config.buffers.dumps, 8);
    assert_eq!(config.workers.dumper, 2);
    assert_eq!(config.workers.flusher_sleep, Duration::from_secs(60));
    assert!(!config.logrotate.method.periodic());
    assert!(config.logrotate.method.guided());

    let scheme = Arc::new(config.scheme().unwrap());
    assert_eq!(scheme.directory("a/b"), PathBuf::from("/var/log/carrier/a/b"));
    let route = config.route_settings(Arc::clone(&scheme));
    assert_eq!(route.dir_mode, 0o700);
    assert!(route.guided_rotation);

    let chain = config.chain_config();
    assert_eq!(chain.input, 64 * 1024);
    assert_eq!(chain.framing, 1024 * 1024);
    assert_eq!(chain.codec.method, Method::Zstd);
  }

  #[test]
  fn test_invalid_values() {
    let err = "[workers]\ndumper = 0\n".parse::<Config>().unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { field: "workers.dumper", .. }));

    let err = "[files]\nname = \"{dir}/{nope}\"\n".parse::<Config>().unwrap_err();
    assert!(matches!(err, ConfigError::Template { field: "files.name", .. }));

    let err = "[logrotate]\nschedule = \"every hour\"\n".parse::<Config>().unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { field: "logrotate.schedule", .. }));

    // The schedule is not used when rotation is guided only.
    assert!("[logrotate]\nmethod = \"guided\"\nschedule = \"every hour\"\n"
      .parse::<Config>()
      .is_ok());

    let err = "log_level = \"loud\"\n".parse::<Config>().unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { field: "log_level", .. }));

    let err = "[buffers]\ninput = \"12Tb\"\n".parse::<Config>().unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));

    let err = "[compression]\nmethod = \"brotli\"\n".parse::<Config>().unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
  }

  #[test]
  fn test_default_config_round_trips_through_toml() {
    let text = Config::default().to_toml().unwrap();
    assert!(text.contains("input = \"128Kb\""));
    let parsed: Config = text.parse().unwrap();
    assert_eq!(parsed.buffers.framing, Size::kb(256));
    assert_eq!(parsed.workers.flusher_sleep, Duration::from_secs(30));
    assert_eq!(parsed.logrotate.schedule, "0 0 * * * *");
  }

  #[test]
  fn test_load_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "key = \"from-file\"").unwrap();
    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.key, "from-file");

    let err = Config::load("/nonexistent/logcarrier.toml").unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
  }
}
