use clap::Parser;

use crate::db::{DEFAULT_TABLE, is_valid_table_name};

/// Network device inventory service
#[derive(Debug, Clone, Parser)]
#[command(name = "network_device_manager", version, about)]
pub struct Config {
    /// SQLite database file, optionally prefixed with sqlite://
    #[arg(long, env = "DATABASE_URL", default_value = "devices.db")]
    pub database_url: String,

    /// Table holding the device records
    #[arg(
        long = "collection",
        env = "COLLECTION_NAME",
        default_value = DEFAULT_TABLE,
        value_parser = parse_table_name
    )]
    pub collection: String,

    /// Address to listen on
    #[arg(long, env = "BIND_ADDRESS", default_value = "127.0.0.1")]
    pub bind: String,

    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Wall-clock limit for a single ping request
    #[arg(
        long,
        env = "PROBE_TIMEOUT_MS",
        default_value_t = 1000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub probe_timeout_ms: u64,

    /// Echo requests sent per ping
    #[arg(
        long,
        env = "PROBE_COUNT",
        default_value_t = 1,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub probe_count: u16,
}

fn parse_table_name(value: &str) -> Result<String, String> {
    if is_valid_table_name(value) {
        Ok(value.to_string())
    } else {
        Err(format!(
            "'{}' is not a valid table name (letters, digits and '_' only)",
            value
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Every flag is passed so values set in the test environment do not leak in
    const ARGS: [&str; 13] = [
        "network_device_manager",
        "--database-url",
        "sqlite:///tmp/inventory.db",
        "--collection",
        "lab_devices",
        "--bind",
        "0.0.0.0",
        "--port",
        "9000",
        "--probe-timeout-ms",
        "250",
        "--probe-count",
        "3",
    ];

    #[test]
    fn test_parse_flags() {
        let config = Config::try_parse_from(ARGS).unwrap();

        assert_eq!(config.database_url, "sqlite:///tmp/inventory.db");
        assert_eq!(config.collection, "lab_devices");
        assert_eq!(config.bind, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.probe_timeout_ms, 250);
        assert_eq!(config.probe_count, 3);
    }

    #[test]
    fn test_rejects_bad_collection() {
        let mut args = ARGS;
        args[4] = "devices; DROP TABLE devices";
        assert!(Config::try_parse_from(args).is_err());
    }

    #[test]
    fn test_rejects_zero_probe_values() {
        let mut args = ARGS;
        args[10] = "0";
        assert!(Config::try_parse_from(args).is_err());

        let mut args = ARGS;
        args[12] = "0";
        assert!(Config::try_parse_from(args).is_err());
    }

    #[test]
    fn test_parse_table_name() {
        assert_eq!(parse_table_name("devices"), Ok("devices".to_string()));
        assert!(parse_table_name("1devices").is_err());
    }
}
