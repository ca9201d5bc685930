use clap::Parser;
use redash_sync::cli::{Cli, Commands};
use redash_sync::load_config::{load_config, parse_log_level};
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tracing::Level;

fn clear_env() {
    env::remove_var("REDASH_URL");
    env::remove_var("REDASH_API_KEY");
    env::remove_var("REDASH_DATA_SOURCE");
}

#[test]
#[serial]
fn connection_falls_back_to_environment() {
    clear_env();
    env::set_var("REDASH_URL", " http://redash.local:5000/ ");
    env::set_var("REDASH_API_KEY", "abc123");
    env::set_var("REDASH_DATA_SOURCE", "warehouse");

    let cli = Cli::try_parse_from(["redash-sync", "push", "--root", "/srv/analytics"])
        .expect("Arguments should parse");
    let Commands::Push {
        connection,
        data_source_name,
    } = cli.command
    else {
        panic!("expected the push command");
    };

    let config = load_config(&connection, data_source_name).expect("Config should load");
    assert_eq!(config.redash_url, "http://redash.local:5000");
    assert_eq!(config.api_key, "abc123");
    assert_eq!(config.root, PathBuf::from("/srv/analytics"));
    assert_eq!(config.data_source_name.as_deref(), Some("warehouse"));
    clear_env();
}

#[test]
#[serial]
fn flags_override_environment() {
    clear_env();
    env::set_var("REDASH_URL", "http://from-env");

    let cli = Cli::try_parse_from([
        "redash-sync",
        "fetch",
        "--redash-url",
        "http://from-flag",
        "--api-key",
        "k",
    ])
    .expect("Arguments should parse");
    let Commands::Fetch { connection } = cli.command else {
        panic!("expected the fetch command");
    };

    let config = load_config(&connection, None).unwrap();
    assert_eq!(config.redash_url, "http://from-flag");
    assert_eq!(config.root, PathBuf::from("."));
    assert_eq!(config.data_source_name, None);
    clear_env();
}

#[test]
#[serial]
fn empty_api_key_is_an_error() {
    clear_env();
    let cli = Cli::try_parse_from([
        "redash-sync",
        "fetch",
        "--redash-url",
        "http://localhost:5000",
        "--api-key",
        "  ",
    ])
    .unwrap();
    let Commands::Fetch { connection } = cli.command else {
        panic!("expected the fetch command");
    };

    let err = load_config(&connection, None).unwrap_err();
    assert!(err.to_string().contains("API key"));
}

#[test]
#[serial]
fn blank_data_source_means_auto_select() {
    let cli = Cli::try_parse_from([
        "redash-sync",
        "push",
        "--redash-url",
        "http://localhost:5000",
        "--api-key",
        "k",
        "--data-source-name",
        "",
    ])
    .unwrap();
    let Commands::Push {
        connection,
        data_source_name,
    } = cli.command
    else {
        panic!("expected the push command");
    };
    assert_eq!(load_config(&connection, data_source_name).unwrap().data_source_name, None);
}

#[test]
fn log_levels_accept_common_names() {
    assert_eq!(parse_log_level("INFO").unwrap(), Level::INFO);
    assert_eq!(parse_log_level("warning").unwrap(), Level::WARN);
    assert_eq!(parse_log_level("CRITICAL").unwrap(), Level::ERROR);
    assert_eq!(parse_log_level("debug").unwrap(), Level::DEBUG);
    assert!(parse_log_level("verbose").is_err());
}
