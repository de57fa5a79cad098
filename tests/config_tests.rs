// Configuration file handling

mod common;

use common::create_temp_dir;
use std::fs;
use trade_impact_sim::{Config, ConfigError, Side};

#[test]
fn test_save_and_load_round_trip() {
    let dir = create_temp_dir();
    let path = dir.path().join("config.toml");

    let mut config = Config::default();
    config.feed.symbols = vec!["ETH-USDT-SWAP".to_string(), "SOL-USDT-SWAP".to_string()];
    config.order.quantity = 3.0;
    config.order.side = Side::Sell;
    config.order.fee_tier = "3".to_string();
    config.to_file(&path).expect("save");

    let loaded = Config::from_file(&path).expect("load");
    assert_eq!(loaded.feed.symbols, config.feed.symbols);
    assert_eq!(loaded.order.side, Side::Sell);
    assert_eq!(loaded.order.fee_tier, "3");
    assert_eq!(loaded.fees.tiers.len(), 3);
    assert!((loaded.order.quantity - 3.0).abs() < f64::EPSILON);
}

#[test]
fn test_load_or_create_writes_defaults() {
    let dir = create_temp_dir();
    let path = dir.path().join("fresh.toml");
    assert!(!path.exists());

    let config = Config::load_or_create(&path).expect("created");
    assert!(path.exists());
    assert_eq!(config.window.window_capacity, 30);

    let content = fs::read_to_string(&path).expect("read back");
    assert!(content.contains("[window]"));
    assert!(content.contains("[fees.tiers.1]"));
}

#[test]
fn test_missing_file_is_read_error() {
    let dir = create_temp_dir();
    let result = Config::from_file(dir.path().join("nope.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_malformed_toml_is_parse_error() {
    let dir = create_temp_dir();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[window\nwindow_capacity = ").expect("write");
    assert!(matches!(Config::from_file(&path), Err(ConfigError::Parse(_))));
}

#[test]
fn test_invalid_values_fail_validation() {
    let dir = create_temp_dir();
    let path = dir.path().join("invalid.toml");
    fs::write(
        &path,
        r#"
[window]
window_capacity = 1

[models]
eta = -0.1
"#,
    )
    .expect("write");
    assert!(matches!(Config::from_file(&path), Err(ConfigError::Validation(_))));
}

#[test]
fn test_custom_fee_tiers() {
    let dir = create_temp_dir();
    let path = dir.path().join("fees.toml");
    fs::write(
        &path,
        r#"
[order]
fee_tier = "maker_program"

[fees.tiers.maker_program]
maker_rate = 0.0
taker_rate = 0.0003
"#,
    )
    .expect("write");

    let config = Config::from_file(&path).expect("valid");
    let tier = config.fees.tier("maker_program");
    assert_eq!(tier.maker_rate, 0.0);
    assert_eq!(config.fees.tiers.len(), 1);
}
