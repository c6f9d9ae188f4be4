use std::env;
use std::fs;

use serial_test::serial;
use tooldock::config::AppConfig;

fn clear_env_vars() {
    unsafe {
        env::remove_var("MCP_PORT");
        env::remove_var("CONFIG_FILE");
        env::remove_var("BEARER_TOKEN");
        env::remove_var("DATA_DIR");
    }
}

#[test]
#[serial]
fn defaults_load_without_a_config_file() {
    clear_env_vars();
    let config = AppConfig::load_from_args(vec!["tooldock"]).expect("defaults should load");
    assert_eq!(config.server.mcp_port, 3100);
    assert_eq!(config.server.openapi_port, 3200);
    assert_eq!(config.server.web_port, 3300);
    assert!(config.auth.bearer_token.is_empty());
    assert!(config.manage_processes);
}

#[test]
#[serial]
fn env_var_overrides_default_port() {
    clear_env_vars();
    unsafe {
        env::set_var("MCP_PORT", "9191");
    }

    let config = AppConfig::load_from_args(vec!["tooldock"]).expect("should load");
    assert_eq!(config.server.mcp_port, 9191);

    clear_env_vars();
}

#[test]
#[serial]
fn bearer_token_env_var_enables_auth() {
    clear_env_vars();
    unsafe {
        env::set_var("BEARER_TOKEN", "swordfish");
    }

    let config = AppConfig::load_from_args(vec!["tooldock"]).expect("should load");
    assert_eq!(config.auth.bearer_token, "swordfish");

    clear_env_vars();
}

#[test]
#[serial]
fn explicit_config_file_is_loaded() {
    clear_env_vars();

    let config_content = "server:\n  mcp_port: 7070\n";
    let file_path = "tooldock_test_config.yaml";
    fs::write(file_path, config_content).expect("failed to write temp config");
    unsafe {
        env::set_var("CONFIG_FILE", file_path);
    }

    let config = AppConfig::load_from_args(vec!["tooldock"]).expect("should load config from file");
    assert_eq!(config.server.mcp_port, 7070);

    fs::remove_file(file_path).unwrap();
    clear_env_vars();
}

#[test]
#[serial]
fn cli_flag_takes_precedence_over_env_var() {
    clear_env_vars();
    unsafe {
        env::set_var("MCP_PORT", "1111");
    }

    let config = AppConfig::load_from_args(vec!["tooldock", "--mcp-port", "2222"]).expect("should load");
    assert_eq!(config.server.mcp_port, 2222);

    clear_env_vars();
}
