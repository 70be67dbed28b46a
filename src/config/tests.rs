use super::*;
use serial_test::serial;
use std::collections::HashMap;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |name| vars.get(name).cloned()
}

#[test]
fn default_config() {
    let config = Config::from_lookup(|_| None).expect("empty environment is valid");
    assert_eq!(config.host, "0.0.0.0");
    assert_eq!(config.port, 8000);
    assert_eq!(config.transport, Transport::Stdio);
    assert_eq!(config, Config::default());
}

#[test]
fn reads_all_variables() {
    let config = Config::from_lookup(lookup_from(&[
        ("HOST", "127.0.0.1"),
        ("PORT", "9123"),
        ("MCP_TRANSPORT", "streamable-http"),
    ]))
    .expect("valid environment");

    assert_eq!(config.host, "127.0.0.1");
    assert_eq!(config.port, 9123);
    assert_eq!(config.transport, Transport::StreamableHttp);
    assert_eq!(config.bind_address(), "127.0.0.1:9123");
}

#[test]
fn transport_selection() {
    assert_eq!(
        Transport::from_name("streamable-http"),
        Transport::StreamableHttp
    );

    for name in ["stdio", "", "sse", "streamable_http", "Streamable-HTTP", "http"] {
        assert_eq!(Transport::from_name(name), Transport::Stdio, "{name:?}");
    }
}

#[test]
fn empty_transport_variable_is_stdio() {
    let config = Config::from_lookup(lookup_from(&[("MCP_TRANSPORT", "")]))
        .expect("valid environment");
    assert_eq!(config.transport, Transport::Stdio);
}

#[test]
fn non_numeric_port_is_rejected() {
    let err = Config::from_lookup(lookup_from(&[("PORT", "notanumber")]))
        .expect_err("port must be numeric");

    let ConfigError::InvalidPort { value, .. } = err;
    assert_eq!(value, "notanumber");
}

#[test]
fn out_of_range_port_is_rejected() {
    assert!(parse_port("70000").is_err());
    assert!(parse_port("-1").is_err());
    assert!(parse_port("").is_err());
}

#[test]
fn port_whitespace_is_trimmed() {
    assert_eq!(parse_port(" 8080\n").expect("trimmed port parses"), 8080);
    assert_eq!(parse_port("0").expect("zero is a valid port"), 0);
}

#[test]
fn overrides_take_precedence() {
    let config = Config::default().with_overrides(
        Some("localhost".to_string()),
        None,
        Some(Transport::StreamableHttp),
    );

    assert_eq!(config.host, "localhost");
    assert_eq!(config.port, 8000);
    assert_eq!(config.transport, Transport::StreamableHttp);
}

#[test]
fn transport_display() {
    assert_eq!(Transport::Stdio.to_string(), "stdio");
    assert_eq!(Transport::StreamableHttp.to_string(), "streamable-http");
}

#[test]
#[serial]
fn from_process_environment() {
    // SAFETY: serialized with every other test that touches the environment.
    unsafe {
        std::env::set_var(PORT_VAR, "8765");
        std::env::set_var(TRANSPORT_VAR, "streamable-http");
        std::env::remove_var(HOST_VAR);
    }

    let config = Config::from_env();

    // SAFETY: as above.
    unsafe {
        std::env::remove_var(PORT_VAR);
        std::env::remove_var(TRANSPORT_VAR);
    }

    let config = config.expect("valid environment");
    assert_eq!(config.host, DEFAULT_HOST);
    assert_eq!(config.port, 8765);
    assert_eq!(config.transport, Transport::StreamableHttp);
}
