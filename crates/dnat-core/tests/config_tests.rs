//! Integration tests for configuration and NAT ranges

use dnat_core::config::{Config, NatRange};
use dnat_core::Error;
use std::io::Write;
use std::net::Ipv4Addr;
use std::time::Duration;
use tempfile::NamedTempFile;

fn config_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

// ============ Config File Tests ============

#[test]
fn test_load_full_file() {
    let file = config_file(
        r#"
        # tuned for a slow upstream
        [nat]
        conntrack_timeout_secs = 600
        route_protocol = 99

        [dns]
        listen_addr = "127.0.0.53"
        upstream_port = 5353
        upstream_timeout_ms = 5000

        [reload]
        settle_delay_ms = 500

        [logging]
        level = "dnat_core=debug"
        "#,
    );

    let config = Config::load(file.path()).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.nat.conntrack_timeout(), Duration::from_secs(600));
    assert_eq!(config.nat.route_protocol, 99);
    assert_eq!(config.dns.listen_addr, Ipv4Addr::new(127, 0, 0, 53));
    assert_eq!(config.dns.upstream_port, 5353);
    assert_eq!(config.dns.upstream_timeout(), Duration::from_secs(5));
    assert_eq!(config.reload.settle_delay(), Duration::from_millis(500));
    assert_eq!(config.logging.level.as_deref(), Some("dnat_core=debug"));
}

#[test]
fn test_empty_file_is_defaults() {
    let file = config_file("");
    assert_eq!(Config::load(file.path()).unwrap(), Config::default());
}

#[test]
fn test_unknown_keys_ignored() {
    let file = config_file("[dns]\nupstream_port = 54\nresolver = \"1.1.1.1\"\n");
    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.dns.upstream_port, 54);
}

#[test]
fn test_invalid_listen_addr_rejected() {
    let file = config_file("[dns]\nlisten_addr = \"localhost\"\n");
    assert!(matches!(Config::load(file.path()), Err(Error::TomlParse(_))));
}

#[test]
fn test_loaded_values_still_validated() {
    let file = config_file("[dns]\nupstream_timeout_ms = 0\n");
    let config = Config::load(file.path()).unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.is_fatal());
    assert!(err.to_string().contains("upstream_timeout_ms"));
}

// ============ NAT Range Tests ============

#[test]
fn test_range_bounds() {
    let range: NatRange = "10.64.0.0/16".parse().unwrap();
    assert_eq!(range.start(), Ipv4Addr::new(10, 64, 0, 0));
    assert_eq!(range.min(), Ipv4Addr::new(10, 64, 0, 0));
    assert_eq!(range.max(), Ipv4Addr::new(10, 64, 255, 255));
    assert_eq!(range.size(), 65536);
    assert!(range.contains(Ipv4Addr::new(10, 64, 12, 34)));
    assert!(!range.contains(Ipv4Addr::new(10, 65, 0, 0)));
}

#[test]
fn test_range_host_part_is_first_allocation() {
    let range: NatRange = "10.64.0.9/16".parse().unwrap();
    assert_eq!(range.start(), Ipv4Addr::new(10, 64, 0, 9));
    assert_eq!(range.min(), Ipv4Addr::new(10, 64, 0, 0));
}

#[test]
fn test_single_address_range() {
    let range: NatRange = "198.18.0.1/32".parse().unwrap();
    assert_eq!(range.size(), 1);
    assert_eq!(range.min(), range.max());
}

#[test]
fn test_range_rejects_garbage() {
    for bad in ["", "10.64.0.0", "10.64.0.0/33", "fd00::/64", "ten/8"] {
        let err = bad.parse::<NatRange>().unwrap_err();
        assert!(matches!(err, Error::InvalidRange { .. }), "accepted {bad:?}");
    }
}
