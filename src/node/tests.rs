use super::*;
use std::fs;
use tempfile::TempDir;

/// Six lowercase, zero-padded octets that parse back to the same text
fn assert_canonical(text: &str) {
    let parsed: NodeId = text.parse().expect("six hex octets");
    assert_eq!(parsed.to_string(), text);
}

fn add_interface(root: &Path, name: &str, address: &str) {
    let dir = root.join(name);
    fs::create_dir_all(&dir).expect("should create interface dir");
    fs::write(dir.join("address"), format!("{address}\n")).expect("should write address");
}

fn node_id(value: u64) -> NodeId {
    NodeId::try_from(value).expect("value fits in 48 bits")
}

#[test]
fn formats_octets_most_significant_first() {
    assert_eq!(node_id(0x0a1b_2c3d_4e5f).to_string(), "0a:1b:2c:3d:4e:5f");
}

#[test]
fn formats_zero() {
    assert_eq!(node_id(0).to_string(), "00:00:00:00:00:00");
}

#[test]
fn formats_max() {
    assert_eq!(node_id(NodeId::MAX).to_string(), "ff:ff:ff:ff:ff:ff");
}

#[test]
fn formatted_output_parses_back() {
    let samples = [
        0,
        1,
        0xff,
        0x0100,
        0x0a1b_2c3d_4e5f,
        0x8000_0000_0000,
        0xdead_beef_cafe,
        NodeId::MAX,
    ];

    for value in samples {
        let text = node_id(value).to_string();
        assert_canonical(&text);

        let hex: String = text.split(':').collect();
        let parsed = u64::from_str_radix(&hex, 16).expect("formatted output is hex");
        assert_eq!(parsed, value);
        assert_eq!(text.parse::<NodeId>(), Ok(node_id(value)));
    }
}

#[test]
fn rejects_values_wider_than_48_bits() {
    assert_eq!(
        NodeId::try_from(1_u64 << 48),
        Err(NodeIdError::OutOfRange(1 << 48))
    );
    assert!(NodeId::try_from(u64::MAX).is_err());
}

#[test]
fn octets_and_bytes_agree() {
    let bytes = [0x0a, 0x1b, 0x2c, 0x3d, 0x4e, 0x5f];
    let id = NodeId::from_bytes(bytes);
    assert_eq!(id.as_u64(), 0x0a1b_2c3d_4e5f);
    assert_eq!(id.octets(), bytes);
}

#[test]
fn parses_uppercase_addresses() {
    let id: NodeId = "0A:1B:2C:3D:4E:5F".parse().expect("uppercase is accepted");
    assert_eq!(id.as_u64(), 0x0a1b_2c3d_4e5f);
}

#[test]
fn rejects_malformed_addresses() {
    for bad in [
        "",
        "0a:1b:2c:3d:4e",
        "0a:1b:2c:3d:4e:5f:60",
        "0a-1b-2c-3d-4e-5f",
        "a:1b:2c:3d:4e:5f",
        "0g:1b:2c:3d:4e:5f",
        "+a:1b:2c:3d:4e:5f",
    ] {
        assert!(bad.parse::<NodeId>().is_err(), "{bad:?}");
    }
}

#[test]
fn address_bits() {
    let universal = node_id(0x0022_4d00_0001);
    assert!(!universal.is_local());
    assert!(!universal.is_multicast());

    let local = node_id(0x0242_ac11_0002);
    assert!(local.is_local());
    assert!(!local.is_multicast());

    let multicast = node_id(0x0100_5e00_0001);
    assert!(multicast.is_multicast());
}

#[test]
fn random_fallback_sets_multicast_bit() {
    for _ in 0..32 {
        let id = random_node_id();
        assert!(id.is_multicast());
        assert!(id.as_u64() <= NodeId::MAX);
        assert_canonical(&id.to_string());
    }
}

#[test]
fn missing_directory_has_no_hardware_id() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    assert_eq!(hardware_node_id(&temp_dir.path().join("absent")), None);
}

#[test]
fn empty_directory_falls_back_to_random() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let node = lookup_node(temp_dir.path());
    assert_eq!(node.source, NodeSource::Random);
    assert!(node.id.is_multicast());
}

#[test]
fn prefers_universal_address() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let root = temp_dir.path();
    add_interface(root, "lo", "00:00:00:00:00:00");
    add_interface(root, "docker0", "02:42:ac:11:00:02");
    add_interface(root, "eth0", "00:22:4d:00:00:01");

    let (interface, id) = hardware_node_id(root).expect("eth0 qualifies");
    assert_eq!(interface, "eth0");
    assert_eq!(id.to_string(), "00:22:4d:00:00:01");
}

#[test]
fn falls_back_to_first_local_address() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let root = temp_dir.path();
    add_interface(root, "lo", "00:00:00:00:00:00");
    add_interface(root, "veth1", "06:00:00:00:00:02");
    add_interface(root, "veth0", "02:00:00:00:00:01");

    let node = lookup_node(root);
    assert_eq!(
        node.source,
        NodeSource::Hardware {
            interface: "veth0".to_string()
        }
    );
    assert_eq!(node.id.to_string(), "02:00:00:00:00:01");
}

#[test]
fn skips_garbage_and_multicast_entries() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let root = temp_dir.path();
    add_interface(root, "a0", "not an address");
    add_interface(root, "b0", "01:00:5e:00:00:01");
    fs::create_dir_all(root.join("c0")).expect("should create interface without address");
    add_interface(root, "d0", "00:11:22:33:44:55");

    let (interface, _) = hardware_node_id(root).expect("d0 qualifies");
    assert_eq!(interface, "d0");
}

#[test]
fn cached_node_is_stable() {
    let first = super::node_id();
    let second = super::node_id();
    assert_eq!(first, second);
    assert_canonical(&first.to_string());
}
