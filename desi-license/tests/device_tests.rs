use desi_license::{MachineIdentity, MachineInfo};

fn info(hostname: &str) -> MachineInfo {
    MachineInfo {
        hostname: hostname.to_string(),
        arch: "x86_64".to_string(),
        os: "linux".to_string(),
        machine_id: Some("0123456789abcdef".to_string()),
    }
}

#[test]
fn machine_info_collection() {
    let info = MachineInfo::collect();
    assert!(!info.os.is_empty());
    assert!(!info.arch.is_empty());
    assert!(!info.hostname.is_empty());
}

#[test]
fn identity_is_sha256_hex() {
    let id = MachineIdentity::current();
    assert_eq!(id.as_str().len(), 64);
    assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn identity_is_stable() {
    assert_eq!(MachineIdentity::current(), MachineIdentity::current());
}

#[test]
fn identity_depends_on_hostname() {
    let a = MachineIdentity::from_info(&info("lab-a"));
    let b = MachineIdentity::from_info(&info("lab-b"));
    assert_ne!(a, b);
}

#[test]
fn missing_machine_id_still_hashes() {
    let mut without = info("lab-a");
    without.machine_id = None;
    let id = MachineIdentity::from_info(&without);
    assert_ne!(id, MachineIdentity::from_info(&info("lab-a")));
    assert_eq!(id.as_str().len(), 64);
}

#[test]
fn identity_serializes_as_plain_string() {
    let id = MachineIdentity::from_raw("machine-001");
    assert_eq!(serde_json::to_string(&id).unwrap(), "\"machine-001\"");
    assert_eq!(id.to_string(), "machine-001");
}
