// Tests for the shared data model: method tags, cancellation, device
// helpers, request defaults and serialization.

use super::*;
use serial_test::serial;
use test_case::test_case;

// The interrupt flag is process-global, so everything touching it (or
// reading it through CancelToken) runs serialized.

#[test]
#[serial(interrupt)]
fn interrupt_flag_roundtrip() {
    reset_interrupted();
    assert!(!is_interrupted());
    set_interrupted();
    assert!(is_interrupted());
    reset_interrupted();
}

#[test]
#[serial(interrupt)]
fn cancel_token_is_shared_across_clones() {
    reset_interrupted();
    let token = CancelToken::new();
    let observer = token.clone();
    assert!(!observer.is_cancelled());
    token.cancel();
    assert!(observer.is_cancelled());
}

#[test_case("secure", Some(WipeMethod::Overwrite); "secure tag")]
#[test_case("dd", Some(WipeMethod::Overwrite); "dd tag")]
#[test_case("zero", Some(WipeMethod::Overwrite); "zero tag")]
#[test_case("QUICK", Some(WipeMethod::Overwrite); "case insensitive")]
#[test_case("hdparm", Some(WipeMethod::SecureErase); "hdparm tag")]
#[test_case("blkdiscard", Some(WipeMethod::TrimDiscard); "blkdiscard tag")]
#[test_case("trim", Some(WipeMethod::TrimDiscard); "trim tag")]
#[test_case("nvme", Some(WipeMethod::Format); "nvme tag")]
#[test_case("format", Some(WipeMethod::Format); "format tag")]
#[test_case("cipher-of-doom", None; "unknown tag")]
fn method_tag_mapping(tag: &str, expected: Option<WipeMethod>) {
    assert_eq!(WipeMethod::from_tag(tag), expected);
}

#[test]
fn device_mount_helpers() {
    let mut device = DiskDevice::unknown("/dev/sdq");
    assert!(!device.is_mounted());

    device.partitions = vec![
        PartitionInfo {
            device: "/dev/sdq1".to_string(),
            mountpoint: None,
            fstype: None,
        },
        PartitionInfo {
            device: "/dev/sdq2".to_string(),
            mountpoint: Some("/mnt/x".to_string()),
            fstype: Some("ext4".to_string()),
        },
    ];
    assert!(device.is_mounted());
    assert_eq!(device.mountpoints().collect::<Vec<_>>(), vec!["/mnt/x"]);
}

#[test]
fn request_defaults_are_conservative() {
    let request = WipeRequest::new("/dev/sdq", "secure");
    assert_eq!(request.passes, 1);
    assert!(!request.verify);
    assert!(!request.remove_hpa);
    assert!(!request.remove_dco);
    assert!(!request.force);
}

#[test]
fn wipe_state_display_names() {
    assert_eq!(WipeState::GateCheck.to_string(), "GateCheck");
    assert_eq!(WipeState::HiddenAreaRemoval.to_string(), "HiddenAreaRemoval");
    assert_eq!(WipeState::Rejected.to_string(), "Rejected");
}

#[test]
fn result_serializes_with_error_kind() {
    let result = WipeResult {
        operation_id: uuid::Uuid::new_v4(),
        device: "/dev/sdq".to_string(),
        success: false,
        trail: vec!["GateCheck: rejected - protected".to_string()],
        error: Some(WipeError::Safety("protected".to_string())),
        attempts: 0,
        reached: WipeState::Rejected,
    };
    assert!(result.rejected());

    let json = serde_json::to_string(&result).unwrap();
    assert!(json.contains("Safety"));
    assert!(json.contains("Rejected"));
}

#[test]
fn device_display_shows_size_in_gb() {
    let mut device = DiskDevice::unknown("/dev/sdq");
    device.size_bytes = 128 * 1024 * 1024 * 1024;
    device.model = "TESTMODEL".to_string();
    let shown = device.to_string();
    assert!(shown.contains("/dev/sdq"));
    assert!(shown.contains("128 GB"));
    assert!(shown.contains("TESTMODEL"));
}
