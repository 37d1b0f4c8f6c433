use devcomm_telemetry::{RoutingMetrics, new_request_ids};
use domain::ProtocolType;

#[test]
fn request_ids_non_empty() {
    let ids = new_request_ids();
    assert!(!ids.request_id.is_empty());
    assert!(!ids.trace_id.is_empty());
    assert_ne!(ids.request_id, ids.trace_id);
}

#[test]
fn fresh_snapshot_serializes() {
    let snapshot = RoutingMetrics::new().snapshot();
    let json = serde_json::to_value(&snapshot).expect("serialize");
    assert_eq!(
        json["protocols"][0]["protocol"],
        ProtocolType::AttendanceV4_0.code()
    );
    assert!(json["framesReceived"].is_u64());
}
