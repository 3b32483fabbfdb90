//! TypeScript Generation Tests
//!
//! Validates that race types can be exported to TypeScript when the tauri
//! feature is enabled.

#[cfg(feature = "tauri")]
#[test]
fn test_presentation_types_implement_specta_type() {
    use specta::Type;

    // If this compiles, the types are configured for TypeScript export.
    fn assert_type<T: Type>() {}

    assert_type::<forza_telemetry::Race>();
    assert_type::<forza_telemetry::RaceEvent>();
    assert_type::<forza_telemetry::Lap>();
}

#[cfg(not(feature = "tauri"))]
#[test]
fn test_tauri_feature_disabled() {
    // Types still serialize without specta.
    let lap = forza_telemetry::Lap {
        lap_number: 1,
        lap_time: 92.5,
        finished_at: chrono::Utc::now(),
        race_position: 3,
        race_time: 92.5,
    };
    let json = serde_json::to_value(lap).unwrap();
    assert!(json.is_object());
}
