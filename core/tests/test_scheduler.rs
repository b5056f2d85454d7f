#[cfg(test)]
mod scheduler_tests {
    use progressive_core::scheduler::{DecodePolicy, FailureMode, FailureTracker};
    use progressive_core::types::StreamError;

    #[test]
    fn tracker_trips_at_the_ceiling() {
        let mut tracker = FailureTracker::new(DecodePolicy::new(3));
        assert!(tracker.record_failure().is_ok());
        assert!(tracker.record_failure().is_ok());
        match tracker.record_failure() {
            Err(StreamError::DecodeCeiling { failures }) => assert_eq!(failures, 3),
            other => panic!("expected decode ceiling, got {other:?}"),
        }
    }

    #[test]
    fn success_resets_streak_but_not_total() {
        let mut tracker = FailureTracker::new(DecodePolicy::new(2));
        tracker.record_failure().unwrap();
        tracker.record_success();
        tracker.record_failure().unwrap();
        assert_eq!(tracker.consecutive(), 1);
        assert_eq!(tracker.total(), 2);
    }

    #[test]
    fn zero_ceiling_is_invalid() {
        assert!(DecodePolicy::new(0).validate().is_err());
        assert!(DecodePolicy::default().validate().is_ok());
        assert_eq!(DecodePolicy::default().max_consecutive_failures, 8);
    }

    #[test]
    fn failure_mode_wire_names() {
        assert_eq!(FailureMode::default(), FailureMode::Skip);
        let modes: Vec<FailureMode> = serde_json::from_str(r#"["skip","error_frame","abort"]"#).unwrap();
        assert_eq!(modes, [FailureMode::Skip, FailureMode::ErrorFrame, FailureMode::Abort]);
    }
}
