use super::*;
use chrono::{Duration, TimeZone};

#[test]
fn test_clock_never_goes_backwards() {
    let clock = MonotonicClock::new();
    let later = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
    let earlier = later - Duration::seconds(30);

    assert_eq!(clock.observe(later), later);
    assert_eq!(clock.observe(earlier), later + Duration::microseconds(1));
    assert_eq!(clock.observe(later), later + Duration::microseconds(2));
    assert_eq!(
        clock.observe(later + Duration::seconds(1)),
        later + Duration::seconds(1)
    );
}

#[test]
fn test_clock_truncates_to_micros() {
    let clock = MonotonicClock::new();
    let ts = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
    let observed = clock.observe(ts);
    assert_eq!(observed.timestamp_subsec_nanos(), 123_456_000);
}

#[test]
fn test_clock_now_is_strictly_increasing() {
    let clock = MonotonicClock::new();
    let mut prev = clock.now();
    for _ in 0..1000 {
        let next = clock.now();
        assert!(next > prev);
        prev = next;
    }
}

#[test]
fn test_timestamp_format_is_fixed_width_and_parses_back() {
    let a = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    let b = Utc.timestamp_opt(1_700_000_000, 5_000).unwrap();
    let (fa, fb) = (format_timestamp(&a), format_timestamp(&b));

    assert_eq!(fa.len(), fb.len());
    assert!(fa < fb);
    assert_eq!(parse_timestamp(&fb).unwrap(), b);
}

#[test]
fn test_parse_timestamp_rejects_garbage() {
    assert!(matches!(
        parse_timestamp("yesterday"),
        Err(StorageError::InvalidTimestamp(_))
    ));
}

#[test]
fn test_clamp_limit() {
    assert_eq!(clamp_limit(0), 0);
    assert_eq!(clamp_limit(50), 50);
    assert_eq!(clamp_limit(10_000), MAX_LIST_LIMIT);
}

#[test]
fn test_validate_event_type() {
    assert!(validate_event_type("user.signup").is_ok());
    assert!(validate_event_type("").is_err());
    assert!(validate_event_type(&"x".repeat(MAX_EVENT_TYPE_LEN)).is_ok());
    assert!(validate_event_type(&"x".repeat(MAX_EVENT_TYPE_LEN + 1)).is_err());
}

#[test]
fn test_statements_splits_script() {
    let parts: Vec<&str> = statements("CREATE TABLE a (x INT);\n\nCREATE INDEX i ON a(x);\n").collect();
    assert_eq!(parts, vec!["CREATE TABLE a (x INT)", "CREATE INDEX i ON a(x)"]);
}
