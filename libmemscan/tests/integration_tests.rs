//! End-to-end scans against the current process's own memory, exercising
//! the session façade the way a REPL driver does: set pid, scan, narrow,
//! list, write.

#[cfg(test)]
mod integration_tests {
    use libmemscan::region::RegionLevel;
    use libmemscan::scanner::{CancelToken, ExecutionMode};
    use libmemscan::value::{DataType, MatchKind, UserValue};
    use libmemscan::ScanSession;

    fn own_session() -> ScanSession {
        let mut session = ScanSession::new();
        session.set_pid(std::process::id() as i32);
        session.set_region_level(RegionLevel::All);
        session
    }

    #[test]
    fn exact_scalar_scan_then_narrow_converges_on_a_known_address() {
        let value: i64 = 0x1122_3344_5566_7788;
        let addr = &value as *const i64 as usize;

        let mut session = own_session();
        let cancel = CancelToken::new();

        let needle = UserValue::parse_integer(&value.to_string(), DataType::I64).unwrap();
        session
            .scan(DataType::I64, MatchKind::EqualTo, Some(&needle), &cancel)
            .unwrap();
        assert!(session.count() > 0);

        let records = session.list(usize::MAX).unwrap();
        assert!(records.iter().any(|r| r.address == addr));

        // A second identical scan (narrowing against the existing match set)
        // must not lose the known-good candidate.
        session
            .scan(DataType::I64, MatchKind::EqualTo, Some(&needle), &cancel)
            .unwrap();
        let records = session.list(usize::MAX).unwrap();
        assert!(records.iter().any(|r| r.address == addr));
    }

    #[test]
    fn range_scan_bounds_are_inclusive() {
        let value: i32 = 42;
        let addr = &value as *const i32 as usize;

        let mut session = own_session();
        let cancel = CancelToken::new();
        let range = UserValue::parse_integer_range("42", "42", DataType::I32).unwrap();
        session
            .scan(DataType::I32, MatchKind::Range, Some(&range), &cancel)
            .unwrap();
        let records = session.list(usize::MAX).unwrap();
        assert!(records.iter().any(|r| r.address == addr));
    }

    #[test]
    fn changed_match_kind_seeds_an_implicit_baseline_then_detects_the_change() {
        let mut value: i32 = 100;
        let addr = &mut value as *mut i32 as usize;

        let mut session = own_session();
        let cancel = CancelToken::new();

        // No prior match set: `Changed` needs an old-value baseline, so
        // auto_baseline seeds an implicit `Any` first pass before narrowing.
        session
            .scan(DataType::I32, MatchKind::Changed, None, &cancel)
            .unwrap();
        assert!(session.count() > 0);

        value = 101;
        session
            .scan(DataType::I32, MatchKind::Changed, None, &cancel)
            .unwrap();
        let records = session.list(usize::MAX).unwrap();
        assert!(records.iter().any(|r| r.address == addr));
    }

    #[test]
    fn byte_array_scan_with_mask_matches_wildcarded_bytes() {
        // Second byte is genuinely 0xAD; the mask wildcards it (0x00) so the
        // scan must still match even though the pattern's own guess (0x00)
        // for that byte is wrong.
        let needle: [u8; 4] = [0xDE, 0xAD, 0xBE, 0xEF];
        let addr = needle.as_ptr() as usize;

        let mut session = own_session();
        let cancel = CancelToken::new();
        let pattern = UserValue::parse_bytes("DE00BEEF", Some("FF00FFFF")).unwrap();
        session
            .scan(DataType::ByteArray, MatchKind::EqualTo, Some(&pattern), &cancel)
            .unwrap();
        let records = session.list(usize::MAX).unwrap();
        assert!(records.iter().any(|r| r.address == addr));
    }

    #[test]
    fn regex_scan_finds_a_string_in_memory() {
        let haystack = "memscan_integration_marker_7421\0";
        let addr = haystack.as_ptr() as usize;

        let mut session = own_session();
        let cancel = CancelToken::new();
        let pattern = UserValue::from_string("memscan_integration_marker_[0-9]+");
        session
            .scan(DataType::String, MatchKind::Regex, Some(&pattern), &cancel)
            .unwrap();
        let records = session.list(usize::MAX).unwrap();
        assert!(records.iter().any(|r| r.address == addr));
    }

    #[test]
    fn sequential_and_parallel_scans_agree_on_the_same_process() {
        let value: i32 = 0x4141_4141u32 as i32;
        let _addr = &value as *const i32 as usize;

        let needle = UserValue::parse_integer(&value.to_string(), DataType::I32).unwrap();
        let cancel = CancelToken::new();

        let mut seq = own_session();
        seq.set_execution_mode(ExecutionMode::Sequential);
        seq.scan(DataType::I32, MatchKind::EqualTo, Some(&needle), &cancel)
            .unwrap();

        let mut par = own_session();
        par.set_execution_mode(ExecutionMode::Parallel);
        par.scan(DataType::I32, MatchKind::EqualTo, Some(&needle), &cancel)
            .unwrap();

        assert_eq!(seq.count(), par.count());
    }

    #[test]
    fn write_all_updates_every_surviving_match() {
        let mut value: i32 = 77;
        let addr = &mut value as *mut i32 as usize;

        let mut session = own_session();
        let cancel = CancelToken::new();
        let needle = UserValue::parse_integer("77", DataType::I32).unwrap();
        session
            .scan(DataType::I32, MatchKind::EqualTo, Some(&needle), &cancel)
            .unwrap();
        assert!(session.count() > 0);

        let replacement = UserValue::parse_integer("88", DataType::I32).unwrap();
        let (stats, first_error) = session.write(&replacement, None).unwrap();
        assert!(stats.succeeded > 0);
        assert!(first_error.is_none());
        assert_eq!(value, 88);
        let _ = addr;
    }
}
