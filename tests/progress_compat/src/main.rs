fn main() {
    println!("Run `cargo test -p progress-compat` to execute progress format compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;
    use std::time::Duration;

    use avatar_batch_progress::{
        FORMAT_VERSION, FileProgressRepository, ImageMode, PlatformId, ProgressRepository,
        ProgressStore, StoreError,
    };

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Deserializes a fixture, re-serializes it, and compares the JSON values
    /// (order-independent comparison).
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));
        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  fixture: {fixture}\n  current: {reserialized}"
        );
        parsed
    }

    #[test]
    fn fixture_mid_run_roundtrip() {
        let store: ProgressStore = roundtrip_test("progress_mid_run.json");
        assert_eq!(store.format_version, FORMAT_VERSION);
        assert_eq!(store.sleep_interval, Duration::from_secs(5));
        assert_eq!(store.retry_count, 0);
    }

    #[test]
    fn fixture_mid_run_cursor() {
        let store: ProgressStore = roundtrip_test("progress_mid_run.json");
        assert_eq!(store.cursor_platform, Some(PlatformId::Mobile));
        assert_eq!(store.pending_switch, Some(PlatformId::Mobile));
        assert!(store.is_platform_finished(PlatformId::Desktop));
        assert!(!store.is_pass_complete());

        let job = store.current_job().unwrap();
        assert_eq!(job.avatar.id, "avtr_bara");
        assert_eq!(
            job.settings_for(PlatformId::Mobile).image,
            ImageMode::File {
                path: PathBuf::from("Thumbs/bara.png")
            }
        );
        assert!(!job.is_enabled_for(PlatformId::Desktop));
    }

    #[test]
    fn fixture_mid_run_errors() {
        let store: ProgressStore = roundtrip_test("progress_mid_run.json");
        assert_eq!(store.errors.len(), 2);
        assert!(store.errors[0].is_for_avatar("avtr_capy"));
        assert!(store.errors[1].avatar.is_none());
        assert_eq!(store.errors[1].platform, Some(PlatformId::Mobile));
    }

    #[test]
    fn fixture_minimal_defaults() {
        let store: ProgressStore =
            serde_json::from_value(load_fixture("progress_minimal.json")).unwrap();
        assert_eq!(store.format_version, FORMAT_VERSION);
        assert_eq!(store.cursor_avatar_index, 0);
        assert!(store.cursor_platform.is_none());
        assert!(store.finished_platforms.is_empty());
        assert!(store.errors.is_empty());
        assert_eq!(store.sleep_interval, Duration::ZERO);
        assert!(!store.strict_mode);
        assert!(store.saved_environment.is_none());
        assert!(store.avatar_queue[0].is_enabled_for(PlatformId::Mobile));
    }

    #[test]
    fn fixture_future_format_rejected() {
        let repo = FileProgressRepository::new(fixtures_dir().join("progress_future.json"));
        match repo.load() {
            Err(StoreError::UnsupportedFormat { found, supported }) => {
                assert_eq!(found, 99);
                assert_eq!(supported, FORMAT_VERSION);
            }
            other => panic!("expected UnsupportedFormat, got {other:?}"),
        }
    }
}
