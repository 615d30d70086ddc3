/// Default data directory name under home.
pub const DEFAULT_DATA_DIR: &str = ".bugrank";

/// Project config file name, relative to the dataset root.
pub const PROJECT_CONFIG_FILE: &str = ".bugrank/config.toml";

/// Dataset manifest file name.
pub const DATASET_MANIFEST_FILE: &str = "dataset.json";

/// Manifest schema version accepted by the loader.
pub const DATASET_MANIFEST_VERSION: &str = "bugrank-dataset-v1";

/// Schema version stamped on evaluation reports.
pub const EVALUATION_REPORT_VERSION: &str = "bugrank-eval-report-v1";

/// Schema version stamped on persisted weight files.
pub const WEIGHTS_FILE_VERSION: &str = "bugrank-weights-v1";

/// Seed used by the reference pipeline.
pub const DEFAULT_SEED: u64 = 458_711_526;

/// Default Top-N cutoffs.
pub const DEFAULT_TOP_N: [usize; 3] = [1, 5, 10];

/// Default ranking artifact file name.
pub const DEFAULT_RESULTS_FILE: &str = "output.csv";

/// Signal order used when a manifest does not list its signals.
pub const DEFAULT_SIGNALS: [&str; 5] = [
    "vsm_similarity",
    "token_matching",
    "fixed_bug_reports",
    "semantic_similarity",
    "stack_trace",
];

/// Named dataset presets: `(preset, directory under the data root)`.
pub const DATASET_PRESETS: [(&str, &str); 4] = [
    ("aspectj", "AspectJ"),
    ("swt", "SWT"),
    ("zxing", "ZXing"),
    ("codec", "CODEC"),
];

/// Resolve a preset name (case-insensitive) to its directory under the data root.
pub fn preset_dir(name: &str) -> Option<&'static str> {
    let lowered = name.trim().to_ascii_lowercase();
    DATASET_PRESETS
        .iter()
        .find(|(preset, _)| *preset == lowered)
        .map(|(_, dir)| *dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_lookup_ignores_case() {
        assert_eq!(preset_dir("ZXing"), Some("ZXing"));
        assert_eq!(preset_dir(" aspectj "), Some("AspectJ"));
        assert_eq!(preset_dir("eclipse"), None);
    }
}
