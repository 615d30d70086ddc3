use crate::constants;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Search strategy used to estimate signal weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerStrategy {
    #[default]
    DifferentialEvolution,
    RandomSearch,
}

impl OptimizerStrategy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DifferentialEvolution => "differential_evolution",
            Self::RandomSearch => "random_search",
        }
    }
}

impl std::fmt::Display for OptimizerStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    #[serde(default = "default_mutation_min")]
    pub mutation_min: f64,
    #[serde(default = "default_mutation_max")]
    pub mutation_max: f64,
    #[serde(default = "default_recombination")]
    pub recombination: f64,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default)]
    pub absolute_tolerance: f64,
    /// Worker threads for candidate evaluation; 0 means available CPUs.
    #[serde(default)]
    pub workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    #[serde(default = "default_top_n")]
    pub top_n: Vec<usize>,
    #[serde(default = "default_results_file")]
    pub results_file: String,
    #[serde(default)]
    pub report_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root under which dataset presets are resolved.
    #[serde(default = "default_data_root")]
    pub data_root: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_strategy() -> String {
    OptimizerStrategy::default().as_str().to_string()
}
fn default_seed() -> u64 {
    constants::DEFAULT_SEED
}
fn default_max_iterations() -> usize {
    1000
}
fn default_population_size() -> usize {
    15
}
fn default_mutation_min() -> f64 {
    0.5
}
fn default_mutation_max() -> f64 {
    1.0
}
fn default_recombination() -> f64 {
    0.7
}
fn default_tolerance() -> f64 {
    0.01
}
fn default_top_n() -> Vec<usize> {
    constants::DEFAULT_TOP_N.to_vec()
}
fn default_results_file() -> String {
    constants::DEFAULT_RESULTS_FILE.to_string()
}
fn default_data_root() -> String {
    format!("~/{}/data", constants::DEFAULT_DATA_DIR)
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            seed: default_seed(),
            max_iterations: default_max_iterations(),
            population_size: default_population_size(),
            mutation_min: default_mutation_min(),
            mutation_max: default_mutation_max(),
            recombination: default_recombination(),
            tolerance: default_tolerance(),
            absolute_tolerance: 0.0,
            workers: 0,
        }
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            results_file: default_results_file(),
            report_file: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl OptimizerConfig {
    pub fn strategy_typed(&self) -> OptimizerStrategy {
        parse_strategy(&self.strategy).unwrap_or_default()
    }

    /// Resolve `workers = 0` to the machine's available parallelism.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(usize::from)
            .unwrap_or(1)
    }
}

impl Config {
    /// Load configuration with layered precedence:
    /// 1. Explicit config file (from `--config` flag, highest priority)
    /// 2. Dataset config: `<dataset_root>/.bugrank/config.toml`
    /// 3. Global config: `~/.bugrank/config.toml`
    /// 4. Built-in defaults (lowest priority)
    ///
    /// Environment variables (`BUGRANK_<SECTION>_<KEY>`) override all files.
    pub fn load_with_file(
        dataset_root: Option<&Path>,
        config_file: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let mut merged = toml::Value::Table(toml::map::Map::new());

        if let Some(home) = dirs::home_dir() {
            let global_path = home.join(constants::DEFAULT_DATA_DIR).join("config.toml");
            if global_path.exists() {
                let raw = load_toml_value(&global_path)?;
                merge_toml_values(&mut merged, &raw);
            }
        }

        if let Some(root) = dataset_root {
            let project_path = root.join(constants::PROJECT_CONFIG_FILE);
            if project_path.exists() {
                let raw = load_toml_value(&project_path)?;
                merge_toml_values(&mut merged, &raw);
            }
        }

        if let Some(cf) = config_file {
            if !cf.exists() {
                return Err(ConfigError::NotFound {
                    path: cf.display().to_string(),
                });
            }
            let raw = load_toml_value(cf)?;
            merge_toml_values(&mut merged, &raw);
        }

        let config_str =
            toml::to_string(&merged).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        let mut config: Config =
            toml::from_str(&config_str).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        apply_env_overrides(&mut config);
        config.normalize()?;
        Ok(config)
    }

    /// Clamp and canonicalize values; rejects only values with no sane fallback.
    pub fn normalize(&mut self) -> Result<(), ConfigError> {
        let optimizer = &mut self.optimizer;
        match parse_strategy(&optimizer.strategy) {
            Some(strategy) => optimizer.strategy = strategy.as_str().to_string(),
            None => {
                return Err(ConfigError::InvalidValue {
                    field: "optimizer.strategy".to_string(),
                    reason: format!(
                        "unknown strategy '{}'; expected differential_evolution or random_search",
                        optimizer.strategy
                    ),
                });
            }
        }
        optimizer.max_iterations = clamp_min_usize_with_warning(
            optimizer.max_iterations,
            1,
            default_max_iterations(),
            "optimizer.max_iterations",
        );
        optimizer.population_size = clamp_min_usize_with_warning(
            optimizer.population_size,
            1,
            default_population_size(),
            "optimizer.population_size",
        );
        optimizer.mutation_min = clamp_range_f64_with_warning(
            optimizer.mutation_min,
            0.0,
            2.0,
            default_mutation_min(),
            "optimizer.mutation_min",
        );
        optimizer.mutation_max = clamp_range_f64_with_warning(
            optimizer.mutation_max,
            0.0,
            2.0,
            default_mutation_max(),
            "optimizer.mutation_max",
        );
        if optimizer.mutation_min > optimizer.mutation_max {
            tracing::warn!(
                mutation_min = optimizer.mutation_min,
                mutation_max = optimizer.mutation_max,
                "mutation range is inverted; swapping bounds"
            );
            std::mem::swap(&mut optimizer.mutation_min, &mut optimizer.mutation_max);
        }
        optimizer.recombination = clamp_unit_f64_with_warning(
            optimizer.recombination,
            default_recombination(),
            "optimizer.recombination",
        );
        optimizer.tolerance = clamp_non_negative_f64_with_warning(
            optimizer.tolerance,
            default_tolerance(),
            "optimizer.tolerance",
        );
        optimizer.absolute_tolerance = clamp_non_negative_f64_with_warning(
            optimizer.absolute_tolerance,
            0.0,
            "optimizer.absolute_tolerance",
        );

        self.evaluation.top_n = normalize_top_n(&self.evaluation.top_n);
        if self.evaluation.results_file.trim().is_empty() {
            tracing::warn!("evaluation.results_file is empty; falling back to default");
            self.evaluation.results_file = default_results_file();
        }

        self.storage.data_root = expand_tilde(&self.storage.data_root);
        Ok(())
    }

    /// Resolve the directory of a named dataset preset.
    pub fn preset_root(&self, preset: &str) -> Option<PathBuf> {
        constants::preset_dir(preset).map(|dir| PathBuf::from(&self.storage.data_root).join(dir))
    }
}

/// Load a TOML file as a raw `toml::Value` (preserving only explicitly-set fields).
fn load_toml_value(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    content
        .parse::<toml::Value>()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Deep-merge `overlay` into `base`. Only keys present in `overlay` are written.
fn merge_toml_values(base: &mut toml::Value, overlay: &toml::Value) {
    if let (toml::Value::Table(base_map), toml::Value::Table(overlay_map)) = (base, overlay) {
        for (key, overlay_val) in overlay_map {
            if let Some(base_val) = base_map.get_mut(key) {
                if base_val.is_table() && overlay_val.is_table() {
                    merge_toml_values(base_val, overlay_val);
                } else {
                    *base_val = overlay_val.clone();
                }
            } else {
                base_map.insert(key.clone(), overlay_val.clone());
            }
        }
    }
}

/// Apply environment variable overrides to config fields.
/// Convention: `BUGRANK_<SECTION>_<KEY>` in UPPER_SNAKE_CASE.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(v) = std::env::var("BUGRANK_OPTIMIZER_STRATEGY") {
        config.optimizer.strategy = v;
    }
    if let Ok(v) = std::env::var("BUGRANK_OPTIMIZER_SEED")
        && let Ok(n) = v.trim().parse()
    {
        config.optimizer.seed = n;
    }
    if let Ok(v) = std::env::var("BUGRANK_OPTIMIZER_MAX_ITERATIONS")
        && let Ok(n) = v.trim().parse()
    {
        config.optimizer.max_iterations = n;
    }
    if let Ok(v) = std::env::var("BUGRANK_OPTIMIZER_POPULATION_SIZE")
        && let Ok(n) = v.trim().parse()
    {
        config.optimizer.population_size = n;
    }
    if let Ok(v) = std::env::var("BUGRANK_OPTIMIZER_WORKERS")
        && let Ok(n) = v.trim().parse()
    {
        config.optimizer.workers = n;
    }
    if let Ok(v) = std::env::var("BUGRANK_EVALUATION_TOP_N") {
        let parsed: Vec<usize> = parse_csv_env_list(&v)
            .iter()
            .filter_map(|value| value.parse().ok())
            .collect();
        if !parsed.is_empty() {
            config.evaluation.top_n = parsed;
        }
    }
    if let Ok(v) = std::env::var("BUGRANK_EVALUATION_RESULTS_FILE") {
        config.evaluation.results_file = v;
    }
    if let Ok(v) = std::env::var("BUGRANK_STORAGE_DATA_ROOT") {
        config.storage.data_root = v;
    }
    if let Ok(v) = std::env::var("BUGRANK_LOGGING_LEVEL") {
        config.logging.level = v;
    }
}

fn parse_csv_env_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_strategy(raw: &str) -> Option<OptimizerStrategy> {
    match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
        "differential_evolution" | "de" => Some(OptimizerStrategy::DifferentialEvolution),
        "random_search" | "random" => Some(OptimizerStrategy::RandomSearch),
        _ => None,
    }
}

fn normalize_top_n(raw: &[usize]) -> Vec<usize> {
    let mut values: Vec<usize> = raw.iter().copied().filter(|n| *n > 0).collect();
    values.sort_unstable();
    values.dedup();
    if values.len() != raw.len() {
        tracing::warn!(
            raw = ?raw,
            normalized = ?values,
            "evaluation.top_n contained zero or duplicate cutoffs"
        );
    }
    if values.is_empty() {
        return default_top_n();
    }
    values
}

fn clamp_unit_f64_with_warning(value: f64, fallback: f64, field: &str) -> f64 {
    if !value.is_finite() {
        tracing::warn!(
            field,
            value,
            fallback,
            "invalid non-finite config value; falling back to default"
        );
        return fallback;
    }
    let clamped = value.clamp(0.0, 1.0);
    if (clamped - value).abs() > f64::EPSILON {
        tracing::warn!(
            field,
            value,
            clamped,
            "config value out of range; clamped to [0.0, 1.0]"
        );
    }
    clamped
}

fn clamp_non_negative_f64_with_warning(value: f64, fallback: f64, field: &str) -> f64 {
    if !value.is_finite() || value < 0.0 {
        tracing::warn!(
            field,
            value,
            fallback,
            "config value must be finite and non-negative; falling back to default"
        );
        return fallback;
    }
    value
}

fn clamp_range_f64_with_warning(value: f64, min: f64, max: f64, fallback: f64, field: &str) -> f64 {
    if !value.is_finite() || value < min || value > max {
        tracing::warn!(
            field,
            value,
            min,
            max,
            fallback,
            "config value out of range; falling back to default"
        );
        return fallback;
    }
    value
}

fn clamp_min_usize_with_warning(value: usize, min: usize, fallback: usize, field: &str) -> usize {
    if value < min {
        tracing::warn!(
            field,
            value,
            min,
            fallback,
            "config value below minimum; falling back to default"
        );
        fallback
    } else {
        value
    }
}

fn expand_tilde(path: &str) -> String {
    if path.starts_with('~')
        && let Some(home) = dirs::home_dir()
    {
        return path.replacen('~', &home.to_string_lossy(), 1);
    }
    path.to_string()
}
