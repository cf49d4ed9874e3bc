//! Configuration types, defaults, and (de)serialization.
//!
//! A fully-defaulted, immutable-after-construction record, built once at
//! startup, in preference to scattered `?? default` checks at call sites.
//! The host is assumed to have already validated the tree it hands us; the
//! `Config::load`/`from_toml_str` helpers below exist for the standalone
//! binary and for tests.

use super::secrets::SecretString;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Closed enum with total order `simple < mid < complex < reasoning`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityTier {
    Simple,
    Mid,
    Complex,
    Reasoning,
}

impl ComplexityTier {
    pub const ALL: [ComplexityTier; 4] = [
        ComplexityTier::Simple,
        ComplexityTier::Mid,
        ComplexityTier::Complex,
        ComplexityTier::Reasoning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComplexityTier::Simple => "simple",
            ComplexityTier::Mid => "mid",
            ComplexityTier::Complex => "complex",
            ComplexityTier::Reasoning => "reasoning",
        }
    }

    /// The next cheaper tier, used by the router's budget-exceeded downgrade
    /// path.
    pub fn next_cheaper(&self) -> Option<ComplexityTier> {
        match self {
            ComplexityTier::Simple => None,
            ComplexityTier::Mid => Some(ComplexityTier::Simple),
            ComplexityTier::Complex => Some(ComplexityTier::Mid),
            ComplexityTier::Reasoning => Some(ComplexityTier::Complex),
        }
    }
}

/// Operating mode (GLOSSARY: shadow vs active routing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Shadow,
    Active,
}

fn default_true() -> bool {
    true
}

/// `RoutingConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub allow_downgrade: bool,
    #[serde(default)]
    pub pinned_models: HashSet<String>,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Keyed by `ComplexityTier::as_str()` rather than the enum itself: TOML
    /// (and most human-readable formats via serde) only support string map
    /// keys, so the wire representation is `{ simple = "...", mid = "..." }`
    /// and `tier_model`/`set_tier_model` below are the typed accessors.
    #[serde(default)]
    pub tiers: HashMap<String, String>,
    #[serde(default)]
    pub tier_providers: HashMap<String, String>,
    #[serde(default = "default_reasoning_budget")]
    pub reasoning_budget: i64,
    #[serde(default)]
    pub pricing: HashMap<String, PricingRate>,
    #[serde(default)]
    pub open_router_headers: HashMap<String, String>,
}

fn default_min_confidence() -> f64 {
    0.4
}

fn default_reasoning_budget() -> i64 {
    10_000
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allow_downgrade: true,
            pinned_models: HashSet::new(),
            min_confidence: default_min_confidence(),
            tiers: HashMap::new(),
            tier_providers: HashMap::new(),
            reasoning_budget: default_reasoning_budget(),
            pricing: HashMap::new(),
            open_router_headers: HashMap::new(),
        }
    }
}

impl RoutingConfig {
    pub fn tier_model(&self, tier: ComplexityTier) -> Option<&str> {
        self.tiers.get(tier.as_str()).map(String::as_str)
    }

    pub fn set_tier_model(&mut self, tier: ComplexityTier, model: impl Into<String>) {
        self.tiers.insert(tier.as_str().to_string(), model.into());
    }

    /// Inverse lookup used by the router's downgrade-block clause: which
    /// tier (if any) does this model id currently map to as a tier target?
    pub fn tier_of_model(&self, model: &str) -> Option<ComplexityTier> {
        ComplexityTier::ALL
            .into_iter()
            .find(|t| self.tiers.get(t.as_str()).is_some_and(|m| m == model))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PricingRate {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

/// `WindowingConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: Option<usize>,
    #[serde(default = "default_summarize_threshold")]
    pub summarize_threshold: usize,
    #[serde(default)]
    pub max_summary_tokens: Option<usize>,
}

fn default_max_messages() -> usize {
    10
}
fn default_max_tokens() -> Option<usize> {
    Some(4000)
}
fn default_summarize_threshold() -> usize {
    8
}

impl Default for WindowingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_messages: default_max_messages(),
            max_tokens: default_max_tokens(),
            summarize_threshold: default_summarize_threshold(),
            max_summary_tokens: None,
        }
    }
}

/// `CachingConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub inject_breakpoints: bool,
    #[serde(default = "default_min_content_length")]
    pub min_content_length: usize,
}

fn default_min_content_length() -> usize {
    1000
}

impl Default for CachingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            inject_breakpoints: true,
            min_content_length: default_min_content_length(),
        }
    }
}

/// Streaming sidecar bind configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidecarConfig {
    #[serde(default = "default_sidecar_bind")]
    pub bind: String,
    /// 0 means OS-assigned.
    #[serde(default)]
    pub port: u16,
    #[serde(default = "default_true")]
    pub debug_headers: bool,
}

fn default_sidecar_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            bind: default_sidecar_bind(),
            port: 0,
            debug_headers: true,
        }
    }
}

/// Per-provider outbound credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCredentials {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<SecretString>,
}

/// Budget Tracker configuration. `scopes` allows a per-scope ceiling/window
/// override; `default_ceiling`/`default_window_ms` apply to any scope not
/// listed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_budget_ceiling")]
    pub default_ceiling: f64,
    #[serde(default = "default_budget_window_ms")]
    pub default_window_ms: u64,
    #[serde(default)]
    pub scopes: HashMap<String, BudgetScopeConfig>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BudgetScopeConfig {
    pub ceiling: f64,
    pub window_ms: u64,
}

fn default_budget_ceiling() -> f64 {
    10.0
}
fn default_budget_window_ms() -> u64 {
    3_600_000
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            default_ceiling: default_budget_ceiling(),
            default_window_ms: default_budget_window_ms(),
            scopes: HashMap::new(),
        }
    }
}

/// Latency Tracker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyConfig {
    #[serde(default = "default_ring_size")]
    pub ring_size: usize,
    #[serde(default = "default_outlier_threshold_ms")]
    pub outlier_threshold_ms: u64,
}

fn default_ring_size() -> usize {
    100
}
fn default_outlier_threshold_ms() -> u64 {
    30_000
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            ring_size: default_ring_size(),
            outlier_threshold_ms: default_outlier_threshold_ms(),
        }
    }
}

/// A/B variant definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ABVariantConfig {
    pub id: String,
    pub model: String,
    pub weight: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentStatus {
    Active,
    Paused,
    Completed,
}

/// A/B experiment definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ABExperimentConfig {
    pub id: String,
    pub tier: ComplexityTier,
    pub variants: Vec<ABVariantConfig>,
    #[serde(default = "default_experiment_status")]
    pub status: ExperimentStatus,
    /// Milliseconds since epoch; used to break ties between multiple active
    /// experiments for the same tier (most recently started wins).
    pub started_at_ms: i64,
    #[serde(default = "default_min_samples")]
    pub min_samples: u64,
}

fn default_experiment_status() -> ExperimentStatus {
    ExperimentStatus::Active
}
fn default_min_samples() -> u64 {
    30
}

fn default_max_pending_assignments() -> usize {
    10_000
}

/// Root configuration record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Master switch. When false, or when
    /// `ctx.bypassOptimization` is set on a request, the orchestrator
    /// returns messages verbatim with zero metrics.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub windowing: WindowingConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub caching: CachingConfig,
    #[serde(default)]
    pub sidecar: SidecarConfig,
    #[serde(default)]
    pub providers: HashMap<String, ProviderCredentials>,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub latency: LatencyConfig,
    #[serde(default)]
    pub ab_experiments: Vec<ABExperimentConfig>,
    #[serde(default = "default_max_pending_assignments")]
    pub max_pending_ab_assignments: usize,
    #[serde(default = "default_forwarder_timeout_ms")]
    pub forwarder_timeout_ms: u64,
}

fn default_forwarder_timeout_ms() -> u64 {
    30_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: Mode::default(),
            windowing: WindowingConfig::default(),
            routing: RoutingConfig::default(),
            caching: CachingConfig::default(),
            sidecar: SidecarConfig::default(),
            providers: HashMap::new(),
            budget: BudgetConfig::default(),
            latency: LatencyConfig::default(),
            ab_experiments: Vec::new(),
            max_pending_ab_assignments: default_max_pending_assignments(),
            forwarder_timeout_ms: default_forwarder_timeout_ms(),
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("parsing config TOML")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config file at {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).ok();
        }
        let toml_str = toml::to_string_pretty(self).context("serializing config to TOML")?;
        fs::write(path, toml_str)
            .with_context(|| format!("writing config file at {}", path.display()))
    }

    /// Default config file location: `~/.slimclaw/config.toml`.
    pub fn default_path() -> PathBuf {
        slimclaw_home().join("config.toml")
    }
}

/// Canonical base directory: `~/.slimclaw/`.
pub fn slimclaw_home() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".slimclaw")
}
