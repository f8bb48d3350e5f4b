//! Runtime configuration.
//!
//! One explicit structure collects every pipeline knob, loaded once at
//! startup and passed into components by value. Sources, in order:
//! defaults, an optional JSON file named by `SENTINEL_CONFIG`, then
//! `SENTINEL_*` environment overrides for the fields that vary per
//! deployment (stream URL, report endpoint, frame skip, confirm threshold,
//! window, cooldown). `validate()` runs once; components never re-check
//! their knobs.

use anyhow::{anyhow, Result};
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use crate::aggregate::AggregatorConfig;
use crate::recognize::RecognitionConfig;
use crate::report::ReporterConfig;
use crate::source::StreamSettings;

const DEFAULT_STREAM_LOCATOR: &str = "stub://front_gate";
const DEFAULT_READ_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_BACKOFF_START_MS: u64 = 250;
const DEFAULT_BACKOFF_CAP_MS: u64 = 4_000;
const DEFAULT_FRAME_SKIP: u64 = 2;
const DEFAULT_CONFIDENCE_FLOOR: f32 = 0.35;
const DEFAULT_MAX_CANDIDATES: usize = 3;
const DEFAULT_PADDING_FRAC: f32 = 0.05;
const DEFAULT_UPSCALE_FACTOR: u32 = 2;
const DEFAULT_ALLOWLIST: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ-";
const DEFAULT_MIN_TEXT_LEN: usize = 4;
const DEFAULT_OCR_CONFIDENCE_FLOOR: f32 = 0.5;
const DEFAULT_STAGE_BUDGET_MS: u64 = 2_000;
const DEFAULT_CONFIRM_THRESHOLD: u32 = 3;
const DEFAULT_WINDOW_SECS: u64 = 5;
const DEFAULT_COOLDOWN_SECS: u64 = 30;
const DEFAULT_IDLE_EVICT_SECS: u64 = 120;
const DEFAULT_REPORT_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_REPORT_QUEUE: usize = 16;
const DEFAULT_REPORT_ATTEMPTS: u32 = 2;

#[derive(Debug, Deserialize, Default)]
struct SentinelConfigFile {
    stream: Option<StreamConfigFile>,
    scheduler: Option<SchedulerConfigFile>,
    recognition: Option<RecognitionConfigFile>,
    normalizer: Option<NormalizerConfigFile>,
    aggregator: Option<AggregatorConfigFile>,
    reporting: Option<ReportingConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    locator: Option<String>,
    read_timeout_ms: Option<u64>,
    mirror: Option<bool>,
    backoff_start_ms: Option<u64>,
    backoff_cap_ms: Option<u64>,
    max_reconnects: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct SchedulerConfigFile {
    frame_skip: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct RecognitionConfigFile {
    confidence_floor: Option<f32>,
    max_candidates: Option<usize>,
    padding_frac: Option<f32>,
    upscale_factor: Option<u32>,
    allowlist: Option<String>,
    min_text_len: Option<usize>,
    ocr_confidence_floor: Option<f32>,
    stage_budget_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct NormalizerConfigFile {
    keep_prefix: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct AggregatorConfigFile {
    confirm_threshold: Option<u32>,
    window_secs: Option<u64>,
    cooldown_secs: Option<u64>,
    idle_evict_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ReportingConfigFile {
    endpoint: Option<String>,
    timeout_ms: Option<u64>,
    queue_capacity: Option<usize>,
    max_attempts: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct SentinelConfig {
    pub stream: StreamSettings,
    pub frame_skip: u64,
    pub recognition: RecognitionConfig,
    /// Keep the locale prefix-letter group in normalized plates.
    pub keep_prefix: bool,
    pub aggregator: AggregatorConfig,
    pub reporting: ReporterConfig,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            stream: StreamSettings {
                locator: DEFAULT_STREAM_LOCATOR.to_string(),
                read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
                mirror: false,
                backoff_start: Duration::from_millis(DEFAULT_BACKOFF_START_MS),
                backoff_cap: Duration::from_millis(DEFAULT_BACKOFF_CAP_MS),
                max_reconnects: 0,
            },
            frame_skip: DEFAULT_FRAME_SKIP,
            recognition: RecognitionConfig {
                confidence_floor: DEFAULT_CONFIDENCE_FLOOR,
                max_candidates: DEFAULT_MAX_CANDIDATES,
                padding_frac: DEFAULT_PADDING_FRAC,
                upscale_factor: DEFAULT_UPSCALE_FACTOR,
                allowlist: DEFAULT_ALLOWLIST.to_string(),
                min_text_len: DEFAULT_MIN_TEXT_LEN,
                ocr_confidence_floor: DEFAULT_OCR_CONFIDENCE_FLOOR,
                stage_budget: Duration::from_millis(DEFAULT_STAGE_BUDGET_MS),
            },
            keep_prefix: true,
            aggregator: AggregatorConfig {
                confirm_threshold: DEFAULT_CONFIRM_THRESHOLD,
                window: Duration::from_secs(DEFAULT_WINDOW_SECS),
                cooldown: Duration::from_secs(DEFAULT_COOLDOWN_SECS),
                idle_evict: Duration::from_secs(DEFAULT_IDLE_EVICT_SECS),
            },
            reporting: ReporterConfig {
                endpoint: None,
                timeout: Duration::from_millis(DEFAULT_REPORT_TIMEOUT_MS),
                queue_capacity: DEFAULT_REPORT_QUEUE,
                max_attempts: DEFAULT_REPORT_ATTEMPTS,
            },
        }
    }
}

impl SentinelConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SENTINEL_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => read_config_file(Path::new(path))?,
            None => SentinelConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SentinelConfigFile) -> Self {
        let mut cfg = Self::default();
        if let Some(stream) = file.stream {
            if let Some(locator) = stream.locator {
                cfg.stream.locator = locator;
            }
            if let Some(ms) = stream.read_timeout_ms {
                cfg.stream.read_timeout = Duration::from_millis(ms);
            }
            if let Some(mirror) = stream.mirror {
                cfg.stream.mirror = mirror;
            }
            if let Some(ms) = stream.backoff_start_ms {
                cfg.stream.backoff_start = Duration::from_millis(ms);
            }
            if let Some(ms) = stream.backoff_cap_ms {
                cfg.stream.backoff_cap = Duration::from_millis(ms);
            }
            if let Some(ceiling) = stream.max_reconnects {
                cfg.stream.max_reconnects = ceiling;
            }
        }
        if let Some(scheduler) = file.scheduler {
            if let Some(skip) = scheduler.frame_skip {
                cfg.frame_skip = skip;
            }
        }
        if let Some(rec) = file.recognition {
            if let Some(floor) = rec.confidence_floor {
                cfg.recognition.confidence_floor = floor;
            }
            if let Some(max) = rec.max_candidates {
                cfg.recognition.max_candidates = max;
            }
            if let Some(pad) = rec.padding_frac {
                cfg.recognition.padding_frac = pad;
            }
            if let Some(scale) = rec.upscale_factor {
                cfg.recognition.upscale_factor = scale;
            }
            if let Some(allowlist) = rec.allowlist {
                cfg.recognition.allowlist = allowlist;
            }
            if let Some(len) = rec.min_text_len {
                cfg.recognition.min_text_len = len;
            }
            if let Some(floor) = rec.ocr_confidence_floor {
                cfg.recognition.ocr_confidence_floor = floor;
            }
            if let Some(ms) = rec.stage_budget_ms {
                cfg.recognition.stage_budget = Duration::from_millis(ms);
            }
        }
        if let Some(norm) = file.normalizer {
            if let Some(keep) = norm.keep_prefix {
                cfg.keep_prefix = keep;
            }
        }
        if let Some(agg) = file.aggregator {
            if let Some(threshold) = agg.confirm_threshold {
                cfg.aggregator.confirm_threshold = threshold;
            }
            if let Some(secs) = agg.window_secs {
                cfg.aggregator.window = Duration::from_secs(secs);
            }
            if let Some(secs) = agg.cooldown_secs {
                cfg.aggregator.cooldown = Duration::from_secs(secs);
            }
            if let Some(secs) = agg.idle_evict_secs {
                cfg.aggregator.idle_evict = Duration::from_secs(secs);
            }
        }
        if let Some(rep) = file.reporting {
            if rep.endpoint.is_some() {
                cfg.reporting.endpoint = rep.endpoint;
            }
            if let Some(ms) = rep.timeout_ms {
                cfg.reporting.timeout = Duration::from_millis(ms);
            }
            if let Some(cap) = rep.queue_capacity {
                cfg.reporting.queue_capacity = cap;
            }
            if let Some(attempts) = rep.max_attempts {
                cfg.reporting.max_attempts = attempts;
            }
        }
        cfg
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(locator) = std::env::var("SENTINEL_STREAM_URL") {
            if !locator.trim().is_empty() {
                self.stream.locator = locator;
            }
        }
        if let Ok(endpoint) = std::env::var("SENTINEL_REPORT_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                self.reporting.endpoint = Some(endpoint);
            }
        }
        if let Ok(skip) = std::env::var("SENTINEL_FRAME_SKIP") {
            self.frame_skip = skip
                .parse()
                .map_err(|_| anyhow!("SENTINEL_FRAME_SKIP must be an integer"))?;
        }
        if let Ok(threshold) = std::env::var("SENTINEL_CONFIRM_THRESHOLD") {
            self.aggregator.confirm_threshold = threshold
                .parse()
                .map_err(|_| anyhow!("SENTINEL_CONFIRM_THRESHOLD must be an integer"))?;
        }
        if let Ok(secs) = std::env::var("SENTINEL_WINDOW_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|_| anyhow!("SENTINEL_WINDOW_SECS must be an integer number of seconds"))?;
            self.aggregator.window = Duration::from_secs(secs);
        }
        if let Ok(secs) = std::env::var("SENTINEL_COOLDOWN_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                anyhow!("SENTINEL_COOLDOWN_SECS must be an integer number of seconds")
            })?;
            self.aggregator.cooldown = Duration::from_secs(secs);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.frame_skip == 0 {
            return Err(anyhow!("scheduler frame_skip must be >= 1"));
        }
        if !(0.0..=1.0).contains(&self.recognition.confidence_floor) {
            return Err(anyhow!("recognition confidence_floor must be within 0..=1"));
        }
        if !(0.0..=1.0).contains(&self.recognition.ocr_confidence_floor) {
            return Err(anyhow!("recognition ocr_confidence_floor must be within 0..=1"));
        }
        if self.recognition.max_candidates == 0 {
            return Err(anyhow!("recognition max_candidates must be >= 1"));
        }
        if !(0.0..=1.0).contains(&self.recognition.padding_frac) {
            return Err(anyhow!("recognition padding_frac must be within 0..=1"));
        }
        if !(1..=8).contains(&self.recognition.upscale_factor) {
            return Err(anyhow!("recognition upscale_factor must be within 1..=8"));
        }
        if self.recognition.min_text_len == 0 {
            return Err(anyhow!("recognition min_text_len must be >= 1"));
        }
        validate_allowlist(&self.recognition.allowlist)?;
        if self.aggregator.confirm_threshold == 0 {
            return Err(anyhow!("aggregator confirm_threshold must be >= 1"));
        }
        if self.aggregator.window.is_zero() {
            return Err(anyhow!("aggregator window must be greater than zero"));
        }
        if self.aggregator.cooldown.is_zero() {
            return Err(anyhow!("aggregator cooldown must be greater than zero"));
        }
        if self.aggregator.idle_evict < self.aggregator.window {
            return Err(anyhow!(
                "aggregator idle_evict must be at least the window duration"
            ));
        }
        if self.reporting.queue_capacity == 0 {
            return Err(anyhow!("reporting queue_capacity must be >= 1"));
        }
        if self.reporting.max_attempts == 0 {
            return Err(anyhow!("reporting max_attempts must be >= 1"));
        }
        if self.stream.backoff_start.is_zero() {
            return Err(anyhow!("stream backoff_start_ms must be greater than zero"));
        }
        if self.stream.backoff_cap < self.stream.backoff_start {
            return Err(anyhow!(
                "stream backoff_cap_ms must be at least backoff_start_ms"
            ));
        }
        Ok(())
    }
}

/// The allowlist is handed verbatim to the OCR collaborator; restrict it to
/// the characters the normalizer understands.
fn validate_allowlist(allowlist: &str) -> Result<()> {
    static ALLOWLIST_RE: OnceLock<Regex> = OnceLock::new();
    let re = ALLOWLIST_RE.get_or_init(|| Regex::new(r"^[0-9A-Z-]+$").unwrap());
    if !re.is_match(allowlist) {
        return Err(anyhow!(
            "recognition allowlist must be non-empty and drawn from [0-9A-Z-]"
        ));
    }
    Ok(())
}

fn read_config_file(path: &Path) -> Result<SentinelConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
