use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{env, fs, path::PathBuf, sync::RwLock, time::Duration};

pub const POLL_INTERVAL_ENV: &str = "VITALS_POLL_INTERVAL_MS";
pub const SESSION_TIMEOUT_ENV: &str = "VITALS_SESSION_TIMEOUT_MS";
pub const FETCH_TIMEOUT_ENV: &str = "VITALS_FETCH_TIMEOUT_MS";

/// A capture that has not reported within a day never will.
const MAX_SESSION_TIMEOUT_MS: u64 = 24 * 60 * 60 * 1_000;

/// Tunables for the poller and the timeout guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CaptureSettings {
    pub poll_interval_ms: u64,
    pub session_timeout_ms: u64,
    /// Upper bound on a single latest-reading fetch.
    pub fetch_timeout_ms: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            session_timeout_ms: 60_000,
            fetch_timeout_ms: 5_000,
        }
    }
}

impl CaptureSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            bail!("pollIntervalMs must be greater than zero");
        }
        if self.session_timeout_ms == 0 {
            bail!("sessionTimeoutMs must be greater than zero");
        }
        if self.session_timeout_ms > MAX_SESSION_TIMEOUT_MS {
            bail!("sessionTimeoutMs must not exceed {MAX_SESSION_TIMEOUT_MS}");
        }
        if self.fetch_timeout_ms == 0 {
            bail!("fetchTimeoutMs must be greater than zero");
        }
        if self.fetch_timeout_ms > self.session_timeout_ms {
            bail!(
                "fetchTimeoutMs ({}) exceeds sessionTimeoutMs ({})",
                self.fetch_timeout_ms,
                self.session_timeout_ms
            );
        }
        Ok(())
    }

    /// Overlay `VITALS_*` environment variables on top of `self`.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(value) = read_env_ms(POLL_INTERVAL_ENV)? {
            self.poll_interval_ms = value;
        }
        if let Some(value) = read_env_ms(SESSION_TIMEOUT_ENV)? {
            self.session_timeout_ms = value;
        }
        if let Some(value) = read_env_ms(FETCH_TIMEOUT_ENV)? {
            self.fetch_timeout_ms = value;
        }
        Ok(self)
    }
}

fn read_env_ms(key: &str) -> Result<Option<u64>> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .with_context(|| format!("{key} must be a whole number of milliseconds, got '{raw}'")),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("Failed to read {key}")),
    }
}

/// JSON-file backed capture settings.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<CaptureSettings>,
}

impl SettingsStore {
    /// Load settings from `path`, falling back to defaults when the file is
    /// missing. Environment overrides are applied on top and the result is
    /// validated.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = Self::load(&path)?.with_env_overrides()?;
        data.validate()
            .with_context(|| format!("Invalid capture settings in {}", path.display()))?;

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    fn load(path: &PathBuf) -> Result<CaptureSettings> {
        if !path.exists() {
            return Ok(CaptureSettings::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings in {}", path.display()))
    }

    pub fn capture(&self) -> CaptureSettings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update_capture(&self, settings: CaptureSettings) -> Result<()> {
        settings.validate()?;
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    pub fn reload(&self) -> Result<()> {
        let data = Self::load(&self.path)?;
        data.validate()?;
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = data;
        Ok(())
    }

    fn persist(&self, data: &CaptureSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
