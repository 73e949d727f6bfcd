use std::path::PathBuf;
use std::time::Duration;

use custody_core::lockout::LockoutPolicy;
use custody_core::CoreError;
use custody_engine::{EngineConfig, EscalationPolicy, TamperMonitorConfig};
use custody_events::HttpChannelConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{name} must be {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error(transparent)]
    Policy(#[from] CoreError),
}

/// Agent configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub backend_url: String,
    pub device_id: String,
    pub session_store_dir: PathBuf,
    /// Storage readable before the first unlock after a reboot.
    pub boot_store_dir: PathBuf,
    pub delivery_timeout: Duration,
    pub tamper: TamperMonitorConfig,
    pub lockout: LockoutPolicy,
    pub heartbeat_interval: Duration,
    pub connectivity_probe_interval: Duration,
    pub allowed_packages: Vec<String>,
    pub control_socket: PathBuf,
}

impl AgentConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                      | Default                                   |
    /// |------------------------------|-------------------------------------------|
    /// | `BACKEND_URL`                | required                                  |
    /// | `DEVICE_ID`                  | required                                  |
    /// | `SESSION_STORE_DIR`          | `/var/lib/custody/session`                |
    /// | `BOOT_STORE_DIR`             | `/var/lib/custody/boot`                   |
    /// | `DELIVERY_TIMEOUT_SECS`      | `300`                                     |
    /// | `TAMPER_INTERVAL_SECS`       | `15`                                      |
    /// | `TAMPER_SETUP_INTERVAL_SECS` | `60`                                      |
    /// | `TAMPER_ESCALATION_POLICY`   | `stop` (or `continue`)                    |
    /// | `TAMPER_LOCK_ON_DEBUG`       | `false`                                   |
    /// | `LOCKOUT_THRESHOLD`          | `5`                                       |
    /// | `LOCKOUT_WINDOW_MINS`        | `30`                                      |
    /// | `LOCKOUT_DURATION_MINS`      | `30`                                      |
    /// | `HEARTBEAT_INTERVAL_SECS`    | `300`                                     |
    /// | `CONNECTIVITY_PROBE_SECS`    | `30`                                      |
    /// | `ALLOWED_PACKAGES`           | `com.android.phone,com.android.settings`  |
    /// | `CONTROL_SOCKET`             | `/run/custody/agent.sock`                 |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let backend_url = env.required("BACKEND_URL")?;
        if reqwest::Url::parse(&backend_url).is_err() {
            return Err(ConfigError::Invalid {
                name: "BACKEND_URL",
                expected: "an absolute URL",
                value: backend_url,
            });
        }
        let device_id = env.required("DEVICE_ID")?;

        let escalation_policy = match env.or("TAMPER_ESCALATION_POLICY", "stop").as_str() {
            "stop" => EscalationPolicy::StopMonitoring,
            "continue" => EscalationPolicy::ContinueMonitoring,
            other => {
                return Err(ConfigError::Invalid {
                    name: "TAMPER_ESCALATION_POLICY",
                    expected: "'stop' or 'continue'",
                    value: other.to_string(),
                })
            }
        };

        let tamper = TamperMonitorConfig {
            interval: Duration::from_secs(env.parse("TAMPER_INTERVAL_SECS", 15)?),
            setup_interval: Duration::from_secs(env.parse("TAMPER_SETUP_INTERVAL_SECS", 60)?),
            escalation_policy,
            lock_on_debug: env.parse("TAMPER_LOCK_ON_DEBUG", false)?,
        };

        let lockout = LockoutPolicy {
            threshold: env.parse("LOCKOUT_THRESHOLD", 5)?,
            window: chrono::Duration::minutes(env.parse("LOCKOUT_WINDOW_MINS", 30)?),
            lockout_duration: chrono::Duration::minutes(env.parse("LOCKOUT_DURATION_MINS", 30)?),
        };
        lockout.validate()?;

        let allowed_packages = env
            .or("ALLOWED_PACKAGES", "com.android.phone,com.android.settings")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            backend_url,
            device_id,
            session_store_dir: env.or("SESSION_STORE_DIR", "/var/lib/custody/session").into(),
            boot_store_dir: env.or("BOOT_STORE_DIR", "/var/lib/custody/boot").into(),
            delivery_timeout: Duration::from_secs(env.parse("DELIVERY_TIMEOUT_SECS", 300)?),
            tamper,
            lockout,
            heartbeat_interval: Duration::from_secs(env.parse("HEARTBEAT_INTERVAL_SECS", 300)?),
            connectivity_probe_interval: Duration::from_secs(
                env.parse("CONNECTIVITY_PROBE_SECS", 30)?,
            ),
            allowed_packages,
            control_socket: env.or("CONTROL_SOCKET", "/run/custody/agent.sock").into(),
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            lock_id: self.device_id.clone(),
            lockout: self.lockout,
            tamper: self.tamper,
            allowed_packages: self.allowed_packages.clone(),
        }
    }

    pub fn channel_config(&self) -> HttpChannelConfig {
        HttpChannelConfig {
            base_url: self.backend_url.clone(),
            device_id: self.device_id.clone(),
            timeout: self.delivery_timeout,
        }
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.get(name).ok_or(ConfigError::Missing(name))
    }

    fn or(&self, name: &str, default: &str) -> String {
        self.get(name).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: std::str::FromStr>(&self, name: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(name) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                name,
                expected: std::any::type_name::<T>(),
                value: raw,
            }),
        }
    }
}
