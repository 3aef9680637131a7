//! # pmoupnp Configuration Module
//!
//! This module provides configuration management for the pmoupnp stack, including:
//! - Loading configuration from YAML files
//! - Merging with embedded default configuration
//! - Environment variable overrides
//! - Type-safe getters and setters for configuration values
//! - Thread-safe singleton access pattern
//!
//! ## Usage
//!
//! ```no_run
//! use pmoconfig::get_config;
//!
//! // Get the global configuration
//! let config = get_config();
//!
//! // Access configuration values
//! let port = config.get_http_port();
//! let timeout = config.get_action_call_timeout_secs()?;
//!
//! // Update configuration values
//! config.set_http_port(9000)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Result};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::info;
use uuid::Uuid;

mod logging;

pub use logging::init_logging;

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("upnp.yaml");

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load_config("").expect("Failed to load pmoupnp configuration"));
}

const ENV_CONFIG_DIR: &str = "PMOUPNP_CONFIG";
const ENV_PREFIX: &str = "PMOUPNP_CONFIG__";
const CONFIG_DIR_NAME: &str = ".pmoupnp";

// Default values for configuration
const DEFAULT_HTTP_PORT: u16 = 8080;
const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";
const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";
const DEFAULT_LOG_ENABLE_CONSOLE: bool = true;

pub const DEFAULT_DESCRIPTION_PATH: &str = "/upnphost/description";
pub const DEFAULT_CONTROL_PATH: &str = "/upnphost/control";
pub const DEFAULT_EVENTING_PATH: &str = "/upnphost/eventing";

const DEFAULT_CP_HTTP_PORT: usize = 0;
const DEFAULT_PENDING_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_ACTION_CALL_TIMEOUT_SECS: u64 = 30;
const DEFAULT_EVENT_SUBSCRIPTION_SECS: u64 = 1800;
const DEFAULT_SUBSCRIPTION_RENEWAL_GAP_SECS: u64 = 30;

/// Macro to generate getter/setter for usize values with default
macro_rules! impl_usize_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<usize> {
            match self.get_value($path) {
                Ok(Value::Number(n)) => Ok(n.as_u64().map(|v| v as usize).unwrap_or($default)),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, size: usize) -> Result<()> {
            let n = Number::from(size);
            self.set_value($path, Value::Number(n))
        }
    };
}

/// Macro to generate getter/setter for u64 durations (in seconds) with default
macro_rules! impl_secs_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<u64> {
            match self.get_value($path) {
                Ok(Value::Number(n)) => Ok(n.as_u64().filter(|v| *v > 0).unwrap_or($default)),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, secs: u64) -> Result<()> {
            self.set_value($path, Value::Number(Number::from(secs)))
        }
    };
}

/// Macro to generate getter/setter for bool values with default
macro_rules! impl_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<bool> {
            match self.get_value($path) {
                Ok(Value::Bool(b)) => Ok(b),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
}

/// Macro to generate getter/setter for string values with default
macro_rules! impl_string_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> String {
            match self.get_value($path) {
                Ok(Value::String(s)) if !s.is_empty() => s,
                _ => $default.to_string(),
            }
        }

        pub fn $setter(&self, value: String) -> Result<()> {
            self.set_value($path, Value::String(value))
        }
    };
}

/// Configuration manager for the pmoupnp stack
///
/// This structure manages the application configuration, including:
/// - Loading configuration from YAML files
/// - Merging with default configuration
/// - Handling environment variable overrides
/// - Providing typed getters/setters for configuration values
///
/// # Examples
///
/// ```no_run
/// use pmoconfig::get_config;
///
/// let config = get_config();
/// let port = config.get_http_port();
/// println!("HTTP port: {}", port);
/// ```
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        let data = self.data().clone();
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(data),
        }
    }
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> String {
        // 1. Try provided directory
        if !directory.is_empty() {
            return directory.to_string();
        }

        // 2. Try environment variable
        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var=ENV_CONFIG_DIR, path=%env_path, "Trying to load config from env");
            return env_path;
        }

        // 3. Try current directory
        if Path::new(CONFIG_DIR_NAME).exists() {
            return CONFIG_DIR_NAME.to_string();
        }

        // 4. Try home directory
        if let Some(home) = home_dir() {
            let home_config = home.join(CONFIG_DIR_NAME);
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        CONFIG_DIR_NAME.to_string()
    }

    /// Validates and prepares a config directory
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!("{} is not a directory", path.display()));
        }

        // Test write permission
        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;

        fs::read_dir(path)?;

        Ok(())
    }

    /// Determines and validates the configuration directory
    ///
    /// The directory is searched in the following order:
    /// 1. The provided `directory` parameter if not empty
    /// 2. The `PMOUPNP_CONFIG` environment variable
    /// 3. `.pmoupnp` in the current directory
    /// 4. `.pmoupnp` in the user's home directory
    ///
    /// The directory is created if it doesn't exist, and validated for read/write permissions.
    pub fn config_dir(directory: &str) -> Result<String> {
        let dir_path = Self::find_config_dir(directory);
        Self::validate_config_dir(Path::new(&dir_path))?;
        Ok(dir_path)
    }

    /// Loads the configuration from the specified directory
    ///
    /// This method:
    /// 1. Determines the configuration directory
    /// 2. Loads the default embedded configuration
    /// 3. Merges it with the external config.yaml file if present
    /// 4. Applies environment variable overrides
    /// 5. Saves the merged configuration
    ///
    /// # Arguments
    ///
    /// * `directory` - The directory containing the config.yaml file, or empty to use defaults
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::config_dir(directory)?;
        info!(config_dir=%config_dir, "Using config directory");

        let config_file_path = Path::new(&config_dir).join("config.yaml");
        let path = config_file_path.to_string_lossy().to_string();

        let mut default_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        let yaml_data = if let Ok(data) = fs::read(&path) {
            info!(config_file=%path, "Loaded config file");
            data
        } else {
            info!(config_file=%path, "Config file not found, using default embedded config");
            DEFAULT_CONFIG.as_bytes().to_vec()
        };

        let external_value: Value = serde_yaml::from_slice(&yaml_data)?;
        merge_yaml(&mut default_value, &external_value);
        let mut config_value = Self::lower_keys_value(default_value);

        Self::apply_env_overrides(&mut config_value);

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
        };

        config.save()?;
        Ok(config)
    }

    fn data(&self) -> MutexGuard<'_, Value> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the directory the configuration was loaded from
    pub fn directory(&self) -> &str {
        &self.config_dir
    }

    /// Saves the current configuration to the config.yaml file
    pub fn save(&self) -> Result<()> {
        let yaml = serde_yaml::to_string(&*self.data())?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Sets a configuration value at the specified path and saves it
    ///
    /// # Arguments
    ///
    /// * `path` - Array of keys representing the path (e.g., `&["host", "http_port"]`)
    /// * `value` - The YAML value to set
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        {
            let mut data = self.data();
            Self::set_value_internal(&mut data, path, value)?;
        }
        self.save()
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key_value = Value::String(path[0].to_lowercase());
            if path.len() == 1 {
                map.insert(key_value, value);
            } else {
                let entry = map
                    .entry(key_value)
                    .or_insert(Value::Mapping(Mapping::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not a map"))
        }
    }

    /// Gets a configuration value at the specified path
    ///
    /// # Arguments
    ///
    /// * `path` - Array of keys representing the path (e.g., `&["host", "http_port"]`)
    ///
    /// # Returns
    ///
    /// Returns a `Result` containing the YAML value or an error if the path doesn't exist
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data();
        Self::get_value_internal(&data, path)
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                let key = key.to_lowercase();

                if let Some(next) = map.get(Value::String(key)) {
                    current = next;
                } else {
                    return Err(anyhow!("Path {} does not exist", path[..=i].join(".")));
                }
            } else {
                return Err(anyhow!("Path {} is not a Config", path[..i].join(".")));
            }
        }
        Ok(current.clone())
    }

    fn apply_env_overrides(config: &mut Value) {
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                let key_path = stripped.split("__").collect::<Vec<_>>();
                let yaml_value = Self::convert_env_value(&value);
                let _ = Self::set_value_internal(config, &key_path, yaml_value);
            }
        }
    }

    fn convert_env_value(value: &str) -> Value {
        if let Ok(parsed) = serde_yaml::from_str::<Value>(value) {
            return parsed;
        }
        Value::String(value.to_string())
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    if let Value::String(s) = k {
                        new_map.insert(Value::String(s.to_lowercase()), Self::lower_keys_value(v));
                    } else {
                        new_map.insert(k, Self::lower_keys_value(v));
                    }
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    /// Gets the HTTP port of the device host from configuration
    ///
    /// Returns the configured HTTP port, or the default port (8080) if not configured or invalid.
    pub fn get_http_port(&self) -> u16 {
        match self.get_value(&["host", "http_port"]) {
            Ok(Value::Number(n)) => match n.as_u64().and_then(|p| u16::try_from(p).ok()) {
                Some(port) => port,
                None => {
                    tracing::warn!("Invalid HTTP port '{}', using default {}", n, DEFAULT_HTTP_PORT);
                    DEFAULT_HTTP_PORT
                }
            },
            Ok(Value::String(s)) => match s.parse::<u16>() {
                Ok(port) => port,
                Err(_) => {
                    tracing::warn!("Invalid HTTP port '{}', using default {}", s, DEFAULT_HTTP_PORT);
                    DEFAULT_HTTP_PORT
                }
            },
            Ok(_) => {
                tracing::warn!(
                    "HTTP port not a number or string, using default {}",
                    DEFAULT_HTTP_PORT
                );
                DEFAULT_HTTP_PORT
            }
            Err(err) => {
                tracing::warn!(
                    "Failed to get HTTP port: {}, using default {}",
                    err,
                    DEFAULT_HTTP_PORT
                );
                DEFAULT_HTTP_PORT
            }
        }
    }

    /// Sets the HTTP port of the device host
    pub fn set_http_port(&self, port: u16) -> Result<()> {
        self.set_value(&["host", "http_port"], Value::Number(Number::from(port)))
    }

    impl_string_config!(
        get_bind_address,
        set_bind_address,
        &["host", "bind_address"],
        DEFAULT_BIND_ADDRESS
    );

    impl_string_config!(
        get_description_path,
        set_description_path,
        &["upnp", "server", "description_path"],
        DEFAULT_DESCRIPTION_PATH
    );

    impl_string_config!(
        get_control_path,
        set_control_path,
        &["upnp", "server", "control_path"],
        DEFAULT_CONTROL_PATH
    );

    impl_string_config!(
        get_eventing_path,
        set_eventing_path,
        &["upnp", "server", "eventing_path"],
        DEFAULT_EVENTING_PATH
    );

    impl_usize_config!(
        get_cp_http_port,
        set_cp_http_port,
        &["upnp", "controlpoint", "http_port"],
        DEFAULT_CP_HTTP_PORT
    );

    impl_secs_config!(
        get_pending_request_timeout_secs,
        set_pending_request_timeout_secs,
        &["upnp", "controlpoint", "pending_request_timeout_secs"],
        DEFAULT_PENDING_REQUEST_TIMEOUT_SECS
    );

    impl_secs_config!(
        get_action_call_timeout_secs,
        set_action_call_timeout_secs,
        &["upnp", "controlpoint", "action_call_timeout_secs"],
        DEFAULT_ACTION_CALL_TIMEOUT_SECS
    );

    impl_secs_config!(
        get_event_subscription_secs,
        set_event_subscription_secs,
        &["upnp", "controlpoint", "event_subscription_secs"],
        DEFAULT_EVENT_SUBSCRIPTION_SECS
    );

    impl_secs_config!(
        get_subscription_renewal_gap_secs,
        set_subscription_renewal_gap_secs,
        &["upnp", "controlpoint", "subscription_renewal_gap_secs"],
        DEFAULT_SUBSCRIPTION_RENEWAL_GAP_SECS
    );

    /// Gets the UDN (Unique Device Name) for a device, generating one if it doesn't exist
    ///
    /// The returned value is the bare UUID, without the `uuid:` prefix.
    ///
    /// # Arguments
    ///
    /// * `devtype` - The device type (e.g., "mediaserver")
    /// * `name` - The device name
    pub fn get_device_udn(&self, devtype: &str, name: &str) -> Result<String> {
        let path = &["devices", devtype, name, "udn"];
        match self.get_value(path) {
            Ok(Value::String(udn)) => {
                let udn_str = udn.trim();
                Ok(udn_str.strip_prefix("uuid:").unwrap_or(udn_str).to_string())
            }
            _ => {
                let new_udn = Uuid::new_v4().to_string();
                self.set_value(path, Value::String(new_udn.clone()))?;
                Ok(new_udn)
            }
        }
    }

    /// Sets the UDN (Unique Device Name) for a device
    pub fn set_device_udn(&self, devtype: &str, name: &str, udn: String) -> Result<()> {
        let udn_str = udn.trim();
        let sanitized = udn_str.strip_prefix("uuid:").unwrap_or(udn_str).to_string();
        self.set_value(&["devices", devtype, name, "udn"], Value::String(sanitized))
    }

    impl_bool_config!(
        get_log_enable_console,
        set_log_enable_console,
        &["host", "logger", "enable_console"],
        DEFAULT_LOG_ENABLE_CONSOLE
    );

    /// Récupère le niveau de log minimum depuis la configuration
    pub fn get_log_min_level(&self) -> Result<String> {
        match self.get_value(&["host", "logger", "min_level"]) {
            Ok(Value::String(s)) => Ok(s),
            _ => Ok(DEFAULT_LOG_MIN_LEVEL.to_string()),
        }
    }

    /// Définit le niveau de log minimum dans la configuration
    pub fn set_log_min_level(&self, level: String) -> Result<()> {
        self.set_value(&["host", "logger", "min_level"], Value::String(level))
    }
}

/// Returns the global configuration instance
///
/// This function provides access to the singleton configuration instance,
/// which is lazily loaded on first access.
///
/// # Examples
///
/// ```no_run
/// use pmoconfig::get_config;
///
/// let config = get_config();
/// let port = config.get_http_port();
/// ```
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

/// Merges external YAML configuration into default configuration
///
/// - For mappings (objects), it merges keys from external into default
/// - For scalars and sequences, external values replace default values
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config() -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        (dir, config)
    }

    #[test]
    fn test_defaults_are_loaded() {
        let (_dir, config) = temp_config();

        assert_eq!(config.get_http_port(), 8080);
        assert_eq!(config.get_description_path(), "/upnphost/description");
        assert_eq!(config.get_control_path(), "/upnphost/control");
        assert_eq!(config.get_eventing_path(), "/upnphost/eventing");
        assert_eq!(config.get_action_call_timeout_secs().unwrap(), 30);
        assert_eq!(config.get_pending_request_timeout_secs().unwrap(), 30);
        assert_eq!(config.get_event_subscription_secs().unwrap(), 1800);
        assert_eq!(config.get_subscription_renewal_gap_secs().unwrap(), 30);
        assert_eq!(config.get_cp_http_port().unwrap(), 0);
    }

    #[test]
    fn test_set_value_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_str().unwrap();

        let config = Config::load_config(path).unwrap();
        config.set_http_port(9100).unwrap();
        config.set_action_call_timeout_secs(12).unwrap();

        let reloaded = Config::load_config(path).unwrap();
        assert_eq!(reloaded.get_http_port(), 9100);
        assert_eq!(reloaded.get_action_call_timeout_secs().unwrap(), 12);
    }

    #[test]
    fn test_device_udn_is_stable() {
        let (_dir, config) = temp_config();

        let first = config.get_device_udn("mediaserver", "test").unwrap();
        let second = config.get_device_udn("mediaserver", "test").unwrap();
        assert_eq!(first, second);
        assert!(Uuid::parse_str(&first).is_ok());

        config
            .set_device_udn("mediaserver", "test", "uuid:abc".to_string())
            .unwrap();
        assert_eq!(config.get_device_udn("mediaserver", "test").unwrap(), "abc");
    }

    #[test]
    fn test_get_value_missing_path() {
        let (_dir, config) = temp_config();
        assert!(config.get_value(&["nothing", "here"]).is_err());
    }

    #[test]
    fn test_merge_yaml_overrides_scalars() {
        let mut default: Value = serde_yaml::from_str("a:\n  b: 1\n  c: 2\n").unwrap();
        let external: Value = serde_yaml::from_str("a:\n  c: 3\n  d: 4\n").unwrap();
        merge_yaml(&mut default, &external);

        assert_eq!(Config::get_value_internal(&default, &["a", "b"]).unwrap(), Value::from(1));
        assert_eq!(Config::get_value_internal(&default, &["a", "c"]).unwrap(), Value::from(3));
        assert_eq!(Config::get_value_internal(&default, &["a", "d"]).unwrap(), Value::from(4));
    }
}
