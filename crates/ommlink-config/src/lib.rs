//! Configuration profiles for ommlink instances.
//!
//! TOML profiles with global defaults, environment overrides
//! (`OMMLINK_*`), credential resolution, and translation to the access
//! layer's runtime config types. The access crate never reads files; this
//! crate builds `ConsumerConfig`/`ProviderConfig` values and hands them
//! over.
//!
//! ```toml
//! default_profile = "prod"
//!
//! [defaults]
//! operation_model = "api"
//! pool_size = 32
//!
//! [profiles.prod.login]
//! username = "trader1"
//! application_id = "256"
//!
//! [[profiles.prod.channels]]
//! name = "Primary"
//! endpoint = "omm://feed-a.example.com:14002"
//!
//! [[profiles.prod.services]]
//! id = 10
//! name = "DIRECT_FEED"
//! capabilities = [6, 7]
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use ommlink_access::{
    AdminControl, ConsumerConfig, LoginIdentity, OperationModel, ProviderConfig,
};
use ommlink_rdm::Qos;
use ommlink_rdm::directory::{
    Service, ServiceInfo, ServiceLoad, ServiceState, filter_flags,
};
use ommlink_reactor::ConnectOptions;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown profile '{0}'")]
    UnknownProfile(String),

    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when the caller names none.
    pub default_profile: Option<String>,

    /// Global defaults a profile may override.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named instance profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    /// "api" or "user".
    #[serde(default = "default_operation_model")]
    pub operation_model: String,

    #[serde(default = "default_request_timeout")]
    pub login_request_timeout_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub directory_request_timeout_secs: u64,

    /// Initial size of the per-instance object pools.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Filters the instance's own directory stream requests.
    #[serde(default = "default_directory_filter")]
    pub directory_filter: Vec<String>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            operation_model: default_operation_model(),
            login_request_timeout_secs: default_request_timeout(),
            directory_request_timeout_secs: default_request_timeout(),
            pool_size: default_pool_size(),
            directory_filter: default_directory_filter(),
        }
    }
}

fn default_operation_model() -> String {
    "api".into()
}
fn default_request_timeout() -> u64 {
    45
}
fn default_pool_size() -> usize {
    16
}
fn default_directory_filter() -> Vec<String> {
    vec!["info".into(), "state".into(), "group".into()]
}

/// A named instance profile. Unset fields fall back to [`Defaults`].
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Profile {
    #[serde(default)]
    pub login: LoginSection,

    /// Channels tried in order by a consumer; a provider uses the first.
    #[serde(default)]
    pub channels: Vec<ChannelSection>,

    /// Services a provider advertises under ApiControl.
    #[serde(default)]
    pub services: Vec<ServiceSection>,

    pub operation_model: Option<String>,
    pub login_request_timeout_secs: Option<u64>,
    pub directory_request_timeout_secs: Option<u64>,
    pub pool_size: Option<usize>,
    pub directory_filter: Option<Vec<String>>,

    /// "api" or "user"; provider instances only.
    pub directory_admin_control: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoginSection {
    #[serde(default = "default_username")]
    pub username: String,

    pub application_id: Option<String>,
    pub application_name: Option<String>,

    /// Host/net position; peers use it for entitlement bookkeeping.
    pub position: Option<String>,

    /// Plaintext password — prefer `password_env`.
    pub password: Option<String>,

    /// Environment variable holding the password.
    pub password_env: Option<String>,
}

impl Default for LoginSection {
    fn default() -> Self {
        Self {
            username: default_username(),
            application_id: None,
            application_name: None,
            position: None,
            password: None,
            password_env: None,
        }
    }
}

fn default_username() -> String {
    "user".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChannelSection {
    /// Display name; generated from the list position when unset.
    pub name: Option<String>,

    /// Endpoint URL (e.g. "omm://feed.example.com:14002").
    pub endpoint: String,

    pub interface: Option<String>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_secs: u64,

    #[serde(default = "default_output_buffers")]
    pub guaranteed_output_buffers: u32,

    pub high_water_mark: Option<u64>,
    pub compression_threshold: Option<u64>,
    pub component_version: Option<String>,
}

fn default_connect_timeout() -> u64 {
    5
}
fn default_ping_timeout() -> u64 {
    30
}
fn default_output_buffers() -> u32 {
    100
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceSection {
    /// Explicit service id; generated above the highest explicit id when
    /// unset.
    pub id: Option<u16>,

    pub name: String,
    pub vendor: Option<String>,

    #[serde(default)]
    pub is_source: bool,

    /// Domain ids this service serves.
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<u8>,

    #[serde(default)]
    pub dictionaries_provided: Vec<String>,

    #[serde(default)]
    pub dictionaries_used: Vec<String>,

    #[serde(default = "default_true")]
    pub service_up: bool,

    #[serde(default = "default_true")]
    pub accepting_requests: bool,

    pub open_limit: Option<u64>,
    pub open_window: Option<u64>,
    pub load_factor: Option<u64>,
}

fn default_capabilities() -> Vec<u8> {
    vec![ommlink_rdm::DomainType::MarketPrice.code()]
}
fn default_true() -> bool {
    true
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "ommlink", "ommlink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("ommlink");
    p
}

// ── Loading and saving ──────────────────────────────────────────────

/// Load the full [`Config`] from the canonical path plus environment
/// overrides (`OMMLINK_` prefix, `__` separating nesting levels).
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the full [`Config`] from an explicit path. A missing file yields
/// the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("OMMLINK_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Serialize the config to TOML at the canonical path.
pub fn save_config(config: &Config) -> Result<(), ConfigError> {
    let path = config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(config)?;
    std::fs::write(&path, toml_str)?;
    Ok(())
}

// ── Translation to runtime configs ──────────────────────────────────

/// Build a [`ConsumerConfig`] from a profile. `profile` falls back to the
/// configured `default_profile`, then to "default".
pub fn consumer_config(
    config: &Config,
    profile: Option<&str>,
) -> Result<ConsumerConfig, ConfigError> {
    let (name, profile) = select_profile(config, profile)?;

    let channels = build_channels(profile)?;
    if channels.is_empty() {
        return Err(ConfigError::Validation {
            field: "channels".into(),
            reason: format!("profile '{name}' defines no channels"),
        });
    }

    Ok(ConsumerConfig {
        instance_name: format!("Consumer_{name}"),
        channels,
        login: build_login(&profile.login),
        operation_model: parse_operation_model(
            profile
                .operation_model
                .as_deref()
                .unwrap_or(&config.defaults.operation_model),
        )?,
        login_request_timeout: Duration::from_secs(
            profile
                .login_request_timeout_secs
                .unwrap_or(config.defaults.login_request_timeout_secs),
        ),
        directory_request_timeout: Duration::from_secs(
            profile
                .directory_request_timeout_secs
                .unwrap_or(config.defaults.directory_request_timeout_secs),
        ),
        directory_filter: parse_filter(
            profile
                .directory_filter
                .as_deref()
                .unwrap_or(&config.defaults.directory_filter),
        )?,
        pool_size: profile.pool_size.unwrap_or(config.defaults.pool_size),
    })
}

/// Build a [`ProviderConfig`] from a profile. The provider connects the
/// profile's first channel and advertises its `services` under
/// ApiControl.
pub fn provider_config(
    config: &Config,
    profile: Option<&str>,
) -> Result<ProviderConfig, ConfigError> {
    let (name, profile) = select_profile(config, profile)?;

    let mut channels = build_channels(profile)?;
    if channels.is_empty() {
        return Err(ConfigError::Validation {
            field: "channels".into(),
            reason: format!("profile '{name}' defines no channels"),
        });
    }

    Ok(ProviderConfig {
        instance_name: format!("Provider_{name}"),
        channel: channels.remove(0),
        login: build_login(&profile.login),
        operation_model: parse_operation_model(
            profile
                .operation_model
                .as_deref()
                .unwrap_or(&config.defaults.operation_model),
        )?,
        login_request_timeout: Duration::from_secs(
            profile
                .login_request_timeout_secs
                .unwrap_or(config.defaults.login_request_timeout_secs),
        ),
        directory_admin_control: parse_admin_control(
            profile.directory_admin_control.as_deref().unwrap_or("api"),
        )?,
        services: build_services(&profile.services),
        pool_size: profile.pool_size.unwrap_or(config.defaults.pool_size),
    })
}

fn select_profile<'a>(
    config: &'a Config,
    profile: Option<&str>,
) -> Result<(String, &'a Profile), ConfigError> {
    let name = profile
        .map(str::to_owned)
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into());
    match config.profiles.get(&name) {
        Some(profile) => Ok((name, profile)),
        None => Err(ConfigError::UnknownProfile(name)),
    }
}

fn build_channels(profile: &Profile) -> Result<Vec<ConnectOptions>, ConfigError> {
    profile
        .channels
        .iter()
        .enumerate()
        .map(|(index, section)| section.to_connect_options(index))
        .collect()
}

impl ChannelSection {
    fn to_connect_options(&self, index: usize) -> Result<ConnectOptions, ConfigError> {
        let endpoint: Url = self.endpoint.parse().map_err(|_| ConfigError::Validation {
            field: "endpoint".into(),
            reason: format!("invalid URL: {}", self.endpoint),
        })?;

        Ok(ConnectOptions {
            name: self
                .name
                .clone()
                .unwrap_or_else(|| format!("Channel_{}", index + 1)),
            endpoint,
            interface: self.interface.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            ping_timeout: Duration::from_secs(self.ping_timeout_secs),
            guaranteed_output_buffers: self.guaranteed_output_buffers,
            high_water_mark: self.high_water_mark,
            compression_threshold: self.compression_threshold,
            component_version: self.component_version.clone(),
        })
    }
}

fn build_login(section: &LoginSection) -> LoginIdentity {
    let env_value = section
        .password_env
        .as_deref()
        .and_then(|name| std::env::var(name).ok());
    LoginIdentity {
        username: section.username.clone(),
        application_id: section.application_id.clone(),
        application_name: section.application_name.clone(),
        position: section.position.clone(),
        password: resolve_password(env_value, section.password.as_deref()),
    }
}

/// Credential chain: environment first, plaintext config second.
fn resolve_password(env_value: Option<String>, plaintext: Option<&str>) -> Option<SecretString> {
    env_value
        .map(SecretString::from)
        .or_else(|| plaintext.map(|p| SecretString::from(p.to_owned())))
}

fn parse_operation_model(value: &str) -> Result<OperationModel, ConfigError> {
    match value {
        "api" => Ok(OperationModel::ApiDispatch),
        "user" => Ok(OperationModel::UserDispatch),
        other => Err(ConfigError::Validation {
            field: "operation_model".into(),
            reason: format!("expected 'api' or 'user', got '{other}'"),
        }),
    }
}

fn parse_admin_control(value: &str) -> Result<AdminControl, ConfigError> {
    match value {
        "api" => Ok(AdminControl::ApiControl),
        "user" => Ok(AdminControl::UserControl),
        other => Err(ConfigError::Validation {
            field: "directory_admin_control".into(),
            reason: format!("expected 'api' or 'user', got '{other}'"),
        }),
    }
}

fn parse_filter(names: &[String]) -> Result<u32, ConfigError> {
    let mut mask = 0;
    for name in names {
        mask |= match name.as_str() {
            "info" => filter_flags::INFO,
            "state" => filter_flags::STATE,
            "group" => filter_flags::GROUP,
            "load" => filter_flags::LOAD,
            "data" => filter_flags::DATA,
            "link" => filter_flags::LINK,
            "all" => filter_flags::ALL,
            other => {
                return Err(ConfigError::Validation {
                    field: "directory_filter".into(),
                    reason: format!(
                        "expected one of info/state/group/load/data/link/all, got '{other}'"
                    ),
                });
            }
        };
    }
    Ok(mask)
}

/// Build the advertised service list. Explicit ids are kept; generated
/// ids start above the highest explicit id so a later edit that pins an
/// id cannot collide with a generated one.
fn build_services(sections: &[ServiceSection]) -> Vec<Service> {
    let mut next_id = sections
        .iter()
        .filter_map(|section| section.id)
        .max()
        .unwrap_or(0);

    sections
        .iter()
        .map(|section| {
            let id = section.id.unwrap_or_else(|| {
                next_id += 1;
                next_id
            });
            section.to_service(id)
        })
        .collect()
}

impl ServiceSection {
    fn to_service(&self, service_id: u16) -> Service {
        let load = (self.open_limit.is_some()
            || self.open_window.is_some()
            || self.load_factor.is_some())
        .then(|| ServiceLoad {
            open_limit: self.open_limit,
            open_window: self.open_window,
            load_factor: self.load_factor,
            ..ServiceLoad::default()
        });

        Service {
            service_id,
            info: Some(ServiceInfo {
                service_name: self.name.clone(),
                vendor: self.vendor.clone(),
                is_source: Some(self.is_source),
                capabilities: self.capabilities.clone(),
                dictionaries_provided: self.dictionaries_provided.clone(),
                dictionaries_used: self.dictionaries_used.clone(),
                qos: vec![Qos::realtime_tick_by_tick()],
                ..ServiceInfo::default()
            }),
            state: Some(ServiceState {
                service_up: self.service_up,
                accepting_requests: Some(self.accepting_requests),
                ..ServiceState::default()
            }),
            load,
            ..Service::default()
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;
    use std::io::Write;

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    const SAMPLE: &str = r#"
default_profile = "prod"

[defaults]
operation_model = "api"
pool_size = 32

[profiles.prod]
directory_filter = ["info", "state", "load"]

[profiles.prod.login]
username = "trader1"
application_id = "256"
password = "plaintext-pw"

[[profiles.prod.channels]]
name = "Primary"
endpoint = "omm://feed-a.example.com:14002"
high_water_mark = 4096

[[profiles.prod.channels]]
endpoint = "omm://feed-b.example.com:14002"

[profiles.nip]
operation_model = "user"
directory_admin_control = "api"

[[profiles.nip.channels]]
endpoint = "omm://adh.example.com:14003"

[[profiles.nip.services]]
id = 10
name = "NI_PUB"
capabilities = [6, 7]
open_limit = 1000

[[profiles.nip.services]]
name = "NI_AUX"
service_up = false
"#;

    #[test]
    fn consumer_profile_translates() {
        let (_dir, path) = write_config(SAMPLE);
        let config = load_config_from(&path).unwrap();

        let consumer = consumer_config(&config, None).unwrap();
        assert_eq!(consumer.instance_name, "Consumer_prod");
        assert_eq!(consumer.channels.len(), 2);
        assert_eq!(consumer.channels[0].name, "Primary");
        assert_eq!(consumer.channels[0].high_water_mark, Some(4096));
        // Unnamed channels are named by position.
        assert_eq!(consumer.channels[1].name, "Channel_2");
        assert_eq!(consumer.channels[1].endpoint.host_str(), Some("feed-b.example.com"));

        assert_eq!(consumer.login.username, "trader1");
        assert_eq!(
            consumer
                .login
                .password
                .as_ref()
                .map(|p| p.expose_secret().to_owned()),
            Some("plaintext-pw".to_owned())
        );

        assert_eq!(consumer.operation_model, OperationModel::ApiDispatch);
        assert_eq!(consumer.pool_size, 32);
        assert_eq!(
            consumer.directory_filter,
            filter_flags::INFO | filter_flags::STATE | filter_flags::LOAD
        );
    }

    #[test]
    fn provider_profile_translates() {
        let (_dir, path) = write_config(SAMPLE);
        let config = load_config_from(&path).unwrap();

        let provider = provider_config(&config, Some("nip")).unwrap();
        assert_eq!(provider.instance_name, "Provider_nip");
        assert_eq!(provider.channel.endpoint.host_str(), Some("adh.example.com"));
        assert_eq!(provider.operation_model, OperationModel::UserDispatch);
        assert_eq!(provider.directory_admin_control, AdminControl::ApiControl);

        assert_eq!(provider.services.len(), 2);
        let pub_service = &provider.services[0];
        assert_eq!(pub_service.service_id, 10);
        assert_eq!(pub_service.name(), Some("NI_PUB"));
        let info = pub_service.info.as_ref().unwrap();
        assert_eq!(info.capabilities, vec![6, 7]);
        assert_eq!(pub_service.load.unwrap().open_limit, Some(1000));

        // The id-less service lands above the highest explicit id.
        let aux = &provider.services[1];
        assert_eq!(aux.service_id, 11);
        assert!(!aux.state.as_ref().unwrap().service_up);
        assert!(aux.load.is_none());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.default_profile.as_deref(), Some("default"));
        assert!(config.profiles.is_empty());
        assert_eq!(config.defaults.pool_size, 16);
    }

    #[test]
    fn unknown_profile_is_reported() {
        let (_dir, path) = write_config(SAMPLE);
        let config = load_config_from(&path).unwrap();
        let err = consumer_config(&config, Some("staging")).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProfile(name) if name == "staging"));
    }

    #[test]
    fn profile_without_channels_is_rejected() {
        let (_dir, path) = write_config("[profiles.empty]\n");
        let config = load_config_from(&path).unwrap();
        let err = consumer_config(&config, Some("empty")).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { field, .. } if field == "channels"));
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        let toml = r#"
[[profiles.bad.channels]]
endpoint = "not a url"
"#;
        let (_dir, path) = write_config(toml);
        let config = load_config_from(&path).unwrap();
        let err = consumer_config(&config, Some("bad")).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { field, .. } if field == "endpoint"));
    }

    #[test]
    fn invalid_operation_model_is_rejected() {
        let toml = r#"
[profiles.bad]
operation_model = "background"

[[profiles.bad.channels]]
endpoint = "omm://host:14002"
"#;
        let (_dir, path) = write_config(toml);
        let config = load_config_from(&path).unwrap();
        let err = consumer_config(&config, Some("bad")).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { field, .. } if field == "operation_model"));
    }

    #[test]
    fn invalid_filter_name_is_rejected() {
        assert!(matches!(
            parse_filter(&["info".into(), "everything".into()]),
            Err(ConfigError::Validation { field, .. }) if field == "directory_filter"
        ));
        assert_eq!(parse_filter(&["all".into()]).unwrap(), filter_flags::ALL);
    }

    #[test]
    fn password_chain_prefers_environment() {
        let resolved = resolve_password(Some("from-env".into()), Some("from-file"));
        assert_eq!(resolved.unwrap().expose_secret(), "from-env");

        let resolved = resolve_password(None, Some("from-file"));
        assert_eq!(resolved.unwrap().expose_secret(), "from-file");

        assert!(resolve_password(None, None).is_none());
    }

    #[test]
    fn generated_ids_never_collide_with_explicit_ones() {
        let sections = vec![
            ServiceSection {
                id: None,
                ..section("A")
            },
            ServiceSection {
                id: Some(5),
                ..section("B")
            },
            ServiceSection {
                id: None,
                ..section("C")
            },
        ];
        let services = build_services(&sections);
        let ids: Vec<u16> = services.iter().map(|s| s.service_id).collect();
        assert_eq!(ids, vec![6, 5, 7]);
    }

    fn section(name: &str) -> ServiceSection {
        ServiceSection {
            id: None,
            name: name.to_owned(),
            vendor: None,
            is_source: false,
            capabilities: default_capabilities(),
            dictionaries_provided: Vec::new(),
            dictionaries_used: Vec::new(),
            service_up: true,
            accepting_requests: true,
            open_limit: None,
            open_window: None,
            load_factor: None,
        }
    }
}
