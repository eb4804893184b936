// ── Runtime instance configuration ──
//
// These types describe *how* a consumer or provider instance behaves.
// They carry credential data and tuning, but never touch disk — the
// ommlink-config crate builds them from files and hands them in.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use ommlink_rdm::directory::Service;
use ommlink_rdm::login::{LoginRequest, ROLE_CONSUMER, ROLE_PROVIDER};
use ommlink_reactor::ConnectOptions;

/// Who pumps the event queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationModel {
    /// A background task owned by the instance pumps events.
    #[default]
    ApiDispatch,
    /// The caller pumps via `dispatch(timeout)`.
    UserDispatch,
}

/// Identity presented on the login stream.
#[derive(Debug, Clone)]
pub struct LoginIdentity {
    pub username: String,
    pub application_id: Option<String>,
    pub application_name: Option<String>,
    /// Host/net position string; peers use it for entitlement bookkeeping.
    pub position: Option<String>,
    pub password: Option<SecretString>,
}

impl Default for LoginIdentity {
    fn default() -> Self {
        Self {
            username: "user".to_owned(),
            application_id: Some("256".to_owned()),
            application_name: Some("ommlink".to_owned()),
            position: None,
            password: None,
        }
    }
}

impl LoginIdentity {
    pub(crate) fn to_login_request(&self, provider_role: bool) -> LoginRequest {
        LoginRequest {
            name: self.username.clone(),
            application_id: self.application_id.clone(),
            application_name: self.application_name.clone(),
            position: self.position.clone(),
            password: self
                .password
                .as_ref()
                .map(|p| p.expose_secret().to_owned()),
            role: if provider_role {
                ROLE_PROVIDER
            } else {
                ROLE_CONSUMER
            },
            ..LoginRequest::default()
        }
    }
}

/// Configuration for one consumer instance.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Instance name used in logs and error text.
    pub instance_name: String,
    /// Channels tried in order until one connects.
    pub channels: Vec<ConnectOptions>,
    pub login: LoginIdentity,
    pub operation_model: OperationModel,
    /// How long the initial login handshake may take.
    pub login_request_timeout: Duration,
    /// How long the initial directory exchange may take.
    pub directory_request_timeout: Duration,
    /// Requested directory filter mask for the instance's own directory
    /// stream.
    pub directory_filter: u32,
    /// Initial size of the per-instance object pools.
    pub pool_size: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            instance_name: "Consumer_1".to_owned(),
            channels: vec![ConnectOptions::default()],
            login: LoginIdentity::default(),
            operation_model: OperationModel::default(),
            login_request_timeout: Duration::from_secs(45),
            directory_request_timeout: Duration::from_secs(45),
            directory_filter: ommlink_rdm::directory::filter_flags::INFO
                | ommlink_rdm::directory::filter_flags::STATE
                | ommlink_rdm::directory::filter_flags::GROUP,
            pool_size: 16,
        }
    }
}

/// Who owns the provider's source directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdminControl {
    /// The instance builds and submits the directory from configuration.
    #[default]
    ApiControl,
    /// The application submits directory messages itself; the instance
    /// validates and caches them.
    UserControl,
}

/// Configuration for one non-interactive provider instance.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub instance_name: String,
    pub channel: ConnectOptions,
    pub login: LoginIdentity,
    pub operation_model: OperationModel,
    pub login_request_timeout: Duration,
    pub directory_admin_control: AdminControl,
    /// Services advertised under `ApiControl`; ignored otherwise.
    pub services: Vec<Service>,
    pub pool_size: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            instance_name: "Provider_1".to_owned(),
            channel: ConnectOptions::default(),
            login: LoginIdentity::default(),
            operation_model: OperationModel::default(),
            login_request_timeout: Duration::from_secs(45),
            directory_admin_control: AdminControl::default(),
            services: Vec::new(),
            pool_size: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_request_carries_identity() {
        let identity = LoginIdentity {
            username: "trader1".into(),
            position: Some("10.0.0.5/net".into()),
            password: Some(SecretString::from("hunter2".to_owned())),
            ..LoginIdentity::default()
        };

        let request = identity.to_login_request(false);
        assert_eq!(request.name, "trader1");
        assert_eq!(request.role, ROLE_CONSUMER);
        assert_eq!(request.password.as_deref(), Some("hunter2"));

        let provider = identity.to_login_request(true);
        assert_eq!(provider.role, ROLE_PROVIDER);
    }
}
