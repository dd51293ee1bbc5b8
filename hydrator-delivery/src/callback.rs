//! HTTP partial-update delivery to task callbacks

use hydrator_config::HttpConfig;
use hydrator_core::ChangeSet;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::errors::DeliveryError;

/// Statuses counted as a delivered update.
///
/// 410 Gone is accepted exactly like 204: the remote dropped the document
/// and the update is considered already handled. Inherited behavior,
/// intent unverified.
pub const ACCEPTED_STATUS: [StatusCode; 2] = [StatusCode::NO_CONTENT, StatusCode::GONE];

/// Client issuing partial updates (PATCH) to task callback endpoints.
#[derive(Debug, Clone)]
pub struct CallbackClient {
    client: Client,
    timeout: Duration,
}

impl CallbackClient {
    /// Build a client from the HTTP configuration.
    pub fn new(config: &HttpConfig) -> Result<Self, DeliveryError> {
        let mut builder = Client::builder()
            .use_rustls_tls()
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .user_agent(config.user_agent.clone());

        if !config.verify_ssl {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|e| DeliveryError::ClientConstruction(e.to_string()))?;

        Ok(Self {
            client,
            timeout: config.timeout,
        })
    }

    /// Send a change-set to the callback as a partial update.
    pub async fn deliver(&self, callback: &Url, changes: &ChangeSet) -> Result<(), DeliveryError> {
        debug!(%callback, "delivering change-set");

        let response = self
            .client
            .patch(callback.clone())
            .json(changes)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| DeliveryError::Network {
                url: callback.to_string(),
                error: e.to_string(),
            })?;

        let status = response.status();
        if is_accepted(status) {
            Ok(())
        } else {
            Err(DeliveryError::Rejected {
                url: callback.to_string(),
                status: status.as_u16(),
            })
        }
    }

    /// Best-effort notification that the task failed transiently.
    ///
    /// Failure of this call is logged and swallowed; the task outcome has
    /// already been decided.
    pub async fn report_failure(&self, callback: &Url, message: &str) {
        let body = ChangeSet::hydration_failure(message);
        if let Err(error) = self.deliver(callback, &body).await {
            warn!(%callback, %error, "failed to report task failure to callback");
        }
    }
}

fn is_accepted(status: StatusCode) -> bool {
    ACCEPTED_STATUS.contains(&status)
}
