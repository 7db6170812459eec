use thiserror::Error;
use tracing::{error, info};

use super::{CheckedEndpoint, DispatchError, Orchestrator};
use crate::database::models::{Endpoint, EndpointChanges, NewEndpoint};
use crate::monitoring::validation::{validate_check_interval, validate_hostname, validate_timeout};

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("Invalid domain: {0}")]
    Invalid(String),

    #[error("Domain {hostname} is already registered")]
    Duplicate { hostname: String },

    #[error("Domain with ID {0} not found")]
    NotFound(i64),

    #[error("Storage failure: {0:#}")]
    Storage(anyhow::Error),
}

/// A freshly registered endpoint and its first probe, if one ran
#[derive(Debug)]
pub struct Registered {
    pub endpoint: Endpoint,
    pub first_check: Option<CheckedEndpoint>,
}

fn validate(hostname: &str, interval_seconds: u64, timeout_seconds: u64) -> Result<(), EndpointError> {
    validate_hostname(hostname)
        .and_then(|_| validate_check_interval(interval_seconds))
        .and_then(|_| validate_timeout(timeout_seconds))
        .map_err(|e| EndpointError::Invalid(e.to_string()))
}

impl Orchestrator {
    /// Validate and store a new endpoint, then probe it once if active
    pub async fn register_endpoint(&self, mut new: NewEndpoint) -> Result<Registered, EndpointError> {
        new.hostname = new.hostname.trim().to_string();
        validate(&new.hostname, new.interval_seconds, new.timeout_seconds)?;

        let existing = self
            .endpoints
            .find_endpoint(&new.hostname, new.owner_id)
            .await
            .map_err(EndpointError::Storage)?;
        if existing.is_some() {
            return Err(EndpointError::Duplicate { hostname: new.hostname });
        }

        let endpoint = self.endpoints.create_endpoint(&new).await.map_err(EndpointError::Storage)?;
        info!(endpoint_id = endpoint.id, "Registered domain {}", endpoint.hostname);

        if !endpoint.is_active {
            return Ok(Registered { endpoint, first_check: None });
        }

        let first_check = match self.pipeline.run(&endpoint).await {
            Ok(checked) => Some(checked),
            Err(e) => {
                error!(endpoint_id = endpoint.id, "Initial check failed: {e}");
                None
            }
        };

        Ok(Registered { endpoint, first_check })
    }

    /// Apply `changes` to an endpoint. Owner and activity are left alone.
    pub async fn update_endpoint(&self, endpoint_id: i64, changes: &EndpointChanges) -> Result<Endpoint, EndpointError> {
        let current = self
            .endpoints
            .get_endpoint(endpoint_id)
            .await
            .map_err(EndpointError::Storage)?
            .ok_or(EndpointError::NotFound(endpoint_id))?;
        if changes.is_empty() {
            return Ok(current);
        }

        let edited = changes.apply_to(&current);
        validate(&edited.hostname, edited.interval_seconds, edited.timeout_seconds)?;

        let clash = self
            .endpoints
            .find_endpoint(&edited.hostname, edited.owner_id)
            .await
            .map_err(EndpointError::Storage)?;
        if clash.is_some_and(|other| other.id != endpoint_id) {
            return Err(EndpointError::Duplicate { hostname: edited.hostname });
        }

        let updated = self
            .endpoints
            .update_endpoint(&edited)
            .await
            .map_err(EndpointError::Storage)?
            .ok_or(EndpointError::NotFound(endpoint_id))?;
        info!(endpoint_id, "Updated domain {}", updated.hostname);
        Ok(updated)
    }

    /// Activate or deactivate an endpoint
    pub async fn set_active(&self, endpoint_id: i64, is_active: bool) -> Result<(), EndpointError> {
        let updated = self
            .endpoints
            .set_active(endpoint_id, is_active)
            .await
            .map_err(EndpointError::Storage)?;
        if !updated {
            return Err(EndpointError::NotFound(endpoint_id));
        }
        info!(endpoint_id, is_active, "Domain status changed");
        Ok(())
    }

    /// Flip `is_active` and return the new value
    pub async fn toggle_endpoint(&self, endpoint_id: i64) -> Result<bool, EndpointError> {
        let endpoint = self.load(endpoint_id).await.map_err(|e| match e {
            DispatchError::EndpointNotFound(id) => EndpointError::NotFound(id),
            DispatchError::Repository(e) | DispatchError::History(e) => EndpointError::Storage(e),
            other => EndpointError::Storage(anyhow::anyhow!(other.to_string())),
        })?;
        let is_active = !endpoint.is_active;
        self.set_active(endpoint_id, is_active).await?;
        Ok(is_active)
    }

    /// Delete an endpoint together with its check history
    pub async fn remove_endpoint(&self, endpoint_id: i64) -> Result<(), EndpointError> {
        let deleted = self
            .endpoints
            .delete_endpoint(endpoint_id)
            .await
            .map_err(EndpointError::Storage)?;
        if !deleted {
            return Err(EndpointError::NotFound(endpoint_id));
        }
        info!(endpoint_id, "Domain deleted");
        Ok(())
    }
}
