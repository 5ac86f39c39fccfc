//! Sandbox connection with bounded exponential backoff.
//!
//! [`SandboxConnector::ensure`] reconnects a session's sandbox, or silently
//! provisions a replacement when the old one is gone, then waits for the
//! desktop stream to come up. Every provisioning call has a timeout and the
//! whole sequence gives up after a fixed number of attempts.

use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::BackoffConfig;
use crate::error::ProvisionError;
use crate::model::SandboxId;
use crate::notify::{Notification, Notifier};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxHandle {
    pub id: SandboxId,
}

/// Parameters for provisioning a new sandbox.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOptions {
    pub template: Option<String>,
    pub resolution: Option<(u32, u32)>,
    /// Idle lifetime requested from the provider
    pub lifetime_secs: Option<u64>,
}

/// The remote sandbox provisioning service.
pub trait Provisioner: Send + Sync {
    /// Attach to an existing sandbox. `ProvisionError::NotFound` means it no
    /// longer exists.
    fn connect(&self, id: &SandboxId) -> impl Future<Output = Result<SandboxHandle, ProvisionError>> + Send;

    fn create(&self, options: &CreateOptions) -> impl Future<Output = Result<SandboxHandle, ProvisionError>> + Send;

    /// Desktop stream URL. `ProvisionError::NotRunning` while it boots.
    fn stream_url(&self, handle: &SandboxHandle) -> impl Future<Output = Result<String, ProvisionError>> + Send;
}

/// A live sandbox ready to be shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxBinding {
    pub handle: SandboxHandle,
    pub stream_url: String,
    /// The requested sandbox was gone and this one replaced it
    pub recovered: bool,
}

pub struct SandboxConnector<P> {
    provisioner: P,
    backoff: BackoffConfig,
    options: CreateOptions,
    notifier: Notifier,
}

/// Progress carried across attempts so a handle obtained once is not
/// provisioned again.
#[derive(Default)]
struct Attempt {
    handle: Option<SandboxHandle>,
    recovered: bool,
}

impl<P: Provisioner> SandboxConnector<P> {
    pub fn new(provisioner: P, backoff: BackoffConfig, notifier: Notifier) -> Self {
        Self {
            provisioner,
            backoff,
            options: CreateOptions::default(),
            notifier,
        }
    }

    pub fn with_options(mut self, options: CreateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn provisioner(&self) -> &P {
        &self.provisioner
    }

    /// Connect to `existing` (or create a sandbox when there is none) and
    /// resolve its stream URL.
    ///
    /// # Errors
    /// The last provisioning error once `max_attempts` attempts have failed.
    /// A `SandboxError` notification is emitted at the same time.
    pub async fn ensure(&self, existing: Option<&SandboxId>) -> Result<SandboxBinding, ProvisionError> {
        let mut progress = Attempt::default();
        let mut last_error = ProvisionError::Other("no connection attempts configured".to_string());

        for attempt in 0..self.backoff.max_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.backoff.delay_for(attempt - 1)).await;
            }

            match self.try_connect(existing, &mut progress).await {
                Ok(binding) => {
                    if binding.recovered {
                        self.notifier.emit(Notification::SandboxRecovered {
                            sandbox_id: binding.handle.id.clone(),
                        });
                    }
                    info!(sandbox_id = %binding.handle.id, attempt = attempt + 1, "sandbox ready");
                    return Ok(binding);
                }
                Err(e) => {
                    warn!(attempt = attempt + 1, max = self.backoff.max_attempts, error = %e, "sandbox connect failed");
                    last_error = e;
                }
            }
        }

        error!(error = %last_error, "giving up on sandbox");
        self.notifier.emit(Notification::SandboxError {
            message: last_error.to_string(),
        });
        Err(last_error)
    }

    async fn try_connect(
        &self,
        existing: Option<&SandboxId>,
        progress: &mut Attempt,
    ) -> Result<SandboxBinding, ProvisionError> {
        let handle = match progress.handle.clone() {
            Some(handle) => handle,
            None => {
                let handle = match existing {
                    Some(id) => match self.timed(self.provisioner.connect(id)).await {
                        Ok(handle) => handle,
                        Err(ProvisionError::NotFound(_)) => {
                            info!(sandbox_id = %id, "sandbox gone; provisioning a replacement");
                            let handle = self.timed(self.provisioner.create(&self.options)).await?;
                            progress.recovered = true;
                            handle
                        }
                        Err(e) => return Err(e),
                    },
                    None => self.timed(self.provisioner.create(&self.options)).await?,
                };
                progress.handle = Some(handle.clone());
                handle
            }
        };

        let stream_url = self.timed(self.provisioner.stream_url(&handle)).await?;
        Ok(SandboxBinding {
            handle,
            stream_url,
            recovered: progress.recovered,
        })
    }

    async fn timed<T>(&self, call: impl Future<Output = Result<T, ProvisionError>>) -> Result<T, ProvisionError> {
        tokio::time::timeout(self.backoff.op_timeout(), call)
            .await
            .map_err(|_| ProvisionError::Timeout)?
    }
}
