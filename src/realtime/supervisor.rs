use std::time::Duration;

use secrecy::SecretString;
use tokio::time::sleep;

use super::client::Client;
use crate::Result;

const DEFAULT_CONNECT_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Configuration for [`Supervisor`].
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Connection attempts made by [`Supervisor::start`]. At least one attempt is
    /// always made.
    pub connect_retries: u32,
    /// Pause between failed attempts
    pub retry_delay: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            connect_retries: DEFAULT_CONNECT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Application lifecycle signals the supervisor reacts to.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The application came to the foreground
    Visible,
    /// The application went to the background
    Hidden,
    /// Network connectivity was restored
    Online,
    /// Network connectivity was lost
    Offline,
}

/// Keeps a [`Client`] connected across application lifecycle changes.
///
/// The client's own reconnection only covers the loss of an open connection.
/// The supervisor adds a bounded retry around the initial connect and reopens
/// the connection when the application becomes visible or comes back online.
pub struct Supervisor {
    client: Client,
    credential: SecretString,
    config: SupervisorConfig,
}

impl Supervisor {
    #[must_use]
    pub fn new(client: Client, credential: SecretString, config: SupervisorConfig) -> Self {
        Self {
            client,
            credential,
            config,
        }
    }

    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Connect, retrying up to `connect_retries` times.
    ///
    /// # Errors
    ///
    /// The error of the last attempt if none succeeded.
    pub async fn start(&self) -> Result<()> {
        let attempts = self.config.connect_retries.max(1);
        let mut attempt = 1;

        loop {
            match self.client.connect(&self.credential).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= attempts => return Err(e),
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        error = %e,
                        attempt,
                        delay = ?self.config.retry_delay,
                        "Connection attempt failed, retrying"
                    );
                    #[cfg(not(feature = "tracing"))]
                    let _ = &e;
                }
            }

            attempt += 1;
            sleep(self.config.retry_delay).await;
        }
    }

    /// React to a lifecycle change.
    ///
    /// # Errors
    ///
    /// Only when a reconnect triggered by `Visible` or `Online` fails.
    pub async fn handle(&self, event: LifecycleEvent) -> Result<()> {
        #[cfg(feature = "tracing")]
        tracing::debug!(?event, "Lifecycle event");

        match event {
            LifecycleEvent::Visible | LifecycleEvent::Online => {
                if self.is_connected() {
                    return Ok(());
                }
                self.start().await
            }
            LifecycleEvent::Offline => {
                self.stop();
                Ok(())
            }
            LifecycleEvent::Hidden => Ok(()),
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.client.state().is_connected()
    }

    pub fn stop(&self) {
        self.client.disconnect();
    }
}
