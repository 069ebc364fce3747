//! Broker connection lifecycle
//!
//! One connection/channel pair is opened lazily and shared. When the broker
//! drops the connection, a supervisor task reconnects with exponential
//! backoff, re-declares the topology and re-runs every registered consumer
//! setup. If a backoff cycle runs out, consumers stay marked as stopped and
//! are restored by the next connection that succeeds, including one opened
//! lazily by the publisher. `shutdown` stops the supervisor and closes the
//! connection.

use async_trait::async_trait;
use futures::future::BoxFuture;
use lapin::options::{BasicQosOptions, ConfirmSelectOptions};
use lapin::{Channel, Connection, ConnectionProperties};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::amqp::AmqpChannel;
use super::topology::{self, PREFETCH_COUNT};
use super::{ChannelProvider, MessageChannel, QueueError};

/// Consumer setup re-run on every fresh channel
pub type Registration =
    Arc<dyn Fn(Channel) -> BoxFuture<'static, Result<(), QueueError>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Wait before the zero-based `attempt`: base doubled per attempt, capped
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }
}

struct Link {
    connection: Connection,
    channel: Channel,
}

pub struct ConnectionManager {
    uri: String,
    policy: ReconnectPolicy,
    link: tokio::sync::Mutex<Option<Link>>,
    registrations: Mutex<Vec<Registration>>,
    lost: Arc<Notify>,
    /// Registrations are not running on the current link
    consumers_stopped: Arc<AtomicBool>,
    shutting_down: AtomicBool,
}

impl ConnectionManager {
    pub fn new(uri: impl Into<String>, policy: ReconnectPolicy) -> Self {
        Self {
            uri: uri.into(),
            policy,
            link: tokio::sync::Mutex::new(None),
            registrations: Mutex::new(Vec::new()),
            lost: Arc::new(Notify::new()),
            consumers_stopped: Arc::new(AtomicBool::new(false)),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn consumers_stopped(&self) -> bool {
        self.consumers_stopped.load(Ordering::SeqCst)
    }

    pub fn registration_count(&self) -> usize {
        lock(&self.registrations).len()
    }

    pub async fn is_connected(&self) -> bool {
        self.link
            .lock()
            .await
            .as_ref()
            .is_some_and(|link| link.connection.status().connected() && link.channel.status().connected())
    }

    /// Shared channel, connecting first when there is no live one
    pub async fn acquire_channel(&self) -> Result<Channel, QueueError> {
        if self.is_shutting_down() {
            return Err(QueueError::ShutDown);
        }

        let mut link = self.link.lock().await;
        if let Some(current) = link.as_ref() {
            if current.connection.status().connected() && current.channel.status().connected() {
                return Ok(current.channel.clone());
            }
        }

        let fresh = self.establish().await?;
        let channel = fresh.channel.clone();
        *link = Some(fresh);
        if self.consumers_stopped() {
            self.lost.notify_one();
        }
        Ok(channel)
    }

    /// Add a consumer setup to run after each successful reconnect
    pub fn on_reconnect(&self, registration: Registration) {
        lock(&self.registrations).push(registration);
    }

    /// Ask the supervisor to bring the registered consumers up, reconnecting
    /// with backoff first when there is no live link
    pub fn request_resubscribe(&self) {
        self.consumers_stopped.store(true, Ordering::SeqCst);
        self.lost.notify_one();
    }

    pub fn spawn_supervisor(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.supervise().await })
    }

    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.lost.notify_one();

        let link = self.link.lock().await.take();
        if let Some(link) = link {
            if let Err(e) = link.connection.close(200, "shutdown").await {
                warn!(error = %e, "Error while closing broker connection");
            }
        }
        info!("Queue connection shut down");
    }

    async fn establish(&self) -> Result<Link, QueueError> {
        let connection = Connection::connect(&self.uri, ConnectionProperties::default()).await?;

        let lost = Arc::clone(&self.lost);
        let consumers_stopped = Arc::clone(&self.consumers_stopped);
        connection.on_error(move |err| {
            warn!(error = %err, "Broker connection lost");
            consumers_stopped.store(true, Ordering::SeqCst);
            lost.notify_one();
        });

        let channel = connection.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;
        channel
            .basic_qos(PREFETCH_COUNT, BasicQosOptions::default())
            .await?;
        topology::declare(&channel).await?;

        info!("Connected to broker");
        Ok(Link {
            connection,
            channel,
        })
    }

    async fn supervise(&self) {
        loop {
            self.lost.notified().await;
            if self.is_shutting_down() {
                break;
            }
            if !self.consumers_stopped() {
                continue;
            }

            let channel = if self.is_connected().await {
                self.acquire_channel().await
            } else {
                self.reconnect().await
            };
            match channel {
                Ok(channel) => self.resubscribe(channel).await,
                Err(QueueError::ShutDown) => break,
                Err(e) => error!(
                    error = %e,
                    "Broker unreachable, consumers resume on the next successful connect"
                ),
            }
        }
    }

    async fn reconnect(&self) -> Result<Channel, QueueError> {
        for attempt in 0..self.policy.max_attempts {
            let delay = self.policy.delay_for(attempt);
            warn!(
                attempt = attempt + 1,
                max_attempts = self.policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting to broker"
            );
            tokio::time::sleep(delay).await;

            match self.acquire_channel().await {
                Ok(channel) => return Ok(channel),
                Err(QueueError::ShutDown) => return Err(QueueError::ShutDown),
                Err(e) => warn!(attempt = attempt + 1, error = %e, "Reconnect attempt failed"),
            }
        }

        Err(QueueError::ReconnectExhausted(self.policy.max_attempts))
    }

    async fn resubscribe(&self, channel: Channel) {
        self.consumers_stopped.store(false, Ordering::SeqCst);
        let registrations: Vec<Registration> = lock(&self.registrations).clone();
        let mut restored = true;
        for registration in registrations {
            if let Err(e) = registration(channel.clone()).await {
                error!(error = %e, "Failed to restore consumer after reconnect");
                restored = false;
            }
        }

        if restored {
            info!("Consumers restored after reconnect");
        } else {
            self.consumers_stopped.store(true, Ordering::SeqCst);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ChannelProvider for ConnectionManager {
    async fn channel(&self) -> Result<Arc<dyn MessageChannel>, QueueError> {
        let channel = self.acquire_channel().await?;
        Ok(Arc::new(AmqpChannel::new(channel)))
    }
}
