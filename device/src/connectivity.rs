use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::DeviceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectivityState {
    pub fn is_connected(self) -> bool {
        self == ConnectivityState::Connected
    }
}

/// The single network association the device maintains.
#[async_trait]
pub trait Link: Send {
    /// Whether the association is currently up.
    async fn is_associated(&mut self) -> bool;

    /// Try to (re-)establish the association. May take arbitrarily long;
    /// the caller bounds it.
    async fn associate(&mut self) -> Result<(), DeviceError>;
}

/// Host link: the association is up when the collector accepts TCP connections.
pub struct TcpLink {
    addr: String,
    probe_timeout: Duration,
}

const ASSOCIATE_RETRY: Duration = Duration::from_millis(500);

impl TcpLink {
    pub fn new(addr: impl Into<String>, probe_timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            probe_timeout,
        }
    }

    /// `host:port` of a collector base URL, defaulting the port from the scheme.
    pub fn probe_addr_for(base_url: &str) -> Option<String> {
        let url = reqwest::Url::parse(base_url).ok()?;
        let host = url.host_str()?;
        let port = url.port_or_known_default()?;
        Some(format!("{host}:{port}"))
    }

    async fn probe(&self) -> bool {
        matches!(
            tokio::time::timeout(self.probe_timeout, TcpStream::connect(&self.addr)).await,
            Ok(Ok(_))
        )
    }
}

#[async_trait]
impl Link for TcpLink {
    async fn is_associated(&mut self) -> bool {
        self.probe().await
    }

    async fn associate(&mut self) -> Result<(), DeviceError> {
        loop {
            if self.probe().await {
                return Ok(());
            }
            debug!(addr = self.addr, "link probe failed, retrying");
            tokio::time::sleep(ASSOCIATE_RETRY).await;
        }
    }
}

/// Sole owner of [`ConnectivityState`].
///
/// Other components receive the state by value and never change it.
pub struct ConnectivityManager {
    link: Box<dyn Link>,
    state: ConnectivityState,
    check_interval: Duration,
    connect_timeout: Duration,
    last_check: Option<Duration>,
}

impl ConnectivityManager {
    pub fn new(link: Box<dyn Link>, check_interval: Duration, connect_timeout: Duration) -> Self {
        Self {
            link,
            state: ConnectivityState::Disconnected,
            check_interval,
            connect_timeout,
            last_check: None,
        }
    }

    pub fn current_state(&self) -> ConnectivityState {
        self.state
    }

    /// Re-check the link if `check_interval` has elapsed since the last check.
    /// `now` is time since boot.
    pub async fn maintain(&mut self, now: Duration) -> ConnectivityState {
        let due = match self.last_check {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.check_interval,
        };
        if due {
            self.check_at(now).await;
        }
        self.state
    }

    /// [`ensure_connected`](Self::ensure_connected), recorded as the check at
    /// `now` so the cadence counts from here.
    pub async fn check_at(&mut self, now: Duration) -> ConnectivityState {
        let state = self.ensure_connected().await;
        self.last_check = Some(now);
        state
    }

    /// Verify the association and, if it is down, reconnect for at most
    /// `connect_timeout`. Ends in `Connected` or `Disconnected`.
    pub async fn ensure_connected(&mut self) -> ConnectivityState {
        if self.state.is_connected() {
            if self.link.is_associated().await {
                return self.state;
            }
            warn!("network association lost");
            self.state = ConnectivityState::Disconnected;
        } else if self.link.is_associated().await {
            info!("network association up");
            self.state = ConnectivityState::Connected;
            return self.state;
        }

        self.state = ConnectivityState::Connecting;
        info!(timeout = ?self.connect_timeout, "reconnecting");

        self.state = match tokio::time::timeout(self.connect_timeout, self.link.associate()).await {
            Ok(Ok(())) => {
                info!("network connected");
                ConnectivityState::Connected
            }
            Ok(Err(e)) => {
                warn!(error = %e, "reconnect failed");
                ConnectivityState::Disconnected
            }
            Err(_) => {
                warn!(timeout = ?self.connect_timeout, "reconnect timed out");
                ConnectivityState::Disconnected
            }
        };
        self.state
    }
}
