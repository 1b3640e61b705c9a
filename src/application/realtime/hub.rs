use std::collections::HashMap;
use std::fmt;

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::domain::DeviceId;

use super::OutboundFrame;

pub const DEFAULT_HUB_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the registry keeps for a live connection: enough to close it.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub connection_id: ConnectionId,
    pub device_id: DeviceId,
    outbound: mpsc::Sender<OutboundFrame>,
}

impl ConnectionHandle {
    pub fn new(
        connection_id: ConnectionId,
        device_id: DeviceId,
        outbound: mpsc::Sender<OutboundFrame>,
    ) -> Self {
        Self {
            connection_id,
            device_id,
            outbound,
        }
    }

    /// Asks the connection's writer to send a close frame and stop. Never
    /// blocks the registry loop.
    fn close(self) {
        match self.outbound.try_send(OutboundFrame::Close) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tokio::spawn(async move {
                    let _ = self.outbound.send(OutboundFrame::Close).await;
                });
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

enum HubCommand {
    Register(ConnectionHandle),
    Unregister {
        device_id: DeviceId,
        connection_id: ConnectionId,
    },
    Count(oneshot::Sender<usize>),
    IsConnected(DeviceId, oneshot::Sender<bool>),
}

/// Cloneable front of the connection registry. All reads and writes of the
/// device map go through [`HubWorker::run`], one command at a time.
#[derive(Clone)]
pub struct Hub {
    commands: mpsc::Sender<HubCommand>,
}

impl Hub {
    pub fn new(buffer: usize) -> (Self, HubWorker) {
        let (commands, receiver) = mpsc::channel(buffer.max(1));
        (
            Self { commands },
            HubWorker {
                receiver,
                clients: HashMap::new(),
            },
        )
    }

    pub async fn register(&self, handle: ConnectionHandle) -> Result<(), HubError> {
        self.commands
            .send(HubCommand::Register(handle))
            .await
            .map_err(|_| HubError::Stopped)
    }

    pub async fn unregister(
        &self,
        device_id: DeviceId,
        connection_id: ConnectionId,
    ) -> Result<(), HubError> {
        self.commands
            .send(HubCommand::Unregister {
                device_id,
                connection_id,
            })
            .await
            .map_err(|_| HubError::Stopped)
    }

    pub async fn connected_count(&self) -> Result<usize, HubError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(HubCommand::Count(reply))
            .await
            .map_err(|_| HubError::Stopped)?;
        response.await.map_err(|_| HubError::Stopped)
    }

    pub async fn is_connected(&self, device_id: &DeviceId) -> Result<bool, HubError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(HubCommand::IsConnected(device_id.clone(), reply))
            .await
            .map_err(|_| HubError::Stopped)?;
        response.await.map_err(|_| HubError::Stopped)
    }
}

pub struct HubWorker {
    receiver: mpsc::Receiver<HubCommand>,
    clients: HashMap<DeviceId, ConnectionHandle>,
}

impl HubWorker {
    pub async fn run(mut self) {
        tracing::info!("Connection hub started");
        while let Some(command) = self.receiver.recv().await {
            match command {
                HubCommand::Register(handle) => self.register(handle),
                HubCommand::Unregister {
                    device_id,
                    connection_id,
                } => self.unregister(&device_id, connection_id),
                HubCommand::Count(reply) => {
                    let _ = reply.send(self.clients.len());
                }
                HubCommand::IsConnected(device_id, reply) => {
                    let _ = reply.send(self.clients.contains_key(&device_id));
                }
            }
        }
        tracing::info!("Connection hub stopped: all handles dropped");
    }

    fn register(&mut self, handle: ConnectionHandle) {
        let device_id = handle.device_id.clone();
        let connection_id = handle.connection_id;
        if let Some(previous) = self.clients.insert(device_id.clone(), handle) {
            tracing::info!(
                device_id = %device_id,
                replaced = %previous.connection_id,
                "Closing superseded connection"
            );
            previous.close();
        }
        tracing::info!(
            device_id = %device_id,
            connection_id = %connection_id,
            connected = self.clients.len(),
            "Client registered"
        );
    }

    /// Ignores stale requests from a connection that was already replaced.
    fn unregister(&mut self, device_id: &DeviceId, connection_id: ConnectionId) {
        let is_current = self
            .clients
            .get(device_id)
            .is_some_and(|c| c.connection_id == connection_id);
        if !is_current {
            tracing::debug!(
                device_id = %device_id,
                connection_id = %connection_id,
                "Ignoring unregister for superseded connection"
            );
            return;
        }
        if let Some(handle) = self.clients.remove(device_id) {
            handle.close();
        }
        tracing::info!(
            device_id = %device_id,
            connection_id = %connection_id,
            connected = self.clients.len(),
            "Client unregistered"
        );
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("connection hub is not running")]
    Stopped,
}
