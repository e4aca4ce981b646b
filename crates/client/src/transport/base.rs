//! State shared by send and receive transports
//!
//! `closed` and `connection_state` live under one lock. Closing flips the
//! latch inside it and state notifications only write the connection state
//! inside it, so a notification racing with `close()` is applied but can
//! never reopen the transport.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{Transport, TransportListener};
use crate::connection_state::{ConnectionState, IceConnectionState};
use crate::handler::Handler;
use crate::parameters::{AppData, DtlsParameters, IceParameters, IceServer, StatsReport};
use crate::{Error, Result};

#[derive(Debug, Default)]
struct TransportState {
    connection_state: ConnectionState,
    closed: bool,
}

pub(crate) struct TransportBase<H: ?Sized, L: ?Sized> {
    id: String,
    app_data: AppData,
    extended_rtp_capabilities: Arc<serde_json::Value>,
    listener: Arc<L>,
    /// Taken on close; the handler is released with it.
    handler: RwLock<Option<Arc<H>>>,
    state: Mutex<TransportState>,
    /// Single slot: at most one DTLS connect handshake in flight.
    connect_slot: Semaphore,
}

impl<H, L> TransportBase<H, L>
where
    H: Handler + ?Sized,
    L: TransportListener + ?Sized,
{
    pub(crate) fn new(
        id: String,
        app_data: AppData,
        extended_rtp_capabilities: Arc<serde_json::Value>,
        listener: Arc<L>,
    ) -> Self {
        Self {
            id,
            app_data,
            extended_rtp_capabilities,
            listener,
            handler: RwLock::new(None),
            state: Mutex::new(TransportState::default()),
            connect_slot: Semaphore::new(1),
        }
    }

    pub(crate) fn set_handler(&self, handler: Arc<H>) {
        *self.handler.write() = Some(handler);
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn app_data(&self) -> &AppData {
        &self.app_data
    }

    pub(crate) fn extended_rtp_capabilities(&self) -> &serde_json::Value {
        &self.extended_rtp_capabilities
    }

    pub(crate) fn listener(&self) -> &Arc<L> {
        &self.listener
    }

    pub(crate) fn connection_state(&self) -> ConnectionState {
        self.state.lock().connection_state
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub(crate) fn closed_error(&self) -> Error {
        Error::InvalidState(format!("transport {} closed", self.id))
    }

    /// Handler of an open transport
    pub(crate) fn handler(&self) -> Result<Arc<H>> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        self.handler
            .read()
            .clone()
            .ok_or_else(|| self.closed_error())
    }

    pub(crate) async fn get_stats(&self) -> Result<StatsReport> {
        let handler = self.handler()?;
        handler.transport_stats().await
    }

    /// Only a closed transport is an error; handler failures surface
    /// through connection state.
    pub(crate) async fn restart_ice(&self, ice_parameters: IceParameters) -> Result<()> {
        let handler = self.handler()?;
        debug!("Restarting ICE on transport {}", self.id);
        if let Err(error) = handler.restart_ice(ice_parameters).await {
            warn!("ICE restart failed on transport {}: {}", self.id, error);
        }
        Ok(())
    }

    pub(crate) async fn update_ice_servers(&self, ice_servers: Vec<IceServer>) -> Result<()> {
        let handler = self.handler()?;
        debug!(
            "Updating {} ICE server(s) on transport {}",
            ice_servers.len(),
            self.id
        );
        if let Err(error) = handler.update_ice_servers(ice_servers).await {
            warn!("ICE server update failed on transport {}: {}", self.id, error);
        }
        Ok(())
    }

    /// Latch `closed` and release the handler.
    ///
    /// Returns `false` when the transport was already closed, in which case
    /// nothing else must be torn down.
    pub(crate) fn close(&self) -> bool {
        {
            let mut state = self.state.lock();
            if state.closed {
                return false;
            }
            state.closed = true;
        }

        info!("Closing transport {}", self.id);

        let handler = self.handler.write().take();
        if let Some(handler) = handler {
            handler.close();
        }

        true
    }

    pub(crate) async fn on_connect(
        &self,
        transport: &dyn Transport,
        dtls_parameters: DtlsParameters,
    ) -> Result<()> {
        if self.is_closed() {
            return Err(self.closed_error());
        }

        // Released when the listener's future resolves or is dropped
        let _permit = self
            .connect_slot
            .try_acquire()
            .map_err(|_| Error::ConnectInProgress(self.id.clone()))?;

        debug!("Transport {} requesting DTLS connect", self.id);
        let result = self.listener.on_connect(transport, dtls_parameters).await;

        // Closing abandons the handshake, whatever the server answered
        if self.is_closed() {
            return Err(self.closed_error());
        }
        result
    }

    pub(crate) fn on_connection_state_change(
        &self,
        transport: &dyn Transport,
        native: IceConnectionState,
    ) {
        let connection_state = ConnectionState::from(native);
        let closed = {
            let mut state = self.state.lock();
            state.connection_state = connection_state;
            state.closed
        };

        debug!(
            "Transport {} connection state changed to {} (closed: {})",
            self.id, connection_state, closed
        );

        self.listener
            .on_connection_state_change(transport, connection_state);
    }
}
