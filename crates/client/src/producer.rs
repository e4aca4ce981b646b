//! Outbound media track multiplexed on a send transport
//!
//! The application owns [`Producer`] handles. The transport only keeps a
//! [`WeakProducer`] per producer id, used to fan out transport closure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::parameters::{AppData, MediaKind, RtpParameters, StatsReport};
use crate::track::MediaTrack;
use crate::{Error, Result};

/// Transport side of a producer
#[async_trait]
pub trait ProducerListener: Send + Sync {
    /// The producer was closed by the application
    async fn on_close(&self, producer: &Producer);

    async fn on_replace_track(&self, producer: &Producer, track: Arc<dyn MediaTrack>)
        -> Result<()>;

    async fn on_set_max_spatial_layer(&self, producer: &Producer, spatial_layer: u8)
        -> Result<()>;

    async fn on_get_stats(&self, producer: &Producer) -> Result<StatsReport>;
}

/// Application side of a producer
pub trait ProducerPublicListener: Send + Sync {
    /// The owning transport was closed; the producer is now closed too
    fn on_transport_close(&self, _producer: &Producer) {}
}

struct ProducerInner {
    id: String,
    local_id: String,
    kind: MediaKind,
    rtp_parameters: RtpParameters,
    app_data: AppData,
    track: Mutex<Arc<dyn MediaTrack>>,
    max_spatial_layer: Mutex<Option<u8>>,
    closed: AtomicBool,
    listener: Arc<dyn ProducerListener>,
    public_listener: Arc<dyn ProducerPublicListener>,
}

/// Handle to an outbound track
#[derive(Clone)]
pub struct Producer {
    inner: Arc<ProducerInner>,
}

impl Producer {
    pub(crate) fn new(
        id: String,
        local_id: String,
        track: Arc<dyn MediaTrack>,
        rtp_parameters: RtpParameters,
        app_data: AppData,
        listener: Arc<dyn ProducerListener>,
        public_listener: Arc<dyn ProducerPublicListener>,
    ) -> Self {
        Self {
            inner: Arc::new(ProducerInner {
                id,
                local_id,
                kind: track.kind(),
                rtp_parameters,
                app_data,
                track: Mutex::new(track),
                max_spatial_layer: Mutex::new(None),
                closed: AtomicBool::new(false),
                listener,
                public_listener,
            }),
        }
    }

    /// Server assigned producer id
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Handler assigned sender id
    pub fn local_id(&self) -> &str {
        &self.inner.local_id
    }

    pub fn kind(&self) -> MediaKind {
        self.inner.kind
    }

    /// Track currently being sent
    pub fn track(&self) -> Arc<dyn MediaTrack> {
        Arc::clone(&self.inner.track.lock())
    }

    pub fn rtp_parameters(&self) -> &RtpParameters {
        &self.inner.rtp_parameters
    }

    pub fn app_data(&self) -> &AppData {
        &self.inner.app_data
    }

    pub fn max_spatial_layer(&self) -> Option<u8> {
        *self.inner.max_spatial_layer.lock()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn downgrade(&self) -> WeakProducer {
        WeakProducer {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn closed_error(&self) -> Error {
        Error::InvalidState(format!("producer {} closed", self.inner.id))
    }

    /// Close the producer and stop sending. Idempotent.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        debug!("Closing producer {}", self.inner.id);
        self.inner.listener.on_close(self).await;
    }

    /// Called by the transport when it closes. Does not touch the transport.
    pub(crate) fn transport_closed(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        debug!("Producer {} closed by its transport", self.inner.id);
        self.inner.public_listener.on_transport_close(self);
    }

    /// Sender stats
    pub async fn get_stats(&self) -> Result<StatsReport> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        self.inner.listener.on_get_stats(self).await
    }

    /// Send `track` instead of the current one. Replacing with the same
    /// track is a no-op.
    pub async fn replace_track(&self, track: Arc<dyn MediaTrack>) -> Result<()> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        if track.kind() != self.inner.kind {
            return Err(Error::InvalidParameter(format!(
                "cannot replace {} track with a {} track",
                self.inner.kind,
                track.kind()
            )));
        }
        let current_id = self.track().id().to_string();
        if current_id == track.id() {
            return Ok(());
        }

        self.inner
            .listener
            .on_replace_track(self, Arc::clone(&track))
            .await?;

        *self.inner.track.lock() = track;
        Ok(())
    }

    /// Cap the highest simulcast/SVC layer sent. Video only.
    pub async fn set_max_spatial_layer(&self, spatial_layer: u8) -> Result<()> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        if self.inner.kind != MediaKind::Video {
            return Err(Error::InvalidParameter(format!(
                "producer {} is not a video producer",
                self.inner.id
            )));
        }
        if self.max_spatial_layer() == Some(spatial_layer) {
            return Ok(());
        }

        self.inner
            .listener
            .on_set_max_spatial_layer(self, spatial_layer)
            .await?;

        *self.inner.max_spatial_layer.lock() = Some(spatial_layer);
        Ok(())
    }
}

/// Non-owning producer reference held by the transport registry
#[derive(Clone)]
pub struct WeakProducer {
    inner: Weak<ProducerInner>,
}

impl WeakProducer {
    pub fn upgrade(&self) -> Option<Producer> {
        self.inner.upgrade().map(|inner| Producer { inner })
    }

    /// Whether any `Producer` handle is still held
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}
