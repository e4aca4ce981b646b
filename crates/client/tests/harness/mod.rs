//! Test doubles for handlers, signaling listeners and tracks
//!
//! Handlers record every call as a string so tests can assert on the exact
//! sequence the transport drove.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use mediaroute_client::handler::{Handler, RecvResult, SendResult};
use mediaroute_client::{
    AppData, ConnectionState, Consumer, ConsumerPublicListener, Device, DeviceCapabilities,
    DtlsFingerprint, DtlsParameters, DtlsRole, Error, HandlerFactory, HandlerListener,
    HandlerOptions, IceCandidate, IceParameters, IceServer, MediaKind, MediaTrack, Producer,
    ProducerPublicListener, RecvHandler, RecvTransport, Result, RtpEncodingParameters,
    RtpParameters, SendHandler, SendTransport, SendTransportListener, StatsReport, Transport,
    TransportListener, TransportOptions,
};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::Notify;

// ============================================================================
// Tracks
// ============================================================================

pub struct TestTrack {
    id: String,
    kind: MediaKind,
}

impl TestTrack {
    pub fn new(id: impl Into<String>, kind: MediaKind) -> Arc<dyn MediaTrack> {
        Arc::new(Self {
            id: id.into(),
            kind,
        })
    }

    pub fn audio(id: &str) -> Arc<dyn MediaTrack> {
        Self::new(id, MediaKind::Audio)
    }

    pub fn video(id: &str) -> Arc<dyn MediaTrack> {
        Self::new(id, MediaKind::Video)
    }
}

impl MediaTrack for TestTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }
}

// ============================================================================
// Handlers
// ============================================================================

pub fn test_dtls_parameters() -> DtlsParameters {
    DtlsParameters {
        role: DtlsRole::Client,
        fingerprints: vec![DtlsFingerprint {
            algorithm: "sha-256".to_string(),
            value: "AB:CD:EF".to_string(),
        }],
    }
}

/// Call log and connect bookkeeping shared by both mock handlers
struct MockHandlerState {
    listener: Arc<dyn HandlerListener>,
    /// Held across the connect handshake, like a real negotiation queue
    connected: tokio::sync::Mutex<bool>,
    next_local_id: AtomicUsize,
    calls: Mutex<Vec<String>>,
    closed: AtomicBool,
    /// Makes `restart_ice` and `update_ice_servers` fail
    fail_ice: AtomicBool,
}

impl MockHandlerState {
    fn new(listener: Arc<dyn HandlerListener>) -> Self {
        Self {
            listener,
            connected: tokio::sync::Mutex::new(false),
            next_local_id: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            fail_ice: AtomicBool::new(false),
        }
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }

    async fn ensure_connected(&self) -> Result<()> {
        let mut connected = self.connected.lock().await;
        if !*connected {
            self.listener.on_connect(test_dtls_parameters()).await?;
            *connected = true;
        }
        Ok(())
    }

    fn next_local_id(&self) -> String {
        self.next_local_id.fetch_add(1, Ordering::SeqCst).to_string()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.record("close");
    }

    fn ice_operation(&self, call: String) -> Result<()> {
        self.record(call);
        if self.fail_ice.load(Ordering::SeqCst) {
            return Err(Error::Handler("ICE agent gone".to_string()));
        }
        Ok(())
    }

    fn transport_stats(&self) -> Result<StatsReport> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Handler("handler closed".to_string()));
        }
        Ok(json!({ "type": "transport", "bytesSent": 0 }))
    }
}

pub struct MockSendHandler {
    state: MockHandlerState,
}

impl MockSendHandler {
    pub fn fail_ice_operations(&self) {
        self.state.fail_ice.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.calls.lock().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Handler-side view of the transport, as the handler would call it
    pub fn listener(&self) -> Arc<dyn HandlerListener> {
        Arc::clone(&self.state.listener)
    }
}

#[async_trait]
impl Handler for MockSendHandler {
    fn close(&self) {
        self.state.close();
    }

    async fn transport_stats(&self) -> Result<StatsReport> {
        self.state.transport_stats()
    }

    async fn restart_ice(&self, ice_parameters: IceParameters) -> Result<()> {
        self.state
            .ice_operation(format!("restart_ice:{}", ice_parameters.username_fragment))
    }

    async fn update_ice_servers(&self, ice_servers: Vec<IceServer>) -> Result<()> {
        self.state
            .ice_operation(format!("update_ice_servers:{}", ice_servers.len()))
    }
}

#[async_trait]
impl SendHandler for MockSendHandler {
    async fn send(
        &self,
        track: Arc<dyn MediaTrack>,
        encodings: Vec<RtpEncodingParameters>,
        _codec_options: Option<serde_json::Value>,
    ) -> Result<SendResult> {
        self.state.ensure_connected().await?;

        let local_id = self.state.next_local_id();
        self.state
            .record(format!("send:{}:{}", track.id(), encodings.len()));

        Ok(SendResult {
            rtp_parameters: json!({ "mid": local_id, "kind": track.kind().as_str() }),
            local_id,
        })
    }

    async fn stop_sending(&self, local_id: &str) -> Result<()> {
        self.state.record(format!("stop_sending:{}", local_id));
        Ok(())
    }

    async fn replace_track(&self, local_id: &str, track: Arc<dyn MediaTrack>) -> Result<()> {
        self.state
            .record(format!("replace_track:{}:{}", local_id, track.id()));
        Ok(())
    }

    async fn set_max_spatial_layer(&self, local_id: &str, spatial_layer: u8) -> Result<()> {
        self.state
            .record(format!("set_max_spatial_layer:{}:{}", local_id, spatial_layer));
        Ok(())
    }

    async fn sender_stats(&self, local_id: &str) -> Result<StatsReport> {
        Ok(json!({ "type": "outbound-rtp", "localId": local_id }))
    }
}

pub struct MockRecvHandler {
    state: MockHandlerState,
    /// Hand back a track of the other kind from `receive`
    pub swap_track_kind: AtomicBool,
}

impl MockRecvHandler {
    pub fn fail_ice_operations(&self) {
        self.state.fail_ice.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.calls.lock().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn listener(&self) -> Arc<dyn HandlerListener> {
        Arc::clone(&self.state.listener)
    }
}

#[async_trait]
impl Handler for MockRecvHandler {
    fn close(&self) {
        self.state.close();
    }

    async fn transport_stats(&self) -> Result<StatsReport> {
        self.state.transport_stats()
    }

    async fn restart_ice(&self, ice_parameters: IceParameters) -> Result<()> {
        self.state
            .ice_operation(format!("restart_ice:{}", ice_parameters.username_fragment))
    }

    async fn update_ice_servers(&self, ice_servers: Vec<IceServer>) -> Result<()> {
        self.state
            .ice_operation(format!("update_ice_servers:{}", ice_servers.len()))
    }
}

#[async_trait]
impl RecvHandler for MockRecvHandler {
    async fn receive(
        &self,
        id: &str,
        kind: MediaKind,
        _rtp_parameters: &RtpParameters,
    ) -> Result<RecvResult> {
        self.state.ensure_connected().await?;

        let local_id = self.state.next_local_id();
        self.state.record(format!("receive:{}", id));

        let track_kind = match (self.swap_track_kind.load(Ordering::SeqCst), kind) {
            (false, kind) => kind,
            (true, MediaKind::Audio) => MediaKind::Video,
            (true, MediaKind::Video) => MediaKind::Audio,
        };
        Ok(RecvResult {
            local_id,
            track: TestTrack::new(format!("remote-{}", id), track_kind),
        })
    }

    async fn stop_receiving(&self, local_id: &str) -> Result<()> {
        self.state.record(format!("stop_receiving:{}", local_id));
        Ok(())
    }

    async fn receiver_stats(&self, local_id: &str) -> Result<StatsReport> {
        Ok(json!({ "type": "inbound-rtp", "localId": local_id }))
    }
}

/// Factory keeping a handle on every handler it built
#[derive(Default)]
pub struct MockHandlerFactory {
    send_handlers: Mutex<Vec<Arc<MockSendHandler>>>,
    recv_handlers: Mutex<Vec<Arc<MockRecvHandler>>>,
    options: Mutex<Vec<HandlerOptions>>,
}

impl MockHandlerFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn last_send_handler(&self) -> Arc<MockSendHandler> {
        Arc::clone(self.send_handlers.lock().last().expect("no send handler built"))
    }

    pub fn last_recv_handler(&self) -> Arc<MockRecvHandler> {
        Arc::clone(self.recv_handlers.lock().last().expect("no recv handler built"))
    }

    pub fn last_options(&self) -> HandlerOptions {
        self.options.lock().last().cloned().expect("no handler built")
    }
}

impl HandlerFactory for MockHandlerFactory {
    fn create_send_handler(
        &self,
        options: HandlerOptions,
        listener: Arc<dyn HandlerListener>,
    ) -> Result<Arc<dyn SendHandler>> {
        self.options.lock().push(options);
        let handler = Arc::new(MockSendHandler {
            state: MockHandlerState::new(listener),
        });
        self.send_handlers.lock().push(Arc::clone(&handler));
        Ok(handler)
    }

    fn create_recv_handler(
        &self,
        options: HandlerOptions,
        listener: Arc<dyn HandlerListener>,
    ) -> Result<Arc<dyn RecvHandler>> {
        self.options.lock().push(options);
        let handler = Arc::new(MockRecvHandler {
            state: MockHandlerState::new(listener),
            swap_track_kind: AtomicBool::new(false),
        });
        self.recv_handlers.lock().push(Arc::clone(&handler));
        Ok(handler)
    }
}

// ============================================================================
// Signaling listener
// ============================================================================

/// Stands in for the application's signaling client
#[derive(Default)]
pub struct TestListener {
    connect_calls: AtomicUsize,
    produce_calls: AtomicUsize,
    next_producer: AtomicUsize,
    states: Mutex<Vec<ConnectionState>>,
    dtls: Mutex<Vec<DtlsParameters>>,
    /// When set, `on_connect` waits for a permit before resolving
    pub connect_gate: Option<Arc<Notify>>,
    /// When set, `on_produce` waits for a permit before resolving
    pub produce_gate: Option<Arc<Notify>>,
    pub reject_connect: AtomicBool,
    pub reject_produce: AtomicBool,
    /// Server id returned for every producer instead of a fresh one
    pub fixed_producer_id: Mutex<Option<String>>,
}

impl TestListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_connect_gate(gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            connect_gate: Some(gate),
            ..Default::default()
        })
    }

    pub fn with_produce_gate(gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            produce_gate: Some(gate),
            ..Default::default()
        })
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn produce_calls(&self) -> usize {
        self.produce_calls.load(Ordering::SeqCst)
    }

    pub fn states(&self) -> Vec<ConnectionState> {
        self.states.lock().clone()
    }

    pub fn dtls(&self) -> Vec<DtlsParameters> {
        self.dtls.lock().clone()
    }
}

#[async_trait]
impl TransportListener for TestListener {
    async fn on_connect(
        &self,
        _transport: &dyn Transport,
        dtls_parameters: DtlsParameters,
    ) -> Result<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        self.dtls.lock().push(dtls_parameters);

        if let Some(gate) = &self.connect_gate {
            gate.notified().await;
        }
        if self.reject_connect.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("connectWebRtcTransport rejected").into());
        }
        Ok(())
    }

    fn on_connection_state_change(&self, _transport: &dyn Transport, state: ConnectionState) {
        self.states.lock().push(state);
    }
}

#[async_trait]
impl SendTransportListener for TestListener {
    async fn on_produce(
        &self,
        _transport: &dyn Transport,
        _kind: MediaKind,
        _rtp_parameters: RtpParameters,
        _app_data: AppData,
    ) -> Result<String> {
        self.produce_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.produce_gate {
            gate.notified().await;
        }
        if self.reject_produce.load(Ordering::SeqCst) {
            return Err(Error::Signaling("produce rejected".to_string()));
        }
        if let Some(id) = self.fixed_producer_id.lock().clone() {
            return Ok(id);
        }
        let n = self.next_producer.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("producer-{}", n))
    }
}

// ============================================================================
// Public listeners
// ============================================================================

/// Counts `on_transport_close` per entity id
#[derive(Default)]
pub struct ClosureCounter {
    counts: Mutex<HashMap<String, usize>>,
}

impl ClosureCounter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self, id: &str) -> usize {
        self.counts.lock().get(id).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.lock().values().sum()
    }

    fn bump(&self, id: &str) {
        *self.counts.lock().entry(id.to_string()).or_insert(0) += 1;
    }
}

impl ProducerPublicListener for ClosureCounter {
    fn on_transport_close(&self, producer: &Producer) {
        self.bump(producer.id());
    }
}

impl ConsumerPublicListener for ClosureCounter {
    fn on_transport_close(&self, consumer: &Consumer) {
        self.bump(consumer.id());
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn transport_options(id: &str) -> TransportOptions {
    TransportOptions::new(
        id,
        IceParameters {
            username_fragment: "ufrag".to_string(),
            password: "pwd".to_string(),
            ice_lite: true,
        },
        vec![serde_json::from_value::<IceCandidate>(json!({
            "foundation": "udpcandidate",
            "priority": 1076302079,
            "ip": "127.0.0.1",
            "port": 40000,
            "protocol": "udp",
            "type": "host"
        }))
        .expect("valid candidate")],
        test_dtls_parameters(),
    )
    .with_app_data(json!({ "role": "test" }))
}

pub fn device(factory: &Arc<MockHandlerFactory>, audio: bool, video: bool) -> Device {
    let capabilities = DeviceCapabilities::new(json!({ "codecs": [], "headerExtensions": [] }))
        .with_can_produce(MediaKind::Audio, audio)
        .with_can_produce(MediaKind::Video, video);
    Device::new(capabilities, Arc::clone(factory) as Arc<dyn HandlerFactory>)
}

pub struct SendFixture {
    pub transport: SendTransport,
    pub handler: Arc<MockSendHandler>,
    pub listener: Arc<TestListener>,
    pub factory: Arc<MockHandlerFactory>,
}

pub fn send_fixture(listener: Arc<TestListener>, audio: bool, video: bool) -> SendFixture {
    let factory = MockHandlerFactory::new();
    let transport = device(&factory, audio, video)
        .create_send_transport(
            Arc::clone(&listener) as Arc<dyn SendTransportListener>,
            transport_options("send-transport"),
            Default::default(),
        )
        .expect("send transport");

    SendFixture {
        transport,
        handler: factory.last_send_handler(),
        listener,
        factory,
    }
}

pub struct RecvFixture {
    pub transport: RecvTransport,
    pub handler: Arc<MockRecvHandler>,
    pub listener: Arc<TestListener>,
}

pub fn recv_fixture(listener: Arc<TestListener>) -> RecvFixture {
    let factory = MockHandlerFactory::new();
    let transport = device(&factory, true, true)
        .create_recv_transport(
            Arc::clone(&listener) as Arc<dyn TransportListener>,
            transport_options("recv-transport"),
            Default::default(),
        )
        .expect("recv transport");

    RecvFixture {
        transport,
        handler: factory.last_recv_handler(),
        listener,
    }
}

pub fn empty_app_data() -> AppData {
    json!({})
}
