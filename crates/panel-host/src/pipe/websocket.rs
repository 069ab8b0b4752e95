//! Client connection to the obs-websocket server.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use futures::{SinkExt, StreamExt};
use panel_bus::{attach, Broker, MessageType, Node, NodeCore};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket client link to the obs-websocket server.
///
/// Text frames are published as [`MessageType::INBOUND_WIRELESS`]; messages
/// tagged [`MessageType::OUTBOUND_WIRELESS`] are queued for sending. The
/// broker callback reports failure while no connection is up.
pub struct WebSocketPipe {
    core: NodeCore,
    outbound: mpsc::UnboundedSender<String>,
    pending: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    connected: AtomicBool,
    shutdown: Notify,
}

impl WebSocketPipe {
    /// Create the pipe and subscribe it to `broker`. Nothing is connected
    /// until [`run`](Self::run) is awaited.
    pub fn new(broker: Arc<Broker>) -> Arc<Self> {
        let (outbound, pending) = mpsc::unbounded_channel();
        let pipe = Arc::new(Self {
            core: NodeCore::new(
                broker,
                MessageType::OUTBOUND_WIRELESS,
                MessageType::INBOUND_WIRELESS,
            ),
            outbound,
            pending: Mutex::new(Some(pending)),
            connected: AtomicBool::new(false),
            shutdown: Notify::new(),
        });
        attach(&pipe);
        pipe
    }

    /// True while a connection is established.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Connect to `url` and pump frames until the server closes the
    /// connection or the pipe is stopped. A pipe runs at most once.
    pub async fn run(self: Arc<Self>, url: String) -> anyhow::Result<()> {
        let outbound = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .context("websocket pipe has already run")?;

        let (stream, _) = connect_async(url.as_str())
            .await
            .with_context(|| format!("connecting to {url}"))?;
        info!(%url, "obs-websocket connected");

        self.connected.store(true, Ordering::Release);
        let result = self.pump(stream, outbound).await;
        self.connected.store(false, Ordering::Release);
        result
    }

    async fn pump(
        &self,
        stream: WsStream,
        mut outbound: mpsc::UnboundedReceiver<String>,
    ) -> anyhow::Result<()> {
        let (mut write, mut read) = stream.split();

        loop {
            tokio::select! {
                () = self.shutdown.notified() => {
                    info!("closing obs-websocket connection");
                    write.send(Message::Close(None)).await?;
                    return Ok(());
                }
                frame = outbound.recv() => {
                    let Some(text) = frame else {
                        return Ok(());
                    };
                    trace!(len = text.len(), "sending frame");
                    write.send(Message::Text(text)).await?;
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        trace!(len = text.len(), "received frame");
                        if !self.core.publish(&text) {
                            debug!("frame not consumed");
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(?frame, "server closed the connection");
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(()),
                },
            }
        }
    }
}

impl Node for WebSocketPipe {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn publish_callback(&self, message_type: MessageType, payload: &str) -> bool {
        if !self.core.accepts(message_type) || !self.is_connected() {
            return false;
        }
        self.outbound.send(payload.to_string()).is_ok()
    }

    fn stop(&self) {
        self.core.stop();
        self.shutdown.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn listen() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        (listener, url)
    }

    #[test]
    fn callback_fails_while_disconnected() {
        let broker = Arc::new(Broker::new());
        let pipe = WebSocketPipe::new(Arc::clone(&broker));

        assert!(!pipe.is_connected());
        assert!(!broker.publish(MessageType::OUTBOUND_WIRELESS, "{}"));
    }

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let broker = Arc::new(Broker::new());
        {
            let responder = Arc::clone(&broker);
            broker.subscribe(move |message_type, payload| {
                message_type == MessageType::INBOUND_WIRELESS
                    && responder.publish(MessageType::OUTBOUND_WIRELESS, &format!("echo:{payload}"))
            });
        }

        let (listener, url) = listen().await;
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.send(Message::Text("hello".into())).await.unwrap();
            let reply = ws.next().await.unwrap().unwrap();
            ws.close(None).await.unwrap();
            reply
        });

        let pipe = WebSocketPipe::new(Arc::clone(&broker));
        let run = tokio::spawn(Arc::clone(&pipe).run(url));

        assert_eq!(server.await.unwrap(), Message::Text("echo:hello".into()));
        run.await.unwrap().unwrap();
        assert!(!pipe.is_connected());
    }

    #[tokio::test]
    async fn stop_closes_the_connection() {
        let (listener, url) = listen().await;
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.next().await.unwrap().unwrap()
        });

        let pipe = WebSocketPipe::new(Arc::new(Broker::new()));
        let run = tokio::spawn(Arc::clone(&pipe).run(url));
        pipe.stop();

        assert!(matches!(server.await.unwrap(), Message::Close(_)));
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn a_pipe_runs_once() {
        let pipe = WebSocketPipe::new(Arc::new(Broker::new()));
        let (_listener, url) = listen().await;
        pipe.pending.lock().unwrap().take();

        let err = Arc::clone(&pipe).run(url).await.unwrap_err();
        assert!(err.to_string().contains("already run"));
    }
}
