//! Connection to the activity producer. [TransportModule] keeps a WebSocket session alive,
//! reconnecting after a fixed delay, and forwards messages in delivery order to the view.

pub mod protocol;

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use protocol::{hello, parse_message, ProtocolError, TransportEvent};
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::utils::clock::Clock;

pub const DEFAULT_URL: &str = "ws://127.0.0.1:5168/client";
pub const DEFAULT_RECONNECT_MS: u64 = 1000;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub url: String,
    pub reconnect_delay: Duration,
}

/// The view's end of the transport.
pub struct TransportHandle {
    pub events: mpsc::Receiver<TransportEvent>,
    resets: mpsc::UnboundedSender<u64>,
}

impl TransportHandle {
    /// Creates a handle fed by hand, along with the ends the transport task would hold.
    #[cfg(test)]
    pub fn detached() -> (
        mpsc::Sender<TransportEvent>,
        mpsc::UnboundedReceiver<u64>,
        TransportHandle,
    ) {
        let (next, events) = mpsc::channel(64);
        let (resets, reset_receiver) = mpsc::unbounded_channel();
        (next, reset_receiver, TransportHandle { events, resets })
    }

    /// Asks the transport to drop `session` because it violated the protocol.
    pub fn reset(&self, session: u64) {
        if self.resets.send(session).is_err() {
            debug!("Transport is already gone, nothing to reset");
        }
    }
}

enum SessionEnd {
    Closed,
    Reset,
    Shutdown,
}

pub struct TransportModule {
    config: TransportConfig,
    next: mpsc::Sender<TransportEvent>,
    resets: mpsc::UnboundedReceiver<u64>,
    shutdown: CancellationToken,
    clock: Arc<dyn Clock>,
}

impl TransportModule {
    pub fn new(
        config: TransportConfig,
        shutdown: CancellationToken,
        clock: Arc<dyn Clock>,
    ) -> (Self, TransportHandle) {
        let (next, events) = mpsc::channel(64);
        let (resets_sender, resets) = mpsc::unbounded_channel();
        (
            Self {
                config,
                next,
                resets,
                shutdown,
                clock,
            },
            TransportHandle {
                events,
                resets: resets_sender,
            },
        )
    }

    /// Executes the connection loop until shutdown or until the view goes away.
    pub async fn run(mut self) -> Result<()> {
        let mut session = 0;
        loop {
            session += 1;
            match self.session(session).await {
                Ok(SessionEnd::Shutdown) => return Ok(()),
                Ok(SessionEnd::Closed) => info!("Session {session} was closed by the producer"),
                Ok(SessionEnd::Reset) => warn!("Session {session} was dropped"),
                Err(e) => warn!("Session {session} failed {e:?}"),
            }

            debug!("Reconnecting in {:?}", self.config.reconnect_delay);
            tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                _ = self.clock.sleep(self.config.reconnect_delay) => ()
            }
        }
    }

    #[instrument(skip(self), fields(url = %self.config.url))]
    async fn session(&mut self, session: u64) -> Result<SessionEnd> {
        let (mut socket, _) = tokio::select! {
            _ = self.shutdown.cancelled() => return Ok(SessionEnd::Shutdown),
            connection = connect_async(self.config.url.as_str()) => connection?,
        };
        socket.send(Message::Text(hello())).await?;
        info!("Connected");

        if !self.emit(TransportEvent::Connected { session }).await {
            return Ok(SessionEnd::Shutdown);
        }
        let end = self.receive(session, &mut socket).await;
        if let Err(e) = socket.close(None).await {
            debug!("Closing socket failed {e:?}");
        }
        if !self.emit(TransportEvent::Disconnected { session }).await {
            return Ok(SessionEnd::Shutdown);
        }
        end
    }

    async fn receive(&mut self, session: u64, socket: &mut Socket) -> Result<SessionEnd> {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(SessionEnd::Shutdown),
                reset = self.resets.recv() => match reset {
                    Some(id) if id == session => return Ok(SessionEnd::Reset),
                    Some(id) => debug!("Ignoring reset of stale session {id}"),
                    None => return Ok(SessionEnd::Shutdown),
                },
                frame = socket.next() => {
                    let text = match frame {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Binary(_))) => {
                            warn!("{}", ProtocolError::UnexpectedFrame("binary"));
                            return Ok(SessionEnd::Reset);
                        }
                        Some(Ok(Message::Close(_))) | None => return Ok(SessionEnd::Closed),
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(e.into()),
                    };
                    let message = match parse_message(&text) {
                        Ok(message) => message,
                        Err(e) => {
                            warn!("Protocol violation {e}");
                            return Ok(SessionEnd::Reset);
                        }
                    };
                    if !self.emit(TransportEvent::Message { session, message }).await {
                        return Ok(SessionEnd::Shutdown);
                    }
                }
            }
        }
    }

    /// Returns false once the receiving side is gone.
    async fn emit(&self, event: TransportEvent) -> bool {
        self.next.send(event).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use anyhow::Result;
    use chrono::{TimeZone, Utc};
    use futures::{SinkExt, StreamExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};
    use tokio_util::sync::CancellationToken;

    use super::{
        protocol::{TransportEvent, TransportMessage},
        TransportConfig, TransportHandle, TransportModule,
    };
    use crate::{
        activity::entities::ActivitySegment,
        utils::{clock::DefaultClock, logging::TEST_LOGGING},
    };

    fn snapshot() -> TransportMessage {
        let start = Utc.with_ymd_and_hms(2024, 4, 5, 12, 0, 0).unwrap();
        TransportMessage::Snapshot(vec![ActivitySegment::new("Chrome", start)])
    }

    fn delta() -> TransportMessage {
        let start = Utc.with_ymd_and_hms(2024, 4, 5, 12, 1, 0).unwrap();
        TransportMessage::Delta(ActivitySegment::new("Slack", start))
    }

    async fn start(
        listener: &TcpListener,
    ) -> Result<(TransportHandle, CancellationToken, tokio::task::JoinHandle<Result<()>>)> {
        let shutdown = CancellationToken::new();
        let config = TransportConfig {
            url: format!("ws://{}/client", listener.local_addr()?),
            reconnect_delay: Duration::from_millis(20),
        };
        let (module, handle) = TransportModule::new(config, shutdown.clone(), Arc::new(DefaultClock));
        Ok((handle, shutdown, tokio::spawn(module.run())))
    }

    async fn accept(listener: &TcpListener) -> Result<WebSocketStream<TcpStream>> {
        let (stream, _) = listener.accept().await?;
        let mut socket = accept_async(stream).await?;
        let Some(Ok(Message::Text(hello))) = socket.next().await else {
            anyhow::bail!("client didn't announce itself");
        };
        assert!(hello.contains("hello"));
        Ok(socket)
    }

    async fn send(socket: &mut WebSocketStream<TcpStream>, message: &TransportMessage) -> Result<()> {
        socket
            .send(Message::Text(serde_json::to_string(message)?))
            .await?;
        Ok(())
    }

    async fn next_event(handle: &mut TransportHandle) -> TransportEvent {
        tokio::time::timeout(Duration::from_secs(5), handle.events.recv())
            .await
            .expect("transport stalled")
            .expect("transport stopped")
    }

    #[tokio::test]
    async fn delivers_messages_in_order() -> Result<()> {
        *TEST_LOGGING;
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let (mut handle, shutdown, task) = start(&listener).await?;

        let mut socket = accept(&listener).await?;
        send(&mut socket, &snapshot()).await?;
        send(&mut socket, &delta()).await?;

        assert_eq!(next_event(&mut handle).await, TransportEvent::Connected { session: 1 });
        assert_eq!(
            next_event(&mut handle).await,
            TransportEvent::Message {
                session: 1,
                message: snapshot()
            }
        );
        assert_eq!(
            next_event(&mut handle).await,
            TransportEvent::Message {
                session: 1,
                message: delta()
            }
        );

        shutdown.cancel();
        task.await??;
        Ok(())
    }

    #[tokio::test]
    async fn reconnects_after_close() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let (mut handle, shutdown, task) = start(&listener).await?;

        let mut socket = accept(&listener).await?;
        socket.close(None).await?;
        drop(socket);

        let mut socket = accept(&listener).await?;
        send(&mut socket, &snapshot()).await?;

        assert_eq!(next_event(&mut handle).await, TransportEvent::Connected { session: 1 });
        assert_eq!(next_event(&mut handle).await, TransportEvent::Disconnected { session: 1 });
        assert_eq!(next_event(&mut handle).await, TransportEvent::Connected { session: 2 });
        assert_eq!(
            next_event(&mut handle).await,
            TransportEvent::Message {
                session: 2,
                message: snapshot()
            }
        );

        shutdown.cancel();
        task.await??;
        Ok(())
    }

    #[tokio::test]
    async fn malformed_message_drops_session() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let (mut handle, shutdown, task) = start(&listener).await?;

        let mut socket = accept(&listener).await?;
        socket.send(Message::Text("{not json".into())).await?;
        // The client hangs up on us.
        while let Some(Ok(frame)) = socket.next().await {
            if frame.is_close() {
                break;
            }
        }

        let mut socket = accept(&listener).await?;
        send(&mut socket, &snapshot()).await?;

        assert_eq!(next_event(&mut handle).await, TransportEvent::Connected { session: 1 });
        assert_eq!(next_event(&mut handle).await, TransportEvent::Disconnected { session: 1 });
        assert_eq!(next_event(&mut handle).await, TransportEvent::Connected { session: 2 });
        assert!(matches!(
            next_event(&mut handle).await,
            TransportEvent::Message { session: 2, .. }
        ));

        shutdown.cancel();
        task.await??;
        Ok(())
    }

    #[tokio::test]
    async fn binary_frame_drops_session() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let (mut handle, shutdown, task) = start(&listener).await?;

        let mut socket = accept(&listener).await?;
        socket.send(Message::Binary(vec![1, 2, 3])).await?;
        while let Some(Ok(frame)) = socket.next().await {
            if frame.is_close() {
                break;
            }
        }

        let mut socket = accept(&listener).await?;
        send(&mut socket, &snapshot()).await?;

        assert_eq!(next_event(&mut handle).await, TransportEvent::Connected { session: 1 });
        assert_eq!(next_event(&mut handle).await, TransportEvent::Disconnected { session: 1 });
        assert_eq!(next_event(&mut handle).await, TransportEvent::Connected { session: 2 });
        assert_eq!(
            next_event(&mut handle).await,
            TransportEvent::Message {
                session: 2,
                message: snapshot()
            }
        );

        shutdown.cancel();
        task.await??;
        Ok(())
    }

    #[tokio::test]
    async fn reset_drops_only_matching_session() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let (mut handle, shutdown, task) = start(&listener).await?;

        let _socket = accept(&listener).await?;
        assert_eq!(next_event(&mut handle).await, TransportEvent::Connected { session: 1 });

        handle.reset(7);
        handle.reset(1);
        assert_eq!(next_event(&mut handle).await, TransportEvent::Disconnected { session: 1 });

        let _socket = accept(&listener).await?;
        assert_eq!(next_event(&mut handle).await, TransportEvent::Connected { session: 2 });

        shutdown.cancel();
        task.await??;
        Ok(())
    }
}
