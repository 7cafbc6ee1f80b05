//! Mock WebSocket server for integration tests.
//!
//! Accepts connections, pushes a fixed list of frames to every new client
//! and records what clients send back.

use futures_util::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// A mock WebSocket server for testing.
pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    messages: Arc<Mutex<VecDeque<String>>>,
    connections: Arc<Mutex<u32>>,
}

impl MockWsServer {
    /// Start a server that sends nothing on connect.
    pub async fn start() -> Self {
        Self::start_with(Vec::new()).await
    }

    /// Start a server that sends `greeting` frames to each client on connect.
    pub async fn start_with(greeting: Vec<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self::serve(listener, greeting, false)
    }

    /// Start on a previously reserved address.
    pub async fn start_on(addr: SocketAddr, greeting: Vec<String>) -> Self {
        let listener = TcpListener::bind(addr).await.unwrap();
        Self::serve(listener, greeting, false)
    }

    /// Like `start_with`, but the first client is sent a close frame right
    /// after the greeting. Later clients are served normally.
    pub async fn start_closing_first(greeting: Vec<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self::serve(listener, greeting, true)
    }

    fn serve(listener: TcpListener, greeting: Vec<String>, close_first: bool) -> Self {
        let addr = listener.local_addr().unwrap();
        let messages: Arc<Mutex<VecDeque<String>>> = Arc::new(Mutex::new(VecDeque::new()));
        let connections: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let greeting = Arc::new(greeting);

        let messages_clone = messages.clone();
        let connections_clone = connections.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        tokio::spawn(handle_connection(
                            stream,
                            greeting.clone(),
                            close_first,
                            messages_clone.clone(),
                            connections_clone.clone(),
                        ));
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            messages,
            connections,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Number of accepted TCP connections.
    pub async fn connection_count(&self) -> u32 {
        *self.connections.lock().await
    }

    /// Text frames received from clients.
    pub async fn received_messages(&self) -> Vec<String> {
        self.messages.lock().await.iter().cloned().collect()
    }

    /// Stop accepting new connections.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// A free local address with nothing listening on it.
pub async fn reserve_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// A ws:// URL on which nothing is listening.
pub async fn unreachable_url() -> String {
    format!("ws://{}", reserve_addr().await)
}

async fn handle_connection(
    stream: TcpStream,
    greeting: Arc<Vec<String>>,
    close_first: bool,
    messages: Arc<Mutex<VecDeque<String>>>,
    connections: Arc<Mutex<u32>>,
) {
    let index = {
        let mut count = connections.lock().await;
        *count += 1;
        *count
    };

    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();

    for frame in greeting.iter() {
        if write.send(Message::Text(frame.clone())).await.is_err() {
            return;
        }
    }

    if close_first && index == 1 {
        let _ = write.send(Message::Close(None)).await;
    }

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                messages.lock().await.push_back(text);
            }
            Ok(Message::Ping(data)) => {
                let _ = write.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_starts() {
        let server = MockWsServer::start().await;
        assert!(server.url().starts_with("ws://127.0.0.1:"));
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_on_reserved_addr() {
        let addr = reserve_addr().await;
        let server = MockWsServer::start_on(addr, Vec::new()).await;
        assert_eq!(server.url(), format!("ws://{addr}"));
        server.shutdown().await;
    }
}
