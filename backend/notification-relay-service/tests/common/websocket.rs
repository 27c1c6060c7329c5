//! Real WebSocket client against an in-process server.
//!
//! The server runs the production routes on an ephemeral port, so frames go
//! through the actix-ws transport exactly as a browser's would.

use actix_web::{web, App, HttpServer};
use futures_util::{SinkExt, StreamExt};
use notification_relay_service::handlers;
use notification_relay_service::AppState;
use serde_json::{json, Value};
use std::net::{SocketAddr, TcpListener};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::tungstenite::http::Request;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const WAIT: Duration = Duration::from_secs(5);

/// Serve the relay on `127.0.0.1:<random>`; must run inside an actix system.
pub fn start_server(state: AppState) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Failed to read listener address");

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(handlers::register_routes)
    })
    .workers(1)
    .listen(listener)
    .expect("Failed to listen")
    .run();
    actix_web::rt::spawn(server);

    addr
}

pub struct WebSocketClient {
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WebSocketClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        Self::connect_with_cookies(addr, None).await
    }

    pub async fn connect_with_cookies(addr: SocketAddr, cookies: Option<&str>) -> Self {
        let mut request = Request::builder()
            .uri(format!("ws://{}/io/user/notifications", addr))
            .header("Host", addr.to_string())
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .header("Sec-WebSocket-Key", generate_key());
        if let Some(cookies) = cookies {
            request = request.header("Cookie", cookies);
        }
        let request = request.body(()).expect("Failed to build request");

        let (ws_stream, _) = connect_async(request)
            .await
            .expect("WebSocket handshake failed");
        Self { ws_stream }
    }

    pub async fn send_text(&mut self, text: &str) {
        self.ws_stream
            .send(Message::text(text.to_string()))
            .await
            .expect("Failed to send text frame");
    }

    pub async fn send_binary(&mut self, bytes: Vec<u8>) {
        self.ws_stream
            .send(Message::binary(bytes))
            .await
            .expect("Failed to send binary frame");
    }

    pub async fn subscribe(&mut self, uuid: &str) {
        let frame = json!({"event": "subscribe-to-notifications", "data": {"uuid": uuid}});
        self.send_text(&frame.to_string()).await;
    }

    pub async fn subscribe_by_cookies(&mut self) {
        self.send_text(r#"{"event":"subscribe-to-notifications-by-cookies"}"#)
            .await;
    }

    /// Next text frame as JSON; control frames are skipped.
    pub async fn next_json(&mut self) -> Value {
        loop {
            let msg = timeout(WAIT, self.ws_stream.next())
                .await
                .expect("timed out waiting for a frame")
                .expect("connection closed")
                .expect("WebSocket error");
            if msg.is_text() {
                let text = msg.to_text().expect("text frame is not UTF-8");
                return serde_json::from_str(text).expect("server sent invalid JSON");
            }
            if let Message::Close(frame) = msg {
                panic!("server closed the connection: {:?}", frame);
            }
        }
    }

    /// Close code of the server's close frame, skipping anything before it.
    pub async fn close_code(&mut self) -> Option<u16> {
        loop {
            let msg = timeout(WAIT, self.ws_stream.next())
                .await
                .expect("timed out waiting for close")?;
            match msg {
                Ok(Message::Close(frame)) => return frame.map(|f| u16::from(f.code)),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    }

    pub async fn close(mut self) {
        self.ws_stream
            .close(None)
            .await
            .expect("Failed to send close frame");
    }
}

pub fn assert_subscription_ok(frame: &Value) {
    assert_eq!(frame["event"], "internal", "unexpected frame: {}", frame);
    assert_eq!(frame["data"]["type"], "success");
    assert_eq!(frame["data"]["code"], "SUBSCRIPTION_OK");
}

pub fn assert_error_code(frame: &Value, code: &str) {
    assert_eq!(frame["event"], "internal", "unexpected frame: {}", frame);
    assert_eq!(frame["data"]["type"], "error");
    assert_eq!(frame["data"]["code"], code);
}
