//! In-process obs-websocket stand-in for tests.
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::frame::coding::{CloseCode, Data, OpCode as WsOpCode};
use tokio_tungstenite::tungstenite::protocol::frame::Frame as WsFrame;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

use super::auth::auth_response;
use super::{ControlSettings, DEFAULT_START_REQUEST, DEFAULT_STOP_REQUEST};

pub const TEST_PASSWORD: &str = "hunter2";
pub const SALT: &str = "c2FsdA==";
pub const CHALLENGE: &str = "Y2hhbGxlbmdl";
pub const TEST_TIMEOUT: Duration = Duration::from_millis(300);

/// Answered with `result: false, code: 604`.
pub const FAILING_REQUEST: &str = "StartRecordingThatFails";
/// Answered with `result: false, code: 500` (output already running).
pub const ALREADY_RUNNING_REQUEST: &str = "StartStream";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Normal handshake, answers every request.
    Accept,
    /// Sends Hello, reads Identify, then never answers.
    NeverIdentify,
    /// Replies to Identify with an event instead of Identified.
    WrongFrame,
    /// Sends Hello split across two WebSocket frames.
    FragmentedHello,
    /// Precedes every response with an event and a response to another id.
    Noisy,
    /// Identifies, records requests, never answers them.
    IgnoreRequests,
}

#[derive(Default)]
struct ServerLog {
    identifies: usize,
    requests: Vec<String>,
}

pub struct FakeObs {
    port: u16,
    log: Arc<Mutex<ServerLog>>,
}

impl FakeObs {
    pub fn settings(&self, password: Option<&str>) -> ControlSettings {
        settings_for(self.port, password)
    }

    pub fn requests(&self) -> Vec<String> {
        self.log.lock().unwrap().requests.clone()
    }

    pub fn identify_count(&self) -> usize {
        self.log.lock().unwrap().identifies
    }
}

pub fn settings_for(port: u16, password: Option<&str>) -> ControlSettings {
    ControlSettings {
        host: "127.0.0.1".into(),
        port,
        password: password.map(|p| SecretString::from(p.to_string())),
        timeout: TEST_TIMEOUT,
        start_request: DEFAULT_START_REQUEST.into(),
        stop_request: DEFAULT_STOP_REQUEST.into(),
    }
}

/// Settings pointing at a port nothing listens on.
pub fn unused_port_settings() -> ControlSettings {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    settings_for(port, None)
}

/// Binds to an ephemeral port and serves connections until the runtime shuts down.
pub async fn spawn(password: Option<&str>, behavior: Behavior) -> FakeObs {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let log = Arc::new(Mutex::new(ServerLog::default()));
    let password = password.map(str::to_string);

    {
        let log = Arc::clone(&log);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, password.clone(), behavior, Arc::clone(&log)));
            }
        });
    }

    FakeObs { port, log }
}

async fn serve(
    stream: TcpStream,
    password: Option<String>,
    behavior: Behavior,
    log: Arc<Mutex<ServerLog>>,
) {
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };

    let mut hello = json!({"obsWebSocketVersion": "5.4.2", "rpcVersion": 1});
    if password.is_some() {
        hello["authentication"] = json!({"challenge": CHALLENGE, "salt": SALT});
    }
    let hello = json!({"op": 0, "d": hello}).to_string();

    if behavior == Behavior::FragmentedHello {
        let bytes = hello.into_bytes();
        let (head, tail) = bytes.split_at(bytes.len() / 2);
        let first = WsFrame::message(head.to_vec(), WsOpCode::Data(Data::Text), false);
        let rest = WsFrame::message(tail.to_vec(), WsOpCode::Data(Data::Continue), true);
        if ws.send(Message::Frame(first)).await.is_err()
            || ws.send(Message::Frame(rest)).await.is_err()
        {
            return;
        }
    } else if ws.send(Message::Text(hello)).await.is_err() {
        return;
    }

    let Some(identify) = next_json(&mut ws).await else {
        return;
    };
    log.lock().unwrap().identifies += 1;

    if let Some(password) = &password {
        let expected = auth_response(&SecretString::from(password.clone()), SALT, CHALLENGE);
        if identify["d"]["authentication"].as_str() != Some(expected.as_str()) {
            let _ = ws
                .close(Some(CloseFrame {
                    code: CloseCode::from(4009),
                    reason: "Authentication failed.".into(),
                }))
                .await;
            return;
        }
    }

    match behavior {
        Behavior::NeverIdentify => {
            while next_json(&mut ws).await.is_some() {}
            return;
        }
        Behavior::WrongFrame => {
            let event = json!({"op": 5, "d": {"eventType": "ExitStarted", "eventIntent": 1}});
            let _ = ws.send(Message::Text(event.to_string())).await;
            while next_json(&mut ws).await.is_some() {}
            return;
        }
        _ => {}
    }

    let identified = json!({"op": 2, "d": {"negotiatedRpcVersion": 1}});
    if ws.send(Message::Text(identified.to_string())).await.is_err() {
        return;
    }

    while let Some(request) = next_json(&mut ws).await {
        if request["op"] != 6 {
            continue;
        }
        let request_type = request["d"]["requestType"].as_str().unwrap_or_default().to_string();
        let request_id = request["d"]["requestId"].as_str().unwrap_or_default().to_string();
        log.lock().unwrap().requests.push(request_type.clone());

        if behavior == Behavior::IgnoreRequests {
            continue;
        }
        if behavior == Behavior::Noisy {
            let event = json!({"op": 5, "d": {"eventType": "ReplayBufferStateChanged", "eventIntent": 64}});
            let other = response(&request_type, "someone-else", true, 100, None);
            let _ = ws.send(Message::Text(event.to_string())).await;
            let _ = ws.send(Message::Text(other.to_string())).await;
        }

        let reply = match request_type.as_str() {
            FAILING_REQUEST => response(
                &request_type,
                &request_id,
                false,
                604,
                Some("Replay buffer is not enabled."),
            ),
            ALREADY_RUNNING_REQUEST => response(&request_type, &request_id, false, 500, None),
            _ => response(&request_type, &request_id, true, 100, None),
        };
        if ws.send(Message::Text(reply.to_string())).await.is_err() {
            return;
        }
    }
}

fn response(request_type: &str, request_id: &str, result: bool, code: u32, comment: Option<&str>) -> Value {
    let mut status = json!({"result": result, "code": code});
    if let Some(comment) = comment {
        status["comment"] = json!(comment);
    }
    json!({"op": 7, "d": {
        "requestType": request_type,
        "requestId": request_id,
        "requestStatus": status,
    }})
}

async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Option<Value> {
    loop {
        match ws.next().await? {
            Ok(Message::Text(text)) => return serde_json::from_str(&text).ok(),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}
