use futures::{SinkExt, StreamExt};
use secrecy::SecretString;
use tokio::net::TcpStream;
use tokio::time::{self, Duration};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};
use uuid::Uuid;

use super::auth::auth_response;
use super::protocol::{
    Frame, Hello, Identified, Identify, OpCode, Request, RequestResponse, RequestStatus,
    RPC_VERSION,
};
use super::{ControlError, ControlSettings};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An identified connection to the streaming tool.
///
/// Only constructed through [`ControlClient::connect`], so holding one means the
/// handshake succeeded. Dropping it closes the TCP connection.
pub struct ControlClient {
    socket: Socket,
    timeout: Duration,
    rpc_version: u32,
}

impl ControlClient {
    /// Connects and runs the Hello / Identify / Identified handshake.
    ///
    /// Any failure (refused connection, wrong frame, rejected password, or no
    /// reply within `settings.timeout`) discards the socket. There is no retry.
    pub async fn connect(settings: &ControlSettings) -> Result<Self, ControlError> {
        let url = settings.url();
        let (socket, _) = time::timeout(settings.timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| ControlError::Timeout {
                after: settings.timeout,
                waiting_for: "connection",
            })?
            .map_err(|e| ControlError::Connect {
                url: url.clone(),
                source: Box::new(e),
            })?;

        let mut client = Self {
            socket,
            timeout: settings.timeout,
            rpc_version: RPC_VERSION,
        };
        client.identify(settings.password.as_ref()).await?;
        info!("[control] Identified with {url} (rpc v{})", client.rpc_version);
        Ok(client)
    }

    async fn identify(&mut self, password: Option<&SecretString>) -> Result<(), ControlError> {
        let hello: Hello = self.expect(OpCode::Hello, "Hello").await?;
        debug!(
            "[control] Hello from server {} (rpc v{})",
            hello.obs_web_socket_version.as_deref().unwrap_or("unknown"),
            hello.rpc_version
        );

        let authentication = match &hello.authentication {
            Some(challenge) => {
                let password = password.ok_or(ControlError::PasswordRequired)?;
                Some(auth_response(password, &challenge.salt, &challenge.challenge))
            }
            None => None,
        };

        let identify = Identify {
            rpc_version: hello.rpc_version.min(RPC_VERSION),
            authentication,
            event_subscriptions: 0,
        };
        self.send(&Frame::new(OpCode::Identify, &identify)?).await?;

        let identified: Identified = self.expect(OpCode::Identified, "Identified").await?;
        self.rpc_version = identified.negotiated_rpc_version;
        Ok(())
    }

    /// Sends a parameterless request and waits for its matching response.
    ///
    /// Events and responses to other request ids are skipped while waiting.
    /// Fails if the server reports an unsatisfied status or nothing matching
    /// arrives within the timeout.
    pub async fn request(&mut self, request_type: &str) -> Result<RequestStatus, ControlError> {
        let request = Request {
            request_type: request_type.to_string(),
            request_id: Uuid::new_v4().to_string(),
            request_data: None,
        };
        self.send(&Frame::new(OpCode::Request, &request)?).await?;

        let response = time::timeout(self.timeout, self.await_response(&request.request_id))
            .await
            .map_err(|_| ControlError::Timeout {
                after: self.timeout,
                waiting_for: "request response",
            })??;

        let status = response.request_status;
        if status.is_satisfied() {
            debug!("[control] {request_type} -> {}", status.code);
            Ok(status)
        } else {
            Err(ControlError::RequestFailed {
                request_type: request.request_type,
                code: status.code,
                comment: status.comment,
            })
        }
    }

    /// Sends a close frame and drops the connection. Errors are ignored; the
    /// socket is gone either way.
    pub async fn close(mut self) {
        let _ = time::timeout(self.timeout, self.socket.close(None)).await;
    }

    async fn await_response(&mut self, request_id: &str) -> Result<RequestResponse, ControlError> {
        loop {
            let frame = self.read_frame().await?;
            match frame.op_code() {
                Some(OpCode::RequestResponse) => {
                    let response: RequestResponse = frame.decode()?;
                    if response.request_id == request_id {
                        return Ok(response);
                    }
                    debug!("[control] Skipping response to request {}", response.request_id);
                }
                Some(OpCode::Event) => {}
                _ => debug!("[control] Ignoring op {} while awaiting response", frame.op),
            }
        }
    }

    async fn expect<T: serde::de::DeserializeOwned>(
        &mut self,
        op: OpCode,
        waiting_for: &'static str,
    ) -> Result<T, ControlError> {
        let frame = time::timeout(self.timeout, self.read_frame())
            .await
            .map_err(|_| ControlError::Timeout {
                after: self.timeout,
                waiting_for,
            })??;
        if frame.op != op.code() {
            return Err(ControlError::UnexpectedFrame {
                expected: op,
                received: frame.op,
            });
        }
        Ok(frame.decode()?)
    }

    /// Reads the next complete text message. Fragmented messages are
    /// reassembled by the WebSocket layer before they surface here.
    async fn read_frame(&mut self) -> Result<Frame, ControlError> {
        loop {
            match self.socket.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Frame::parse(&text)?),
                Some(Ok(Message::Close(close))) => {
                    return Err(ControlError::Closed(close.map(|c| {
                        format!("{} {}", u16::from(c.code), c.reason)
                    })))
                }
                Some(Ok(Message::Binary(_))) => return Err(ControlError::NonTextMessage),
                // Ping/pong are answered by tungstenite itself.
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Err(ControlError::Closed(None)),
            }
        }
    }

    async fn send(&mut self, frame: &Frame) -> Result<(), ControlError> {
        let text = frame.to_json()?;
        time::timeout(self.timeout, self.socket.send(Message::Text(text)))
            .await
            .map_err(|_| ControlError::Timeout {
                after: self.timeout,
                waiting_for: "send",
            })??;
        Ok(())
    }
}
