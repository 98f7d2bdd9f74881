// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/machinaear-agent

//! Fakes shared by the unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::backend::{Backend, BackendError, PairingResult, RegistrationResult, StatusUpdate};
use crate::db::DeviceCredentials;
use crate::net::Connectivity;
use crate::sensors::{Sample, SoundSensor};

/// Answers exactly one HTTP request with a canned response and keeps the raw request
pub struct OneShotServer {
    addr: std::net::SocketAddr,
    request_rx: tokio::sync::Mutex<Option<oneshot::Receiver<String>>>,
}

impl OneShotServer {
    pub async fn start(status: u16, body: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            let _ = tx.send(request);
        });

        Self {
            addr,
            request_rx: tokio::sync::Mutex::new(Some(rx)),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn request(&self) -> String {
        let rx = self.request_rx.lock().await.take().expect("request already taken");
        rx.await.expect("server task dropped")
    }
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf).to_string();
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }

    String::from_utf8_lossy(&buf).to_string()
}

/// Scripted backend that records every call
#[derive(Default)]
pub struct FakeBackend {
    pub pairing_responses: Mutex<VecDeque<Result<Option<PairingResult>, BackendError>>>,
    pub status_failures: Mutex<VecDeque<bool>>,
    pub fail_registration: AtomicBool,
    pub register_calls: AtomicUsize,
    pub check_calls: AtomicUsize,
    pub sent: Mutex<Vec<(DeviceCredentials, StatusUpdate)>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_pairing(&self, response: Result<Option<PairingResult>, BackendError>) {
        self.pairing_responses.lock().push_back(response);
    }

    /// Outcomes for the next `send_status` calls, true meaning failure
    pub fn script_status_failures(&self, failures: &[bool]) {
        self.status_failures.lock().extend(failures.iter().copied());
    }

    pub fn status_calls(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn network_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
            + self.check_calls.load(Ordering::SeqCst)
            + self.status_calls()
    }
}

pub fn paired(device_id: &str, device_token: &str) -> PairingResult {
    PairingResult {
        device_id: device_id.to_string(),
        device_token: device_token.to_string(),
        name: None,
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn register_pending(
        &self,
        pairing_code: &str,
        _mac: &str,
        _hostname: &str,
    ) -> Result<RegistrationResult, BackendError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_registration.load(Ordering::SeqCst) {
            return Err(BackendError::Status { status: 503, body: "unavailable".to_string() });
        }
        Ok(RegistrationResult {
            payload: serde_json::json!({ "pairingCode": pairing_code }),
        })
    }

    async fn check_pairing(&self, _pairing_code: &str) -> Result<Option<PairingResult>, BackendError> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        self.pairing_responses.lock().pop_front().unwrap_or(Ok(None))
    }

    async fn send_status(
        &self,
        credentials: &DeviceCredentials,
        update: &StatusUpdate,
    ) -> Result<(), BackendError> {
        self.sent.lock().push((credentials.clone(), update.clone()));
        if self.status_failures.lock().pop_front().unwrap_or(false) {
            return Err(BackendError::Status { status: 500, body: "boom".to_string() });
        }
        Ok(())
    }
}

/// Connectivity probe with a switchable answer
pub struct FakeConnectivity {
    online: AtomicBool,
    pub probes: AtomicUsize,
}

impl FakeConnectivity {
    pub fn new(online: bool) -> Arc<Self> {
        Arc::new(Self {
            online: AtomicBool::new(online),
            probes: AtomicUsize::new(0),
        })
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connectivity for FakeConnectivity {
    async fn is_online(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.online.load(Ordering::SeqCst)
    }
}

/// Sensor that replays a fixed list of outcomes, then repeats the last one
pub struct ScriptedSensor {
    script: VecDeque<Result<Sample>>,
    last: Sample,
}

impl ScriptedSensor {
    pub fn new(script: Vec<Result<Sample>>) -> Self {
        Self {
            script: script.into(),
            last: Sample::neutral(),
        }
    }

    pub fn constant(sample: Sample) -> Self {
        Self {
            script: VecDeque::new(),
            last: sample,
        }
    }

    pub fn failure(message: &str) -> Result<Sample> {
        Err(anyhow!(message.to_string()))
    }
}

#[async_trait]
impl SoundSensor for ScriptedSensor {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn sample(&mut self) -> Result<Sample> {
        match self.script.pop_front() {
            Some(Ok(sample)) => {
                self.last = sample.clone();
                Ok(sample)
            }
            Some(Err(e)) => Err(e),
            None => Ok(self.last.clone()),
        }
    }
}
