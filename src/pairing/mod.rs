// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/machinaear-agent

//! Pairing state machine: Unpaired → PendingRegistration → Paired
//!
//! The only writer of the device credentials. Polling cadence belongs to
//! the caller.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use rand::prelude::*;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::db::{Database, DeviceCredentials, StoreError, KEY_PAIRING_CODE};

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const PAIRING_CODE_LEN: usize = 6;

/// Lifecycle of the device identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PairingState {
    Unpaired,
    PendingRegistration,
    Paired,
}

impl std::fmt::Display for PairingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PairingState::Unpaired => write!(f, "Unpaired"),
            PairingState::PendingRegistration => write!(f, "PendingRegistration"),
            PairingState::Paired => write!(f, "Paired"),
        }
    }
}

/// Hardware facts sent with a registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub mac_address: String,
    pub hostname: String,
}

impl DeviceIdentity {
    pub fn detect() -> Self {
        let hostname = hostname();
        Self {
            mac_address: mac_address(&hostname),
            hostname,
        }
    }
}

/// Random code from `[A-Z0-9]`
pub fn generate_pairing_code() -> String {
    let mut rng = thread_rng();
    (0..PAIRING_CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

pub fn hostname() -> String {
    sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string())
}

/// First non-zero interface MAC, else a stable pseudo-MAC
pub fn mac_address(hostname: &str) -> String {
    hardware_mac(Path::new("/sys/class/net")).unwrap_or_else(|| {
        let machine_id = fs::read_to_string("/etc/machine-id").unwrap_or_default();
        pseudo_mac(machine_id.trim(), hostname)
    })
}

fn hardware_mac(net_root: &Path) -> Option<String> {
    let mut interfaces: Vec<_> = fs::read_dir(net_root)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.file_name().is_some_and(|name| name != "lo"))
        .collect();
    interfaces.sort();

    interfaces.iter().find_map(|iface| {
        let address = fs::read_to_string(iface.join("address")).ok()?;
        let address = address.trim().to_uppercase();
        let valid = address.len() == 17 && address.split(':').all(|b| b.len() == 2);
        (valid && address != "00:00:00:00:00:00").then_some(address)
    })
}

/// Locally administered unicast address derived from the inputs
pub fn pseudo_mac(machine_id: &str, hostname: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(machine_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(hostname.as_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 6];
    bytes.copy_from_slice(&digest[..6]);
    bytes[0] = (bytes[0] & 0xfe) | 0x02;

    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

pub struct PairingMachine {
    store: Arc<Database>,
    backend: Arc<dyn Backend>,
    identity: DeviceIdentity,
    state: PairingState,
    credentials: Option<DeviceCredentials>,
    pairing_code: Option<String>,
}

impl PairingMachine {
    /// Restore from the store. Persisted credentials mean Paired.
    pub fn load(
        store: Arc<Database>,
        backend: Arc<dyn Backend>,
        identity: DeviceIdentity,
    ) -> Result<Self, StoreError> {
        let credentials = store.load_credentials()?;
        let pairing_code = store.get(KEY_PAIRING_CODE)?;
        let state = if credentials.is_some() {
            PairingState::Paired
        } else {
            PairingState::Unpaired
        };

        Ok(Self {
            store,
            backend,
            identity,
            state,
            credentials,
            pairing_code,
        })
    }

    pub fn state(&self) -> PairingState {
        self.state
    }

    pub fn is_paired(&self) -> bool {
        self.state == PairingState::Paired
    }

    pub fn credentials(&self) -> Option<&DeviceCredentials> {
        self.credentials.as_ref()
    }

    pub fn pairing_code(&self) -> Option<&str> {
        self.pairing_code.as_deref()
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Unpaired → PendingRegistration. Registration failure does not block
    /// the transition. Returns the active code, or `None` when already paired.
    pub async fn start_pairing(&mut self) -> Result<Option<String>, StoreError> {
        match self.state {
            PairingState::Paired => return Ok(None),
            PairingState::PendingRegistration => return Ok(self.pairing_code.clone()),
            PairingState::Unpaired => {}
        }

        let code = match self.pairing_code.clone() {
            Some(code) => code,
            None => {
                let code = generate_pairing_code();
                self.store.set(KEY_PAIRING_CODE, &code)?;
                code
            }
        };
        self.pairing_code = Some(code.clone());

        self.register(&code).await;
        self.state = PairingState::PendingRegistration;

        info!("Pairing code: {} (state {})", code, self.state);
        Ok(Some(code))
    }

    /// Re-announce the stored code while pending. Registration is idempotent.
    pub async fn register_again(&mut self) -> bool {
        if self.state != PairingState::PendingRegistration {
            return false;
        }
        match self.pairing_code.clone() {
            Some(code) => self.register(&code).await,
            None => false,
        }
    }

    async fn register(&self, code: &str) -> bool {
        match self
            .backend
            .register_pending(code, &self.identity.mac_address, &self.identity.hostname)
            .await
        {
            Ok(result) => {
                debug!("Registration accepted: {}", result.payload);
                true
            }
            Err(e) => {
                warn!("Registration of pairing code failed: {}", e);
                false
            }
        }
    }

    /// One pairing check. `true` once paired; a paired machine never
    /// contacts the backend again.
    pub async fn poll_pairing(&mut self) -> Result<bool, StoreError> {
        match self.state {
            PairingState::Paired => return Ok(true),
            PairingState::Unpaired => return Ok(false),
            PairingState::PendingRegistration => {}
        }

        let Some(code) = self.pairing_code.clone() else {
            return Ok(false);
        };

        let result = match self.backend.check_pairing(&code).await {
            Ok(Some(result)) => result,
            Ok(None) => {
                debug!("Pairing code {} not claimed yet", code);
                return Ok(false);
            }
            Err(e) => {
                debug!("Pairing check failed: {}", e);
                return Ok(false);
            }
        };

        let credentials = DeviceCredentials {
            device_id: result.device_id,
            device_token: result.device_token,
        };
        self.store.save_credentials(&credentials)?;

        info!(
            "Device paired as {}{}",
            credentials.device_id,
            result.name.map(|n| format!(" ({})", n)).unwrap_or_default()
        );
        self.credentials = Some(credentials);
        self.state = PairingState::Paired;
        Ok(true)
    }

    /// Forget the identity. Events are kept.
    pub fn reset(&mut self) -> Result<(), StoreError> {
        self.store.clear_identity()?;
        self.credentials = None;
        self.pairing_code = None;
        self.state = PairingState::Unpaired;
        info!("Device identity reset");
        Ok(())
    }
}
