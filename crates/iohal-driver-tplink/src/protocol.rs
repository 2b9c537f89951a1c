//! TP-Link smart home protocol.
//!
//! Each command is one TCP exchange: a 4-byte big-endian length followed by the JSON
//! payload obfuscated with an XOR autokey cipher (initial key `0xAB`, each ciphertext byte
//! keys the next). Replies use the same framing. The cipher is obfuscation only.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;

use iohal_core::network::io_error;
use iohal_core::{Dialer, Result, TransportError};
use tracing::{debug, instrument};

/// Initial autokey.
pub const INITIAL_KEY: u8 = 0xAB;

/// Connect, read and write timeout for one exchange.
pub const TIMEOUT: Duration = Duration::from_secs(2);

/// Largest reply accepted.
const MAX_REPLY: usize = 64 * 1024;

/// Obfuscate a plaintext payload.
pub fn encrypt(plain: &[u8]) -> Vec<u8> {
    let mut key = INITIAL_KEY;
    plain
        .iter()
        .map(|b| {
            key ^= b;
            key
        })
        .collect()
}

/// Recover a plaintext payload.
pub fn decrypt(cipher: &[u8]) -> Vec<u8> {
    let mut key = INITIAL_KEY;
    cipher
        .iter()
        .map(|b| {
            let plain = b ^ key;
            key = *b;
            plain
        })
        .collect()
}

/// Length-prefixed, encrypted frame.
pub fn frame(plain: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(plain.len() + 4);
    out.extend_from_slice(&(plain.len() as u32).to_be_bytes());
    out.extend_from_slice(&encrypt(plain));
    out
}

/// `get_sysinfo` reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SysInfo {
    /// User-assigned name.
    pub alias: String,
    /// Firmware version.
    #[serde(rename = "sw_ver")]
    pub software_version: String,
    /// Hardware revision.
    #[serde(rename = "hw_ver")]
    pub hardware_version: String,
    /// Model string, e.g. `HS110(EU)`.
    pub model: String,
    /// Device id.
    #[serde(rename = "deviceId")]
    pub device_id: String,
    /// Wi-Fi signal strength.
    pub rssi: f64,
    /// 1 when the relay is closed.
    pub relay_state: i32,
    /// Seconds since the relay last closed.
    pub on_time: i64,
    /// 1 when the status LED is disabled.
    pub led_off: i32,
    /// Non-zero on device-side failure.
    pub err_code: i32,
}

/// `emeter.get_realtime` reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Realtime {
    /// Amperes.
    pub current: f64,
    /// Volts.
    pub voltage: f64,
    /// Watts.
    pub power: f64,
    /// Kilowatt hours.
    pub total: f64,
    /// Non-zero on device-side failure.
    pub err_code: i32,
}

#[derive(Deserialize)]
struct SysInfoReply {
    system: SysInfoSystem,
}

#[derive(Deserialize)]
struct SysInfoSystem {
    get_sysinfo: SysInfo,
}

#[derive(Deserialize)]
struct RealtimeReply {
    emeter: RealtimeEmeter,
}

#[derive(Deserialize)]
struct RealtimeEmeter {
    get_realtime: Realtime,
}

/// Command channel to one plug.
#[derive(Clone)]
pub struct PlugClient {
    dialer: Arc<dyn Dialer>,
    address: String,
}

impl PlugClient {
    /// Client for the plug at `address` (`host:port`).
    pub fn new(dialer: Arc<dyn Dialer>, address: impl Into<String>) -> Self {
        Self {
            dialer,
            address: address.into(),
        }
    }

    /// Plug address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Switch the relay.
    pub fn set_relay(&self, on: bool) -> Result<()> {
        let command = serde_json::json!({
            "system": { "set_relay_state": { "state": u8::from(on) } }
        });
        self.exchange(&command, false)?;
        Ok(())
    }

    /// Device information.
    pub fn sysinfo(&self) -> Result<SysInfo> {
        let command = serde_json::json!({ "system": { "get_sysinfo": {} } });
        let reply: SysInfoReply = self.query(&command)?;
        Ok(reply.system.get_sysinfo)
    }

    /// Energy meter reading (HS110 only).
    pub fn realtime(&self) -> Result<Realtime> {
        let command = serde_json::json!({ "emeter": { "get_realtime": {} } });
        let reply: RealtimeReply = self.query(&command)?;
        Ok(reply.emeter.get_realtime)
    }

    fn query<T: DeserializeOwned>(&self, command: &serde_json::Value) -> Result<T> {
        let reply = self.exchange(command, true)?;
        let parsed = serde_json::from_slice(&reply)
            .map_err(|e| TransportError::Protocol(format!("invalid reply: {e}")))?;
        Ok(parsed)
    }

    #[instrument(skip(self, command), fields(address = %self.address))]
    fn exchange(&self, command: &serde_json::Value, expect_reply: bool) -> Result<Vec<u8>> {
        let payload = serde_json::to_vec(command)
            .map_err(|e| TransportError::Protocol(format!("cannot encode command: {e}")))?;

        let mut conn = self.dialer.dial(&self.address, TIMEOUT)?;
        conn.write_all(&frame(&payload))
            .and_then(|()| conn.flush())
            .map_err(|e| io_error(e, TIMEOUT))?;
        debug!(bytes = payload.len(), "command sent");

        if !expect_reply {
            return Ok(Vec::new());
        }

        let mut header = [0u8; 4];
        conn.read_exact(&mut header)
            .map_err(|e| io_error(e, TIMEOUT))?;
        let len = u32::from_be_bytes(header) as usize;
        if len > MAX_REPLY {
            return Err(TransportError::Protocol(format!("reply of {len} bytes is too large")).into());
        }

        let mut body = vec![0u8; len];
        conn.read_exact(&mut body)
            .map_err(|e| io_error(e, TIMEOUT))?;
        debug!(bytes = len, "reply received");
        Ok(decrypt(&body))
    }
}
