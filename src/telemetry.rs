//! FTMS "Indoor Bike Data" (0x2AD2) decoding
//!
//! Payload layout, little-endian:
//! - flags: u16
//! - instantaneous speed: u16, 0.01 km/h (always present on the wire)
//! - optional fields in protocol order, each gated by a flag bit
//!
//! Only cadence, power and heart rate are extracted; other flag bits are
//! ignored.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::trace;

/// Bit 2: instantaneous cadence present
pub const FLAG_CADENCE: u16 = 0x0004;
/// Bit 6: instantaneous power present
pub const FLAG_POWER: u16 = 0x0040;
/// Bit 9: heart rate present
pub const FLAG_HEART_RATE: u16 = 0x0200;

/// Flags + speed
const MIN_FRAME_LEN: usize = 4;

/// One decoded telemetry frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BikeMetrics {
    /// Speed in km/h
    pub speed_kph: Option<f64>,
    /// Cadence in rpm
    pub cadence_rpm: Option<f64>,
    /// Instantaneous power in watts
    pub power_watts: Option<i16>,
    /// Heart rate in bpm; a raw 0 means "no sensor" and decodes to `None`
    pub heart_rate_bpm: Option<u8>,
}

/// Bounds-checked little-endian reader over a frame
struct FrameCursor<'a> {
    data: &'a [u8],
    index: usize,
}

impl<'a> FrameCursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, index: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.index)
    }

    fn read_u8(&mut self) -> Option<u8> {
        let value = *self.data.get(self.index)?;
        self.index += 1;
        Some(value)
    }

    fn read_u16(&mut self) -> Option<u16> {
        let bytes = self.data.get(self.index..self.index + 2)?;
        self.index += 2;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read_i16(&mut self) -> Option<i16> {
        self.read_u16().map(|raw| raw as i16)
    }
}

/// Decode an Indoor Bike Data frame.
///
/// Returns `None` when the frame is shorter than the mandatory flags + speed
/// prefix. Optional fields whose flag is set but whose bytes are missing are
/// left absent.
pub fn decode(data: &[u8]) -> Option<BikeMetrics> {
    if data.len() < MIN_FRAME_LEN {
        return None;
    }

    let mut cursor = FrameCursor::new(data);
    let flags = cursor.read_u16()?;
    let raw_speed = cursor.read_u16()?;

    let mut metrics = BikeMetrics {
        speed_kph: Some(f64::from(raw_speed) / 100.0),
        ..BikeMetrics::default()
    };

    if flags & FLAG_CADENCE != 0 && cursor.remaining() >= 2 {
        metrics.cadence_rpm = cursor.read_u16().map(|raw| f64::from(raw) / 2.0);
    }

    if flags & FLAG_POWER != 0 && cursor.remaining() >= 2 {
        metrics.power_watts = cursor.read_i16();
    }

    if flags & FLAG_HEART_RATE != 0 && cursor.remaining() >= 1 {
        metrics.heart_rate_bpm = cursor.read_u8().filter(|&bpm| bpm != 0);
    }

    Some(metrics)
}

/// Telemetry link state as reported by the device layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    #[default]
    Idle,
    Scanning,
    Connecting,
    Connected,
    Unauthorized,
    PoweredOff,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "Not connected"),
            ConnectionState::Scanning => write!(f, "Scanning…"),
            ConnectionState::Connecting => write!(f, "Connecting…"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Unauthorized => write!(f, "Bluetooth permission denied"),
            ConnectionState::PoweredOff => write!(f, "Bluetooth is off"),
        }
    }
}

#[derive(Debug, Default)]
struct LiveState {
    metrics: Option<BikeMetrics>,
    connection: ConnectionState,
}

/// Latest decoded metrics, shared between the device callback thread and
/// whoever polls for readings.
#[derive(Debug, Clone, Default)]
pub struct LiveMetrics {
    inner: Arc<RwLock<LiveState>>,
}

impl LiveMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a frame and supersede the previous snapshot. Malformed frames
    /// leave the previous snapshot in place.
    pub fn ingest_frame(&self, data: &[u8]) -> Option<BikeMetrics> {
        let Some(metrics) = decode(data) else {
            trace!(len = data.len(), "Skipping short telemetry frame");
            return None;
        };

        if let Ok(mut state) = self.inner.write() {
            state.metrics = Some(metrics);
        }
        Some(metrics)
    }

    pub fn set_connection_state(&self, connection: ConnectionState) {
        if let Ok(mut state) = self.inner.write() {
            if state.connection != connection {
                trace!(from = ?state.connection, to = ?connection, "Telemetry connection state changed");
            }
            state.connection = connection;
            if !connection.is_connected() {
                state.metrics = None;
            }
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner
            .read()
            .map(|state| state.connection)
            .unwrap_or_default()
    }

    pub fn latest(&self) -> Option<BikeMetrics> {
        self.inner.read().ok().and_then(|state| state.metrics)
    }

    /// Latest power reading, only while the device is connected
    pub fn current_power(&self) -> Option<i32> {
        let state = self.inner.read().ok()?;
        if !state.connection.is_connected() {
            return None;
        }
        state.metrics?.power_watts.map(i32::from)
    }

    /// Accessor for [`crate::playback::PlaybackEngine::set_average_source`]
    pub fn power_source(&self) -> crate::playback::ReadingSource {
        let live = self.clone();
        Box::new(move || live.current_power())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_short_frame_rejected() {
        assert!(decode(&[]).is_none());
        assert!(decode(&[0x00, 0x00, 0x10]).is_none());
    }

    #[test]
    fn test_speed_always_present() {
        // Flags clear, 25.50 km/h
        let metrics = decode(&[0x00, 0x00, 0xF6, 0x09]).unwrap();
        assert_eq!(metrics.speed_kph, Some(25.5));
        assert!(metrics.cadence_rpm.is_none());
        assert!(metrics.power_watts.is_none());
        assert!(metrics.heart_rate_bpm.is_none());
    }

    #[test]
    fn test_all_fields() {
        let flags = FLAG_CADENCE | FLAG_POWER | FLAG_HEART_RATE;
        let mut frame = flags.to_le_bytes().to_vec();
        frame.extend_from_slice(&3000u16.to_le_bytes()); // 30.00 km/h
        frame.extend_from_slice(&181u16.to_le_bytes()); // 90.5 rpm
        frame.extend_from_slice(&250i16.to_le_bytes());
        frame.push(142);

        let metrics = decode(&frame).unwrap();
        assert_eq!(metrics.speed_kph, Some(30.0));
        assert_eq!(metrics.cadence_rpm, Some(90.5));
        assert_eq!(metrics.power_watts, Some(250));
        assert_eq!(metrics.heart_rate_bpm, Some(142));
    }

    #[test]
    fn test_negative_power() {
        let mut frame = FLAG_POWER.to_le_bytes().to_vec();
        frame.extend_from_slice(&0u16.to_le_bytes());
        frame.extend_from_slice(&(-12i16).to_le_bytes());

        assert_eq!(decode(&frame).unwrap().power_watts, Some(-12));
    }

    #[test]
    fn test_zero_heart_rate_is_absent() {
        let mut frame = FLAG_HEART_RATE.to_le_bytes().to_vec();
        frame.extend_from_slice(&0u16.to_le_bytes());
        frame.push(0);

        assert_eq!(decode(&frame).unwrap().heart_rate_bpm, None);
    }

    #[test]
    fn test_truncated_optional_fields() {
        // Power flagged but only one byte left
        let mut frame = (FLAG_CADENCE | FLAG_POWER).to_le_bytes().to_vec();
        frame.extend_from_slice(&0u16.to_le_bytes());
        frame.extend_from_slice(&160u16.to_le_bytes());
        frame.push(0x01);

        let metrics = decode(&frame).unwrap();
        assert_eq!(metrics.cadence_rpm, Some(80.0));
        assert!(metrics.power_watts.is_none());
    }

    #[test]
    fn test_live_metrics_gates_power_on_connection() {
        let live = LiveMetrics::new();
        let mut frame = FLAG_POWER.to_le_bytes().to_vec();
        frame.extend_from_slice(&0u16.to_le_bytes());
        frame.extend_from_slice(&200i16.to_le_bytes());

        live.set_connection_state(ConnectionState::Connected);
        assert!(live.ingest_frame(&frame).is_some());
        assert_eq!(live.current_power(), Some(200));

        // A short frame does not clear the last good reading
        assert!(live.ingest_frame(&[0x01]).is_none());
        assert_eq!(live.current_power(), Some(200));

        live.set_connection_state(ConnectionState::PoweredOff);
        assert_eq!(live.current_power(), None);
        assert!(live.latest().is_none());
    }

    proptest! {
        #[test]
        fn test_decode_never_panics(data in proptest::collection::vec(any::<u8>(), 0..32)) {
            let result = decode(&data);
            if data.len() < 4 {
                prop_assert!(result.is_none());
            } else {
                let metrics = result.unwrap();
                prop_assert!(metrics.speed_kph.is_some());

                let flags = u16::from_le_bytes([data[0], data[1]]);
                if flags & FLAG_CADENCE == 0 {
                    prop_assert!(metrics.cadence_rpm.is_none());
                }
                if flags & FLAG_POWER == 0 {
                    prop_assert!(metrics.power_watts.is_none());
                }
                if flags & FLAG_HEART_RATE == 0 {
                    prop_assert!(metrics.heart_rate_bpm.is_none());
                }
                prop_assert_ne!(metrics.heart_rate_bpm, Some(0));
            }
        }
    }
}
