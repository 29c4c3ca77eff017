//! Kernel input event records
//!
//! A record is the kernel's `struct input_event` on a 64-bit system:
//! seconds, microseconds, type, code, value, in native byte order.

use crate::error::BridgeError;

/// Size of one input event record in bytes
pub const INPUT_EVENT_SIZE: usize = 24;

/// Synchronization events (separate one report from the next)
pub const EV_SYN: u16 = 0x00;
/// Switch events
pub const EV_SW: u16 = 0x05;
/// Vendor switch code used by the one-key low power slider
pub const SW_ONEKEY_LOW_POWER: u16 = 0x13;

/// A decoded input event record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct InputEvent {
    pub seconds: u64,
    pub microseconds: u64,
    #[serde(rename = "type")]
    pub kind: u16,
    pub code: u16,
    pub value: i32,
}

impl InputEvent {
    /// Decode a record; the buffer must be exactly [`INPUT_EVENT_SIZE`] bytes
    pub fn from_bytes(buf: &[u8]) -> Result<Self, BridgeError> {
        let buf: &[u8; INPUT_EVENT_SIZE] = buf
            .try_into()
            .map_err(|_| BridgeError::ShortRead(buf.len()))?;

        Ok(Self {
            seconds: u64::from_ne_bytes(field(buf, 0)),
            microseconds: u64::from_ne_bytes(field(buf, 8)),
            kind: u16::from_ne_bytes(field(buf, 16)),
            code: u16::from_ne_bytes(field(buf, 18)),
            value: i32::from_ne_bytes(field(buf, 20)),
        })
    }

    /// Encode back into the wire layout
    pub fn to_bytes(&self) -> [u8; INPUT_EVENT_SIZE] {
        let mut buf = [0u8; INPUT_EVENT_SIZE];
        buf[0..8].copy_from_slice(&self.seconds.to_ne_bytes());
        buf[8..16].copy_from_slice(&self.microseconds.to_ne_bytes());
        buf[16..18].copy_from_slice(&self.kind.to_ne_bytes());
        buf[18..20].copy_from_slice(&self.code.to_ne_bytes());
        buf[20..24].copy_from_slice(&self.value.to_ne_bytes());
        buf
    }

    /// Whether this is a synchronization record
    pub fn is_sync(&self) -> bool {
        self.kind == EV_SYN
    }
}

/// Decode a capture of back-to-back records.
/// Returns the records and the number of trailing bytes that did not form one.
pub fn decode_all(bytes: &[u8]) -> (Vec<InputEvent>, usize) {
    let chunks = bytes.chunks_exact(INPUT_EVENT_SIZE);
    let trailing = chunks.remainder().len();
    let events = chunks.filter_map(|c| InputEvent::from_bytes(c).ok()).collect();
    (events, trailing)
}

fn field<const N: usize>(buf: &[u8; INPUT_EVENT_SIZE], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[offset..offset + N]);
    out
}

/// Semantic switch state delivered to the handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchEvent {
    pub is_on: bool,
}

/// Selects the records that carry the switch state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchFilter {
    pub event_type: u16,
    pub event_code: u16,
}

impl Default for SwitchFilter {
    fn default() -> Self {
        Self {
            event_type: EV_SW,
            event_code: SW_ONEKEY_LOW_POWER,
        }
    }
}

impl SwitchFilter {
    /// Map a record to a switch event, or None if it is some other event.
    /// Any nonzero value counts as "on".
    pub fn apply(&self, event: &InputEvent) -> Option<SwitchEvent> {
        (event.kind == self.event_type && event.code == self.event_code).then_some(SwitchEvent {
            is_on: event.value != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: u16, code: u16, value: i32) -> InputEvent {
        InputEvent {
            seconds: 1_571_000_000,
            microseconds: 123_456,
            kind,
            code,
            value,
        }
    }

    #[test]
    fn test_round_trip_preserves_bytes() {
        let mut buf = [0u8; INPUT_EVENT_SIZE];
        for (i, b) in buf.iter_mut().enumerate() {
            *b = (i as u8).wrapping_mul(37).wrapping_add(11);
        }
        let event = InputEvent::from_bytes(&buf).unwrap();
        assert_eq!(event.to_bytes(), buf);

        let all_ones = [0xffu8; INPUT_EVENT_SIZE];
        let event = InputEvent::from_bytes(&all_ones).unwrap();
        assert_eq!(event.value, -1);
        assert_eq!(event.to_bytes(), all_ones);
    }

    #[test]
    fn test_field_layout() {
        let event = record(EV_SW, SW_ONEKEY_LOW_POWER, 1);
        let bytes = event.to_bytes();
        assert_eq!(&bytes[16..18], &EV_SW.to_ne_bytes());
        assert_eq!(&bytes[18..20], &SW_ONEKEY_LOW_POWER.to_ne_bytes());
        assert_eq!(&bytes[20..24], &1i32.to_ne_bytes());
        assert_eq!(InputEvent::from_bytes(&bytes).unwrap(), event);
    }

    #[test]
    fn test_wrong_length_is_short_read() {
        for len in [0usize, 1, 16, 23, 25, 48] {
            let buf = vec![0u8; len];
            match InputEvent::from_bytes(&buf) {
                Err(BridgeError::ShortRead(got)) => assert_eq!(got, len),
                other => panic!("expected ShortRead for {} bytes, got {:?}", len, other),
            }
        }
    }

    #[test]
    fn test_decode_all_reports_trailing_bytes() {
        let mut capture = Vec::new();
        capture.extend_from_slice(&record(EV_SW, SW_ONEKEY_LOW_POWER, 1).to_bytes());
        capture.extend_from_slice(&record(EV_SYN, 0, 0).to_bytes());
        capture.extend_from_slice(&[0u8; 7]);

        let (events, trailing) = decode_all(&capture);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].value, 1);
        assert!(events[1].is_sync());
        assert_eq!(trailing, 7);

        assert_eq!(decode_all(&[]), (vec![], 0));
    }

    #[test]
    fn test_filter_on_and_off() {
        let filter = SwitchFilter::default();
        assert_eq!(
            filter.apply(&record(0x05, 0x13, 1)),
            Some(SwitchEvent { is_on: true })
        );
        assert_eq!(
            filter.apply(&record(0x05, 0x13, 0)),
            Some(SwitchEvent { is_on: false })
        );
    }

    #[test]
    fn test_filter_nonzero_value_is_on() {
        // Values other than 0/1 are not expected from the switch; they are
        // treated as "on" rather than dropped.
        let filter = SwitchFilter::default();
        assert_eq!(
            filter.apply(&record(0x05, 0x13, 5)),
            Some(SwitchEvent { is_on: true })
        );
        assert_eq!(
            filter.apply(&record(0x05, 0x13, -1)),
            Some(SwitchEvent { is_on: true })
        );
    }

    #[test]
    fn test_filter_ignores_other_events() {
        let filter = SwitchFilter::default();
        assert_eq!(filter.apply(&record(EV_SYN, 0, 0)), None);
        assert_eq!(filter.apply(&record(0x01, 0x13, 1)), None);
        assert_eq!(filter.apply(&record(0x05, 0x00, 1)), None);
        assert_eq!(filter.apply(&record(0x05, 0x14, 0)), None);
        assert!(record(EV_SYN, 0, 0).is_sync());
    }
}
