//! Unsolicited IO data samples.

use bytes::BufMut;

use crate::error::{FrameError, Result};
use crate::frame_type;
use crate::types::{Address16, Address64};

/// Fixed part of the payload: addresses, options, count and both masks.
const FIXED_LEN: usize = 8 + 2 + 1 + 1 + 2 + 1;

/// Millivolts at full scale of the supply-voltage channel.
const SUPPLY_FULL_SCALE_MV: u32 = 1200;
/// Raw counts at full scale of the supply-voltage channel.
const SUPPLY_FULL_SCALE_RAW: u32 = 1024;

/// Digital IO lines, by their bit in the digital mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum DigitalPin {
    D0 = 1 << 0,
    D1 = 1 << 1,
    D2 = 1 << 2,
    D3 = 1 << 3,
    D4 = 1 << 4,
    D5 = 1 << 5,
    D6 = 1 << 6,
    D7 = 1 << 7,
    D10 = 1 << 10,
    D11 = 1 << 11,
    D12 = 1 << 12,
}

impl DigitalPin {
    pub const ALL: [DigitalPin; 11] = [
        DigitalPin::D0,
        DigitalPin::D1,
        DigitalPin::D2,
        DigitalPin::D3,
        DigitalPin::D4,
        DigitalPin::D5,
        DigitalPin::D6,
        DigitalPin::D7,
        DigitalPin::D10,
        DigitalPin::D11,
        DigitalPin::D12,
    ];

    pub fn mask(self) -> u16 {
        self as u16
    }
}

/// Analog channels, by their bit in the analog mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AnalogPin {
    A0 = 1 << 0,
    A1 = 1 << 1,
    A2 = 1 << 2,
    A3 = 1 << 3,
    /// Module supply voltage.
    SupplyVoltage = 1 << 7,
}

impl AnalogPin {
    pub const ALL: [AnalogPin; 5] = [
        AnalogPin::A0,
        AnalogPin::A1,
        AnalogPin::A2,
        AnalogPin::A3,
        AnalogPin::SupplyVoltage,
    ];

    pub fn mask(self) -> u8 {
        self as u8
    }
}

/// One IO sample report from a remote module.
///
/// `digital_sample` is present exactly when `digital_mask` is non-zero, and
/// `analog_samples` holds one value per set bit of `analog_mask`, in
/// ascending bit order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoSampleFrame {
    pub address64: Address64,
    pub address16: Address16,
    pub receive_options: u8,
    pub sample_count: u8,
    pub digital_mask: u16,
    pub analog_mask: u8,
    pub digital_sample: Option<u16>,
    pub analog_samples: Vec<u16>,
}

impl IoSampleFrame {
    pub fn is_digital_enabled(&self, pin: DigitalPin) -> bool {
        self.digital_mask & pin.mask() != 0
    }

    /// Level of an enabled digital pin; `None` if the pin is not sampled.
    pub fn digital_level(&self, pin: DigitalPin) -> Option<bool> {
        if !self.is_digital_enabled(pin) {
            return None;
        }
        self.digital_sample.map(|sample| sample & pin.mask() != 0)
    }

    pub fn is_analog_enabled(&self, pin: AnalogPin) -> bool {
        self.analog_mask & pin.mask() != 0
    }

    /// Raw reading of an enabled analog channel.
    pub fn analog_sample(&self, pin: AnalogPin) -> Option<u16> {
        if !self.is_analog_enabled(pin) {
            return None;
        }
        let below = self.analog_mask & (pin.mask() - 1);
        self.analog_samples.get(below.count_ones() as usize).copied()
    }

    /// Supply voltage in millivolts, if the module reports it.
    pub fn supply_voltage_mv(&self) -> Option<u32> {
        self.analog_sample(AnalogPin::SupplyVoltage)
            .map(|raw| u32::from(raw) * SUPPLY_FULL_SCALE_MV / SUPPLY_FULL_SCALE_RAW)
    }

    pub(crate) fn write_payload(&self, dst: &mut Vec<u8>) -> Result<()> {
        if self.digital_sample.is_some() != (self.digital_mask != 0) {
            return Err(FrameError::InvalidFrame(
                "digital sample presence does not match the digital mask",
            ));
        }
        if self.analog_samples.len() != self.analog_mask.count_ones() as usize {
            return Err(FrameError::InvalidFrame(
                "analog sample count does not match the analog mask",
            ));
        }

        dst.put_slice(self.address64.as_bytes());
        dst.put_slice(&self.address16.0);
        dst.put_u8(self.receive_options);
        dst.put_u8(self.sample_count);
        dst.put_u16(self.digital_mask);
        dst.put_u8(self.analog_mask);
        if let Some(sample) = self.digital_sample {
            dst.put_u16(sample);
        }
        for sample in &self.analog_samples {
            dst.put_u16(*sample);
        }
        Ok(())
    }

    pub(crate) fn decode(payload: &[u8]) -> Result<Self> {
        let malformed = |reason| FrameError::Decode {
            frame_type: frame_type::IO_SAMPLE,
            reason,
        };

        if payload.len() < FIXED_LEN {
            return Err(malformed("payload shorter than the fixed header"));
        }

        let mut address64 = [0u8; 8];
        address64.copy_from_slice(&payload[..8]);
        let digital_mask = u16::from_be_bytes([payload[12], payload[13]]);
        let analog_mask = payload[14];

        let digital_len = if digital_mask != 0 { 2 } else { 0 };
        let analog_count = analog_mask.count_ones() as usize;
        let expected = FIXED_LEN + digital_len + 2 * analog_count;
        if payload.len() < expected {
            return Err(malformed("samples missing for the enabled masks"));
        }
        if payload.len() > expected {
            return Err(malformed("trailing bytes after the last sample"));
        }

        let mut rest = &payload[FIXED_LEN..];
        let digital_sample = if digital_mask != 0 {
            let sample = u16::from_be_bytes([rest[0], rest[1]]);
            rest = &rest[2..];
            Some(sample)
        } else {
            None
        };
        let analog_samples = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();

        Ok(Self {
            address64: Address64(address64),
            address16: Address16([payload[8], payload[9]]),
            receive_options: payload[10],
            sample_count: payload[11],
            digital_mask,
            analog_mask,
            digital_sample,
            analog_samples,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> IoSampleFrame {
        IoSampleFrame {
            address64: Address64::from_u64(0x0013_A200_4146_B5A9),
            address16: Address16::from_u16(0x7D33),
            receive_options: 0x01,
            sample_count: 1,
            digital_mask: DigitalPin::D1.mask() | DigitalPin::D10.mask(),
            analog_mask: AnalogPin::A1.mask() | AnalogPin::SupplyVoltage.mask(),
            digital_sample: Some(DigitalPin::D10.mask()),
            analog_samples: vec![0x0200, 0x0300],
        }
    }

    fn payload_of(frame: &IoSampleFrame) -> Vec<u8> {
        let mut dst = Vec::new();
        frame.write_payload(&mut dst).unwrap();
        dst
    }

    #[test]
    fn payload_layout() {
        let payload = payload_of(&sample());
        assert_eq!(
            payload,
            vec![
                0x00, 0x13, 0xA2, 0x00, 0x41, 0x46, 0xB5, 0xA9, // address64
                0x7D, 0x33, // address16
                0x01, 0x01, // options, count
                0x04, 0x02, // digital mask
                0x82, // analog mask
                0x04, 0x00, // digital sample
                0x02, 0x00, 0x03, 0x00, // analog samples
            ]
        );
        assert_eq!(IoSampleFrame::decode(&payload).unwrap(), sample());
    }

    #[test]
    fn pin_helpers() {
        let frame = sample();
        assert_eq!(frame.digital_level(DigitalPin::D10), Some(true));
        assert_eq!(frame.digital_level(DigitalPin::D1), Some(false));
        assert_eq!(frame.digital_level(DigitalPin::D0), None);

        assert_eq!(frame.analog_sample(AnalogPin::A1), Some(0x0200));
        assert_eq!(frame.analog_sample(AnalogPin::SupplyVoltage), Some(0x0300));
        assert_eq!(frame.analog_sample(AnalogPin::A0), None);
        // 0x300 * 1200 / 1024
        assert_eq!(frame.supply_voltage_mv(), Some(900));
    }

    #[test]
    fn no_digital_sample_without_digital_mask() {
        let frame = IoSampleFrame {
            digital_mask: 0,
            digital_sample: None,
            analog_mask: 0,
            analog_samples: Vec::new(),
            ..sample()
        };
        let payload = payload_of(&frame);
        assert_eq!(payload.len(), FIXED_LEN);
        assert_eq!(IoSampleFrame::decode(&payload).unwrap(), frame);
        assert_eq!(frame.supply_voltage_mv(), None);
    }

    #[test]
    fn encode_rejects_inconsistent_masks() {
        let mut dst = Vec::new();

        let missing_analog = IoSampleFrame {
            analog_samples: vec![1],
            ..sample()
        };
        assert!(matches!(
            missing_analog.write_payload(&mut dst),
            Err(FrameError::InvalidFrame(_))
        ));

        let stray_digital = IoSampleFrame {
            digital_mask: 0,
            ..sample()
        };
        assert!(matches!(
            stray_digital.write_payload(&mut dst),
            Err(FrameError::InvalidFrame(_))
        ));
        assert!(dst.is_empty());
    }

    #[test]
    fn decode_rejects_short_and_long_payloads() {
        let payload = payload_of(&sample());

        for cut in [FIXED_LEN - 1, payload.len() - 1] {
            assert!(matches!(
                IoSampleFrame::decode(&payload[..cut]),
                Err(FrameError::Decode { frame_type: 0x92, .. })
            ));
        }

        let mut long = payload.clone();
        long.push(0x00);
        assert!(matches!(
            IoSampleFrame::decode(&long),
            Err(FrameError::Decode { frame_type: 0x92, .. })
        ));
    }
}
