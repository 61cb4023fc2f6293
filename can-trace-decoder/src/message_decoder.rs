//! Message Decoding Engine
//!
//! Extracts signal values from raw CAN payloads based on message definitions
//! from a message table. Handles bit extraction, endianness, multiplexing,
//! and physical value conversion. Everything here is a pure function of its
//! inputs and safe to call from any number of threads.

use crate::normalizer;
use crate::signals::database::{ByteOrder, MessageDefinition, MessageTable, SignalDefinition, ValueType};
use crate::types::{DecodeError, DecodedRow, DecodedSignal, RawValue, SignalValue, MAX_PAYLOAD_BYTES};

/// Message decoder - extracts signals from CAN payloads
pub struct MessageDecoder;

impl MessageDecoder {
    /// Decode one frame against a message table
    ///
    /// # Returns
    /// * `Ok(None)` if the frame ID is not in the table
    /// * `Ok(Some(row))` with every active signal of the matched message
    /// * `Err(DecodeError)` if the payload cannot hold the message
    pub fn decode(
        frame_id: u32,
        payload: &[u8],
        table: &MessageTable,
    ) -> Result<Option<DecodedRow>, DecodeError> {
        match table.get_message(frame_id) {
            Some(message_def) => {
                log::debug!("Decoding message: {} (ID 0x{:X})", message_def.name, frame_id);
                Self::decode_message(payload, message_def).map(Some)
            }
            None => {
                log::trace!("Unknown CAN ID: 0x{:X} in table '{}'", frame_id, table.name());
                Ok(None)
            }
        }
    }

    /// Normalize hex strings and decode them in one step
    pub fn decode_hex(
        frame_id_hex: &str,
        data_hex: &str,
        table: &MessageTable,
    ) -> Result<Option<DecodedRow>, DecodeError> {
        let frame_id = normalizer::parse_frame_id(frame_id_hex).map_err(DecodeError::MalformedHex)?;
        let payload = normalizer::parse_payload(data_hex).map_err(DecodeError::MalformedHex)?;
        Self::decode(frame_id, &payload, table)
    }

    /// Decode a payload into a DecodedRow using a known message definition
    pub fn decode_message(
        payload: &[u8],
        message_def: &MessageDefinition,
    ) -> Result<DecodedRow, DecodeError> {
        if payload.len() > MAX_PAYLOAD_BYTES {
            return Err(DecodeError::PayloadTooLong {
                frame_id: message_def.id,
                actual: payload.len(),
            });
        }

        if payload.len() < message_def.size {
            return Err(DecodeError::PayloadTooShort {
                frame_id: message_def.id,
                expected: message_def.size,
                actual: payload.len(),
            });
        }

        // For multiplexed messages, first extract the multiplexer signal value
        let mut multiplexer_value: Option<u64> = None;
        if let Some(mux_signal) = message_def
            .multiplexer_signal
            .as_deref()
            .and_then(|name| message_def.signal(name))
        {
            multiplexer_value = Some(Self::extract_signal_value(payload, mux_signal)?.selector());
        }

        let mut decoded_signals = Vec::with_capacity(message_def.signals.len());
        for signal in &message_def.signals {
            if let Some(ref mux_info) = signal.multiplexer_info {
                let current = if message_def.multiplexer_signal.as_deref()
                    == Some(mux_info.multiplexer_signal.as_str())
                {
                    multiplexer_value
                } else {
                    Self::selector_value(payload, message_def, &mux_info.multiplexer_signal)?
                };

                match current {
                    Some(current) if mux_info.multiplexer_values.contains(&current) => {}
                    _ => continue,
                }
            }

            decoded_signals.push(Self::decode_signal(payload, signal)?);
        }

        Ok(DecodedRow {
            frame_id: message_def.id,
            message_name: message_def.name.clone(),
            signals: decoded_signals,
            multiplexer_value,
        })
    }

    /// Value of a selector that is not the message-level multiplexer
    fn selector_value(
        payload: &[u8],
        message_def: &MessageDefinition,
        selector: &str,
    ) -> Result<Option<u64>, DecodeError> {
        match message_def.signal(selector) {
            Some(signal) => Ok(Some(Self::extract_signal_value(payload, signal)?.selector())),
            None => {
                log::warn!(
                    "Message '{}' has no multiplexer signal '{}'",
                    message_def.name,
                    selector
                );
                Ok(None)
            }
        }
    }

    /// Decode a single signal from CAN frame data
    fn decode_signal(data: &[u8], signal: &SignalDefinition) -> Result<DecodedSignal, DecodeError> {
        let raw_value = Self::extract_signal_value(data, signal)?;
        let physical_value = raw_value.as_f64() * signal.factor + signal.offset;
        let scaled = signal.factor != 1.0 || signal.offset != 0.0;

        let value = match raw_value {
            _ if !scaled && signal.length == 1 => SignalValue::Boolean(raw_value.selector() != 0),
            _ if scaled => SignalValue::Float(physical_value),
            RawValue::Signed(v) => SignalValue::Integer(v),
            // Unsigned values past i64::MAX have no exact Integer form
            RawValue::Unsigned(v) => match i64::try_from(v) {
                Ok(v) => SignalValue::Integer(v),
                Err(_) => SignalValue::Float(physical_value),
            },
        };

        let value_description = signal
            .value_table
            .as_ref()
            .zip(raw_value.as_i64())
            .and_then(|(table, raw)| table.get(&raw))
            .cloned();

        Ok(DecodedSignal {
            name: signal.name.clone(),
            value,
            unit: signal.unit.clone(),
            value_description,
            raw_value,
        })
    }

    /// Extract raw signal value from CAN frame data, sign-extended if signed
    fn extract_signal_value(data: &[u8], signal: &SignalDefinition) -> Result<RawValue, DecodeError> {
        let length = signal.length as usize;
        if length == 0 || length > 64 {
            return Err(DecodeError::InvalidSignalLength {
                signal: signal.name.clone(),
                length: signal.length,
            });
        }

        let required = signal.required_bytes();
        if required > data.len() {
            return Err(DecodeError::BitRangeOverflow {
                signal: signal.name.clone(),
                required,
                actual: data.len(),
            });
        }

        let start_bit = signal.start_bit as usize;
        let raw_value = match signal.byte_order {
            ByteOrder::LittleEndian => extract_little_endian(data, start_bit, length),
            ByteOrder::BigEndian => extract_big_endian(data, start_bit, length),
        };

        Ok(match signal.value_type {
            ValueType::Unsigned => RawValue::Unsigned(raw_value),
            ValueType::Signed => RawValue::Signed(sign_extend(raw_value, length)),
        })
    }
}

/// Extract signal with little-endian (Intel) byte order
///
/// - Start bit points to the LSB
/// - Bit 0 is the least significant bit of byte 0
fn extract_little_endian(data: &[u8], start_bit: usize, length: usize) -> u64 {
    let mut result: u64 = 0;

    for i in 0..length {
        let bit_pos = start_bit + i;
        let bit_value = (data[bit_pos / 8] >> (bit_pos % 8)) & 0x01;
        result |= (bit_value as u64) << i;
    }

    result
}

/// Extract signal with big-endian (Motorola) byte order
///
/// - Start bit points to the MSB, numbered `byte*8 + bit` with bit 0 = LSB
/// - Walking towards the LSB decrements within a byte and continues at
///   bit 7 of the following byte
fn extract_big_endian(data: &[u8], start_bit: usize, length: usize) -> u64 {
    let mut result: u64 = 0;
    let mut bit_pos = start_bit;

    for _ in 0..length {
        let bit_value = (data[bit_pos / 8] >> (bit_pos % 8)) & 0x01;
        result = (result << 1) | bit_value as u64;
        bit_pos = next_big_endian_bit(bit_pos);
    }

    result
}

fn next_big_endian_bit(bit_pos: usize) -> usize {
    if bit_pos % 8 == 0 {
        bit_pos + 15
    } else {
        bit_pos - 1
    }
}

/// Sign-extend a value from N bits to 64 bits
fn sign_extend(value: u64, bit_length: usize) -> i64 {
    if bit_length >= 64 {
        return value as i64;
    }

    let sign_bit = 1u64 << (bit_length - 1);
    if (value & sign_bit) != 0 {
        let mask = !0u64 << bit_length;
        (value | mask) as i64
    } else {
        value as i64
    }
}

/// Signal encoder - the inverse of `MessageDecoder`, used to build payloads
pub struct MessageEncoder;

impl MessageEncoder {
    /// Encode a full message from (signal name, physical value) pairs
    ///
    /// Signals not listed are left as zero bits.
    pub fn encode_message(
        message_def: &MessageDefinition,
        values: &[(&str, f64)],
    ) -> Result<Vec<u8>, DecodeError> {
        let mut payload = vec![0u8; message_def.size];
        for (name, value) in values {
            match message_def.signal(name) {
                Some(signal) => Self::encode_signal(&mut payload, signal, *value)?,
                None => log::warn!("Message '{}' has no signal '{}'", message_def.name, name),
            }
        }
        Ok(payload)
    }

    /// Write the physical value of one signal into a payload
    pub fn encode_signal(
        data: &mut [u8],
        signal: &SignalDefinition,
        physical_value: f64,
    ) -> Result<(), DecodeError> {
        let length = signal.length as usize;
        if length == 0 || length > 64 {
            return Err(DecodeError::InvalidSignalLength {
                signal: signal.name.clone(),
                length: signal.length,
            });
        }

        let required = signal.required_bytes();
        if required > data.len() {
            return Err(DecodeError::BitRangeOverflow {
                signal: signal.name.clone(),
                required,
                actual: data.len(),
            });
        }

        let out_of_range = || DecodeError::ValueOutOfRange {
            signal: signal.name.clone(),
            value: physical_value,
        };

        if signal.factor == 0.0 || !physical_value.is_finite() {
            return Err(out_of_range());
        }
        let raw = ((physical_value - signal.offset) / signal.factor).round();

        let (min, max) = match signal.value_type {
            ValueType::Unsigned if length == 64 => (0.0, u64::MAX as f64),
            ValueType::Unsigned => (0.0, ((1u64 << length) - 1) as f64),
            ValueType::Signed if length == 64 => (i64::MIN as f64, i64::MAX as f64),
            ValueType::Signed => (
                -((1u64 << (length - 1)) as f64),
                ((1u64 << (length - 1)) - 1) as f64,
            ),
        };
        if raw < min || raw > max {
            return Err(out_of_range());
        }

        let bits = match signal.value_type {
            ValueType::Unsigned => raw as u64,
            ValueType::Signed => raw as i64 as u64,
        };
        let bits = if length == 64 { bits } else { bits & ((1u64 << length) - 1) };

        let start_bit = signal.start_bit as usize;
        match signal.byte_order {
            ByteOrder::LittleEndian => {
                for i in 0..length {
                    write_bit(data, start_bit + i, (bits >> i) & 0x01 != 0);
                }
            }
            ByteOrder::BigEndian => {
                let mut bit_pos = start_bit;
                for i in (0..length).rev() {
                    write_bit(data, bit_pos, (bits >> i) & 0x01 != 0);
                    bit_pos = next_big_endian_bit(bit_pos);
                }
            }
        }

        Ok(())
    }
}

fn write_bit(data: &mut [u8], bit_pos: usize, set: bool) {
    let mask = 1u8 << (bit_pos % 8);
    if set {
        data[bit_pos / 8] |= mask;
    } else {
        data[bit_pos / 8] &= !mask;
    }
}
