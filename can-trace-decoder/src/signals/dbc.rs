//! DBC table source
//!
//! Reads Vector DBC files through the `can-dbc` crate and converts them into
//! our message table format.

use crate::signals::database::{
    ByteOrder, MessageDefinition, MessageTable, MultiplexerInfo, SignalDefinition, ValueType,
};
use crate::types::{DecoderError, Result};
use std::collections::HashMap;
use std::path::Path;

/// Bit 31 of a DBC message ID marks a 29-bit extended frame
const EXTENDED_ID_FLAG: u32 = 0x8000_0000;
const EXTENDED_ID_MASK: u32 = 0x1FFF_FFFF;

/// Load a DBC file into a message table named `name`
pub fn load_dbc_file(path: &Path, name: &str) -> Result<MessageTable> {
    log::info!("Parsing DBC file: {:?}", path);

    // Read the DBC file as bytes first (handle non-UTF8 encodings)
    let bytes = std::fs::read(path).map_err(|e| {
        DecoderError::DbcParseError(format!("Failed to read file {:?}: {}", path, e))
    })?;

    let source_filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown.dbc")
        .to_string();

    let table = load_dbc_bytes(&bytes, name, &source_filename)?;

    log::info!(
        "Parsed {} messages from {:?}",
        table.stats().num_messages,
        path
    );

    Ok(table)
}

/// Convert in-memory DBC content into a message table
pub fn load_dbc_bytes(bytes: &[u8], name: &str, source: &str) -> Result<MessageTable> {
    // Try UTF-8 first, then fall back to Latin-1/Windows-1252
    let dbc_content = match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            log::warn!("DBC file {} is not UTF-8, trying Latin-1 encoding", source);
            bytes.iter().map(|&b| b as char).collect()
        }
    };

    let dbc = can_dbc::DBC::from_slice(dbc_content.as_bytes()).map_err(|e| {
        DecoderError::DbcParseError(format!("Failed to parse DBC file {}: {:?}", source, e))
    })?;

    let mut table = MessageTable::new(name, source);
    for dbc_msg in dbc.messages() {
        let message = convert_message(&dbc, dbc_msg)?;
        table.add_message(message)?;
    }

    Ok(table)
}

/// Convert a can-dbc message to our MessageDefinition
fn convert_message(dbc: &can_dbc::DBC, dbc_msg: &can_dbc::Message) -> Result<MessageDefinition> {
    let raw_id = dbc_msg.message_id().0;
    let is_extended = raw_id & EXTENDED_ID_FLAG != 0;
    let id = if is_extended {
        raw_id & EXTENDED_ID_MASK
    } else {
        raw_id
    };

    let multiplexer_signal_name = dbc_msg
        .signals()
        .iter()
        .find(|s| matches!(s.multiplexer_indicator(), can_dbc::MultiplexIndicator::Multiplexor))
        .map(|s| s.name().to_string());

    let mut signals = Vec::new();
    for dbc_sig in dbc_msg.signals() {
        let value_table = dbc
            .value_descriptions_for_signal(*dbc_msg.message_id(), dbc_sig.name())
            .map(|descriptions| {
                descriptions
                    .iter()
                    .map(|d| (*d.a() as i64, d.b().to_string()))
                    .collect::<HashMap<i64, String>>()
            });

        let signal = convert_signal(dbc_sig, multiplexer_signal_name.as_deref(), value_table)?;
        signals.push(signal);
    }

    Ok(MessageDefinition {
        id,
        name: dbc_msg.message_name().to_string(),
        size: *dbc_msg.message_size() as usize,
        sender: match dbc_msg.transmitter() {
            can_dbc::Transmitter::NodeName(name) => Some(name.to_string()),
            _ => None,
        },
        signals,
        multiplexer_signal: multiplexer_signal_name,
        is_extended,
    })
}

/// Convert a can-dbc signal to our SignalDefinition
fn convert_signal(
    dbc_sig: &can_dbc::Signal,
    multiplexer_signal_name: Option<&str>,
    value_table: Option<HashMap<i64, String>>,
) -> Result<SignalDefinition> {
    let byte_order = match *dbc_sig.byte_order() {
        can_dbc::ByteOrder::LittleEndian => ByteOrder::LittleEndian,
        can_dbc::ByteOrder::BigEndian => ByteOrder::BigEndian,
    };

    let value_type = match *dbc_sig.value_type() {
        can_dbc::ValueType::Signed => ValueType::Signed,
        can_dbc::ValueType::Unsigned => ValueType::Unsigned,
    };

    let multiplexer_info = match *dbc_sig.multiplexer_indicator() {
        can_dbc::MultiplexIndicator::MultiplexedSignal(switch_value)
        | can_dbc::MultiplexIndicator::MultiplexorAndMultiplexedSignal(switch_value) => {
            Some(MultiplexerInfo {
                multiplexer_signal: multiplexer_signal_name
                    .ok_or_else(|| {
                        DecoderError::InvalidSignalDefinition(format!(
                            "Multiplexed signal '{}' but no multiplexer found",
                            dbc_sig.name()
                        ))
                    })?
                    .to_string(),
                multiplexer_values: vec![switch_value],
            })
        }
        _ => None,
    };

    Ok(SignalDefinition {
        name: dbc_sig.name().to_string(),
        start_bit: *dbc_sig.start_bit() as u16,
        length: *dbc_sig.signal_size() as u16,
        byte_order,
        value_type,
        factor: *dbc_sig.factor(),
        offset: *dbc_sig.offset(),
        unit: if dbc_sig.unit().is_empty() {
            None
        } else {
            Some(dbc_sig.unit().to_string())
        },
        value_table,
        multiplexer_info,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MOTOR_DBC: &str = r#"
VERSION ""

NS_ :
    NS_DESC_
    CM_
    BA_DEF_
    BA_
    VAL_
    CAT_DEF_
    CAT_
    FILTER
    BA_DEF_DEF_
    EV_DATA_
    ENVVAR_DATA_
    SGTYPE_
    SGTYPE_VAL_
    BA_DEF_SGTYPE_
    BA_SGTYPE_
    SIG_TYPE_REF_
    VAL_TABLE_
    SIG_GROUP_
    SIG_VALTYPE_
    SIGTYPE_VALTYPE_
    BO_TX_BU_
    BA_DEF_REL_
    BA_REL_
    BA_SGTYPE_REL_
    SG_MUL_VAL_

BS_:

BU_: MCU VCU

BO_ 2418147489 MotorStatus: 8 MCU
 SG_ MC_MOTOR_SPEED : 0|16@1+ (1,0) [0|10000] "rpm" VCU
 SG_ MC_STATUS_FWD : 16|1@1+ (1,0) [0|1] "" VCU
 SG_ MC_DC_VOLT : 31|16@0+ (0.1,0) [0|100] "V" VCU

BO_ 512 BatteryStatus: 8 MCU
 SG_ Battery_Voltage : 0|16@1+ (0.01,0) [0|100] "V" VCU
 SG_ Battery_Current : 16|16@1- (0.1,0) [-500|500] "A" VCU

VAL_ 2418147489 MC_STATUS_FWD 0 "Neutral" 1 "Forward" ;
"#;

    #[test]
    fn test_parse_simple_dbc() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(MOTOR_DBC.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let table = load_dbc_file(temp_file.path(), "dbc1").unwrap();
        assert_eq!(table.name(), "dbc1");
        assert_eq!(table.stats().num_messages, 2);
        assert_eq!(table.stats().num_signals, 5);

        let battery = table.get_message(512).unwrap();
        assert_eq!(battery.name, "BatteryStatus");
        assert_eq!(battery.size, 8);
        assert_eq!(battery.sender, Some("MCU".to_string()));

        let current = battery.signal("Battery_Current").unwrap();
        assert_eq!(current.value_type, ValueType::Signed);
        assert_eq!(current.factor, 0.1);
        assert_eq!(current.unit, Some("A".to_string()));
    }

    #[test]
    fn test_extended_id_flag_is_stripped() {
        let table = load_dbc_bytes(MOTOR_DBC.as_bytes(), "dbc1", "motor.dbc").unwrap();

        let motor = table.get_message(0x102200A1).unwrap();
        assert!(motor.is_extended);
        assert_eq!(motor.name, "MotorStatus");

        let volt = motor.signal("MC_DC_VOLT").unwrap();
        assert_eq!(volt.byte_order, ByteOrder::BigEndian);
        assert_eq!(volt.start_bit, 31);
    }

    #[test]
    fn test_value_descriptions_are_attached() {
        let table = load_dbc_bytes(MOTOR_DBC.as_bytes(), "dbc1", "motor.dbc").unwrap();
        let fwd = table
            .get_message(0x102200A1)
            .and_then(|m| m.signal("MC_STATUS_FWD"))
            .unwrap();
        let labels = fwd.value_table.as_ref().unwrap();
        assert_eq!(labels.get(&1), Some(&"Forward".to_string()));
    }

    #[test]
    fn test_parse_multiplexed_signals() {
        let dbc_content = r#"
VERSION ""

NS_ :

BS_:

BU_: ECU1

BO_ 512 MultiplexedMsg: 8 ECU1
 SG_ Mode M : 0|8@1+ (1,0) [0|3] "" ECU1
 SG_ SignalA m0 : 8|16@1+ (1,0) [0|100] "%" ECU1
 SG_ SignalB m1 : 8|16@1+ (0.1,0) [0|1000] "mV" ECU1
"#;

        let table = load_dbc_bytes(dbc_content.as_bytes(), "mux", "mux.dbc").unwrap();
        let msg = table.get_message(512).unwrap();
        assert!(msg.is_multiplexed());
        assert_eq!(msg.multiplexer_signal, Some("Mode".to_string()));
        assert_eq!(msg.signals.len(), 3);

        let sig_b = msg.signal("SignalB").unwrap();
        let mux = sig_b.multiplexer_info.as_ref().unwrap();
        assert_eq!(mux.multiplexer_signal, "Mode");
        assert_eq!(mux.multiplexer_values, vec![1]);
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = load_dbc_file(Path::new("does/not/exist.dbc"), "dbc1");
        assert!(matches!(result, Err(DecoderError::DbcParseError(_))));
    }
}
