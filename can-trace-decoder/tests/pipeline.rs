//! End-to-end tests: trace file + table files through the whole pipeline

use can_trace_decoder::derived::{BATTERY_POWER, MOTOR_CURRENT, POWER, TORQUE, VEHICLE_SPEED};
use can_trace_decoder::{
    ColumnMapping, Decoder, DecoderError, PipelineConfig, SignalValue, TraceFormat,
};
use std::f64::consts::PI;
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

BS_:

BU_: MCU VCU

BO_ 2418147489 MotorStatus: 8 MCU
 SG_ MC_MOTOR_SPEED : 0|16@1+ (1,0) [0|10000] "rpm" VCU
 SG_ MC_PH_CURR : 16|16@1+ (0.1,0) [0|1000] "A" VCU
 SG_ MC_DC_VOLT : 32|16@1+ (0.1,0) [0|100] "V" VCU

BO_ 768 Heartbeat: 1 MCU
 SG_ Counter : 0|8@1+ (1,0) [0|255] "" VCU
"#;

const BMS_JSON: &str = r#"{
    "messages": [
        {
            "id": 436142552,
            "name": "BMS_Status",
            "size": 8,
            "signals": [
                { "name": "Battery_Voltage", "start_bit": 0, "length": 16, "factor": 0.1, "unit": "V" },
                { "name": "Battery_Current", "start_bit": 16, "length": 16, "value_type": "signed", "factor": 0.1, "unit": "A" }
            ]
        },
        {
            "id": 768,
            "name": "Heartbeat",
            "size": 1,
            "signals": [ { "name": "Counter", "start_bit": 0, "length": 8 } ]
        }
    ]
}"#;

const TRACE: &str = "\
Trace exported by analyzer
Channel 1
Index;Timestamp;Time;Type;Frame ID;Length;Data
1;0.100;12:00:00.100;Rx;102200A1;8;B8 0B E8 03 E0 01 00 00
2;0.900;12:00:00.900;Rx;102200A1;8;B8 0B D0 07 E0 01 00 00
3;0.950;12:00:00.950;Rx;19FF01D8;8;F4 01 C8 00 00 00 00 00
4;0.960;12:00:00.960;Rx;19FF01D8;8;EA 01 2C 01 00 00 00 00
5;1.050;12:00:01.050;Rx;102200A1;8;00 00 E8 03 E0 01 00 00
6;1.100;12:00:01.100;Rx;ZZ;8;00 00 00 00 00 00 00 00
7;1.200;12:00:01.200;Rx;300;1;2A
8;1.300;12:00:01.300;Rx;7FF;1;00
";

fn temp_file(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn two_table_decoder() -> (Decoder, Vec<NamedTempFile>) {
    let dbc = temp_file(".dbc", MOTOR_DBC);
    let json = temp_file(".json", BMS_JSON);

    let mut decoder = Decoder::new();
    decoder.add_dbc(dbc.path()).unwrap();
    decoder.load_table_file(json.path(), None).unwrap();
    (decoder, vec![dbc, json])
}

fn close(actual: Option<f64>, expected: f64) -> bool {
    actual.map_or(false, |a| (a - expected).abs() < 1e-6)
}

#[test]
fn test_two_tables_end_to_end() {
    let _ = env_logger::builder().is_test(true).try_init();

    let (decoder, _files) = two_table_decoder();
    let trace = temp_file(".csv", TRACE);

    let output = decoder
        .decode_trace_file(trace.path(), &PipelineConfig::default())
        .unwrap();

    let report = &output.report;
    assert_eq!(report.total_rows, 8);
    assert_eq!(report.normalized, 7);
    assert_eq!(report.normalize_failures, 1);
    assert_eq!(report.decode_failures, 0);
    assert_eq!(report.unknown_frames, 1);
    assert_eq!(report.decoded_pairs, 7);
    assert_eq!(report.buckets, 2);
    assert_eq!(report.errors_by_kind["invalid_hex"], 1);
    assert_eq!(report.samples[0].index, 6);

    // Both tables define Counter; each keeps its own column
    let dbc1_counter = output.layout.position_by_name("dbc1_Counter").unwrap();
    let dbc2_counter = output.layout.position_by_name("dbc2_Counter").unwrap();
    let heartbeat = output.rows.iter().find(|r| r.index == 7).unwrap();
    assert_eq!(heartbeat.cells[dbc1_counter], Some(SignalValue::Integer(42)));
    assert_eq!(heartbeat.cells[dbc2_counter], Some(SignalValue::Integer(42)));

    let table = &output.aggregated;
    assert_eq!(table.records[0].row_count, 4);
    assert_eq!(table.records[1].row_count, 2);

    // Mean for motor signals, max for battery signals
    assert!(close(table.value(0, "dbc1_MC_MOTOR_SPEED"), 3000.0));
    assert!(close(table.value(0, "dbc1_MC_PH_CURR"), 150.0));
    assert!(close(table.value(0, "dbc2_Battery_Voltage"), 50.0));
    assert!(close(table.value(0, "dbc2_Battery_Current"), 30.0));

    let motor_current = 150.0 * 0.866;
    let power = motor_current * 48.0 * 0.73;
    assert!(close(table.value(0, MOTOR_CURRENT), motor_current));
    assert!(close(table.value(0, VEHICLE_SPEED), 3000.0 * 0.012551909));
    assert!(close(table.value(0, POWER), power));
    assert!(close(table.value(0, TORQUE), power / (2.0 * PI * 3000.0 / 60.0)));
    assert!(close(table.value(0, BATTERY_POWER), 1500.0));

    // Second bucket: motor stopped, no battery frames
    assert!(close(table.value(1, "dbc1_MC_MOTOR_SPEED"), 0.0));
    assert_eq!(table.value(1, TORQUE), None);
    assert_eq!(table.value(1, BATTERY_POWER), None);
    assert!(close(table.value(1, "dbc1_Counter"), 42.0));
}

#[test]
fn test_output_is_identical_sequential_and_parallel() {
    let (decoder, _files) = two_table_decoder();
    let trace = temp_file(".csv", TRACE);

    let parallel = decoder
        .decode_trace_file(trace.path(), &PipelineConfig::default())
        .unwrap();
    let sequential = decoder
        .decode_trace_file(trace.path(), &PipelineConfig::default().with_parallel(false))
        .unwrap();

    assert_eq!(parallel.rows, sequential.rows);
    assert_eq!(parallel.aggregated, sequential.aggregated);
    assert_eq!(parallel.report, sequential.report);
}

#[test]
fn test_single_table_named_columns() {
    let json = temp_file(".json", BMS_JSON);
    let mut decoder = Decoder::new();
    decoder.load_table_file(json.path(), Some("bms")).unwrap();

    let trace = temp_file(
        ".csv",
        "Time,ID,Payload\n\
         ,300,07\n\
         2024-03-01 08:15:00.250,19FF01D8,F401C80000000000\n",
    );
    let config = PipelineConfig::new()
        .with_trace_format(TraceFormat {
            delimiter: ',',
            skip_rows: 0,
            has_headers: true,
        })
        .with_columns(ColumnMapping::by_name("Time", "ID", "Payload"))
        .with_derived(None);

    let output = decoder.decode_trace_file(trace.path(), &config).unwrap();

    // One table: bare signal names
    let names: Vec<_> = output.layout.columns().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Counter", "Battery_Voltage", "Battery_Current"]);

    // The untimed row is decoded but not aggregated
    assert_eq!(output.rows.len(), 2);
    assert_eq!(output.report.untimed_rows, 1);
    assert_eq!(output.aggregated.len(), 1);
    assert_eq!(output.aggregated.records[0].row_count, 1);
    assert!(close(output.aggregated.value(0, "Battery_Voltage"), 50.0));
    assert_eq!(output.aggregated.value(0, "Counter"), None);
    assert_eq!(output.aggregated.columns.len(), 3);
}

#[test]
fn test_missing_trace_file_is_file_error() {
    let (decoder, _files) = two_table_decoder();
    let result = decoder.decode_trace_file(
        std::path::Path::new("does/not/exist.csv"),
        &PipelineConfig::default(),
    );
    assert!(matches!(result, Err(DecoderError::TraceReadError(_))));
}

#[test]
fn test_unsupported_table_source() {
    let file = temp_file(".arxml", "<AUTOSAR/>");
    let mut decoder = Decoder::new();
    let result = decoder.load_table_file(file.path(), None);
    assert!(matches!(result, Err(DecoderError::UnsupportedTableSource(_))));
    assert!(!decoder.has_tables());
}
