//! Derived drivetrain quantities
//!
//! Computed per aggregated bucket from the motor controller and battery
//! columns. Any missing input, zero motor speed (for torque) or non-finite
//! result leaves the derived cell empty.

use crate::aggregate::AggregatedTable;
use crate::config::DerivedConfig;
use std::f64::consts::PI;

pub const MOTOR_CURRENT: &str = "motor_current";
pub const VEHICLE_SPEED: &str = "vehicle_speed";
pub const POWER: &str = "power";
pub const TORQUE: &str = "torque";
pub const BATTERY_POWER: &str = "battery_power";

/// Names of the derived columns, in the order they are appended
pub const DERIVED_COLUMNS: [&str; 5] = [MOTOR_CURRENT, VEHICLE_SPEED, POWER, TORQUE, BATTERY_POWER];

/// Derived values of one bucket
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DerivedValues {
    pub motor_current: Option<f64>,
    pub vehicle_speed: Option<f64>,
    pub power: Option<f64>,
    pub torque: Option<f64>,
    pub battery_power: Option<f64>,
}

/// Aggregated inputs of one bucket
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DerivedInputs {
    pub phase_current: Option<f64>,
    pub motor_speed: Option<f64>,
    pub dc_voltage: Option<f64>,
    pub battery_current: Option<f64>,
    pub battery_voltage: Option<f64>,
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// Compute the derived values for one bucket
pub fn compute(inputs: &DerivedInputs, config: &DerivedConfig) -> DerivedValues {
    let motor_current = inputs
        .phase_current
        .and_then(|i| finite(i * config.current_factor));

    let vehicle_speed = inputs
        .motor_speed
        .and_then(|rpm| finite(rpm * config.speed_factor));

    let power = match (motor_current, inputs.dc_voltage) {
        (Some(current), Some(voltage)) => finite(current * voltage * config.efficiency),
        _ => None,
    };

    let torque = match (power, inputs.motor_speed) {
        (Some(power), Some(rpm)) if rpm != 0.0 => finite(power / (2.0 * PI * rpm / 60.0)),
        _ => None,
    };

    let battery_power = match (inputs.battery_current, inputs.battery_voltage) {
        (Some(current), Some(voltage)) => finite(current * voltage),
        _ => None,
    };

    DerivedValues {
        motor_current,
        vehicle_speed,
        power,
        torque,
        battery_power,
    }
}

/// Append the derived columns to an aggregated table
///
/// The columns are always appended so the output shape does not depend on
/// which tables were loaded. An input named `<table><separator><signal>` that
/// is not present falls back to the bare `<signal>` column, which is how a
/// single-table run names its columns.
pub fn append_derived(table: &mut AggregatedTable, config: &DerivedConfig, separator: &str) {
    let lookup = |name: &str| {
        let position = table.column_index(name).or_else(|| {
            let (_, bare) = name.split_once(separator).filter(|_| !separator.is_empty())?;
            let position = table.column_index(bare)?;
            log::debug!("Derived input '{}' read from column '{}'", name, bare);
            Some(position)
        });
        if position.is_none() {
            log::warn!("Derived input column '{}' not present, dependent values will be empty", name);
        }
        position
    };

    let phase_current = lookup(&config.phase_current_column);
    let motor_speed = lookup(&config.motor_speed_column);
    let dc_voltage = lookup(&config.dc_voltage_column);
    let battery_current = lookup(&config.battery_current_column);
    let battery_voltage = lookup(&config.battery_voltage_column);

    let derived: Vec<DerivedValues> = table
        .records
        .iter()
        .map(|record| {
            let cell = |column: Option<usize>| column.and_then(|c| record.values[c]);
            let inputs = DerivedInputs {
                phase_current: cell(phase_current),
                motor_speed: cell(motor_speed),
                dc_voltage: cell(dc_voltage),
                battery_current: cell(battery_current),
                battery_voltage: cell(battery_voltage),
            };
            compute(&inputs, config)
        })
        .collect();

    table.push_column(MOTOR_CURRENT, derived.iter().map(|d| d.motor_current).collect());
    table.push_column(VEHICLE_SPEED, derived.iter().map(|d| d.vehicle_speed).collect());
    table.push_column(POWER, derived.iter().map(|d| d.power).collect());
    table.push_column(TORQUE, derived.iter().map(|d| d.torque).collect());
    table.push_column(BATTERY_POWER, derived.iter().map(|d| d.battery_power).collect());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregatedRecord;
    use crate::normalizer::parse_timestamp;

    fn inputs(current: f64, speed: f64, voltage: f64) -> DerivedInputs {
        DerivedInputs {
            phase_current: Some(current),
            motor_speed: Some(speed),
            dc_voltage: Some(voltage),
            battery_current: Some(50.0),
            battery_voltage: Some(48.0),
        }
    }

    #[test]
    fn test_eco_mode_values() {
        let values = compute(&inputs(100.0, 3000.0, 48.0), &DerivedConfig::default());

        assert!((values.motor_current.unwrap() - 86.6).abs() < 1e-9);
        assert!((values.vehicle_speed.unwrap() - 37.655727).abs() < 1e-6);

        let power = 86.6 * 48.0 * 0.73;
        assert!((values.power.unwrap() - power).abs() < 1e-9);

        let omega = 2.0 * PI * 3000.0 / 60.0;
        assert!((values.torque.unwrap() - power / omega).abs() < 1e-9);
        assert_eq!(values.battery_power, Some(2400.0));
    }

    #[test]
    fn test_boost_mode_power() {
        let values = compute(&inputs(100.0, 3000.0, 48.0), &DerivedConfig::boost());
        assert!((values.power.unwrap() - 86.6 * 48.0 * 0.92).abs() < 1e-9);
    }

    #[test]
    fn test_zero_speed_has_no_torque() {
        let values = compute(&inputs(100.0, 0.0, 48.0), &DerivedConfig::default());
        assert_eq!(values.torque, None);
        assert!(values.power.is_some());
        assert_eq!(values.vehicle_speed, Some(0.0));
    }

    #[test]
    fn test_missing_inputs_leave_values_empty() {
        let values = compute(
            &DerivedInputs {
                motor_speed: Some(1000.0),
                ..Default::default()
            },
            &DerivedConfig::default(),
        );
        assert_eq!(values.motor_current, None);
        assert_eq!(values.power, None);
        assert_eq!(values.torque, None);
        assert_eq!(values.battery_power, None);
        assert!(values.vehicle_speed.is_some());
    }

    #[test]
    fn test_append_to_table_with_missing_columns() {
        let time = parse_timestamp("12:00:00").unwrap();
        let mut table = AggregatedTable {
            columns: vec!["dbc2_Battery_Current".to_string(), "dbc2_Battery_Voltage".to_string()],
            records: vec![AggregatedRecord {
                bucket_start: time,
                timestamp: time,
                row_count: 1,
                values: vec![Some(10.0), Some(50.0)],
            }],
        };

        append_derived(&mut table, &DerivedConfig::default(), "_");

        assert_eq!(table.columns.len(), 2 + DERIVED_COLUMNS.len());
        assert_eq!(table.value(0, BATTERY_POWER), Some(500.0));
        assert_eq!(table.value(0, MOTOR_CURRENT), None);
        assert_eq!(table.value(0, TORQUE), None);
    }

    #[test]
    fn test_single_table_run_uses_bare_columns() {
        let time = parse_timestamp("12:00:00").unwrap();
        let mut table = AggregatedTable {
            columns: vec![
                "MC_PH_CURR".to_string(),
                "MC_MOTOR_SPEED".to_string(),
                "MC_DC_VOLT".to_string(),
            ],
            records: vec![AggregatedRecord {
                bucket_start: time,
                timestamp: time,
                row_count: 1,
                values: vec![Some(100.0), Some(3000.0), Some(48.0)],
            }],
        };

        append_derived(&mut table, &DerivedConfig::default(), "_");

        assert!((table.value(0, MOTOR_CURRENT).unwrap() - 86.6).abs() < 1e-9);
        assert!((table.value(0, VEHICLE_SPEED).unwrap() - 37.655727).abs() < 1e-6);
        assert!(table.value(0, POWER).is_some());
        assert!(table.value(0, TORQUE).is_some());
        assert_eq!(table.value(0, BATTERY_POWER), None);
    }

    #[test]
    fn test_prefixed_column_wins_over_bare() {
        let time = parse_timestamp("12:00:00").unwrap();
        let mut table = AggregatedTable {
            columns: vec!["MC_MOTOR_SPEED".to_string(), "dbc1_MC_MOTOR_SPEED".to_string()],
            records: vec![AggregatedRecord {
                bucket_start: time,
                timestamp: time,
                row_count: 1,
                values: vec![Some(1.0), Some(1000.0)],
            }],
        };

        append_derived(&mut table, &DerivedConfig::default(), "_");

        assert!((table.value(0, VEHICLE_SPEED).unwrap() - 12.551909).abs() < 1e-6);
    }
}
