//! Multi-table merge
//!
//! Several message tables can be consulted against the same trace. The
//! `ColumnLayout` fixes, before any row is decoded, which column every
//! (table, signal) pair lands in, so two tables defining the same signal name
//! never overwrite each other and the sink always sees the same column set.

use crate::config::ColumnNaming;
use crate::signals::MessageTable;
use crate::types::{DecodedRow, SignalValue, TraceTime};
use std::collections::{HashMap, HashSet};

/// One output column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Column name as written to the sink
    pub name: String,
    /// Name of the table that defines the signal
    pub table: String,
    /// Signal name inside the table
    pub signal: String,
    /// Engineering unit, if the definition has one
    pub unit: Option<String>,
}

/// Stable mapping from (table, signal) to column position
#[derive(Debug, Clone, Default)]
pub struct ColumnLayout {
    columns: Vec<ColumnSpec>,
    lookup: HashMap<(usize, String), usize>,
}

impl ColumnLayout {
    /// Build the layout for an ordered list of tables
    ///
    /// Columns follow table order, then ascending frame ID, then signal
    /// definition order. A signal name appearing in several messages of the
    /// same table shares one column.
    pub fn build(tables: &[MessageTable], naming: ColumnNaming, separator: &str) -> Self {
        let prefixed = match naming {
            ColumnNaming::Prefixed => true,
            ColumnNaming::Auto => tables.len() > 1,
        };

        let mut layout = Self::default();
        let mut taken: HashSet<String> = HashSet::new();

        for (table_idx, table) in tables.iter().enumerate() {
            for message in table.messages_sorted() {
                for signal in &message.signals {
                    let key = (table_idx, signal.name.clone());
                    if layout.lookup.contains_key(&key) {
                        continue;
                    }

                    let base = if prefixed {
                        format!("{}{}{}", table.name(), separator, signal.name)
                    } else {
                        signal.name.clone()
                    };

                    let mut name = base.clone();
                    let mut suffix = 2;
                    while taken.contains(&name) {
                        name = format!("{}{}{}", base, separator, suffix);
                        suffix += 1;
                    }
                    if name != base {
                        log::warn!(
                            "Column '{}' already taken, signal '{}' of table '{}' renamed to '{}'",
                            base,
                            signal.name,
                            table.name(),
                            name
                        );
                    }

                    taken.insert(name.clone());
                    layout.lookup.insert(key, layout.columns.len());
                    layout.columns.push(ColumnSpec {
                        name,
                        table: table.name().to_string(),
                        signal: signal.name.clone(),
                        unit: signal.unit.clone(),
                    });
                }
            }
        }

        layout
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column position for a signal of the table at `table_idx`
    pub fn position(&self, table_idx: usize, signal: &str) -> Option<usize> {
        self.lookup.get(&(table_idx, signal.to_string())).copied()
    }

    /// Column position by output column name
    pub fn position_by_name(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// One trace row with the decoded values of every table side by side
#[derive(Debug, Clone, PartialEq)]
pub struct WideRow {
    /// Index of the originating raw row
    pub index: usize,
    pub timestamp: Option<TraceTime>,
    pub frame_id: u32,
    /// One cell per layout column; `None` where nothing was decoded
    pub cells: Vec<Option<SignalValue>>,
}

impl WideRow {
    /// True when no table decoded anything for this row
    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Option::is_none)
    }

    pub fn value(&self, column: usize) -> Option<f64> {
        self.cells.get(column).and_then(|c| c.as_ref()).map(SignalValue::as_f64)
    }
}

/// Merge per-table decode results of one frame into a wide row
///
/// `decoded` holds `(table index, row)` pairs; tables that did not know the
/// frame or failed to decode it are simply absent.
pub fn merge_row(
    layout: &ColumnLayout,
    index: usize,
    timestamp: Option<TraceTime>,
    frame_id: u32,
    decoded: &[(usize, DecodedRow)],
) -> WideRow {
    let mut cells = vec![None; layout.len()];

    for (table_idx, row) in decoded {
        for signal in &row.signals {
            match layout.position(*table_idx, &signal.name) {
                Some(position) => cells[position] = Some(signal.value.clone()),
                None => log::warn!(
                    "Signal '{}' of table #{} has no column in the layout",
                    signal.name,
                    table_idx
                ),
            }
        }
    }

    WideRow {
        index,
        timestamp,
        frame_id,
        cells,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::{MessageDefinition, SignalDefinition};
    use crate::types::{DecodedSignal, RawValue};

    fn table(name: &str, id: u32, signals: &[&str]) -> MessageTable {
        let signals = signals
            .iter()
            .enumerate()
            .map(|(i, s)| SignalDefinition::new(*s, (i * 8) as u16, 8))
            .collect();
        let msg = MessageDefinition {
            id,
            name: format!("{}_msg", name),
            size: 8,
            sender: None,
            signals,
            multiplexer_signal: None,
            is_extended: false,
        };
        MessageTable::from_messages(name, format!("{}.dbc", name), vec![msg]).unwrap()
    }

    fn decoded(id: u32, name: &str, value: i64) -> DecodedRow {
        DecodedRow {
            frame_id: id,
            message_name: "m".to_string(),
            signals: vec![DecodedSignal {
                name: name.to_string(),
                value: SignalValue::Integer(value),
                unit: None,
                value_description: None,
                raw_value: RawValue::Signed(value),
            }],
            multiplexer_value: None,
        }
    }

    #[test]
    fn test_single_table_uses_bare_names() {
        let tables = vec![table("dbc1", 0x100, &["MC_MOTOR_SPEED", "MC_PH_CURR"])];
        let layout = ColumnLayout::build(&tables, ColumnNaming::Auto, "_");
        let names: Vec<_> = layout.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["MC_MOTOR_SPEED", "MC_PH_CURR"]);
    }

    #[test]
    fn test_same_signal_in_two_tables_is_kept_twice() {
        let tables = vec![
            table("dbc1", 0x100, &["Battery_Current"]),
            table("dbc2", 0x100, &["Battery_Current"]),
        ];
        let layout = ColumnLayout::build(&tables, ColumnNaming::Auto, "_");
        assert_eq!(layout.len(), 2);
        assert_eq!(layout.columns()[0].name, "dbc1_Battery_Current");
        assert_eq!(layout.columns()[1].name, "dbc2_Battery_Current");

        let row = merge_row(
            &layout,
            0,
            None,
            0x100,
            &[(0, decoded(0x100, "Battery_Current", 12)), (1, decoded(0x100, "Battery_Current", 34))],
        );
        assert_eq!(row.value(0), Some(12.0));
        assert_eq!(row.value(1), Some(34.0));
    }

    #[test]
    fn test_residual_collision_gets_suffix() {
        // "a_b" + "c" and "a" + "b_c" both render as "a_b_c"
        let tables = vec![table("a_b", 0x100, &["c"]), table("a", 0x200, &["b_c"])];
        let layout = ColumnLayout::build(&tables, ColumnNaming::Prefixed, "_");
        assert_eq!(layout.columns()[0].name, "a_b_c");
        assert_eq!(layout.columns()[1].name, "a_b_c_2");
    }

    #[test]
    fn test_merge_leaves_undecoded_cells_empty() {
        let tables = vec![table("dbc1", 0x100, &["A", "B"])];
        let layout = ColumnLayout::build(&tables, ColumnNaming::Auto, "_");
        let row = merge_row(&layout, 7, None, 0x100, &[(0, decoded(0x100, "B", 5))]);
        assert_eq!(row.index, 7);
        assert_eq!(row.cells[0], None);
        assert_eq!(row.value(1), Some(5.0));
        assert!(!row.is_empty());

        let empty = merge_row(&layout, 8, None, 0x999, &[]);
        assert!(empty.is_empty());
    }
}
