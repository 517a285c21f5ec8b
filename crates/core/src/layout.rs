#![forbid(unsafe_code)]

//! Canvas placement for node columns.
//!
//! Types are laid out left to right and centered as a group. Inside a column the entry
//! node sits on top and submitted nodes follow newest first. Everything is recomputed
//! from scratch; the same input always yields the same coordinates.

use crate::ids::NodeId;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub node_width: f64,
    pub node_height: f64,
    pub row_gap: f64,
    pub column_gap: f64,
    pub initial_y: f64,
    /// Distance from the entry node to the newest submitted node.
    pub first_spacing: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            node_width: 200.0,
            node_height: 100.0,
            row_gap: 40.0,
            column_gap: 50.0,
            initial_y: 100.0,
            first_spacing: 200.0,
        }
    }
}

impl LayoutConfig {
    pub fn total_width(&self, columns: usize) -> f64 {
        if columns == 0 {
            return 0.0;
        }
        let n = columns as f64;
        n * self.node_width + (n - 1.0) * self.column_gap
    }

    pub fn start_x(&self, viewport_width: f64, columns: usize) -> f64 {
        (viewport_width - self.total_width(columns)) / 2.0
    }

    pub fn entry_y(&self) -> f64 {
        self.initial_y
    }

    pub fn row_y(&self, index: usize) -> f64 {
        self.initial_y + self.first_spacing + index as f64 * (self.node_height + self.row_gap)
    }
}

/// Node ids of one type column, in display order.
#[derive(Clone, Debug)]
pub struct ColumnSlots<'a> {
    pub entry: &'a NodeId,
    /// Newest first.
    pub submitted: Vec<&'a NodeId>,
}

/// Absolute position for every node of every column, column by column, entry first.
pub fn compute<'a>(
    config: &LayoutConfig,
    viewport_width: f64,
    columns: &[ColumnSlots<'a>],
) -> Vec<(&'a NodeId, Position)> {
    let start_x = config.start_x(viewport_width, columns.len());
    let stride = config.node_width + config.column_gap;

    let capacity = columns.iter().map(|c| c.submitted.len() + 1).sum();
    let mut out = Vec::with_capacity(capacity);
    for (column_index, column) in columns.iter().enumerate() {
        let x = start_x + column_index as f64 * stride;
        out.push((column.entry, Position::new(x, config.entry_y())));
        for (row, id) in column.submitted.iter().enumerate() {
            out.push((*id, Position::new(x, config.row_y(row))));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(prefix: &str, count: usize) -> Vec<NodeId> {
        (0..count)
            .map(|i| NodeId::try_new(format!("{prefix}-{i}")).expect("node id"))
            .collect()
    }

    #[test]
    fn single_column_matches_canvas_constants() {
        let config = LayoutConfig::default();
        let entry = NodeId::try_new("entry").unwrap();
        let submitted = ids("goal", 3);
        let columns = [ColumnSlots {
            entry: &entry,
            submitted: submitted.iter().collect(),
        }];

        let out = compute(&config, 1000.0, &columns);
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], (&entry, Position::new(400.0, 100.0)));
        assert_eq!(out[1].1, Position::new(400.0, 300.0));
        assert_eq!(out[2].1, Position::new(400.0, 440.0));
        assert_eq!(out[3].1, Position::new(400.0, 580.0));
    }

    #[test]
    fn columns_are_centered_for_any_width_and_count() {
        let config = LayoutConfig::default();
        let entries = ids("entry", 6);
        for width in [320.0, 777.0, 1280.0, 1920.0, 4000.5] {
            for n in 1..=entries.len() {
                let columns: Vec<ColumnSlots<'_>> = entries[..n]
                    .iter()
                    .map(|entry| ColumnSlots {
                        entry,
                        submitted: Vec::new(),
                    })
                    .collect();
                let out = compute(&config, width, &columns);
                let left = out.first().unwrap().1.x;
                let right = out.last().unwrap().1.x + config.node_width;
                let center = (left + right) / 2.0;
                assert!(
                    (center - width / 2.0).abs() <= config.node_width / 2.0,
                    "width={width} n={n} center={center}"
                );
                assert!((right - left - config.total_width(n)).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn layout_is_bit_identical_across_calls() {
        let config = LayoutConfig::default();
        let entries = ids("entry", 3);
        let rows = ids("row", 7);
        let columns = vec![
            ColumnSlots {
                entry: &entries[0],
                submitted: rows[..4].iter().collect(),
            },
            ColumnSlots {
                entry: &entries[1],
                submitted: Vec::new(),
            },
            ColumnSlots {
                entry: &entries[2],
                submitted: rows[4..].iter().collect(),
            },
        ];

        let first = compute(&config, 1366.0, &columns);
        let second = compute(&config, 1366.0, &columns);
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.0, b.0);
            assert_eq!(a.1.x.to_bits(), b.1.x.to_bits());
            assert_eq!(a.1.y.to_bits(), b.1.y.to_bits());
        }
    }

    #[test]
    fn empty_input_yields_no_positions() {
        let config = LayoutConfig::default();
        assert!(compute(&config, 800.0, &[]).is_empty());
        assert_eq!(config.total_width(0), 0.0);
    }
}
