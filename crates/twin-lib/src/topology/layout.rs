//! Deterministic graph layout
//!
//! Routers form the top row, switches the row below, k3s nodes sit on a
//! circle and everything else is parked on a row above the routers. The
//! output depends only on the input node order, never on wall time or hash
//! iteration order.

use crate::models::{Node, NodeType};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

pub const ROUTER_ROW_Y: f64 = 0.0;
pub const ROUTER_SPACING: f64 = 300.0;
pub const SWITCH_ROW_Y: f64 = 250.0;
pub const SWITCH_SPACING: f64 = 400.0;
pub const K3S_CIRCLE_RADIUS: f64 = 500.0;
pub const K3S_CIRCLE_CENTER_Y: f64 = 200.0;
pub const OTHER_ROW_Y: f64 = -300.0;
pub const OTHER_SPACING: f64 = 200.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePosition {
    pub id: String,
    pub x: f64,
    pub y: f64,
}

/// Compute positions for `nodes`, returned in input order
pub fn compute_layout(nodes: &[Node]) -> Vec<NodePosition> {
    let count = |t: NodeType| nodes.iter().filter(|n| n.node_type == t).count();
    let routers = count(NodeType::Router);
    let switches = count(NodeType::Switch);
    let k3s = count(NodeType::K3sNode);
    let others = count(NodeType::Generic);

    let mut seen_router = 0;
    let mut seen_switch = 0;
    let mut seen_k3s = 0;
    let mut seen_other = 0;

    nodes
        .iter()
        .map(|node| {
            let (x, y) = match node.node_type {
                NodeType::Router => {
                    let x = row_x(seen_router, routers, ROUTER_SPACING);
                    seen_router += 1;
                    (x, ROUTER_ROW_Y)
                }
                NodeType::Switch => {
                    let x = row_x(seen_switch, switches, SWITCH_SPACING);
                    seen_switch += 1;
                    (x, SWITCH_ROW_Y)
                }
                NodeType::K3sNode => {
                    let angle = -PI / 2.0 + seen_k3s as f64 * (2.0 * PI / k3s as f64);
                    seen_k3s += 1;
                    (
                        K3S_CIRCLE_RADIUS * angle.cos(),
                        K3S_CIRCLE_CENTER_Y + K3S_CIRCLE_RADIUS * angle.sin(),
                    )
                }
                NodeType::Generic => {
                    let x = row_x(seen_other, others, OTHER_SPACING);
                    seen_other += 1;
                    (x, OTHER_ROW_Y)
                }
            };
            NodePosition {
                id: node.id.clone(),
                x,
                y,
            }
        })
        .collect()
}

/// X coordinate of the `index`-th of `count` items centered on x = 0
fn row_x(index: usize, count: usize, spacing: f64) -> f64 {
    (index as f64 - (count as f64 - 1.0) / 2.0) * spacing
}
