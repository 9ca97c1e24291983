//! Status and load coloring

use crate::models::{LoadCategory, NodeType};
use serde::{Deserialize, Serialize};

pub const ROUTER_RED: &str = "#e74c3c";
pub const SWITCH_BLUE: &str = "#3498db";
pub const K3S_STOPPED_GREY: &str = "#95a5a6";
pub const K3S_MONITORED_GREEN: &str = "#2ecc71";
pub const K3S_UNMONITORED_ORANGE: &str = "#f39c12";
pub const DEFAULT_NEUTRAL: &str = "#bdc3c7";

pub const LOAD_GREEN: &str = "#27ae60";
pub const LOAD_AMBER: &str = "#ffbf00";
pub const LOAD_RED: &str = "#c0392b";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeColor {
    pub background: String,
    pub border: String,
}

impl NodeColor {
    fn solid(color: &str) -> Self {
        Self {
            background: color.to_string(),
            border: color.to_string(),
        }
    }
}

/// Color for a node given its type and runtime state
pub fn color_for(node_type: NodeType, is_running: bool, has_monitoring: bool) -> NodeColor {
    match node_type {
        NodeType::Router => NodeColor::solid(ROUTER_RED),
        NodeType::Switch => NodeColor::solid(SWITCH_BLUE),
        NodeType::K3sNode if !is_running => NodeColor::solid(K3S_STOPPED_GREY),
        NodeType::K3sNode if has_monitoring => NodeColor::solid(K3S_MONITORED_GREEN),
        NodeType::K3sNode => NodeColor::solid(K3S_UNMONITORED_ORANGE),
        NodeType::Generic => NodeColor::solid(DEFAULT_NEUTRAL),
    }
}

pub fn load_border(category: LoadCategory) -> &'static str {
    match category {
        LoadCategory::Green => LOAD_GREEN,
        LoadCategory::Amber => LOAD_AMBER,
        LoadCategory::Red => LOAD_RED,
    }
}

/// Apply a load category to a node's border. Only k3s nodes carry load.
pub fn with_load(node_type: NodeType, mut color: NodeColor, load: Option<LoadCategory>) -> NodeColor {
    if let (NodeType::K3sNode, Some(category)) = (node_type, load) {
        color.border = load_border(category).to_string();
    }
    color
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_k3s_status_colors() {
        assert_eq!(color_for(NodeType::K3sNode, false, true).background, K3S_STOPPED_GREY);
        assert_eq!(color_for(NodeType::K3sNode, true, true).background, K3S_MONITORED_GREEN);
        assert_eq!(
            color_for(NodeType::K3sNode, true, false).background,
            K3S_UNMONITORED_ORANGE
        );
    }

    #[test]
    fn test_infrastructure_colors_ignore_status() {
        assert_eq!(color_for(NodeType::Router, false, false).background, ROUTER_RED);
        assert_eq!(color_for(NodeType::Switch, true, true).background, SWITCH_BLUE);
        assert_eq!(color_for(NodeType::Generic, true, true).background, DEFAULT_NEUTRAL);
    }

    #[test]
    fn test_load_only_changes_k3s_border() {
        let base = color_for(NodeType::K3sNode, true, true);
        let loaded = with_load(NodeType::K3sNode, base.clone(), Some(LoadCategory::Red));
        assert_eq!(loaded.border, LOAD_RED);
        assert_eq!(loaded.background, base.background);

        let router = color_for(NodeType::Router, true, false);
        assert_eq!(
            with_load(NodeType::Router, router.clone(), Some(LoadCategory::Red)),
            router
        );
    }
}
