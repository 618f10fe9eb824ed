use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One widget declared by an installed plugin.
///
/// Produced by the manifest loader and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetDescriptor {
    /// Type tag the widget is registered and attached under.
    pub name: String,
    #[serde(rename = "type")]
    pub widget_type: String,
    pub description: String,
    /// Component entry point inside the plugin directory.
    pub component_ref: String,
    /// Name of the plugin that declared the widget.
    pub mod_name: String,
    pub mod_path: PathBuf,
    /// External script/style URLs the component needs.
    pub dependencies: Vec<String>,
    /// Default options handed to the component when mounted.
    pub options: serde_json::Value,
}
