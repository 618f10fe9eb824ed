//! Plugin manifest loader.
//!
//! Scans a directory holding one subdirectory per widget plugin and turns each
//! plugin's manifest into [`WidgetDescriptor`]s. Manifests are parsed as data,
//! nothing is executed, and the scan writes nothing to disk.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use telemetry_types::WidgetDescriptor;
use tracing::{debug, error, info, warn};

use crate::error::ManifestError;

/// Manifest file names looked up in each plugin directory, in order.
pub const MANIFEST_FILES: &[&str] = &["manifest.json", "manifest.toml"];

const DEFAULT_WIDGET_TYPE: &str = "widget";
const DEFAULT_COMPONENT: &str = "index.js";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawWidget {
    name: Option<String>,
    #[serde(rename = "type")]
    widget_type: Option<String>,
    description: Option<String>,
    component: Option<String>,
    main: Option<String>,
    cdn: Vec<String>,
    options: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawManifest {
    name: Option<String>,
    #[serde(rename = "type")]
    widget_type: Option<String>,
    description: Option<String>,
    component: Option<String>,
    main: Option<String>,
    cdn: Vec<String>,
    options: Option<Value>,
    widgets: Option<Vec<RawWidget>>,
}

impl RawManifest {
    /// Older plugins describe a single widget with the manifest itself.
    fn as_implicit_widget(&self) -> RawWidget {
        RawWidget {
            name: self.name.clone(),
            widget_type: self.widget_type.clone(),
            description: self.description.clone(),
            component: self.component.clone(),
            main: self.main.clone(),
            cdn: Vec::new(),
            options: self.options.clone(),
        }
    }
}

/// Loads every plugin under `root` into a flat catalog.
///
/// Plugins are visited in directory-name order. Directories without a
/// manifest are skipped silently; a manifest that fails to load is logged and
/// skipped. A missing root yields an empty catalog.
pub fn load_catalog(root: &Path) -> Vec<WidgetDescriptor> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(root = %root.display(), "Plugin directory does not exist");
            return Vec::new();
        }
        Err(e) => {
            error!(root = %root.display(), "Failed to read plugin directory: {}", e);
            return Vec::new();
        }
    };

    let mut plugin_dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    plugin_dirs.sort();

    let mut catalog = Vec::new();
    for dir in plugin_dirs {
        match load_plugin(&dir) {
            Ok(Some(widgets)) => {
                info!(plugin = %dir.display(), widgets = widgets.len(), "Loaded plugin");
                catalog.extend(widgets);
            }
            Ok(None) => debug!(plugin = %dir.display(), "No manifest, skipping"),
            Err(e) => error!(plugin = %dir.display(), "Skipping plugin: {}", e),
        }
    }

    for name in duplicate_names(&catalog) {
        warn!(widget = %name, "Widget name declared more than once, the last one wins");
    }

    info!(root = %root.display(), widgets = catalog.len(), "Plugin scan complete");
    catalog
}

/// Loads the widgets declared by one plugin directory.
///
/// Returns `Ok(None)` when the directory holds no manifest.
pub fn load_plugin(dir: &Path) -> Result<Option<Vec<WidgetDescriptor>>, ManifestError> {
    let Some(path) = MANIFEST_FILES
        .iter()
        .map(|file| dir.join(file))
        .find(|path| path.is_file())
    else {
        return Ok(None);
    };

    let contents = fs::read_to_string(&path).map_err(|source| ManifestError::Io {
        path: path.clone(),
        source,
    })?;
    let manifest = parse_manifest(&path, &contents)?;
    describe(dir, &path, manifest).map(Some)
}

fn parse_manifest(path: &Path, contents: &str) -> Result<RawManifest, ManifestError> {
    let is_toml = path.extension().and_then(|ext| ext.to_str()) == Some("toml");
    if is_toml {
        toml::from_str(contents).map_err(|source| ManifestError::Toml {
            path: path.to_path_buf(),
            source,
        })
    } else {
        serde_json::from_str(contents).map_err(|source| ManifestError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn describe(dir: &Path, path: &Path, mut manifest: RawManifest) -> Result<Vec<WidgetDescriptor>, ManifestError> {
    let dir_name = dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mod_name = manifest
        .name
        .clone()
        .filter(|name| !name.is_empty())
        .unwrap_or(dir_name);

    let explicit = manifest.widgets.is_some();
    let raw_widgets = match manifest.widgets.take() {
        Some(widgets) => widgets,
        None => vec![manifest.as_implicit_widget()],
    };

    raw_widgets
        .into_iter()
        .enumerate()
        .map(|(index, raw)| {
            let name = match raw.name.filter(|name| !name.is_empty()) {
                Some(name) => name,
                None if !explicit => mod_name.clone(),
                None => {
                    return Err(ManifestError::Invalid {
                        path: path.to_path_buf(),
                        message: format!("widget #{} has no name", index),
                    })
                }
            };

            let mut dependencies: Vec<String> = Vec::new();
            for url in manifest.cdn.iter().chain(raw.cdn.iter()) {
                if !dependencies.contains(url) {
                    dependencies.push(url.clone());
                }
            }

            Ok(WidgetDescriptor {
                name,
                widget_type: raw
                    .widget_type
                    .unwrap_or_else(|| DEFAULT_WIDGET_TYPE.to_string()),
                description: raw.description.unwrap_or_default(),
                component_ref: raw
                    .component
                    .or(raw.main)
                    .unwrap_or_else(|| DEFAULT_COMPONENT.to_string()),
                mod_name: mod_name.clone(),
                mod_path: dir.to_path_buf(),
                dependencies,
                options: raw.options.unwrap_or_else(|| Value::Object(Default::default())),
            })
        })
        .collect()
}

/// Widget names declared more than once, sorted.
pub fn duplicate_names(catalog: &[WidgetDescriptor]) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for descriptor in catalog {
        *counts.entry(descriptor.name.as_str()).or_insert(0) += 1;
    }
    let mut duplicates: Vec<String> = counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(name, _)| name.to_string())
        .collect();
    duplicates.sort();
    duplicates
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn write(dir: &Path, file: &str, contents: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(file), contents).unwrap();
    }

    #[test]
    fn test_widget_list_inherits_plugin_dependencies() {
        let root = tempdir().unwrap();
        write(
            &root.path().join("charts"),
            "manifest.json",
            r#"{
                "name": "charts",
                "cdn": ["https://cdn.example/plot.js"],
                "widgets": [
                    { "name": "LineChart", "type": "chart", "component": "line.js",
                      "cdn": ["https://cdn.example/plot.js", "https://cdn.example/zoom.js"],
                      "options": { "points": 200 } },
                    { "name": "BarChart", "main": "bar.js" }
                ]
            }"#,
        );

        let catalog = load_catalog(root.path());
        assert_eq!(catalog.len(), 2);

        let line = &catalog[0];
        assert_eq!(line.name, "LineChart");
        assert_eq!(line.widget_type, "chart");
        assert_eq!(line.component_ref, "line.js");
        assert_eq!(line.mod_name, "charts");
        assert_eq!(line.mod_path, root.path().join("charts"));
        assert_eq!(
            line.dependencies,
            vec!["https://cdn.example/plot.js", "https://cdn.example/zoom.js"]
        );
        assert_eq!(line.options, json!({ "points": 200 }));

        let bar = &catalog[1];
        assert_eq!(bar.component_ref, "bar.js");
        assert_eq!(bar.widget_type, "widget");
        assert_eq!(bar.dependencies, vec!["https://cdn.example/plot.js"]);
        assert_eq!(bar.options, json!({}));
    }

    #[test]
    fn test_manifest_without_widgets_is_a_single_widget() {
        let root = tempdir().unwrap();
        write(
            &root.path().join("gauge"),
            "manifest.json",
            r#"{ "description": "Round gauge", "cdn": ["https://cdn.example/gauge.js"] }"#,
        );

        let catalog = load_catalog(root.path());
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].name, "gauge");
        assert_eq!(catalog[0].mod_name, "gauge");
        assert_eq!(catalog[0].description, "Round gauge");
        assert_eq!(catalog[0].component_ref, "index.js");
        assert_eq!(catalog[0].dependencies, vec!["https://cdn.example/gauge.js"]);
    }

    #[test]
    fn test_toml_manifest() {
        let root = tempdir().unwrap();
        write(
            &root.path().join("compass"),
            "manifest.toml",
            r#"
name = "compass"

[[widgets]]
name = "Heading"
component = "heading.js"

[widgets.options]
needle = "red"
"#,
        );

        let catalog = load_catalog(root.path());
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].name, "Heading");
        assert_eq!(catalog[0].options, json!({ "needle": "red" }));
    }

    #[test]
    fn test_bad_and_missing_manifests_do_not_abort_scan() {
        let root = tempdir().unwrap();
        write(&root.path().join("b_broken"), "manifest.json", "{ this is not json");
        fs::create_dir_all(root.path().join("c_empty")).unwrap();
        write(
            &root.path().join("d_unnamed"),
            "manifest.json",
            r#"{ "widgets": [ { "type": "chart" } ] }"#,
        );
        write(&root.path().join("e_ok"), "manifest.json", r#"{ "name": "ok" }"#);

        let catalog = load_catalog(root.path());
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].name, "ok");

        assert!(matches!(
            load_plugin(&root.path().join("b_broken")),
            Err(ManifestError::Json { .. })
        ));
        assert!(load_plugin(&root.path().join("c_empty")).unwrap().is_none());
        assert!(matches!(
            load_plugin(&root.path().join("d_unnamed")),
            Err(ManifestError::Invalid { .. })
        ));
    }

    #[test]
    fn test_missing_root_is_empty() {
        let root = tempdir().unwrap();
        assert!(load_catalog(&root.path().join("nope")).is_empty());
    }

    #[test]
    fn test_loading_is_repeatable_and_reports_duplicates() {
        let root = tempdir().unwrap();
        write(&root.path().join("a"), "manifest.json", r#"{ "widgets": [ { "name": "Dial" } ] }"#);
        write(&root.path().join("b"), "manifest.json", r#"{ "widgets": [ { "name": "Dial" } ] }"#);

        let first = load_catalog(root.path());
        let second = load_catalog(root.path());
        assert_eq!(first, second);
        assert_eq!(first[1].mod_name, "b");
        assert_eq!(duplicate_names(&first), vec!["Dial"]);
    }
}
