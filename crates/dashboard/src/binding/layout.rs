//! Layout collaborator interfaces and an in-memory grid.
//!
//! The real drag/resize grid lives outside this crate. The binder only needs to
//! find a cell by id, reach its content region and hear about drops and
//! removals. [`GridLayout`] implements that contract without any rendering and
//! backs the headless shell and the tests.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use uuid::Uuid;

/// What a content region currently displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RegionContent {
    Empty,
    /// Waiting for the widget type to be registered.
    Placeholder { widget_type: String },
    Mounted { widget_type: String, container: Uuid },
    /// Terminal: the widget type never showed up.
    NotFound { widget_type: String },
    Error { message: String },
}

impl fmt::Display for RegionContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionContent::Empty => Ok(()),
            RegionContent::Placeholder { widget_type } => write!(f, "Loading {}...", widget_type),
            RegionContent::Mounted { widget_type, .. } => f.write_str(widget_type),
            RegionContent::NotFound { widget_type } => write!(f, "Widget type \"{}\" not found", widget_type),
            RegionContent::Error { message } => write!(f, "Error: {}", message),
        }
    }
}

/// The part of a cell that hosts a widget.
pub trait ContentRegion: Send + Sync {
    fn content(&self) -> RegionContent;
    fn set(&self, content: RegionContent);

    fn clear(&self) {
        self.set(RegionContent::Empty);
    }
}

pub trait GridCell: Send + Sync {
    fn id(&self) -> &str;
    /// Cells may be created without a region, e.g. while still being laid out.
    fn content_region(&self) -> Option<Arc<dyn ContentRegion>>;
}

pub type CellCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Layout engine as seen by the binding layer.
pub trait LayoutEngine: Send + Sync {
    fn find_cell(&self, cell_id: &str) -> Option<Arc<dyn GridCell>>;
    /// Called with the id of each cell a user drops onto the grid.
    fn on_dropped(&self, callback: CellCallback);
    /// Called with the id of each cell removed from the grid.
    fn on_removed(&self, callback: CellCallback);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub struct MemoryRegion {
    content: Mutex<Option<RegionContent>>,
}

impl ContentRegion for MemoryRegion {
    fn content(&self) -> RegionContent {
        lock(&self.content).clone().unwrap_or(RegionContent::Empty)
    }

    fn set(&self, content: RegionContent) {
        *lock(&self.content) = Some(content);
    }
}

pub struct MemoryCell {
    id: String,
    region: Option<Arc<MemoryRegion>>,
}

impl GridCell for MemoryCell {
    fn id(&self) -> &str {
        &self.id
    }

    fn content_region(&self) -> Option<Arc<dyn ContentRegion>> {
        self.region.clone().map(|region| region as Arc<dyn ContentRegion>)
    }
}

/// Grid of cells kept in memory.
#[derive(Default)]
pub struct GridLayout {
    cells: Mutex<BTreeMap<String, Arc<MemoryCell>>>,
    dropped: Mutex<Vec<CellCallback>>,
    removed: Mutex<Vec<CellCallback>>,
}

/// Fresh cell id in the `widget-xxxxxxxxx` form.
pub fn new_cell_id() -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("widget-{}", &random[..9])
}

impl GridLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a cell as if dropped by the user and notifies drop listeners.
    ///
    /// Returns the cell id, generated when `cell_id` is `None`. Dropping onto
    /// an existing id returns it unchanged without notifying.
    pub fn drop_cell(&self, cell_id: Option<&str>) -> String {
        let id = cell_id.map(str::to_string).unwrap_or_else(new_cell_id);
        {
            let mut cells = lock(&self.cells);
            if cells.contains_key(&id) {
                return id;
            }
            cells.insert(
                id.clone(),
                Arc::new(MemoryCell {
                    id: id.clone(),
                    region: Some(Arc::new(MemoryRegion::default())),
                }),
            );
        }
        // Listeners run without the grid locked so they may call back into it.
        let listeners = lock(&self.dropped).clone();
        for listener in listeners {
            listener(&id);
        }
        id
    }

    /// Adds a cell that has no content region.
    pub fn add_bare_cell(&self, cell_id: &str) {
        lock(&self.cells).insert(
            cell_id.to_string(),
            Arc::new(MemoryCell {
                id: cell_id.to_string(),
                region: None,
            }),
        );
    }

    pub fn remove_cell(&self, cell_id: &str) -> bool {
        if lock(&self.cells).remove(cell_id).is_none() {
            return false;
        }
        let listeners = lock(&self.removed).clone();
        for listener in listeners {
            listener(cell_id);
        }
        true
    }

    /// Ids of all cells, sorted.
    pub fn cell_ids(&self) -> Vec<String> {
        lock(&self.cells).keys().cloned().collect()
    }

    pub fn region_content(&self, cell_id: &str) -> Option<RegionContent> {
        self.find_cell(cell_id)?
            .content_region()
            .map(|region| region.content())
    }
}

impl LayoutEngine for GridLayout {
    fn find_cell(&self, cell_id: &str) -> Option<Arc<dyn GridCell>> {
        lock(&self.cells)
            .get(cell_id)
            .cloned()
            .map(|cell| cell as Arc<dyn GridCell>)
    }

    fn on_dropped(&self, callback: CellCallback) {
        lock(&self.dropped).push(callback);
    }

    fn on_removed(&self, callback: CellCallback) {
        lock(&self.removed).push(callback);
    }
}
