//! Widget binding layer.

pub mod binder;
pub mod layout;
pub mod registry;
pub mod widget;

pub use binder::{BinderSettings, BindingInfo, WidgetBinder};
pub use layout::{CellCallback, ContentRegion, GridCell, GridLayout, LayoutEngine, RegionContent};
pub use registry::WidgetRegistry;
pub use widget::{GraphPoint, Widget, WidgetContext, WidgetFactory, WidgetInput, WidgetView};
