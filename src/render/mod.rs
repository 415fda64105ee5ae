pub mod colors;
pub mod legend;
pub mod reconciler;

pub use colors::RouteColorAllocator;
pub use legend::{project_legend, LegendEntry};
pub use reconciler::{ApplyOutcome, ReconcileOutcome, Reconciler, RenderRecord};
