use crate::render::colors::RouteColorAllocator;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegendEntry {
    pub name: String,
    pub icon: String,
}

pub fn icon_for(color_index: u32) -> String {
    format!("{}.ico", color_index)
}

/// Legend rows in allocation order.
pub fn project_legend(colors: &RouteColorAllocator) -> Vec<LegendEntry> {
    colors
        .iter()
        .map(|(route, index)| LegendEntry {
            name: route.to_string(),
            icon: icon_for(index),
        })
        .collect()
}
