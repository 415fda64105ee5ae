use crate::error::ColorsExhausted;
use std::collections::HashMap;

pub const DEFAULT_FIRST_INDEX: u32 = 1;

/// Permanent route -> color index assignments.
///
/// Indices are handed out in first-seen order starting at the configured
/// first index and are never freed or reassigned, so the table grows with the
/// number of distinct routes the feed has ever reported.
#[derive(Debug, Clone)]
pub struct RouteColorAllocator {
    indices: HashMap<String, u32>,
    order: Vec<String>,
    // None once u32::MAX has been handed out
    next_free: Option<u32>,
}

impl Default for RouteColorAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteColorAllocator {
    pub fn new() -> Self {
        Self::starting_at(DEFAULT_FIRST_INDEX)
    }

    pub fn starting_at(first_index: u32) -> Self {
        Self {
            indices: HashMap::new(),
            order: Vec::new(),
            next_free: Some(first_index),
        }
    }

    /// Assigns the next free index to `route` unless it already has one.
    /// Returns true if a new assignment was made.
    pub fn allocate(&mut self, route: &str) -> Result<bool, ColorsExhausted> {
        if self.indices.contains_key(route) {
            return Ok(false);
        }

        let index = self.next_free.ok_or_else(|| ColorsExhausted {
            route: route.to_string(),
        })?;
        self.indices.insert(route.to_string(), index);
        self.order.push(route.to_string());
        self.next_free = index.checked_add(1);
        Ok(true)
    }

    pub fn color_of(&self, route: &str) -> Option<u32> {
        self.indices.get(route).copied()
    }

    pub fn next_free(&self) -> Option<u32> {
        self.next_free
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Assignments in the order routes were first allocated.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> + '_ {
        self.order
            .iter()
            .map(|route| (route.as_str(), self.indices[route]))
    }
}
