//! Tracked items and their reference icons.

use std::path::Path;

use image::GrayImage;

use crate::automation::config::ItemConfig;
use crate::error::{RefresherError, Result};

/// An item the session searches for.
#[derive(Clone, Debug)]
pub struct TrackedItem {
    pub name: String,
    /// Grayscale reference icon
    pub template: GrayImage,
    /// Unit price in the item currency
    pub price: u64,
}

/// Ordered, fixed set of tracked items for one session.
///
/// Indices into the registry are stable for the whole session and match the
/// tally indices in `SessionStats`.
#[derive(Clone, Debug, Default)]
pub struct ItemRegistry {
    items: Vec<TrackedItem>,
}

impl ItemRegistry {
    pub fn new(items: Vec<TrackedItem>) -> Self {
        Self { items }
    }

    /// Loads every item icon from `assets_dir`, converted to grayscale.
    pub fn load(catalog: &[ItemConfig], assets_dir: &Path) -> Result<Self> {
        let items = catalog
            .iter()
            .map(|item| {
                let path = assets_dir.join(&item.icon);
                let template = image::open(&path)
                    .map_err(|source| RefresherError::TemplateLoad {
                        path: path.clone(),
                        source,
                    })?
                    .to_luma8();
                log::info!(
                    "Loaded {} ({}x{}) from {}",
                    item.name,
                    template.width(),
                    template.height(),
                    path.display()
                );
                Ok(TrackedItem {
                    name: item.name.clone(),
                    template,
                    price: item.price,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { items })
    }

    pub fn items(&self) -> &[TrackedItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &TrackedItem)> {
        self.items.iter().enumerate()
    }
}
