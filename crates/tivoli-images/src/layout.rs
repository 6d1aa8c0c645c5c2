//! Waterfall layout of a photo grid.
//!
//! Items are packed greedily into the currently shortest column, which keeps the columns close to
//! balanced in a single pass. The resulting [`VisualOrder`] is the order in which a viewer
//! scrolling from top to bottom encounters the items across all columns.

use serde::Serialize;

use crate::types::ImageSummary;

/// The geometry of a single placed item.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct LayoutItem {
    /// The index of the item in the layout input.
    pub index: usize,
    pub column: usize,
    pub x: f64,
    pub y: f64,
    pub height: f64,
}

/// All item indices sorted top to bottom, together with the inverse mapping.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VisualOrder {
    order: Vec<usize>,
    positions: Vec<usize>,
}

impl VisualOrder {
    /// Sorts items by their vertical offset, ties broken by item index.
    fn from_items(items: &[LayoutItem]) -> Self {
        let mut order: Vec<usize> = (0..items.len()).collect();
        order.sort_by(|&a, &b| items[a].y.total_cmp(&items[b].y).then(a.cmp(&b)));

        let mut positions = vec![0; order.len()];
        for (position, &index) in order.iter().enumerate() {
            positions[index] = position;
        }

        Self { order, positions }
    }

    /// Item indices in viewing order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// The position of an item in viewing order, or `None` if it was not laid out.
    pub fn position_of(&self, index: usize) -> Option<usize> {
        self.positions.get(index).copied()
    }

    /// The item at the given position in viewing order.
    pub fn index_at(&self, position: usize) -> Option<usize> {
        self.order.get(position).copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// A computed waterfall layout.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Layout {
    columns: Vec<Vec<LayoutItem>>,
    items: Vec<LayoutItem>,
    visual_order: VisualOrder,
    height: f64,
}

impl Layout {
    /// The placed items of every column, top to bottom.
    pub fn columns(&self) -> &[Vec<LayoutItem>] {
        &self.columns
    }

    /// All placed items, in input order.
    pub fn items(&self) -> &[LayoutItem] {
        &self.items
    }

    pub fn item(&self, index: usize) -> Option<&LayoutItem> {
        self.items.get(index)
    }

    pub fn visual_order(&self) -> &VisualOrder {
        &self.visual_order
    }

    /// The height of the tallest column.
    pub fn height(&self) -> f64 {
        self.height
    }

    /// Whether the layout places no items, either for lack of items or of a measured container.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Computes the width of one column in a container of the given width.
///
/// Returns `0` while the container has not been measured, which makes the layout empty.
pub fn column_width(container_width: f64, column_count: usize, spacing: f64) -> f64 {
    if container_width.is_nan() || container_width <= 0.0 {
        return 0.0;
    }
    let column_count = column_count.max(1) as f64;
    let width = (container_width - spacing * (column_count - 1.0)) / column_count;
    width.max(0.0)
}

/// Greedy shortest-column packing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WaterfallLayout {
    pub column_count: usize,
    pub column_width: f64,
    /// Vertical gap between items of a column, and horizontal gap between columns.
    pub spacing: f64,
}

impl WaterfallLayout {
    pub fn new(column_count: usize, column_width: f64, spacing: f64) -> Self {
        Self {
            column_count: column_count.max(1),
            column_width,
            spacing,
        }
    }

    /// Lays out items with the given aspect ratios without any spacing.
    pub fn compute<I>(aspect_ratios: I, column_count: usize, column_width: f64) -> Layout
    where
        I: IntoIterator<Item = f64>,
    {
        Self::new(column_count, column_width, 0.0).layout(aspect_ratios)
    }

    /// Lays out search results by their aspect ratio.
    pub fn layout_images(&self, images: &[ImageSummary]) -> Layout {
        self.layout(images.iter().map(ImageSummary::aspect_ratio))
    }

    /// Lays out items with the given aspect ratios, in order.
    ///
    /// Unusable aspect ratios are treated as square items.
    pub fn layout<I>(&self, aspect_ratios: I) -> Layout
    where
        I: IntoIterator<Item = f64>,
    {
        let column_count = self.column_count.max(1);
        if self.column_width.is_nan() || self.column_width <= 0.0 {
            return Layout {
                columns: vec![Vec::new(); column_count],
                ..Default::default()
            };
        }

        let mut columns = vec![Vec::new(); column_count];
        let mut heights = vec![0.0_f64; column_count];
        let mut items = Vec::new();

        for (index, aspect_ratio) in aspect_ratios.into_iter().enumerate() {
            let aspect_ratio = if aspect_ratio.is_finite() && aspect_ratio > 0.0 {
                aspect_ratio
            } else {
                1.0
            };

            // Ties go to the lowest column.
            let column = (0..column_count)
                .min_by(|&a, &b| heights[a].total_cmp(&heights[b]))
                .unwrap_or(0);

            let item = LayoutItem {
                index,
                column,
                x: column as f64 * (self.column_width + self.spacing),
                y: heights[column],
                height: self.column_width / aspect_ratio,
            };
            heights[column] += item.height + self.spacing;
            columns[column].push(item);
            items.push(item);
        }

        let height = heights
            .iter()
            .zip(&columns)
            .filter(|(_, column)| !column.is_empty())
            .map(|(height, _)| height - self.spacing)
            .fold(0.0, f64::max);

        Layout {
            visual_order: VisualOrder::from_items(&items),
            columns,
            items,
            height,
        }
    }
}
