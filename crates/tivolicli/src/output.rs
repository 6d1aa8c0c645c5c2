use prettytable::format::consts::FORMAT_CLEAN;
use prettytable::{Table, row};
use serde::Serialize;
use tivoli_images::layout::{Layout, LayoutItem};
use tivoli_images::types::ImageSummary;

#[derive(Debug, Serialize)]
struct JsonItem<'a> {
    uuid: &'a str,
    #[serde(flatten)]
    item: &'a LayoutItem,
}

#[derive(Debug, Serialize)]
struct JsonLayout<'a> {
    height: f64,
    items: Vec<JsonItem<'a>>,
    visual_order: &'a [usize],
}

pub fn print_json(images: &[ImageSummary], layout: &Layout) -> anyhow::Result<()> {
    let items = layout
        .items()
        .iter()
        .zip(images)
        .map(|(item, image)| JsonItem {
            uuid: &image.uuid,
            item,
        })
        .collect();

    let output = JsonLayout {
        height: layout.height(),
        items,
        visual_order: layout.visual_order().order(),
    };
    serde_json::to_writer_pretty(std::io::stdout(), &output)?;
    println!();
    Ok(())
}

/// Prints the items in visual order.
pub fn print_compact(images: &[ImageSummary], layout: &Layout) {
    if layout.is_empty() {
        println!("Nothing laid out.");
        return;
    }

    let mut table = Table::new();
    table.set_format(*FORMAT_CLEAN);
    table.set_titles(row![b => "Position", "Index", "Image", "Column", "X", "Y", "Height"]);

    for (position, &index) in layout.visual_order().order().iter().enumerate() {
        let Some(item) = layout.item(index) else {
            continue;
        };
        let uuid = images.get(index).map_or("", |image| image.uuid.as_str());
        table.add_row(row![
            r->position,
            r->index,
            uuid,
            r->item.column,
            r->format!("{:.1}", item.x),
            r->format!("{:.1}", item.y),
            r->format!("{:.1}", item.height)
        ]);
    }

    table.printstd();
    println!("Total height: {:.1}", layout.height());
}
