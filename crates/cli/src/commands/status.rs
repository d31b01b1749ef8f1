use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use scanvault_core::config::Config;
use scanvault_core::domain::ArchiveStats;
use scanvault_core::Archive;

pub fn run(archive: &Archive, config: &Config) -> Result<()> {
    let stats = archive.status()?;

    println!();
    println!("  Scanvault Status");
    println!("  ================");
    println!();
    println!("   Catalog:  {}", config.catalog_path.display());
    println!("   Exiftool: {}", config.exiftool_path.display());
    println!();
    println!("{}", stats_table(&stats));

    if stats.dirty_images > 0 {
        println!();
        println!("  Run 'scanvault sync' to write {} pending images.", stats.dirty_images);
    }
    println!();
    Ok(())
}

pub(crate) fn stats_table(stats: &ArchiveStats) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![Cell::new("Catalog"), Cell::new("Count")]);

    let dirty = if stats.dirty_images > 0 {
        Cell::new(stats.dirty_images).fg(Color::Yellow)
    } else {
        Cell::new(stats.dirty_images).fg(Color::Green)
    };
    table.add_row(vec![Cell::new("Images"), Cell::new(stats.total_images)]);
    table.add_row(vec![Cell::new("Pending sync"), dirty]);
    table.add_row(vec![Cell::new("People"), Cell::new(stats.people)]);
    table.add_row(vec![Cell::new("Pets"), Cell::new(stats.pets)]);
    table.add_row(vec![Cell::new("Locations"), Cell::new(stats.locations)]);
    table.add_row(vec![Cell::new("Dates"), Cell::new(stats.dates)]);
    table.add_row(vec![Cell::new("Tags"), Cell::new(stats.tags)]);
    table
}
