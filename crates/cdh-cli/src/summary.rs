//! Terminal run summary.

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use cdh_cli::types::StudyOutcome;

pub fn print_summary(outcomes: &[StudyOutcome]) {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Study"),
        header_cell("Transformations"),
        header_cell("Participants"),
        header_cell("Observations"),
        header_cell("Duplicates suppressed"),
        header_cell("Schema"),
    ]);
    apply_table_style(&mut table);
    for column in 1..=4 {
        align_column(&mut table, column, CellAlignment::Right);
    }
    align_column(&mut table, 5, CellAlignment::Center);

    for outcome in outcomes {
        let schema_cell = if outcome.schema_valid {
            Cell::new("valid").fg(Color::Green)
        } else {
            Cell::new("INVALID").fg(Color::Red).add_attribute(Attribute::Bold)
        };
        table.add_row(vec![
            Cell::new(&outcome.study_id),
            Cell::new(outcome.transformations),
            Cell::new(outcome.participants),
            Cell::new(outcome.observations),
            Cell::new(outcome.duplicates_suppressed),
            schema_cell,
        ]);
    }
    println!("{table}");

    for outcome in outcomes {
        if let Some(path) = &outcome.merged_output_path {
            println!("Merged output ({}): {path}", outcome.study_id);
        }
    }
}

pub fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
}

fn header_cell(text: &str) -> Cell {
    Cell::new(text).add_attribute(Attribute::Bold)
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}
