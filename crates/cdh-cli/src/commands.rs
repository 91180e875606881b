//! Command implementations for the binary.

use anyhow::Result;
use comfy_table::Table;

use cdh_model::NodeType;

use crate::summary::apply_table_style;

pub fn run_node_types() -> Result<()> {
    let mut table = Table::new();
    table.set_header(vec!["Node type", "Collection", "Kind"]);
    apply_table_style(&mut table);
    for node_type in NodeType::ALL {
        let kind = if node_type.is_observation() {
            "observation"
        } else {
            "structural"
        };
        table.add_row(vec![node_type.to_string(), node_type.plural(), kind.to_string()]);
    }
    println!("{table}");
    Ok(())
}
