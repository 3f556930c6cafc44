use anyhow::Result;
use comfy_table::{Cell, Table};

use super::CommandContext;
use crate::output::json::print_json;
use crate::output::table::print_table;

pub async fn list(ctx: &CommandContext) -> Result<()> {
    let models = ctx.api.get_models(ctx.store.token()).await?;

    if ctx.format.is_json() {
        return print_json(&models);
    }

    if models.is_empty() {
        println!("No models available");
        return Ok(());
    }

    let default_model = ctx.settings.defaults.model.as_deref();
    let mut table = Table::new();
    table.set_header(vec!["Model", "Default"]);
    for model in models {
        let marker = if Some(model.id.as_str()) == default_model {
            "*"
        } else {
            ""
        };
        table.add_row(vec![Cell::new(&model.id), Cell::new(marker)]);
    }

    print_table(table)
}
