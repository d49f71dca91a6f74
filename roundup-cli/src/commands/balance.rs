//! Balance command

use anyhow::Result;
use colored::Colorize;

use super::get_context;
use crate::output;

pub async fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let balance = ctx.balance_service.active_balance().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&balance)?);
        return Ok(());
    }

    println!("{} ({})", output::short(&balance.public_key).bold(), balance.network);
    let mut table = output::create_table();
    table.add_row(vec!["Native".to_string(), output::amount(balance.native)]);
    table.add_row(vec!["Stable".to_string(), output::amount(balance.stable)]);
    for total in &balance.pending {
        table.add_row(vec![
            format!("Pending {}", total.asset_type),
            output::amount(total.amount),
        ]);
    }
    println!("{}", table);
    Ok(())
}
