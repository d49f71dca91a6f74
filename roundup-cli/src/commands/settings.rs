//! Settings commands

use anyhow::{Context, Result};
use clap::Subcommand;
use rust_decimal::Decimal;

use roundup_core::services::LogEvent;
use roundup_core::{Network, SettingsUpdate};

use super::get_context;
use crate::output;

#[derive(Subcommand)]
pub enum SettingsCommands {
    /// Show current settings
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change one or more settings
    Set {
        /// Turn round-up detection on or off
        #[arg(long)]
        enabled: Option<bool>,
        /// Round up to the nearest 1, 5 or 10
        #[arg(long)]
        granularity: Option<Decimal>,
        /// Invest pending round-ups automatically
        #[arg(long)]
        auto_invest: Option<bool>,
        /// primary, test or simulated
        #[arg(long)]
        network: Option<String>,
    },
}

pub fn run(command: SettingsCommands) -> Result<()> {
    let ctx = get_context()?;

    match command {
        SettingsCommands::Show { json } => {
            let settings = ctx.accounts.settings()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&settings)?);
                return Ok(());
            }

            let mut table = output::create_table();
            table.add_row(vec!["Round-ups enabled", &settings.round_up_enabled.to_string()]);
            table.add_row(vec!["Round up to", &output::amount(settings.round_up_granularity.value())]);
            table.add_row(vec!["Auto invest", &settings.auto_invest.to_string()]);
            table.add_row(vec!["Network", settings.network.as_str()]);
            println!("{}", table);
        }
        SettingsCommands::Set { enabled, granularity, auto_invest, network } => {
            let network = network
                .map(|n| n.parse::<Network>())
                .transpose()
                .context("Unknown network")?;
            let update = SettingsUpdate {
                round_up_enabled: enabled,
                round_up_granularity: granularity,
                auto_invest,
                network,
            };
            let settings = ctx.accounts.update_settings(&update)?;
            ctx.log(
                LogEvent::new("settings_updated")
                    .with_command("settings set")
                    .with_network(settings.network.as_str()),
            );
            output::success("Settings saved");
        }
    }

    Ok(())
}
