use crate::utils;
use colored::Colorize;
use stackforge_cloud::{Plan, Teardown};
use stackforge_config::LoadedConfig;
use std::io::Write;

pub async fn handle(loaded: &LoadedConfig, yes: bool) -> anyhow::Result<()> {
    utils::print_project(loaded);

    let state = utils::load_state(loaded).await?;
    if state.is_empty() {
        println!("{}", "Nothing recorded, nothing to tear down.".yellow());
        return Ok(());
    }

    println!();
    println!(
        "{}",
        "WARNING: this permanently deletes every resource below and all data in them."
            .red()
            .bold()
    );
    utils::print_plan(&Plan::teardown(&state), &state);
    println!();

    if !yes {
        print!("Type {} to continue: ", utils::CONFIRM_WORD.bold());
        std::io::stdout().flush()?;

        if !utils::confirm(&mut std::io::stdin().lock())? {
            println!("{}", "Teardown cancelled".yellow());
            return Ok(());
        }
    }

    let settings = loaded.settings();
    let sdk = stackforge_cloud_aws::load_sdk_config(loaded.config.region.clone()).await;
    let providers = stackforge_cloud_aws::providers(&sdk, &settings);
    let store = utils::state_store(loaded);

    let result = Teardown::new(&providers, &store, &settings.project_name)
        .run()
        .await?;
    utils::print_result("Tore down", &result);
    println!("{}", "✓ State record removed".green());
    Ok(())
}
