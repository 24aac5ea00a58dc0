use crate::utils;
use colored::Colorize;
use stackforge_cloud::Plan;
use stackforge_config::LoadedConfig;

pub async fn handle(loaded: &LoadedConfig) -> anyhow::Result<()> {
    utils::print_project(loaded);
    println!(
        "State: {}",
        utils::state_store(loaded)
            .state_path()
            .display()
            .to_string()
            .dimmed()
    );
    println!();

    let state = utils::load_state(loaded).await?;
    if state.is_empty() {
        println!("{}", "Nothing provisioned yet.".yellow());
        println!();
    }

    utils::print_plan(&Plan::provision(&state), &state);

    if state.is_complete() {
        utils::print_endpoints(&state);
    }
    Ok(())
}
