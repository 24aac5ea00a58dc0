use crate::utils;
use colored::Colorize;
use stackforge_config::LoadedConfig;

pub async fn handle(loaded: &LoadedConfig) -> anyhow::Result<()> {
    println!("{}", "Deploying artifacts...".yellow());
    utils::print_project(loaded);

    let state = utils::load_state(loaded).await?;
    let settings = loaded.settings();
    println!(
        "Artifacts: {}",
        settings.artifacts_dir.display().to_string().cyan()
    );

    let sdk = stackforge_cloud_aws::load_sdk_config(loaded.config.region.clone()).await;
    let report = stackforge_cloud_aws::deployer(&sdk, &settings)
        .deploy(&state)
        .await?;

    println!();
    println!(
        "{}",
        format!("Uploaded {} frontend file(s):", report.uploaded.len()).bold()
    );
    for key in &report.uploaded {
        println!("  • {}", key);
    }
    println!(
        "{}",
        format!("Updated {} function(s):", report.functions.len()).bold()
    );
    for name in &report.functions {
        println!("  • {}", name.cyan());
    }

    println!();
    println!("{}", "✓ Deployment complete".green());
    Ok(())
}
