use crate::utils;
use colored::Colorize;
use stackforge_cloud::Provisioner;
use stackforge_config::LoadedConfig;

pub async fn handle(loaded: &LoadedConfig) -> anyhow::Result<()> {
    println!("{}", "Provisioning topology...".yellow());
    utils::print_project(loaded);

    let settings = loaded.settings();
    let sdk = stackforge_cloud_aws::load_sdk_config(loaded.config.region.clone()).await;
    println!("Region: {}", stackforge_cloud_aws::region_of(&sdk).cyan());

    let providers = stackforge_cloud_aws::providers(&sdk, &settings);
    let store = utils::state_store(loaded);
    let provisioner = Provisioner::new(&providers, &store, &settings.project_name);

    let plan = provisioner.plan().await?;
    println!("{}", plan.summary().to_string().bold());
    println!();

    let result = provisioner.run().await?;
    utils::print_result("Provisioned", &result);

    let state = utils::load_state(loaded).await?;
    utils::print_endpoints(&state);
    Ok(())
}
