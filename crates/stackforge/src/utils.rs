use colored::Colorize;
use stackforge_cloud::{
    ActionType, ApplyResult, FileStateStore, Plan, StateStore, StepName, TopologyState,
};
use stackforge_config::LoadedConfig;
use std::io::BufRead;

pub const CONFIRM_WORD: &str = "CONFIRM";

pub fn state_store(loaded: &LoadedConfig) -> FileStateStore {
    FileStateStore::new(&loaded.project_root)
}

pub async fn load_state(loaded: &LoadedConfig) -> anyhow::Result<TopologyState> {
    Ok(state_store(loaded)
        .load_project(&loaded.config.project_name)
        .await?)
}

pub fn print_project(loaded: &LoadedConfig) {
    println!(
        "Project: {} ({})",
        loaded.config.project_name.cyan(),
        loaded.path.display().to_string().dimmed()
    );
}

pub fn print_plan(plan: &Plan, state: &TopologyState) {
    for action in &plan.actions {
        let marker = match action.action_type {
            ActionType::Ensure => "+".green(),
            ActionType::Teardown => "-".red(),
            ActionType::Skip => "✓".dimmed(),
        };
        println!("  {} {}", marker, action.step.to_string().bold());

        if let Some(descriptor) = state.get(action.step) {
            for (key, value) in descriptor.iter() {
                println!("      {}: {}", key.dimmed(), value);
            }
        }
    }
    println!();
    println!("{}", plan.summary().to_string().bold());
}

pub fn print_result(verb: &str, result: &ApplyResult) {
    println!();
    println!(
        "{}",
        format!(
            "✓ {} {} step(s), {} skipped in {:.1}s",
            verb,
            result.applied.len(),
            result.skipped.len(),
            result.duration_ms as f64 / 1000.0
        )
        .green()
    );
}

/// Endpoints worth showing once a topology exists
pub fn print_endpoints(state: &TopologyState) {
    let attribute = |step: StepName, key: &str| {
        state
            .get(step)
            .and_then(|descriptor| descriptor.get(key))
            .map(str::to_string)
    };

    println!();
    println!("{}", "Endpoints:".bold());
    if let Some(domain) = attribute(StepName::EdgeCache, "domain_name") {
        println!("  Site:  https://{}", domain.cyan());
    }
    if let Some(url) = attribute(StepName::ApiGateway, "url") {
        println!("  API:   {}", url.cyan());
    }
    if let Some(outputs) = state.outputs() {
        println!("  Cache: {}", outputs.cache_endpoint);
        println!("  Data:  {}", outputs.data_bucket);
        println!("  Topic: {}", outputs.topic_arn);
    }
}

/// True when the operator typed the confirmation word
pub fn confirm(input: &mut impl BufRead) -> std::io::Result<bool> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().eq_ignore_ascii_case(CONFIRM_WORD))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_confirm_is_case_insensitive() {
        assert!(confirm(&mut Cursor::new("CONFIRM\n")).unwrap());
        assert!(confirm(&mut Cursor::new("  confirm  \n")).unwrap());
        assert!(!confirm(&mut Cursor::new("yes\n")).unwrap());
        assert!(!confirm(&mut Cursor::new("")).unwrap());
    }
}
