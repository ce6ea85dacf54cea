use std::error::Error;

use crate::api::{AiProvider, ProviderStatus, ProvidersStatusMap};
use crate::core::client::ChatClient;

pub fn format_provider_line(provider: AiProvider, status: Option<&ProviderStatus>) -> String {
    match status {
        Some(status) if status.available => format!("  ✅ {provider}"),
        Some(ProviderStatus {
            error: Some(error), ..
        }) => format!("  ❌ {provider} ({error})"),
        Some(_) => format!("  ❌ {provider}"),
        None => format!("  ❔ {provider} (not reported)"),
    }
}

pub fn format_providers(statuses: &ProvidersStatusMap) -> Vec<String> {
    AiProvider::ALL
        .into_iter()
        .map(|provider| format_provider_line(provider, statuses.get(&provider)))
        .collect()
}

pub async fn list_providers(client: &ChatClient) -> Result<(), Box<dyn Error>> {
    let statuses = client.providers_status().await?;

    println!("🤖 AI Providers");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for line in format_providers(&statuses) {
        println!("{line}");
    }
    Ok(())
}
