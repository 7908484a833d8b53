use anyhow::Result;
use badminton_analyzer_rust::llm::create_model;
use badminton_analyzer_rust::{Config, PromptRegistry, TaskKind};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("badminton_analyzer_rust=info,check_gemini=info")
        .init();

    info!("🔍 Checking Gemini availability...");

    let config = Config::load(None)?;
    if let Err(e) = config.validate() {
        info!("❌ {}", e);
        return Ok(());
    }

    let model = match create_model(&config.gemini) {
        Ok(model) => model,
        Err(e) => {
            info!("❌ {}", e);
            info!("💡 Put GEMINI_API_KEY=... in your environment or a .env file");
            return Ok(());
        }
    };

    info!("   - Model: {}", model.model_name());
    info!("   - Endpoint: {}", config.gemini.base_url);

    if model.is_available().await {
        info!("✅ Gemini model {} is reachable", model.model_name());
    } else {
        info!("❌ Gemini model {} is not reachable with this key", model.model_name());
        return Ok(());
    }

    // Show the prompts that will be used
    let registry = PromptRegistry::from_config(&config.prompts).await;
    for kind in [TaskKind::Segment, TaskKind::Analyze] {
        let task = registry.config(kind);
        info!(
            "📋 {} prompt: {} chars, temperature {}, top_p {}, top_k {}",
            kind,
            task.prompt.len(),
            task.sampling.temperature,
            task.sampling.top_p,
            task.sampling.top_k
        );
    }

    info!("🎉 Ready to analyze matches");
    info!("💡 Run: badminton-analyzer analyze /path/to/match.mp4");

    Ok(())
}
