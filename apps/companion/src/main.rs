//! familiar: a desktop companion that watches, listens, and answers.

mod orchestrator;
mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use familiar_adapter::{Adapter, AdapterManager};
use familiar_avatar::{AvatarRenderer, HttpAvatarClient};
use familiar_brain::ReasoningClient;
use familiar_keyboard::KeyboardAdapter;
use familiar_screen::ScreenAdapter;
use familiar_voice::VoiceAdapter;

use orchestrator::DecisionDeps;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let settings = settings::load(config_path.as_deref())?;

    if !familiar_brain::check_gateway(&settings.brain.base_url).await {
        anyhow::bail!(
            "reasoning gateway not reachable at {}; start it and try again",
            settings.brain.base_url
        );
    }

    // Local-first synthesis; a failed local path degrades to remote, and
    // with neither the companion runs text-only.
    let synthesizer = familiar_tts::select_synthesizer(&settings.tts).await;
    if synthesizer.is_none() {
        tracing::warn!("degraded mode: no speech output for this run");
    }

    let manager = AdapterManager::new(settings.manager.manager_config());

    let screen: Arc<dyn Adapter> = Arc::new(ScreenAdapter::new(
        settings.screen.adapter_config(),
        settings.screen.content_settings(),
        None,
    ));
    manager.register(screen, settings.screen.enabled)?;

    let voice: Arc<dyn Adapter> = Arc::new(VoiceAdapter::new(settings.voice.adapter_config()));
    manager.register(voice, settings.voice.enabled)?;

    let keyboard: Arc<dyn Adapter> =
        Arc::new(KeyboardAdapter::new(settings.keyboard.adapter_config()));
    manager.register(keyboard, settings.keyboard.enabled)?;

    let brain = Arc::new(ReasoningClient::new(settings.brain.clone())?);
    let renderer: Arc<dyn AvatarRenderer> =
        Arc::new(HttpAvatarClient::new(&settings.avatar.base_url));

    manager.set_decision_callback(orchestrator::decision_callback(DecisionDeps {
        snapshots: manager.snapshot_reader(),
        brain,
        renderer,
        synthesizer,
    }));

    manager.start_all().await;
    tracing::info!("familiar is awake; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    manager.stop_all().await;

    Ok(())
}
