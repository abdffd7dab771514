//! The decision loop: snapshot → context → reasoning → fan-out.

use std::sync::Arc;

use futures::FutureExt;

use familiar_adapter::{DecisionCallback, DecisionRequest, SnapshotReader};
use familiar_avatar::AvatarRenderer;
use familiar_brain::ReasoningClient;
use familiar_context::build_context;
use familiar_tts::SynthesizerRef;

/// Collaborators the decision callback needs.
#[derive(Clone)]
pub struct DecisionDeps {
    pub snapshots: SnapshotReader,
    pub brain: Arc<ReasoningClient>,
    pub renderer: Arc<dyn AvatarRenderer>,
    pub synthesizer: Option<SynthesizerRef>,
}

/// Build the callback the manager invokes per speech turn. The manager's
/// busy gate already guarantees one invocation at a time; cancellation
/// arrives through the request's token when a higher-priority event
/// preempts the call.
pub fn decision_callback(deps: DecisionDeps) -> DecisionCallback {
    Arc::new(move |request: DecisionRequest| {
        let deps = deps.clone();
        async move {
            let snapshot = deps.snapshots.snapshot();
            let context = build_context(&snapshot);
            tracing::debug!(text = %request.text, "decision call starting");

            let result = tokio::select! {
                _ = request.cancel.cancelled() => {
                    tracing::info!("decision call interrupted by a newer event");
                    return;
                }
                result = deps.brain.think(&context, &request.text) => result,
            };

            let directive = match result {
                Ok(directive) => directive,
                Err(error) => {
                    // Recoverable: release the gate, wait for the next
                    // trigger.
                    tracing::warn!(%error, "decision loop failed");
                    return;
                }
            };

            tracing::info!(
                emotion = directive.emotion.as_str(),
                motion = directive.motion.as_str(),
                "directive received"
            );

            let present = async {
                if let Err(error) = deps.renderer.present(&directive).await {
                    tracing::warn!(%error, "avatar renderer rejected directive");
                }
            };
            let speak = async {
                if let Some(synthesizer) = &deps.synthesizer {
                    if let Err(error) = synthesizer.speak(&directive.text).await {
                        tracing::warn!(%error, "speech synthesis failed");
                    }
                }
            };
            tokio::join!(present, speak);
        }
        .boxed()
    })
}
