use std::sync::Arc;
use tracing::info;
use voice_banking_orchestrator::{
    agent::AuthorizationOrchestrator,
    biometric::StaticCamera,
    channel::{BufferedChannel, ChannelEvent},
    intent::{BeneficiaryDirectory, IntentExtractor},
    models::{TransferResult, TransferStatus},
    session::SessionContext,
    store::InMemoryPendingStore,
    verifier::ScriptedVerifier,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    info!("Voice Banking Orchestrator starting (offline demo)");

    // Offline collaborators: a fixed camera frame and a scripted backend
    let channel = Arc::new(BufferedChannel::new());
    let verifier = Arc::new(ScriptedVerifier::approving(TransferResult {
        status: TransferStatus::Success,
        message: "Sent ₦5,000 to Tunde Bakare.".to_string(),
        new_balance_display: "₦45,000".to_string(),
    }));

    let orchestrator = AuthorizationOrchestrator::new(
        SessionContext::for_chat_user("demo-user"),
        IntentExtractor::new(BeneficiaryDirectory::with_defaults()),
        Arc::new(InMemoryPendingStore::new()),
        Arc::new(StaticCamera::with_frame("data:image/jpeg;base64,demo")),
        verifier,
        channel.clone(),
    );

    // One full transfer: spoken intent, challenge, capture, confirmation
    let utterance = "Send 5000 to Tunde";
    info!(utterance, "Running demo transfer");

    orchestrator
        .handle_event(ChannelEvent::UserText(utterance.to_string()))
        .await?;

    let challenge = orchestrator
        .challenge()
        .await
        .ok_or("expected an open challenge after the transfer request")?;
    info!(token = challenge.token, status = %challenge.status, "Challenge open");

    orchestrator.submit_capture().await?;

    println!("\n=== DEMO TRANSFER ===");
    println!("User: {}", utterance);
    for line in channel.drain().await {
        println!("Agent: {}", line);
    }
    println!("Final state: {:?}", orchestrator.state().await);

    Ok(())
}
