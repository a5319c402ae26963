use std::sync::Arc;
use tracing::info;
use voice_banking_orchestrator::{
    agent::AuthorizationOrchestrator,
    api::start_server,
    biometric::StaticCamera,
    channel::BufferedChannel,
    completions::CompletionsClient,
    intent::{BeneficiaryDirectory, IntentExtractor},
    session::{SessionHandle, SessionRegistry},
    store::{InMemoryPendingStore, PendingAuthorizationStore},
    verifier::{FaceVerifier, HttpFaceVerifier, ScriptedVerifier},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    info!("Voice Banking Orchestrator - API Server");
    info!("Port: {}", api_port);

    // Backend verifier: real HTTP client when configured, scripted denial
    // otherwise so the surface stays drivable in development
    let verifier: Arc<dyn FaceVerifier> = match HttpFaceVerifier::from_env() {
        Ok(verifier) => {
            info!("Face verification backend: BANKING_BACKEND_URL");
            Arc::new(verifier)
        }
        Err(_) => {
            eprintln!("BANKING_BACKEND_URL not set; using scripted denial verifier");
            Arc::new(ScriptedVerifier::denying("verification backend not configured"))
        }
    };

    let completions = CompletionsClient::from_env().map(Arc::new);
    if completions.is_some() {
        info!("Chat completions endpoint configured");
    } else {
        info!("CHAT_COMPLETIONS_URL not set; replying locally");
    }

    // One pending-authorization store shared across all sessions
    let store: Arc<dyn PendingAuthorizationStore> = Arc::new(InMemoryPendingStore::new());

    let registry = Arc::new(SessionRegistry::new(Box::new(move |context| {
        let channel = Arc::new(BufferedChannel::new());
        let orchestrator = Arc::new(AuthorizationOrchestrator::new(
            context,
            IntentExtractor::new(BeneficiaryDirectory::with_defaults()),
            store.clone(),
            // The browser posts its own webcam frame; no server camera
            Arc::new(StaticCamera::unavailable()),
            verifier.clone(),
            channel.clone(),
        ));
        SessionHandle {
            orchestrator,
            channel,
        }
    })));

    info!("Orchestrator session registry initialized");
    info!("Starting API server...");

    // Start API server
    start_server(registry, completions, api_port).await?;

    Ok(())
}
