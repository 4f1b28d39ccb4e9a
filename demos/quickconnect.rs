//! QuickConnect registration and event forwarding.
//!
//! Demonstrates:
//! - Building a validated LinkConfig
//! - Resuming a stored connection, or registering via QuickConnect
//! - Forwarding log events and watching the session phase
//!
//! Usage:
//!   INSPECTOR_ORG=org-42 cargo run --example quickconnect
//!   INSPECTOR_ORG=org-42 cargo run --example quickconnect -- --debug
//!   INSPECTOR_ORG=org-42 cargo run --example quickconnect -- --env stage

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use inspector_session::{
    AuthorizationKind, Environment, FileStore, HttpRegistrar, LinkConfig, Orchestrator,
    QuickConnect, RegistrationCallbacks, RegistrationError, Result, SessionCredentials,
    SessionEvent, SessionPhase,
};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_DOMAIN: &str = "inspect.example.com";
const DEFAULT_REGISTRAR: &str = "https://api.example.com/quickconnect";

// ============================================================================
// Args
// ============================================================================

/// Command-line arguments.
#[derive(Debug, Clone)]
struct Args {
    debug: bool,
    environment: Environment,
}

impl Args {
    fn parse() -> Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        let environment = args
            .iter()
            .position(|a| a == "--env")
            .and_then(|i| args.get(i + 1))
            .map(|value| value.parse::<Environment>())
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            debug: args.iter().any(|a| a == "--debug"),
            environment,
        })
    }
}

/// Initialize tracing/logging.
fn init_logging(debug: bool) {
    let filter = if debug {
        "inspector_session=debug"
    } else {
        "inspector_session=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

// ============================================================================
// Callbacks
// ============================================================================

/// Forwards the registration outcome to `main`.
struct Outcome(mpsc::UnboundedSender<std::result::Result<SessionCredentials, RegistrationError>>);

impl RegistrationCallbacks for Outcome {
    fn on_success(&self, credentials: SessionCredentials) {
        let _ = self.0.send(Ok(credentials));
    }

    fn on_error(&self, error: RegistrationError) {
        let _ = self.0.send(Err(error));
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = match Args::parse() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("[ERROR] {e}");
            std::process::exit(2);
        }
    };
    init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== QuickConnect ===\n");

    // ========================================================================
    // Configuration
    // ========================================================================

    let mut builder = LinkConfig::builder()
        .vendor_id("demo")
        .socket_domain(std::env::var("INSPECTOR_DOMAIN").unwrap_or_else(|_| DEFAULT_DOMAIN.into()))
        .registrar_base(
            std::env::var("INSPECTOR_REGISTRAR").unwrap_or_else(|_| DEFAULT_REGISTRAR.into()),
        )
        .device_name("quickconnect demo");
    if let Ok(org) = std::env::var("INSPECTOR_ORG") {
        builder = builder.org_id(org);
    }
    let config = builder.build()?;

    println!("[1] Client: {}", config.client_id);

    let orchestrator = Orchestrator::builder(config.clone())
        .store(Arc::new(FileStore::in_data_dir()?))
        .build();

    // ========================================================================
    // Resume or Register
    // ========================================================================

    if orchestrator.resume_from_store()? {
        println!("[2] Resumed stored connection\n");
    } else {
        println!("[2] Registering device, approve it in the inspector...");
        orchestrator.claim_authorizer(AuthorizationKind::QuickConnect)?;

        let registrar = HttpRegistrar::new(&config.registrar_base, args.environment)?;
        let workflow = QuickConnect::new(&config, Arc::new(registrar), Handle::current());

        let (tx, mut rx) = mpsc::unbounded_channel();
        workflow.register(Arc::new(Outcome(tx)));

        let outcome = tokio::select! {
            outcome = rx.recv() => outcome,
            _ = tokio::signal::ctrl_c() => {
                workflow.cancel();
                rx.recv().await
            }
        };

        orchestrator.release_authorizer(AuthorizationKind::QuickConnect)?;
        match outcome {
            Some(Ok(credentials)) => {
                println!("    ✓ Approved: session {}\n", credentials.session_id);
                orchestrator.create_session(
                    credentials.into_identity(args.environment),
                    Some(AuthorizationKind::QuickConnect),
                )?;
            }
            Some(Err(e)) => {
                println!("    ✗ Registration ended: {e}");
                return Ok(());
            }
            None => return Ok(()),
        }
    }

    // ========================================================================
    // Forward Events
    // ========================================================================

    orchestrator.queue_event(SessionEvent::log("demo", "info", "demo connected"));

    let mut phases = orchestrator.subscribe_phase();
    println!("[3] Watching phase, press Ctrl+C to exit...");
    loop {
        tokio::select! {
            changed = phases.changed() => {
                if changed.is_err() {
                    break;
                }
                let phase = *phases.borrow_and_update();
                println!("    Phase: {phase:?}");
                if let SessionPhase::Disconnected { error: Some(error), reconnecting: false } = phase {
                    println!("    ✗ Session ended: {error}");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    orchestrator.terminate_session(true);
    println!("\n=== Done ===");
    Ok(())
}
