//! # letsync - TLS certificate orchestration for a fleet of agents
//!
//! A control plane that issues and renews ACME v2 certificates (RFC 8555)
//! and distributes them to deploying agents over an HMAC-authenticated,
//! SSE-observable protocol.
//!
//! ## Features
//!
//! - **Complete ACME v2 Protocol Support**: Full RFC 8555 implementation
//! - **Multiple Challenge Types**: HTTP-01, DNS-01
//! - **Fleet agent distribution**: per-agent HMAC auth, deploy + reload on the agent side
//! - **Task-log bus**: live SSE streaming of issuance/renewal/sync progress
//! - **Storage Flexibility**: SQLite-backed store with encrypted secrets at rest
//! - **Async/Await**: Built on Tokio for high performance
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use letsync::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> letsync::Result<()> {
//!     // Create a client for Let's Encrypt staging
//!     let config = AcmeConfig::new("https://acme-staging-v02.api.letsencrypt.org/directory");
//!
//!     // ... use the client
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod account;
pub mod admin;
pub mod agent_worker;
pub mod ca;
pub mod certificate;
pub mod challenge;
pub mod client;
pub mod config;
pub mod crypto;
pub mod deploy;
pub mod dns;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod notifications;
pub mod order;
pub mod protocol;
pub mod reload;
pub mod scheduler;
pub mod server;
pub mod settings;
pub mod store;
pub mod tasklog;
pub mod types;

// Re-exports for convenience
pub use account::{Account, AccountManager, KeyPair};
pub use admin::{LoginLockout, is_first_run, issue_session_token, login, set_initial_password, verify_session_token};
pub use agent_worker::AgentWorker;
pub use ca::{CAConfig, CertificateAuthority, Environment};
pub use certificate::CertificateChain;
pub use challenge::{ChallengeSolver, ChallengeSolverRegistry, Dns01Solver, DnsProvider, Http01Solver, MockDnsProvider};
pub use client::{AcmeClient, AcmeConfig, CertificateBundle};
pub use config::{Config, DatabaseSettings, SchedulerSettings, ServerSettings};
pub use dns::{
    AlibabaCloudDnsProvider, CloudFlareDnsProvider, GodaddyDnsProvider, Route53DnsProvider,
    TencentCloudDnsProvider, build_provider as build_dns_provider,
};
pub use engine::{AcmeEngine, CertRequest, TaskType};
pub use error::{AcmeError, Result};
pub use metrics::{HealthStatus, MetricsRegistry};
pub use notifications::{NotificationDispatcher, NotificationEvent};
pub use protocol::{Directory, DirectoryManager, Jwk, JwsSigner, NonceManager};
pub use scheduler::{CleanupScheduler, RenewalScheduler};
pub use server::{AgentServerState, AppState, HealthCheck, start_server};
pub use settings::SettingsCache;
pub use tasklog::{TaskLogBus, TaskLogFrame, TaskStatus};
pub use types::{
    AuthorizationStatus, ChallengeType, Contact, Identifier, OrderStatus, RevocationReason,
};

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::{
        AcmeClient, AcmeConfig,
        account::{Account, AccountManager, KeyPair},
        agent_worker::AgentWorker,
        certificate::CertificateChain,
        crypto::{Base64Encoding, Sha256Hash},
        engine::{AcmeEngine, CertRequest, TaskType},
        error::{AcmeError, Result},
        notifications::{NotificationDispatcher, NotificationEvent},
        protocol::{Directory, DirectoryManager, Jwk, JwsSigner, NonceManager},
        scheduler::{CleanupScheduler, RenewalScheduler},
        server::{AgentServerState, AppState, start_server},
        settings::SettingsCache,
        store::Store,
        tasklog::{TaskLogBus, TaskLogFrame, TaskStatus},
        types::{
            AuthorizationStatus, ChallengeType, Contact, Identifier, OrderStatus, RevocationReason,
        },
    };
}
