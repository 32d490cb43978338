//! Session orchestration.
//!
//! Implements the two session operations:
//!
//! - `create`: pick the least-loaded healthy relay and persist a session
//!   bound to it. Placement happens before the save so a failed placement
//!   leaves no orphan row.
//! - `join`: admit a participant into an existing session. The relay is
//!   registered before the participant row is written so a failing relay
//!   never leaves a participant behind; the token is minted only after
//!   the durable commit.

use crate::auth::TokenIssuer;
use crate::errors::SmError;
use crate::models::{
    Credentials, Participant, Reference, Relay, RelaySession, Session, SessionOffer,
    SessionStatus, StunCandidate, TurnCandidate, RELAY_APPLICATION,
};
use crate::observability::metrics;
use crate::repositories::SessionRepository;
use crate::services::registry_client::RegistryClient;
use crate::services::relay_client::RelayClient;
use crate::services::relay_selection::{relay_rpc_url, select_least_loaded};
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// System identifier stamped on session references.
const REFERENCE_SYSTEM: &str = "session-manager/session";

/// Service to manage sessions.
pub struct SessionService {
    pool: PgPool,
    registry_client: Arc<dyn RegistryClient>,
    relay_client: Arc<dyn RelayClient>,
    issuer: TokenIssuer,
    /// UDP port relays expose for media traffic.
    relay_port: u16,
    /// Protocol for relay RPC endpoints.
    rpc_protocol: String,
}

impl SessionService {
    pub fn new(
        pool: PgPool,
        registry_client: Arc<dyn RegistryClient>,
        relay_client: Arc<dyn RelayClient>,
        issuer: TokenIssuer,
        relay_port: u16,
        rpc_protocol: String,
    ) -> Self {
        Self {
            pool,
            registry_client,
            relay_client,
            issuer,
            relay_port,
            rpc_protocol,
        }
    }

    /// Create a session bound to the least-loaded healthy relay.
    ///
    /// # Errors
    ///
    /// - `SmError::BadGateway` - The registry listing failed
    /// - `SmError::Internal` - No healthy relay candidates exist
    /// - `SmError::Conflict` / `SmError::Database` - Persisting the row failed
    #[instrument(skip_all, name = "sm.session.create")]
    pub async fn create(&self, _creds: &Credentials) -> Result<Reference, SmError> {
        let session = self.assign_session_to_relay().await?;

        SessionRepository::save(&self.pool, &session).await?;

        metrics::record_session_created();
        info!(
            target: "sm.services.session_service",
            session_id = %session.id,
            relay_server = %session.relay_server,
            "Session created"
        );

        Ok(Reference {
            id: session.id,
            system: REFERENCE_SYSTEM.to_string(),
        })
    }

    async fn assign_session_to_relay(&self) -> Result<Session, SmError> {
        let candidates = self
            .registry_client
            .find_by_application(RELAY_APPLICATION, true)
            .await?;

        let best = select_least_loaded(
            self.relay_client.as_ref(),
            &self.rpc_protocol,
            &candidates,
        )
        .await?;

        let now = Utc::now();
        Ok(Session {
            id: Uuid::new_v4().to_string(),
            status: SessionStatus::Created,
            relay_server: best.id,
            created_at: now,
            updated_at: now,
            participants: Vec::new(),
        })
    }

    /// Admit a participant into an existing session.
    ///
    /// Mints a fresh opaque `user_id` for the participant rather than
    /// deriving one from the submitted credentials; the credentials gate
    /// admission only.
    ///
    /// # Errors
    ///
    /// - `SmError::PreconditionRequired` - The session does not exist
    /// - `SmError::BadGateway` - The relay binding could not be resolved,
    ///   or the relay rejected the registration
    #[instrument(skip_all, name = "sm.session.join", fields(session_id = %session_id))]
    pub async fn join(
        &self,
        session_id: &str,
        _creds: &Credentials,
    ) -> Result<(SessionOffer, Participant), SmError> {
        let now = Utc::now();
        let participant = Participant {
            id: Uuid::new_v4().to_string(),
            user_id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            created_at: now,
            updated_at: now,
        };

        let relay = self.register_participant(&participant).await?;

        SessionRepository::save_participant(&self.pool, &participant).await?;

        let offer = self.create_offer(&participant, &relay)?;

        metrics::record_session_join();
        info!(
            target: "sm.services.session_service",
            session_id = %session_id,
            participant_id = %participant.id,
            relay_id = %relay.id,
            "Participant joined session"
        );

        Ok((offer, participant))
    }

    /// Registers the participant with the session's relay. Returns the
    /// resolved relay entry for offer assembly.
    async fn register_participant(&self, participant: &Participant) -> Result<Relay, SmError> {
        let relay = self.find_relay(&participant.session_id).await?;

        let relay_session = RelaySession {
            user_id: participant.user_id.clone(),
            key: participant.session_id.clone(),
        };

        let relay_url = relay_rpc_url(&self.rpc_protocol, &relay);
        self.relay_client.register(&relay_url, &relay_session).await?;

        Ok(relay)
    }

    /// Resolves a session's relay binding against the registry.
    async fn find_relay(&self, session_id: &str) -> Result<Relay, SmError> {
        let session = SessionRepository::find(&self.pool, session_id)
            .await
            .map_err(|e| match e {
                SmError::NotFound(_) => {
                    SmError::PreconditionRequired(format!("no session with id {}", session_id))
                }
                other => other,
            })?;

        self.registry_client
            .find(&session.relay_server)
            .await
            .map_err(|e| match e {
                // A stale or unreachable binding is an upstream failure
                // from the caller's point of view.
                SmError::NotFound(_) => {
                    SmError::BadGateway("relay server binding is stale".to_string())
                }
                other => other,
            })
    }

    /// Assembles the connection offer for a participant.
    ///
    /// Candidate URLs use the configured UDP relay port, independent of
    /// the RPC port carried on the registry entry.
    fn create_offer(&self, participant: &Participant, relay: &Relay) -> Result<SessionOffer, SmError> {
        let token = self.issuer.issue_user_token(&participant.user_id)?;

        Ok(SessionOffer {
            token,
            turn: TurnCandidate {
                url: format!("turn:{}:{}", relay.location, self.relay_port),
                username: participant.user_id.clone(),
            },
            stun: StunCandidate {
                url: format!("stun:{}:{}", relay.location, self.relay_port),
            },
        })
    }
}
