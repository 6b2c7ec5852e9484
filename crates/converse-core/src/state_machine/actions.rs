use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::executor::StateMachine;
use crate::errors::{AdapterError, EngineError};
use crate::session_store::CallSession;
use crate::state_table::{Action, EventType};
use crate::types::EngineCallId;

/// Failure of a single action
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error("Session has no engine call")]
    MissingEngineCall,
}

fn engine_call(session: &CallSession) -> Result<EngineCallId, ActionError> {
    session.engine_call.clone().ok_or(ActionError::MissingEngineCall)
}

fn event_muted(event: &EventType) -> bool {
    match event {
        EventType::MuteChanged { muted } | EventType::LocalMute { muted } => *muted,
        _ => false,
    }
}

/// Execute an action from the state table
pub async fn execute_action(
    action: &Action,
    event: &EventType,
    session: &mut CallSession,
    machine: &Arc<StateMachine>,
) -> Result<(), ActionError> {
    debug!("Executing action {:?} for session {}", action, session.session_id);
    let telephony = machine.telephony();
    let engine = machine.engine();
    let settings = machine.settings();

    match action {
        // Telephony actions
        Action::CreateIncomingConnection => {
            if session.connection.is_some() {
                return Ok(());
            }
            let connection = telephony
                .create_incoming_connection(
                    &settings.phone_account,
                    &session.remote,
                    &settings.connection_options,
                )
                .await?;
            info!("Incoming connection {} bound to {}", connection, session.session_id);
            session.connection = Some(connection);
            session.awaiting_enablement = false;
            machine.store().index_connection(connection, session.session_id.clone());
        }
        Action::CreateOutgoingConnection => {
            if session.connection.is_some() {
                return Ok(());
            }
            let connection = telephony
                .place_outgoing_connection(
                    &settings.phone_account,
                    &session.remote,
                    &settings.connection_options,
                )
                .await?;
            info!("Outgoing connection {} bound to {}", connection, session.session_id);
            session.connection = Some(connection);
            machine.store().index_connection(connection, session.session_id.clone());
        }
        Action::SetConnectionRinging => {
            if let Some(connection) = session.connection {
                telephony.set_ringing(connection).await?;
            }
        }
        Action::SetConnectionDialing => {
            if let Some(connection) = session.connection {
                telephony.set_dialing(connection).await?;
            }
        }
        Action::SetConnectionActive => {
            if let Some(connection) = session.connection {
                telephony.set_active(connection).await?;
            }
        }
        Action::SetConnectionMuted => {
            if let Some(connection) = session.connection {
                telephony.set_muted(connection, event_muted(event)).await?;
            }
        }
        Action::RequestAccountEnablement => {
            info!(
                "Phone account {} disabled, requesting enablement for {}",
                settings.phone_account, session.session_id
            );
            telephony.request_enable_account(&settings.phone_account).await?;
        }
        Action::WatchEnablement => {
            session.awaiting_enablement = true;
            machine.watch_enablement(session.session_id.clone());
        }
        Action::ReleaseConnection(cause) => {
            if session.connection_released {
                return Ok(());
            }
            if let Some(connection) = session.connection.take() {
                session.connection_released = true;
                info!("Releasing connection {} ({})", connection, cause);
                telephony.set_disconnected(connection, *cause).await?;
            }
        }

        // Engine actions
        Action::EnginePlaceCall => {
            let call = engine.place_call(&session.remote, session.encryption).await?;
            info!("Engine call {} placed for {}", call, session.session_id);
            session.engine_call = Some(call.clone());
            machine.store().index_engine_call(call, session.session_id.clone());
        }
        Action::EngineAccept => {
            let call = engine_call(session)?;
            engine.accept(&call).await?;
        }
        Action::EngineTerminate => {
            if !session.engine_live() || session.engine_terminate_sent {
                debug!("Engine call for {} already gone, skipping terminate", session.session_id);
                return Ok(());
            }
            let call = engine_call(session)?;
            session.engine_terminate_sent = true;
            engine.terminate(&call).await?;
        }
        Action::EngineHold => {
            let call = engine_call(session)?;
            engine.set_hold(&call, true).await?;
        }
        Action::EngineResume => {
            let call = engine_call(session)?;
            engine.set_hold(&call, false).await?;
        }
        Action::EngineSetMic => {
            engine.set_mic_enabled(!event_muted(event)).await?;
        }
        Action::EngineSendDtmf => {
            let EventType::PlayDtmf { digit } = event else {
                warn!("EngineSendDtmf without a digit on {}", session.session_id);
                return Ok(());
            };
            let call = engine_call(session)?;
            engine.send_dtmf(&call, *digit).await?;
        }

        // Bookkeeping
        Action::RecordMute => {
            session.muted = event_muted(event);
        }
        Action::MarkEngineConnected => {
            session.connected_at.get_or_insert_with(Utc::now);
        }
        Action::MarkEngineEnded => {
            session.engine_ended = true;
        }
        Action::MarkEngineReleased => {
            session.engine_released = true;
        }
        Action::MarkReleaseWaitExpired => {
            session.release_wait_expired = true;
        }
        Action::ArmReleaseTimer => {
            machine.arm_release_timer(session);
        }
    }

    Ok(())
}
