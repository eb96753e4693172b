//! Per-connection protocol state machine.
//!
//! A connection is either unauthenticated or bound to one subject. Every
//! inbound frame yields at most one reply; errors are replied and never
//! change state.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use trek_core::{CourseId, SubjectId};

use super::connection::ClientConnection;
use crate::context::ServerContext;
use crate::endpoint::Endpoint;
use crate::protocol::{
    AuthPayload, ClientEvent, Envelope, PositionPayload, ProgressReport, ProtocolError,
    WaypointPayload, decode,
};
use crate::store::Session;

/// Drives one socket through the guidance protocol.
pub struct ConnectionHandler {
    endpoint: Endpoint,
    connection: Arc<ClientConnection>,
    ctx: Arc<ServerContext>,
    subject: Option<SubjectId>,
}

impl ConnectionHandler {
    /// Unauthenticated handler for a freshly accepted socket.
    pub fn new(endpoint: Endpoint, connection: Arc<ClientConnection>, ctx: Arc<ServerContext>) -> Self {
        Self {
            endpoint,
            connection,
            ctx,
            subject: None,
        }
    }

    /// Subject bound by `auth-user`.
    pub fn subject(&self) -> Option<&SubjectId> {
        self.subject.as_ref()
    }

    /// Whether `auth-user` has succeeded on this connection.
    pub fn is_authenticated(&self) -> bool {
        self.subject.is_some()
    }

    /// Handle one text frame and return the reply, if any.
    #[instrument(skip_all, fields(event))]
    pub async fn handle_frame(&mut self, raw: &str) -> Option<Envelope> {
        let result = match self.parse(raw) {
            Ok(event) => {
                let _ = tracing::Span::current().record("event", event.name());
                self.dispatch(event).await
            }
            Err(err) => Err(err),
        };
        match result {
            Ok(reply) => reply,
            Err(err) => {
                debug!(kind = err.kind(), error = %err, "request refused");
                Some(Envelope::error(&err))
            }
        }
    }

    /// Decode a frame. Guarded events from an unauthenticated connection are
    /// refused before their payload is typed.
    fn parse(&self, raw: &str) -> Result<ClientEvent, ProtocolError> {
        let frame = decode(raw).inspect_err(|e| warn!(error = %e, "invalid message format"))?;
        if !self.is_authenticated() && ClientEvent::requires_auth(&frame.event) {
            let _ = tracing::Span::current().record("event", frame.event.as_str());
            return Err(ProtocolError::AuthenticationRequired);
        }
        ClientEvent::from_frame(frame)
            .inspect_err(|e| warn!(error = %e, "invalid message format"))
            .map_err(ProtocolError::from)
    }

    async fn dispatch(&mut self, event: ClientEvent) -> Result<Option<Envelope>, ProtocolError> {
        match event {
            ClientEvent::AuthUser(payload) => self.auth_user(payload).await.map(Some),
            ClientEvent::Start(payload) => self.start(&payload).map(Some),
            ClientEvent::CurrentPosition(payload) => self.current_position(&payload),
            ClientEvent::Pause(payload) => self.pause(&payload).map(Some),
            ClientEvent::Restart(payload) => self.restart(&payload).map(Some),
            ClientEvent::End(payload) => self.end(&payload).map(Some),
            ClientEvent::Ping => Ok(Some(Envelope::pong())),
            ClientEvent::Unknown(name) => {
                warn!(event = %name, "unknown event");
                Err(ProtocolError::UnknownEvent(name))
            }
        }
    }

    async fn auth_user(&mut self, payload: AuthPayload) -> Result<Envelope, ProtocolError> {
        let subject = self
            .ctx
            .authenticator
            .authenticate(payload.authorization.as_deref())
            .await
            .inspect_err(|e| warn!(error = %e, "authentication failed"))?;

        if let Some(previous) = self.subject.take() {
            if previous != subject {
                let _ = self.ctx.store.remove_if_owned(&previous, self.connection.id());
            }
        }

        let session = Session::new(subject.clone(), Arc::clone(&self.connection));
        if let Some(replaced) = self.ctx.store.put(session) {
            if replaced.connection_id() != self.connection.id() {
                info!(
                    subject_id = %subject,
                    previous_connection = %replaced.connection_id(),
                    "session taken over by new connection"
                );
            }
        }
        info!(subject_id = %subject, endpoint = %self.endpoint.name, "client authenticated");
        self.subject = Some(subject);
        Ok(Envelope::success("auth-user", Value::Null))
    }

    fn start(&self, payload: &PositionPayload) -> Result<Envelope, ProtocolError> {
        let subject = self.require_subject()?;
        let course_id = self.require_course_id(payload)?;
        self.with_own_session(subject, |s| s.start(payload.coordinate, course_id.clone()))?;
        info!(
            subject_id = %subject,
            course_id = ?course_id.as_ref().map(ToString::to_string),
            coordinate = %payload.coordinate,
            "guidance started"
        );
        Ok(Envelope::progress("start", &ProgressReport::initial()))
    }

    fn current_position(&self, payload: &PositionPayload) -> Result<Option<Envelope>, ProtocolError> {
        let subject = self.require_subject()?;
        let _ = self.require_course_id(payload)?;
        let oracle = &self.ctx.oracle;

        let update = self.with_own_session(subject, |s| {
            if !s.is_started() {
                return Err(ProtocolError::NotStarted);
            }
            if !s.is_guiding() {
                return Ok(None);
            }
            let update = oracle.advance(&s.progress(), &payload.coordinate);
            Ok(Some(s.record_progress(update, payload.coordinate)))
        })??;

        let Some(update) = update else {
            debug!(subject_id = %subject, "position ignored while paused");
            return Ok(None);
        };
        if update.is_arrived {
            info!(subject_id = %subject, "destination reached");
        }
        Ok(Some(Envelope::progress(
            "current-position",
            &ProgressReport::from_update(&update),
        )))
    }

    fn pause(&self, payload: &WaypointPayload) -> Result<Envelope, ProtocolError> {
        let subject = self.require_subject()?;
        let report = self.with_own_session(subject, |s| {
            s.pause(payload.coordinate);
            report_of(s)
        })?;
        info!(subject_id = %subject, "guidance paused");
        Ok(Envelope::progress("pause", &report))
    }

    fn restart(&self, payload: &WaypointPayload) -> Result<Envelope, ProtocolError> {
        let subject = self.require_subject()?;
        let report = self.with_own_session(subject, |s| {
            s.resume(payload.coordinate)
                .then(|| report_of(s))
                .ok_or(ProtocolError::NotStarted)
        })??;
        info!(subject_id = %subject, "guidance resumed");
        Ok(Envelope::progress("restart", &report))
    }

    fn end(&self, payload: &WaypointPayload) -> Result<Envelope, ProtocolError> {
        let subject = self.require_subject()?;
        let report = self.with_own_session(subject, |s| {
            s.end(payload.coordinate);
            report_of(s)
        })?;
        info!(subject_id = %subject, index = report.index, "guidance ended");
        Ok(Envelope::progress("end", &report))
    }

    /// Release this connection's session. The session is left alone if a
    /// newer connection of the same subject has taken it over.
    pub fn close(&mut self) {
        let Some(subject) = self.subject.take() else {
            return;
        };
        if self.ctx.store.remove_if_owned(&subject, self.connection.id()) {
            info!(subject_id = %subject, "session removed");
        } else {
            debug!(subject_id = %subject, "session owned by another connection, kept");
        }
    }

    fn require_subject(&self) -> Result<&SubjectId, ProtocolError> {
        self.subject.as_ref().ok_or(ProtocolError::AuthenticationRequired)
    }

    fn require_course_id(&self, payload: &PositionPayload) -> Result<Option<CourseId>, ProtocolError> {
        let course_id = payload.course_id().cloned();
        if self.endpoint.requires_course_id && course_id.is_none() {
            return Err(ProtocolError::CourseIdRequired {
                endpoint: self.endpoint.name.clone(),
            });
        }
        Ok(course_id)
    }

    /// Run `f` on the subject's session if this connection still owns it.
    fn with_own_session<R>(
        &self,
        subject: &SubjectId,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Result<R, ProtocolError> {
        let me = self.connection.id();
        self.ctx
            .store
            .mutate(subject, |s| (s.connection_id() == me).then(|| f(s)))
            .flatten()
            .ok_or(ProtocolError::SessionNotFound)
    }
}

fn report_of(session: &Session) -> ProgressReport {
    ProgressReport::snapshot(session.current_index(), session.travel_distance_km())
}
