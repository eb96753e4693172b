//! Shared session registry keyed by subject.
//!
//! The store owns every [`Session`]. Handlers keep only their
//! [`SubjectId`] and go through [`SessionStore::mutate`] for
//! read-modify-write; the keep-alive broadcaster reads via
//! [`SessionStore::guiding_targets`].

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use trek_core::{
    ConnectionId, Coordinate, CourseId, MAX_INDEX, ProgressState, ProgressUpdate, SubjectId,
};

use crate::websocket::connection::ClientConnection;

/// Where a session is in its guidance lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GuidancePhase {
    /// Authenticated, no `start` yet.
    #[default]
    NotStarted,
    /// Accepting position reports.
    Guiding,
    /// Started, position reports ignored.
    Paused,
    /// Finished by `end`.
    Ended,
}

/// Per-subject guidance state.
#[derive(Clone, Debug)]
pub struct Session {
    subject_id: SubjectId,
    connection_id: ConnectionId,
    outbound: Arc<ClientConnection>,
    phase: GuidancePhase,
    current_index: u32,
    last_position: Option<Coordinate>,
    travel_distance_km: f64,
    course_id: Option<CourseId>,
}

impl Session {
    /// Fresh, not-yet-started session bound to a connection.
    pub fn new(subject_id: SubjectId, outbound: Arc<ClientConnection>) -> Self {
        Self {
            subject_id,
            connection_id: outbound.id().clone(),
            outbound,
            phase: GuidancePhase::NotStarted,
            current_index: 0,
            last_position: None,
            travel_distance_km: 0.0,
            course_id: None,
        }
    }

    /// Owning subject.
    pub fn subject_id(&self) -> &SubjectId {
        &self.subject_id
    }

    /// Connection that created this session.
    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// Push handle of the owning connection.
    pub fn outbound(&self) -> &Arc<ClientConnection> {
        &self.outbound
    }

    /// Lifecycle phase.
    pub fn phase(&self) -> GuidancePhase {
        self.phase
    }

    /// Guiding or paused.
    pub fn is_started(&self) -> bool {
        matches!(self.phase, GuidancePhase::Guiding | GuidancePhase::Paused)
    }

    /// Accepting position reports.
    pub fn is_guiding(&self) -> bool {
        self.phase == GuidancePhase::Guiding
    }

    /// Current waypoint index.
    pub fn current_index(&self) -> u32 {
        self.current_index
    }

    /// Accumulated distance in kilometres.
    pub fn travel_distance_km(&self) -> f64 {
        self.travel_distance_km
    }

    /// Last reported coordinate.
    pub fn last_position(&self) -> Option<Coordinate> {
        self.last_position
    }

    /// Course supplied with the latest `start`.
    pub fn course_id(&self) -> Option<&CourseId> {
        self.course_id.as_ref()
    }

    /// Oracle input for this session.
    pub fn progress(&self) -> ProgressState {
        ProgressState {
            index: self.current_index,
            distance_km: self.travel_distance_km,
            last_position: self.last_position,
        }
    }

    /// Begin guidance. Allowed from any phase; progress restarts from zero
    /// only when the session was not already started.
    pub fn start(&mut self, coordinate: Coordinate, course_id: Option<CourseId>) {
        if !self.is_started() {
            self.current_index = 0;
            self.travel_distance_km = 0.0;
        }
        self.phase = GuidancePhase::Guiding;
        self.last_position = Some(coordinate);
        self.course_id = course_id;
    }

    /// Apply an oracle update. The update is clamped to the oracle contract
    /// first, so progress never regresses.
    pub fn record_progress(&mut self, update: ProgressUpdate, coordinate: Coordinate) -> ProgressUpdate {
        let update = update.conform(&self.progress());
        self.current_index = update.new_index;
        self.travel_distance_km = update.new_distance_km;
        self.last_position = Some(coordinate);
        update
    }

    /// Stop accepting positions. Only a started session changes phase.
    pub fn pause(&mut self, coordinate: Option<Coordinate>) {
        if self.phase == GuidancePhase::Guiding {
            self.phase = GuidancePhase::Paused;
        }
        self.remember(coordinate);
    }

    /// Resume guidance. Returns `false` if the session was never started.
    pub fn resume(&mut self, coordinate: Option<Coordinate>) -> bool {
        if !self.is_started() {
            return false;
        }
        self.phase = GuidancePhase::Guiding;
        self.remember(coordinate);
        true
    }

    /// Finish guidance.
    pub fn end(&mut self, coordinate: Option<Coordinate>) {
        self.phase = GuidancePhase::Ended;
        self.remember(coordinate);
    }

    /// Whether the final waypoint has been reached.
    pub fn is_arrived(&self) -> bool {
        self.current_index >= MAX_INDEX
    }

    fn remember(&mut self, coordinate: Option<Coordinate>) {
        if coordinate.is_some() {
            self.last_position = coordinate;
        }
    }

    /// Read-only copy without the push handle.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            subject_id: self.subject_id.clone(),
            connection_id: self.connection_id.clone(),
            phase: self.phase,
            current_index: self.current_index,
            travel_distance_km: self.travel_distance_km,
            last_position: self.last_position,
            course_id: self.course_id.clone(),
        }
    }
}

/// Point-in-time view of a session.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Owning subject.
    pub subject_id: SubjectId,
    /// Owning connection.
    pub connection_id: ConnectionId,
    /// Lifecycle phase.
    pub phase: GuidancePhase,
    /// Waypoint index.
    pub current_index: u32,
    /// Distance in kilometres.
    pub travel_distance_km: f64,
    /// Last reported coordinate.
    pub last_position: Option<Coordinate>,
    /// Course supplied with the latest `start`.
    pub course_id: Option<CourseId>,
}

impl SessionSnapshot {
    /// Guiding or paused.
    pub fn is_started(&self) -> bool {
        matches!(self.phase, GuidancePhase::Guiding | GuidancePhase::Paused)
    }

    /// Accepting position reports.
    pub fn is_guiding(&self) -> bool {
        self.phase == GuidancePhase::Guiding
    }
}

/// Concurrent map from subject to session.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<SubjectId, Session>,
}

impl SessionStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the session for its subject. Returns the replaced
    /// session, if any.
    pub fn put(&self, session: Session) -> Option<Session> {
        self.sessions.insert(session.subject_id.clone(), session)
    }

    /// Copy of the subject's session.
    pub fn get(&self, subject: &SubjectId) -> Option<SessionSnapshot> {
        self.sessions.get(subject).map(|s| s.snapshot())
    }

    /// Run `f` on the subject's session under its entry lock.
    ///
    /// `f` must not touch the store.
    pub fn mutate<R>(&self, subject: &SubjectId, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        self.sessions.get_mut(subject).map(|mut entry| f(entry.value_mut()))
    }

    /// Remove the subject's session unconditionally.
    pub fn remove(&self, subject: &SubjectId) -> Option<Session> {
        self.sessions.remove(subject).map(|(_, session)| session)
    }

    /// Remove the subject's session only if `connection` still owns it.
    pub fn remove_if_owned(&self, subject: &SubjectId, connection: &ConnectionId) -> bool {
        self.sessions
            .remove_if(subject, |_, session| &session.connection_id == connection)
            .is_some()
    }

    /// Guiding sessions with an open connection, collected before any send.
    pub fn guiding_targets(&self) -> Vec<(SubjectId, Arc<ClientConnection>)> {
        self.sessions
            .iter()
            .filter(|entry| entry.is_guiding() && entry.outbound.is_open())
            .map(|entry| (entry.key().clone(), Arc::clone(&entry.outbound)))
            .collect()
    }

    /// Call `f` for every guiding session. No store lock is held during `f`.
    pub fn for_each_guiding(&self, mut f: impl FnMut(&SubjectId, &Arc<ClientConnection>)) {
        for (subject, outbound) in self.guiding_targets() {
            f(&subject, &outbound);
        }
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session exists.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of guiding sessions.
    pub fn guiding_count(&self) -> usize {
        self.sessions.iter().filter(|entry| entry.is_guiding()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tokio::sync::mpsc;
    use trek_core::MAX_DISTANCE_KM;

    fn connection(id: &str) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(8);
        (Arc::new(ClientConnection::new(ConnectionId::from_raw(id), tx)), rx)
    }

    fn subject(id: &str) -> SubjectId {
        SubjectId::from_raw(id)
    }

    fn origin() -> Coordinate {
        Coordinate::new(0.0, 0.0)
    }

    #[test]
    fn new_session_is_idle() {
        let (conn, _rx) = connection("c1");
        let s = Session::new(subject("u1"), conn);
        assert_eq!(s.phase(), GuidancePhase::NotStarted);
        assert!(!s.is_started());
        assert!(!s.is_guiding());
        assert_eq!(s.connection_id().as_str(), "c1");
        assert!(s.last_position().is_none());
    }

    #[test]
    fn lifecycle_transitions() {
        let (conn, _rx) = connection("c1");
        let mut s = Session::new(subject("u1"), conn);

        s.pause(None);
        assert_eq!(s.phase(), GuidancePhase::NotStarted);
        assert!(!s.resume(None));
        assert_eq!(s.phase(), GuidancePhase::NotStarted);

        s.start(origin(), Some(CourseId::Text("c".into())));
        assert!(s.is_guiding() && s.is_started());
        assert_eq!(s.course_id().map(ToString::to_string).as_deref(), Some("c"));

        s.pause(Some(Coordinate::new(1.0, 1.0)));
        assert_eq!(s.phase(), GuidancePhase::Paused);
        assert!(s.is_started() && !s.is_guiding());
        s.pause(None);
        assert_eq!(s.phase(), GuidancePhase::Paused);
        assert_eq!(s.last_position(), Some(Coordinate::new(1.0, 1.0)));

        assert!(s.resume(None));
        assert!(s.is_guiding());

        s.end(None);
        assert_eq!(s.phase(), GuidancePhase::Ended);
        assert!(!s.is_started());
        assert!(!s.resume(None));
    }

    #[test]
    fn start_resets_progress_only_after_end() {
        let (conn, _rx) = connection("c1");
        let mut s = Session::new(subject("u1"), conn);
        s.start(origin(), None);
        let _ = s.record_progress(
            ProgressUpdate {
                new_index: 10,
                new_distance_km: 2.0,
                is_arrived: false,
                is_deviation: false,
            },
            origin(),
        );
        assert_eq!(s.current_index(), 10);

        s.start(origin(), None);
        assert_eq!(s.current_index(), 10);
        s.pause(None);
        s.start(Coordinate::new(1.0, 1.0), None);
        assert!(s.is_guiding());
        assert_eq!(s.current_index(), 10);
        assert!((s.travel_distance_km() - 2.0).abs() < f64::EPSILON);

        s.end(None);
        s.start(origin(), None);
        assert_eq!(s.current_index(), 0);
        assert!(s.travel_distance_km().abs() < f64::EPSILON);
    }

    #[test]
    fn record_progress_clamps_regressions() {
        let (conn, _rx) = connection("c1");
        let mut s = Session::new(subject("u1"), conn);
        s.start(origin(), None);
        let _ = s.record_progress(
            ProgressUpdate {
                new_index: 20,
                new_distance_km: 3.0,
                is_arrived: false,
                is_deviation: false,
            },
            origin(),
        );
        let applied = s.record_progress(
            ProgressUpdate {
                new_index: 5,
                new_distance_km: 1.0,
                is_arrived: true,
                is_deviation: true,
            },
            Coordinate::new(2.0, 2.0),
        );
        assert_eq!(applied.new_index, 20);
        assert!((applied.new_distance_km - 3.0).abs() < f64::EPSILON);
        assert!(!applied.is_arrived);
        assert_eq!(s.last_position(), Some(Coordinate::new(2.0, 2.0)));
    }

    #[test]
    fn put_replaces_and_returns_previous() {
        let store = SessionStore::new();
        let (c1, _r1) = connection("c1");
        let (c2, _r2) = connection("c2");
        assert!(store.put(Session::new(subject("u1"), c1)).is_none());
        let previous = store.put(Session::new(subject("u1"), c2)).unwrap();
        assert_eq!(previous.connection_id().as_str(), "c1");
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&subject("u1")).unwrap().connection_id.as_str(), "c2");
    }

    #[test]
    fn mutate_and_get() {
        let store = SessionStore::new();
        let (c1, _r1) = connection("c1");
        let _ = store.put(Session::new(subject("u1"), c1));
        let phase = store.mutate(&subject("u1"), |s| {
            s.start(origin(), None);
            s.phase()
        });
        assert_eq!(phase, Some(GuidancePhase::Guiding));
        assert!(store.get(&subject("u1")).unwrap().is_guiding());
        assert!(store.mutate(&subject("nobody"), |s| s.phase()).is_none());
        assert!(store.get(&subject("nobody")).is_none());
    }

    #[test]
    fn remove_if_owned_guards_stale_connection() {
        let store = SessionStore::new();
        let (c1, _r1) = connection("c1");
        let (c2, _r2) = connection("c2");
        let _ = store.put(Session::new(subject("u1"), c1));
        let _ = store.put(Session::new(subject("u1"), c2));

        assert!(!store.remove_if_owned(&subject("u1"), &ConnectionId::from_raw("c1")));
        assert_eq!(store.len(), 1);
        assert!(store.remove_if_owned(&subject("u1"), &ConnectionId::from_raw("c2")));
        assert!(store.is_empty());
        assert!(!store.remove_if_owned(&subject("u1"), &ConnectionId::from_raw("c2")));
    }

    #[test]
    fn remove_unconditional() {
        let store = SessionStore::new();
        let (c1, _r1) = connection("c1");
        let _ = store.put(Session::new(subject("u1"), c1));
        assert!(store.remove(&subject("u1")).is_some());
        assert!(store.remove(&subject("u1")).is_none());
    }

    #[test]
    fn guiding_targets_skip_idle_paused_and_closed() {
        let store = SessionStore::new();
        let (c_idle, _r1) = connection("idle");
        let (c_guiding, _r2) = connection("guiding");
        let (c_paused, _r3) = connection("paused");
        let (c_closed, _r4) = connection("closed");

        let _ = store.put(Session::new(subject("idle"), c_idle));
        for (name, conn) in [("guiding", c_guiding), ("paused", c_paused), ("closed", Arc::clone(&c_closed))] {
            let mut s = Session::new(subject(name), conn);
            s.start(origin(), None);
            let _ = store.put(s);
        }
        let _ = store.mutate(&subject("paused"), |s| s.pause(None));
        c_closed.close();

        let targets = store.guiding_targets();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].0.as_str(), "guiding");
        assert_eq!(store.guiding_count(), 2);

        let mut seen = Vec::new();
        store.for_each_guiding(|subject, _| seen.push(subject.clone()));
        assert_eq!(seen, vec![subject("guiding")]);
    }

    #[test]
    fn concurrent_mutation_is_serialized() {
        let store = Arc::new(SessionStore::new());
        let (c1, _r1) = connection("c1");
        let mut s = Session::new(subject("u1"), c1);
        s.start(origin(), None);
        let _ = store.put(s);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        let _ = store.mutate(&subject("u1"), |s| {
                            let next = ProgressUpdate {
                                new_index: s.current_index() + 1,
                                new_distance_km: s.travel_distance_km() + 0.1,
                                is_arrived: false,
                                is_deviation: false,
                            };
                            s.record_progress(next, origin())
                        });
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.get(&subject("u1")).unwrap().current_index, MAX_INDEX);
    }

    proptest! {
        #[test]
        fn progress_never_regresses(steps in prop::collection::vec((0u32..200, -5.0f64..30.0), 1..60)) {
            let (tx, _rx) = mpsc::channel(1);
            let conn = Arc::new(ClientConnection::new(ConnectionId::from_raw("c"), tx));
            let mut s = Session::new(subject("u"), conn);
            s.start(origin(), None);
            let mut prev_index = 0;
            let mut prev_distance = 0.0;
            for (index, distance) in steps {
                let applied = s.record_progress(
                    ProgressUpdate { new_index: index, new_distance_km: distance, is_arrived: false, is_deviation: true },
                    origin(),
                );
                prop_assert!(s.current_index() >= prev_index);
                prop_assert!(s.current_index() <= MAX_INDEX);
                prop_assert!(s.travel_distance_km() >= prev_distance);
                prop_assert!(s.travel_distance_km() <= MAX_DISTANCE_KM);
                prop_assert_eq!(applied.is_arrived, s.current_index() == MAX_INDEX);
                prop_assert!(!(applied.is_arrived && applied.is_deviation));
                prev_index = s.current_index();
                prev_distance = s.travel_distance_km();
            }
        }
    }
}
