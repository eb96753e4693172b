//! # trek-core
//!
//! Foundation types shared by every Trek crate:
//!
//! - **Branded IDs**: `SubjectId`, `ConnectionId` as newtypes for type safety
//! - **Geometry**: `Coordinate` and `CourseId` as they appear on the wire
//! - **Progress**: the pluggable `ProgressOracle` and its random simulator
//! - **Authentication**: the `Authenticator` seam with mock and JWT implementations
//! - **Logging**: `tracing` subscriber bootstrap

#![deny(unsafe_code)]

pub mod auth;
pub mod geo;
pub mod ids;
pub mod logging;
pub mod progress;

pub use auth::{AuthError, Authenticator, JwtAuthenticator, MockAuthenticator};
pub use geo::{Coordinate, CourseId};
pub use ids::{ConnectionId, SubjectId};
pub use logging::{LogFormat, init_subscriber};
pub use progress::{
    MAX_DISTANCE_KM, MAX_INDEX, ProgressOracle, ProgressState, ProgressUpdate, RandomOracle,
};
