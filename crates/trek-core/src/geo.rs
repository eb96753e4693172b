//! Wire-level geometry and course identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A reported position as a two-element `[x, y]` array.
///
/// The server never interprets the axes; progress is simulated.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Coordinate(pub [f64; 2]);

impl Coordinate {
    /// Build a coordinate from its two components.
    pub fn new(x: f64, y: f64) -> Self {
        Self([x, y])
    }

    /// First component.
    pub fn x(&self) -> f64 {
        self.0[0]
    }

    /// Second component.
    pub fn y(&self) -> f64 {
        self.0[1]
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.0[0], self.0[1])
    }
}

/// Identifier of the guided route a session follows.
///
/// Clients send either a string or a number.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CourseId {
    /// Numeric course id.
    Number(serde_json::Number),
    /// String course id.
    Text(String),
}

impl CourseId {
    /// Whether the id counts as supplied. Empty strings and zero do not.
    pub fn is_present(&self) -> bool {
        match self {
            Self::Text(s) => !s.is_empty(),
            Self::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        }
    }
}

impl fmt::Display for CourseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}
