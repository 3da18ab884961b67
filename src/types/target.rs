// ABOUTME: Login target combining an optional user with an endpoint.
// ABOUTME: Parses formats like "host", "user@host", "host:port", "user@host:port".

use super::endpoint::{Endpoint, EndpointError};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("target cannot be empty")]
    Empty,

    #[error("user cannot be empty")]
    EmptyUser,

    #[error(transparent)]
    Endpoint(#[from] EndpointError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub user: Option<String>,
    pub endpoint: Endpoint,
}

impl Target {
    pub fn parse(s: &str) -> Result<Self, TargetError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TargetError::Empty);
        }

        // Parse format: [user@]host[:port]
        let (user, rest) = match s.rsplit_once('@') {
            Some(("", _)) => return Err(TargetError::EmptyUser),
            Some((user, rest)) => (Some(user.to_string()), rest),
            None => (None, s),
        };

        Ok(Target {
            user,
            endpoint: Endpoint::parse(rest)?,
        })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.user {
            Some(user) => write!(f, "{}@{}", user, self.endpoint),
            None => write!(f, "{}", self.endpoint),
        }
    }
}
