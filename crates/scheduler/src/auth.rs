//! Token check performed before an expression is accepted.
//!
//! Registration and token issuance live elsewhere; the scheduler only asks
//! whether a token is valid for an owner.

use std::collections::HashMap;

use tally_core::OwnerId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("unknown owner '{0}'")]
    UnknownOwner(OwnerId),
    #[error("invalid token for owner '{0}'")]
    InvalidToken(OwnerId),
}

pub trait Authenticator: Send + Sync {
    fn verify(&self, owner: &OwnerId, token: &str) -> Result<(), AuthError>;
}

/// Accepts every owner and token.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl Authenticator for AllowAll {
    fn verify(&self, _owner: &OwnerId, _token: &str) -> Result<(), AuthError> {
        Ok(())
    }
}

/// Fixed owner to token table.
#[derive(Debug, Default, Clone)]
pub struct StaticTokens {
    tokens: HashMap<OwnerId, String>,
}

impl StaticTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, owner: impl Into<String>, token: impl Into<String>) -> Self {
        self.tokens.insert(OwnerId::new(owner), token.into());
        self
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl Authenticator for StaticTokens {
    fn verify(&self, owner: &OwnerId, token: &str) -> Result<(), AuthError> {
        match self.tokens.get(owner) {
            None => Err(AuthError::UnknownOwner(owner.clone())),
            Some(expected) if expected == token => Ok(()),
            Some(_) => Err(AuthError::InvalidToken(owner.clone())),
        }
    }
}
