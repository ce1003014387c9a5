//! Chat front door adapter.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument};

use crate::ratelimit::{AdmissionGate, Identity};

/// Why a chat request was turned away.
///
/// The chat handler renders this in the user's language.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    #[error("too many requests")]
    TooManyRequests,
}

/// Admission check run before a chat lookup touches the user store.
pub struct ChatAdmission<G: AdmissionGate + ?Sized> {
    gate: Arc<G>,
}

impl<G: AdmissionGate + ?Sized> ChatAdmission<G> {
    pub fn new(gate: Arc<G>) -> Self {
        Self { gate }
    }

    /// Admit or reject one request from a chat user.
    #[instrument(skip(self), fields(door = "chat"))]
    pub fn check(&self, user_id: i64) -> Result<(), Rejection> {
        if self.gate.allow(Identity::from(user_id)) {
            Ok(())
        } else {
            debug!("Chat request rejected");
            Err(Rejection::TooManyRequests)
        }
    }
}

impl<G: AdmissionGate + ?Sized> Clone for ChatAdmission<G> {
    fn clone(&self) -> Self {
        Self {
            gate: Arc::clone(&self.gate),
        }
    }
}
