//! Admission adapters for the chat and HTTP front doors.
//!
//! Each front door owns an independent limiter with its own ceilings and its
//! own identity space. The adapters only translate a limiter decision into
//! what the respective handler needs to reject a request; rendering and
//! protocol handling stay with the handlers.

mod chat;
mod http;

use std::sync::Arc;

use tracing::info;

use crate::config::WardenConfig;
use crate::ratelimit::SlidingWindowLimiter;

pub use chat::{ChatAdmission, Rejection};
pub use http::{HttpAdmission, HttpDecision, HEADER_LIMIT, HEADER_REMAINING, STATUS_TOO_MANY_REQUESTS};

/// The pair of limiters guarding both front doors.
#[derive(Debug, Clone)]
pub struct Limiters {
    chat: Arc<SlidingWindowLimiter>,
    api: Arc<SlidingWindowLimiter>,
}

impl Limiters {
    /// Build both limiters from configuration.
    ///
    /// Must be called inside a Tokio runtime for idle identities to be evicted.
    pub fn from_config(config: &WardenConfig) -> Self {
        let chat = SlidingWindowLimiter::from_config(&config.chat, &config.janitor);
        let api = SlidingWindowLimiter::from_config(&config.api, &config.janitor);

        info!(
            chat_per_minute = chat.limits().per_minute,
            chat_per_hour = chat.limits().per_hour,
            api_per_minute = api.limits().per_minute,
            api_per_hour = api.limits().per_hour,
            "Front door limiters initialized"
        );

        Self {
            chat: Arc::new(chat),
            api: Arc::new(api),
        }
    }

    pub fn chat(&self) -> ChatAdmission<SlidingWindowLimiter> {
        ChatAdmission::new(Arc::clone(&self.chat))
    }

    pub fn api(&self) -> HttpAdmission<SlidingWindowLimiter> {
        HttpAdmission::new(Arc::clone(&self.api))
    }

    pub fn chat_limiter(&self) -> &Arc<SlidingWindowLimiter> {
        &self.chat
    }

    pub fn api_limiter(&self) -> &Arc<SlidingWindowLimiter> {
        &self.api
    }

    /// Signal both janitors to stop.
    pub fn shutdown(&self) {
        self.chat.shutdown();
        self.api.shutdown();
    }

    /// Signal both janitors to stop and wait for them.
    pub async fn shutdown_and_wait(&self) {
        tokio::join!(self.chat.shutdown_and_wait(), self.api.shutdown_and_wait());
    }
}
