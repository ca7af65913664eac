// ABOUTME: Token-state notification events flowing from API clients to the auth manager
// ABOUTME: Replaces inversion-of-control delegate callbacks with an explicit channel
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tether Labs

//! # Token Events
//!
//! The only asynchronous fan-in in the system: an API client publishes a
//! [`TokenEvent`] when it observes a token-state change mid-request, and the
//! auth manager drains the channel after each delegated vendor call.

use crate::models::TokenData;
use tokio::sync::mpsc;

/// Token-state change observed by an API client
#[derive(Debug, Clone)]
pub enum TokenEvent {
    /// Tokens were exchanged or refreshed; the new material should be persisted
    Refreshed(TokenData),
    /// The vendor reported the grant as revoked; tear down
    Deauthorized,
    /// Authentication failed and could not be recovered; flag the credential
    InvalidAuth,
}

/// Sending half handed to API clients
pub type TokenEventSender = mpsc::UnboundedSender<TokenEvent>;

/// Receiving half held by the auth manager
pub type TokenEventReceiver = mpsc::UnboundedReceiver<TokenEvent>;

/// Create a token event channel pair
#[must_use]
pub fn token_event_channel() -> (TokenEventSender, TokenEventReceiver) {
    mpsc::unbounded_channel()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_arrive_in_publish_order() {
        let (tx, mut rx) = token_event_channel();
        tx.send(TokenEvent::Refreshed(TokenData {
            access_token: "at".into(),
            refresh_token: None,
            expires_at: None,
            scope: None,
        }))
        .unwrap();
        tx.send(TokenEvent::InvalidAuth).unwrap();

        assert!(matches!(rx.try_recv(), Ok(TokenEvent::Refreshed(_))));
        assert!(matches!(rx.try_recv(), Ok(TokenEvent::InvalidAuth)));
        assert!(rx.try_recv().is_err());
    }
}
