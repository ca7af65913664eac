// ABOUTME: Authorization lifecycle module
// ABOUTME: Exposes the per-request manager coordinating credentials, entities, and token events
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Tether Labs

//! Authorization lifecycle management

/// The per-request authorization manager
pub mod manager;

pub use manager::AuthManager;
