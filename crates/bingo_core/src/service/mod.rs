//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into transactional use-case APIs.
//! - Keep the (external) handler layer decoupled from storage details.

pub mod card_service;
