//! Concrete implementations of the collaborator traits in [`crate::api`].

pub mod http;
