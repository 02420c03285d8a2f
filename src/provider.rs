//! Identity-provider descriptors (data) and strategies (behavior).
//!
//! `descriptor` exposes validated endpoint metadata (`IdentityDescriptor`) covering the
//! device-authorization, token, and probe endpoints plus provider quirks (scope delimiter).
//! `strategy` defines [`ProviderStrategy`], an HTTP-client-agnostic hook used by flows to
//! augment outgoing device-code requests and classify probe failures.

pub mod descriptor;
pub mod strategy;

pub use descriptor::*;
pub use strategy::*;
