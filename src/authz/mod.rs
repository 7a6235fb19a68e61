//! Access control resolution.
//!
//! Given the visitor's session and the [`ResourcePolicy`] of the resource
//! being entered, [`AccessEngine`] produces one [`Verdict`] and, on denial,
//! a [`RedirectTarget`]:
//! - no session -> login (with return path)
//! - session-only resource -> allow without reading the profile
//! - master role bypass, then approval, role and module checks
//!
//! Every lookup failure is a denial. Superseded evaluations never settle.

pub mod catalog;
mod engine;
mod evaluator;
mod model;
pub mod navigation;
mod verdict;

pub use engine::AccessEngine;
pub use evaluator::DefaultPolicyEvaluator;
pub use model::{ModuleId, PrincipalId, ProfileRecord, ResourcePolicy, Role, UnknownVariant};
pub use verdict::{AccessDecision, RedirectPaths, RedirectTarget, Verdict};
