//! # IDaaS (Self-hosted Identity Service)
//!
//! `idaas` issues and rotates credentials for end users of downstream
//! applications: password login, email-bound activation via one-time codes,
//! short-lived RS256 access tokens paired with long-lived rotating refresh
//! tokens, and replay detection on refresh-token reuse.
//!
//! ## Token lifecycle
//!
//! Login mints an access token plus a refresh token whose server-side record
//! carries a hash of the signed value, never the value itself. Exchanging a
//! refresh token rotates it: the old record is linked to its replacement and
//! only the replacement stays usable. A retry inside a short grace window is
//! collapsed onto the replacement; a replay outside it is treated as theft
//! and revokes every outstanding token for the user.
//!
//! ## Credentials
//!
//! Passwords are stored as Argon2id PHC strings. Verification always re-derives
//! with the parameters embedded in the stored hash, so cost upgrades never
//! lock out existing users.
//!
//! ## Delivery
//!
//! Verification codes and temporary passwords go out by email through a
//! bounded background queue; delivery problems are logged and never fail the
//! API call that triggered them.

pub mod api;
pub mod cli;
pub mod janitor;
pub mod mailer;
pub mod password;
pub mod token;
