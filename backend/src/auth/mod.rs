pub mod google;
pub mod session;

pub use google::{GoogleVerifier, IdTokenError, VerifiedIdentity};
pub use session::{SessionClaims, SessionError, SessionSigner};
