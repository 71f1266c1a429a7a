pub mod api;
pub mod user;

pub use api::{AuthResponse, ChatRequest, ChatResponse, GoogleAuthRequest, UserProfile};
pub use user::User;
