//! Token Authority: HS256 access and invitation tokens signed with a
//! rotating secret. The previous secret stays valid for one rotation period.

pub mod authority;
pub mod error;
pub mod rotation;

pub use authority::{PersistHook, SecretGenerator, TokenAuthority, generate_secret};
pub use error::TokenError;
pub use rotation::{RotationHandle, spawn_rotation};
