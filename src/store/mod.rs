pub mod credentials;

pub use credentials::{CredentialStore, GrantError, LoginError, RegisterError};
