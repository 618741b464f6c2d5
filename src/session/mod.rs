mod manager;
mod token;
mod validator;

pub use manager::{AuthSignal, AuthSignals, Navigation, SessionManager};
pub use token::TokenStore;
#[cfg(test)]
pub use token::StoredSession;
pub use validator::{SessionCache, SessionSettings, TokenValidator};
