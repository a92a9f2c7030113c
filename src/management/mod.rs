mod session;
mod token;

pub use session::Credentials;
pub use session::Session;
pub use token::SAFETY_MARGIN;
pub use token::TokenStore;
