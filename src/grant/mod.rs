//! OAuth2 grant exchange against the authorization server.

pub mod exchanger;
pub mod types;

pub use exchanger::GrantExchanger;
pub use types::{AuthorizationServerInfo, ClientInfo, GrantType, TokenData};
