pub mod callback_server;
pub mod error;
pub mod exchange;
pub mod flow;
pub mod launcher;
pub mod pkce;
pub mod storage;
pub mod types;

pub use callback_server::CallbackServer;
pub use error::{AuthError, StorageError};
pub use exchange::TokenClient;
pub use flow::OAuthFlow;
pub use launcher::{BrowserLauncher, SystemBrowser, UrlAnnouncer};
pub use storage::TokenStore;
pub use types::{OAuthConfig, PkceSession, TokenRecord};
