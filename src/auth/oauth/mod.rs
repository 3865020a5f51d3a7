mod provider;
mod providers;

pub use provider::OAuthProvider;
pub use providers::{
    FacebookAuthProvider, GitHubAuthProvider, GoogleAuthProvider, OAuthProviderFactory,
    TwitterAuthProvider,
};
