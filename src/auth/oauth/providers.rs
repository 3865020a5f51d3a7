use super::provider::OAuthProvider;

pub trait OAuthProviderFactory {
    fn provider_id() -> &'static str;
    fn new() -> OAuthProvider;
}

pub struct GoogleAuthProvider;

impl GoogleAuthProvider {
    /// Adds a `login_hint` custom parameter to the Google provider configuration.
    pub fn add_login_hint(provider: &mut OAuthProvider, hint: &str) {
        let mut params = provider.custom_parameters().clone();
        params.insert("login_hint".to_string(), hint.to_string());
        provider.set_custom_parameters(params);
    }
}

impl OAuthProviderFactory for GoogleAuthProvider {
    fn provider_id() -> &'static str {
        "google.com"
    }

    fn new() -> OAuthProvider {
        let mut provider = OAuthProvider::new(Self::provider_id());
        provider.add_scope("profile").add_scope("email");
        provider
    }
}

pub struct FacebookAuthProvider;

impl OAuthProviderFactory for FacebookAuthProvider {
    fn provider_id() -> &'static str {
        "facebook.com"
    }

    fn new() -> OAuthProvider {
        let mut provider = OAuthProvider::new(Self::provider_id());
        provider.add_scope("email");
        provider
    }
}

pub struct GitHubAuthProvider;

impl OAuthProviderFactory for GitHubAuthProvider {
    fn provider_id() -> &'static str {
        "github.com"
    }

    fn new() -> OAuthProvider {
        OAuthProvider::new(Self::provider_id())
    }
}

pub struct TwitterAuthProvider;

impl OAuthProviderFactory for TwitterAuthProvider {
    fn provider_id() -> &'static str {
        "twitter.com"
    }

    fn new() -> OAuthProvider {
        OAuthProvider::new(Self::provider_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn google_defaults_and_login_hint() {
        let mut provider = GoogleAuthProvider::new();
        assert_eq!(provider.provider_id(), "google.com");
        assert_eq!(provider.scopes(), ["profile".to_string(), "email".to_string()]);

        GoogleAuthProvider::add_login_hint(&mut provider, "user@example.com");
        assert_eq!(
            provider.custom_parameters().get("login_hint").map(String::as_str),
            Some("user@example.com")
        );
    }
}
