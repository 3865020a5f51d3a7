use std::collections::BTreeMap;

/// Federated identity provider an external auth flow is started for.
///
/// The provider stores configuration (scopes, custom parameters, language
/// hints) that the auth handler page forwards to the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthProvider {
    provider_id: String,
    scopes: Vec<String>,
    custom_parameters: BTreeMap<String, String>,
    language_code: Option<String>,
}

impl OAuthProvider {
    /// Creates a new provider with the given ID (e.g. `google.com`).
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            scopes: Vec::new(),
            custom_parameters: BTreeMap::new(),
            language_code: None,
        }
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn custom_parameters(&self) -> &BTreeMap<String, String> {
        &self.custom_parameters
    }

    pub fn language_code(&self) -> Option<&str> {
        self.language_code.as_deref()
    }

    /// Adds a scope to the provider if it has not been added yet.
    pub fn add_scope(&mut self, scope: impl Into<String>) -> &mut Self {
        let value = scope.into();
        if !self.scopes.contains(&value) {
            self.scopes.push(value);
        }
        self
    }

    /// Overwrites the custom parameters included in authorization requests.
    pub fn set_custom_parameters<I, K, V>(&mut self, parameters: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.custom_parameters = parameters
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        self
    }

    /// Sets the preferred language hint passed to the provider.
    pub fn set_language_code(&mut self, value: impl Into<String>) -> &mut Self {
        self.language_code = Some(value.into());
        self
    }
}
