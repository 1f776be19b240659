use super::types::*;

/// An OAuth2 client registration.
#[derive(Clone, Debug, PartialEq)]
pub struct Application<K> {
    pub id: K,
    pub client_id: ClientId,
    pub client_type: ClientType,
    pub concurrency_token: ConcurrencyToken,
    pub client_secret: Option<HashedClientSecret>,
    pub consent_type: Option<String>,
    pub display_name: Option<String>,
    pub permissions: Vec<String>,
    pub redirect_uris: Vec<RedirectUri>,
    pub post_logout_redirect_uris: Vec<RedirectUri>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewApplication<K> {
    /// Left empty to let the store assign a key.
    pub id: Option<K>,
    pub client_id: ClientId,
    pub client_type: ClientType,
    pub client_secret: Option<HashedClientSecret>,
    pub consent_type: Option<String>,
    pub display_name: Option<String>,
    pub permissions: Vec<String>,
    pub redirect_uris: Vec<RedirectUri>,
    pub post_logout_redirect_uris: Vec<RedirectUri>,
}

impl<K> NewApplication<K> {
    pub fn new(client_id: ClientId, client_type: ClientType) -> Self {
        Self {
            id: None,
            client_id,
            client_type,
            client_secret: None,
            consent_type: None,
            display_name: None,
            permissions: Vec::new(),
            redirect_uris: Vec::new(),
            post_logout_redirect_uris: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: K) -> Self {
        self.id = Some(id);
        self
    }

    pub fn into_application(self, id: K, concurrency_token: ConcurrencyToken) -> Application<K> {
        Application {
            id,
            client_id: self.client_id,
            client_type: self.client_type,
            concurrency_token,
            client_secret: self.client_secret,
            consent_type: self.consent_type,
            display_name: self.display_name,
            permissions: self.permissions,
            redirect_uris: self.redirect_uris,
            post_logout_redirect_uris: self.post_logout_redirect_uris,
        }
    }
}

/// Metadata changes to an application. `None` leaves a field as it is; for
/// optional columns `Some(None)` clears the stored value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ApplicationChanges {
    pub client_id: Option<ClientId>,
    pub client_type: Option<ClientType>,
    pub client_secret: Option<Option<HashedClientSecret>>,
    pub consent_type: Option<Option<String>>,
    pub display_name: Option<Option<String>>,
    pub permissions: Option<Vec<String>>,
    pub redirect_uris: Option<Vec<RedirectUri>>,
    pub post_logout_redirect_uris: Option<Vec<RedirectUri>>,
}

impl ApplicationChanges {
    pub fn client_type(client_type: ClientType) -> Self {
        Self {
            client_type: Some(client_type),
            ..Self::default()
        }
    }

    pub fn apply_to<K>(self, app: &mut Application<K>) {
        if let Some(client_id) = self.client_id {
            app.client_id = client_id;
        }
        if let Some(client_type) = self.client_type {
            app.client_type = client_type;
        }
        if let Some(secret) = self.client_secret {
            app.client_secret = secret;
        }
        if let Some(consent_type) = self.consent_type {
            app.consent_type = consent_type;
        }
        if let Some(display_name) = self.display_name {
            app.display_name = display_name;
        }
        if let Some(permissions) = self.permissions {
            app.permissions = permissions;
        }
        if let Some(uris) = self.redirect_uris {
            app.redirect_uris = uris;
        }
        if let Some(uris) = self.post_logout_redirect_uris {
            app.post_logout_redirect_uris = uris;
        }
    }
}

/// A consent granted to an application.
#[derive(Clone, Debug, PartialEq)]
pub struct Authorization<K> {
    pub id: K,
    pub application_id: Option<K>,
    pub subject: Option<String>,
    pub status: Option<String>,
    pub authorization_type: Option<String>,
    pub scopes: Scope,
    pub creation_date: Option<Timestamp>,
    pub concurrency_token: ConcurrencyToken,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewAuthorization<K> {
    pub id: Option<K>,
    pub application_id: Option<K>,
    pub subject: Option<String>,
    pub status: Option<String>,
    pub authorization_type: Option<String>,
    pub scopes: Scope,
    pub creation_date: Option<Timestamp>,
}

impl<K> Default for NewAuthorization<K> {
    fn default() -> Self {
        Self {
            id: None,
            application_id: None,
            subject: None,
            status: None,
            authorization_type: None,
            scopes: Scope::default(),
            creation_date: None,
        }
    }
}

impl<K> NewAuthorization<K> {
    pub fn for_application(application_id: K) -> Self {
        Self {
            application_id: Some(application_id),
            creation_date: Some(Timestamp::now()),
            ..Self::default()
        }
    }

    pub fn into_authorization(self, id: K, concurrency_token: ConcurrencyToken) -> Authorization<K> {
        Authorization {
            id,
            application_id: self.application_id,
            subject: self.subject,
            status: self.status,
            authorization_type: self.authorization_type,
            scopes: self.scopes,
            creation_date: self.creation_date,
            concurrency_token,
        }
    }
}

/// An issued credential.
#[derive(Clone, Debug, PartialEq)]
pub struct Token<K> {
    pub id: K,
    pub application_id: Option<K>,
    pub authorization_id: Option<K>,
    pub subject: Option<String>,
    pub status: Option<String>,
    pub token_type: Option<String>,
    pub payload: Option<String>,
    pub reference_id: Option<HashedReferenceId>,
    pub creation_date: Option<Timestamp>,
    pub expiration_date: Option<Timestamp>,
    pub concurrency_token: ConcurrencyToken,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewToken<K> {
    pub id: Option<K>,
    pub application_id: Option<K>,
    pub authorization_id: Option<K>,
    pub subject: Option<String>,
    pub status: Option<String>,
    pub token_type: Option<String>,
    pub payload: Option<String>,
    pub reference_id: Option<HashedReferenceId>,
    pub creation_date: Option<Timestamp>,
    pub expiration_date: Option<Timestamp>,
}

impl<K> Default for NewToken<K> {
    fn default() -> Self {
        Self {
            id: None,
            application_id: None,
            authorization_id: None,
            subject: None,
            status: None,
            token_type: None,
            payload: None,
            reference_id: None,
            creation_date: None,
            expiration_date: None,
        }
    }
}

impl<K> NewToken<K> {
    pub fn for_application(application_id: K) -> Self {
        Self {
            application_id: Some(application_id),
            creation_date: Some(Timestamp::now()),
            ..Self::default()
        }
    }

    pub fn into_token(self, id: K, concurrency_token: ConcurrencyToken) -> Token<K> {
        Token {
            id,
            application_id: self.application_id,
            authorization_id: self.authorization_id,
            subject: self.subject,
            status: self.status,
            token_type: self.token_type,
            payload: self.payload,
            reference_id: self.reference_id,
            creation_date: self.creation_date,
            expiration_date: self.expiration_date,
            concurrency_token,
        }
    }
}

/// Records addressable by their primary key, used to page through them.
pub trait Keyed<K> {
    fn key(&self) -> &K;
}

impl<K> Keyed<K> for Application<K> {
    fn key(&self) -> &K {
        &self.id
    }
}

impl<K> Keyed<K> for Authorization<K> {
    fn key(&self) -> &K {
        &self.id
    }
}

impl<K> Keyed<K> for Token<K> {
    fn key(&self) -> &K {
        &self.id
    }
}
