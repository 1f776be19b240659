use crate::core::key::StoreKey;
use crate::core::models::{
    Application, ApplicationChanges, Authorization, NewApplication, NewAuthorization, NewToken,
    Token,
};
use crate::core::types::{ClientId, ConcurrencyToken, HashedReferenceId};

pub mod error;
pub mod listing;
pub mod memory;

pub use error::{Entity, Error};
pub use listing::Listing;
pub use memory::MemoryStore;

/// Persistence of applications and the authorizations and tokens issued to
/// them.
///
/// Every method is all-or-nothing: either its whole effect is visible to
/// other callers or none of it is. Nothing is retried internally, so callers
/// that hit [`Error::ConcurrencyConflict`] reload the record and try again.
pub trait Store {
    type Key: StoreKey;

    /// Registers an application. Fails with [`Error::Conflict`] when its
    /// `client_id`, or the key it asks for, is already taken.
    fn create_application(&self, new: NewApplication<Self::Key>) -> Result<Self::Key, Error>;

    fn find_application_by_id(&self, id: &Self::Key) -> Result<Application<Self::Key>, Error>;

    fn find_application_by_client_id(
        &self,
        client_id: &ClientId,
    ) -> Result<Application<Self::Key>, Error>;

    /// Applies `changes` if the stored concurrency token still equals
    /// `expected`, returning the token that replaces it.
    fn update_application(
        &self,
        id: &Self::Key,
        changes: ApplicationChanges,
        expected: &ConcurrencyToken,
    ) -> Result<ConcurrencyToken, Error>;

    /// Removes an application after detaching every authorization and token
    /// that referenced it.
    fn delete_application(&self, id: &Self::Key) -> Result<(), Error>;

    fn create_authorization(&self, new: NewAuthorization<Self::Key>) -> Result<Self::Key, Error>;

    fn find_authorization_by_id(&self, id: &Self::Key)
        -> Result<Authorization<Self::Key>, Error>;

    /// Removes an authorization after detaching the tokens issued under it.
    fn delete_authorization(&self, id: &Self::Key) -> Result<(), Error>;

    fn create_token(&self, new: NewToken<Self::Key>) -> Result<Self::Key, Error>;

    fn find_token_by_id(&self, id: &Self::Key) -> Result<Token<Self::Key>, Error>;

    fn find_token_by_reference_id(
        &self,
        reference_id: &HashedReferenceId,
    ) -> Result<Token<Self::Key>, Error>;

    fn delete_token(&self, id: &Self::Key) -> Result<(), Error>;

    fn authorizations_page(
        &self,
        application: &Self::Key,
        after: Option<&Self::Key>,
        limit: usize,
    ) -> Result<Vec<Authorization<Self::Key>>, Error>;

    fn tokens_page(
        &self,
        application: &Self::Key,
        after: Option<&Self::Key>,
        limit: usize,
    ) -> Result<Vec<Token<Self::Key>>, Error>;

    fn list_authorizations_for_application(
        &self,
        id: &Self::Key,
    ) -> Listing<'_, Self, Authorization<Self::Key>>
    where
        Self: Sized,
    {
        Listing::new(self, id.clone(), Self::authorizations_page)
    }

    fn list_tokens_for_application(&self, id: &Self::Key) -> Listing<'_, Self, Token<Self::Key>>
    where
        Self: Sized,
    {
        Listing::new(self, id.clone(), Self::tokens_page)
    }
}
