use std::collections::BTreeMap;
use std::ops::Bound;

use parking_lot::Mutex;
use tracing::{event, Level};

use super::error::{Entity, Error, OptionExt};
use super::Store;
use crate::core::key::StoreKey;
use crate::core::models::{
    Application, ApplicationChanges, Authorization, NewApplication, NewAuthorization, NewToken,
    Token,
};
use crate::core::types::{ClientId, ConcurrencyToken, HashedReferenceId};
use crate::core::validation::{check_application, check_new_authorization, check_new_token};

#[derive(Debug)]
struct Table<K, V> {
    rows: BTreeMap<K, V>,
    sequence: u64,
}

impl<K: StoreKey, V> Table<K, V> {
    fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            sequence: 0,
        }
    }

    /// Picks the key to use for a new row without consuming the sequence, so
    /// a rejected insert leaves no gap.
    fn claim_key(&self, requested: Option<K>, entity: Entity) -> Result<(K, u64), Error> {
        if let Some(id) = requested {
            if self.rows.contains_key(&id) {
                return Err(Error::conflict(entity, "id", &id));
            }
            return Ok((id, self.sequence));
        }

        let mut sequence = self.sequence;
        loop {
            sequence += 1;
            let id = K::generate(sequence);
            if !self.rows.contains_key(&id) {
                return Ok((id, sequence));
            }
        }
    }

    fn insert(&mut self, id: K, sequence: u64, row: V) {
        self.sequence = sequence;
        self.rows.insert(id, row);
    }

    fn page_after(
        &self,
        after: Option<&K>,
        limit: usize,
        mut belongs: impl FnMut(&V) -> bool,
    ) -> Vec<V>
    where
        V: Clone,
    {
        let start = match after {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };
        self.rows
            .range::<K, _>((start, Bound::Unbounded))
            .map(|(_, row)| row)
            .filter(|row| belongs(*row))
            .take(limit)
            .cloned()
            .collect()
    }
}

#[derive(Debug)]
struct State<K> {
    applications: Table<K, Application<K>>,
    client_ids: BTreeMap<ClientId, K>,
    authorizations: Table<K, Authorization<K>>,
    tokens: Table<K, Token<K>>,
    reference_ids: BTreeMap<HashedReferenceId, K>,
}

/// A store holding every table in memory behind a single lock.
///
/// Each operation runs entirely inside one critical section, so uniqueness
/// checks and the writes they guard cannot interleave with other callers.
#[derive(Debug)]
pub struct MemoryStore<K: StoreKey> {
    state: Mutex<State<K>>,
}

impl<K: StoreKey> Default for MemoryStore<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: StoreKey> MemoryStore<K> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                applications: Table::new(),
                client_ids: BTreeMap::new(),
                authorizations: Table::new(),
                tokens: Table::new(),
                reference_ids: BTreeMap::new(),
            }),
        }
    }

    pub fn application_count(&self) -> usize {
        self.state.lock().applications.rows.len()
    }
}

fn check_limit(limit: usize) -> Result<(), Error> {
    if limit == 0 {
        return Err(Error::InvalidArgument("limit"));
    }
    Ok(())
}

impl<K: StoreKey> Store for MemoryStore<K> {
    type Key = K;

    #[tracing::instrument(skip_all, fields(client_id = %new.client_id))]
    fn create_application(&self, mut new: NewApplication<K>) -> Result<K, Error> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let (id, sequence) = state
            .applications
            .claim_key(new.id.take(), Entity::Application)?;
        let app = new.into_application(id.clone(), ConcurrencyToken::generate());
        check_application(Some(&id), &app)?;

        if state.client_ids.contains_key(&app.client_id) {
            event!(Level::DEBUG, "client_id is already registered");
            return Err(Error::conflict(
                Entity::Application,
                "client_id",
                &app.client_id.0,
            ));
        }

        state.client_ids.insert(app.client_id.clone(), id.clone());
        state.applications.insert(id.clone(), sequence, app);

        event!(Level::INFO, ?id, "Registered application");
        Ok(id)
    }

    fn find_application_by_id(&self, id: &K) -> Result<Application<K>, Error> {
        self.state
            .lock()
            .applications
            .rows
            .get(id)
            .cloned()
            .or_not_found(Entity::Application)
    }

    fn find_application_by_client_id(&self, client_id: &ClientId) -> Result<Application<K>, Error> {
        if client_id.0.is_empty() {
            return Err(Error::InvalidArgument("client_id"));
        }

        let state = self.state.lock();
        state
            .client_ids
            .get(client_id)
            .and_then(|id| state.applications.rows.get(id))
            .cloned()
            .or_not_found(Entity::Application)
    }

    #[tracing::instrument(skip(self, changes, expected))]
    fn update_application(
        &self,
        id: &K,
        changes: ApplicationChanges,
        expected: &ConcurrencyToken,
    ) -> Result<ConcurrencyToken, Error> {
        if expected.0.is_empty() {
            return Err(Error::InvalidArgument("expected_concurrency_token"));
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;

        let current = state
            .applications
            .rows
            .get(id)
            .or_not_found(Entity::Application)?;

        if &current.concurrency_token != expected {
            event!(Level::DEBUG, "Stale concurrency token");
            return Err(Error::ConcurrencyConflict(Entity::Application));
        }

        let mut updated = current.clone();
        changes.apply_to(&mut updated);
        updated.concurrency_token = ConcurrencyToken::replacing(&current.concurrency_token);
        check_application(Some(id), &updated)?;

        if updated.client_id != current.client_id {
            if state.client_ids.contains_key(&updated.client_id) {
                return Err(Error::conflict(
                    Entity::Application,
                    "client_id",
                    &updated.client_id.0,
                ));
            }
            state.client_ids.remove(&current.client_id);
            state.client_ids.insert(updated.client_id.clone(), id.clone());
        }

        let token = updated.concurrency_token.clone();
        state.applications.rows.insert(id.clone(), updated);

        event!(Level::INFO, "Updated application");
        Ok(token)
    }

    #[tracing::instrument(skip(self))]
    fn delete_application(&self, id: &K) -> Result<(), Error> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let app = state
            .applications
            .rows
            .remove(id)
            .or_not_found(Entity::Application)?;
        state.client_ids.remove(&app.client_id);

        let mut detached = 0usize;
        for authorization in state.authorizations.rows.values_mut() {
            if authorization.application_id.as_ref() == Some(id) {
                authorization.application_id = None;
                detached += 1;
            }
        }
        for token in state.tokens.rows.values_mut() {
            if token.application_id.as_ref() == Some(id) {
                token.application_id = None;
                detached += 1;
            }
        }

        event!(Level::INFO, detached, "Deleted application");
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    fn create_authorization(&self, mut new: NewAuthorization<K>) -> Result<K, Error> {
        check_new_authorization(&new)?;

        let mut guard = self.state.lock();
        let state = &mut *guard;

        if let Some(application_id) = &new.application_id {
            if !state.applications.rows.contains_key(application_id) {
                return Err(Error::NotFound(Entity::Application));
            }
        }

        let (id, sequence) = state
            .authorizations
            .claim_key(new.id.take(), Entity::Authorization)?;
        let authorization = new.into_authorization(id.clone(), ConcurrencyToken::generate());
        state.authorizations.insert(id.clone(), sequence, authorization);

        event!(Level::DEBUG, ?id, "Stored authorization");
        Ok(id)
    }

    fn find_authorization_by_id(&self, id: &K) -> Result<Authorization<K>, Error> {
        self.state
            .lock()
            .authorizations
            .rows
            .get(id)
            .cloned()
            .or_not_found(Entity::Authorization)
    }

    #[tracing::instrument(skip(self))]
    fn delete_authorization(&self, id: &K) -> Result<(), Error> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        state
            .authorizations
            .rows
            .remove(id)
            .or_not_found(Entity::Authorization)?;

        for token in state.tokens.rows.values_mut() {
            if token.authorization_id.as_ref() == Some(id) {
                token.authorization_id = None;
            }
        }

        Ok(())
    }

    #[tracing::instrument(skip_all)]
    fn create_token(&self, mut new: NewToken<K>) -> Result<K, Error> {
        check_new_token(&new)?;

        let mut guard = self.state.lock();
        let state = &mut *guard;

        if let Some(application_id) = &new.application_id {
            if !state.applications.rows.contains_key(application_id) {
                return Err(Error::NotFound(Entity::Application));
            }
        }
        if let Some(authorization_id) = &new.authorization_id {
            if !state.authorizations.rows.contains_key(authorization_id) {
                return Err(Error::NotFound(Entity::Authorization));
            }
        }
        if let Some(reference_id) = &new.reference_id {
            if state.reference_ids.contains_key(reference_id) {
                return Err(Error::conflict(Entity::Token, "reference_id", &reference_id.0));
            }
        }

        let (id, sequence) = state.tokens.claim_key(new.id.take(), Entity::Token)?;
        let token = new.into_token(id.clone(), ConcurrencyToken::generate());
        if let Some(reference_id) = &token.reference_id {
            state.reference_ids.insert(reference_id.clone(), id.clone());
        }
        state.tokens.insert(id.clone(), sequence, token);

        event!(Level::DEBUG, ?id, "Stored token");
        Ok(id)
    }

    fn find_token_by_id(&self, id: &K) -> Result<Token<K>, Error> {
        self.state
            .lock()
            .tokens
            .rows
            .get(id)
            .cloned()
            .or_not_found(Entity::Token)
    }

    fn find_token_by_reference_id(&self, reference_id: &HashedReferenceId) -> Result<Token<K>, Error> {
        if reference_id.0.is_empty() {
            return Err(Error::InvalidArgument("reference_id"));
        }

        let state = self.state.lock();
        state
            .reference_ids
            .get(reference_id)
            .and_then(|id| state.tokens.rows.get(id))
            .cloned()
            .or_not_found(Entity::Token)
    }

    #[tracing::instrument(skip(self))]
    fn delete_token(&self, id: &K) -> Result<(), Error> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let token = state.tokens.rows.remove(id).or_not_found(Entity::Token)?;
        if let Some(reference_id) = &token.reference_id {
            state.reference_ids.remove(reference_id);
        }

        Ok(())
    }

    fn authorizations_page(
        &self,
        application: &K,
        after: Option<&K>,
        limit: usize,
    ) -> Result<Vec<Authorization<K>>, Error> {
        check_limit(limit)?;

        let state = self.state.lock();
        if !state.applications.rows.contains_key(application) {
            return Err(Error::NotFound(Entity::Application));
        }

        Ok(state.authorizations.page_after(after, limit, |a| {
            a.application_id.as_ref() == Some(application)
        }))
    }

    fn tokens_page(
        &self,
        application: &K,
        after: Option<&K>,
        limit: usize,
    ) -> Result<Vec<Token<K>>, Error> {
        check_limit(limit)?;

        let state = self.state.lock();
        if !state.applications.rows.contains_key(application) {
            return Err(Error::NotFound(Entity::Application));
        }

        Ok(state
            .tokens
            .page_after(after, limit, |t| t.application_id.as_ref() == Some(application)))
    }
}
