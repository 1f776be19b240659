#![allow(clippy::ptr_arg)]

use std::convert::TryFrom;
use std::fmt::Debug;
use std::marker::PhantomData;

use crate::core::key::StoreKey;
use crate::core::models::{
    Application, ApplicationChanges, Authorization, NewApplication, NewAuthorization, NewToken,
    Token,
};
use crate::core::types::{
    ClientId, ClientType, ConcurrencyToken, HashedClientSecret, HashedReferenceId, Scope,
    Timestamp,
};
use crate::core::validation::{check_application, check_new_authorization, check_new_token};
use crate::store::error::{Entity, Error, OptionExt};
use crate::store::Store;
use crate::util::random::random_key;

use diesel::prelude::*;
use diesel::r2d2::{Builder as PoolBuilder, ConnectionManager, Pool, PooledConnection};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::{BigInt, Text};
use diesel_migrations::RunMigrationsError;
use tokio::task::block_in_place;
use tracing::{event, Level};

pub mod models;
pub mod schema;

mod text_migrations {
    embed_migrations!("migrations/text");

    pub fn run(conn: &diesel::PgConnection) -> Result<(), diesel_migrations::RunMigrationsError> {
        embedded_migrations::run_with_output(conn, &mut std::io::stderr())
    }
}

mod bigint_migrations {
    embed_migrations!("migrations/bigint");

    pub fn run(conn: &diesel::PgConnection) -> Result<(), diesel_migrations::RunMigrationsError> {
        embedded_migrations::run_with_output(conn, &mut std::io::stderr())
    }
}

sql_function!(fn nextval(sequence: Text) -> BigInt);

const APPLICATIONS_CLIENT_ID_KEY: &str = "applications_client_id_key";
const TOKENS_REFERENCE_ID_KEY: &str = "tokens_reference_id_key";
const TOKENS_AUTHORIZATION_ID_FKEY: &str = "tokens_authorization_id_fkey";

/// A key type [`DbStore`] can hold, together with the migration set whose
/// key columns have the matching SQL type.
pub trait DbKey: StoreKey {
    /// Key for a new row of `table`. Text keys are drawn at random, numeric
    /// keys come from the table's `id` sequence.
    fn next_key(conn: &PgConnection, table: &str) -> QueryResult<Self>;

    fn run_migrations(conn: &PgConnection) -> Result<(), RunMigrationsError>;
}

/// `VARCHAR(50)` keys, from `migrations/text`.
impl DbKey for String {
    fn next_key(_conn: &PgConnection, _table: &str) -> QueryResult<Self> {
        Ok(random_key())
    }

    fn run_migrations(conn: &PgConnection) -> Result<(), RunMigrationsError> {
        text_migrations::run(conn)
    }
}

/// `BIGSERIAL` keys, from `migrations/bigint`.
impl DbKey for i64 {
    fn next_key(conn: &PgConnection, table: &str) -> QueryResult<Self> {
        diesel::select(nextval(format!("{}_id_seq", table))).get_result(conn)
    }

    fn run_migrations(conn: &PgConnection) -> Result<(), RunMigrationsError> {
        bigint_migrations::run(conn)
    }
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub pool_size: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self { pool_size: 10 }
    }
}

/// PostgreSQL-backed store, keyed by `String` or `i64`.
///
/// Uniqueness rests on the database's unique indexes, updates are a
/// compare-and-swap on `concurrency_token`, and every operation that touches
/// more than one row runs in a single transaction.
pub struct DbStore<K = String> {
    pool: Pool<ConnectionManager<PgConnection>>,
    key: PhantomData<fn() -> K>,
}

type Conn = PooledConnection<ConnectionManager<PgConnection>>;

impl<K> DbStore<K> {
    pub fn acquire(uri: &str, config: &DbConfig) -> Result<Self, Error> {
        let pool = PoolBuilder::new()
            .max_size(config.pool_size)
            .build(ConnectionManager::new(uri))?;
        Ok(Self {
            pool,
            key: PhantomData,
        })
    }

    fn conn(&self) -> Result<Conn, Error> {
        Ok(self.pool.get()?)
    }
}

impl<K: DbKey> DbStore<K> {
    pub fn migrate(&self) -> Result<(), Error> {
        let conn = self.conn()?;
        block_in_place(|| K::run_migrations(&conn))?;
        event!(Level::INFO, "Ran migrations");
        Ok(())
    }
}

impl<K> Debug for DbStore<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbStore").finish()
    }
}

fn unique_violation(e: &DieselError) -> Option<&str> {
    match e {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            Some(info.constraint_name().unwrap_or_default())
        }
        _ => None,
    }
}

fn foreign_key_violation(e: &DieselError) -> Option<&str> {
    match e {
        DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
            Some(info.constraint_name().unwrap_or_default())
        }
        _ => None,
    }
}

fn application_conflict<K: StoreKey>(e: DieselError, app: &Application<K>) -> Error {
    match unique_violation(&e) {
        Some(APPLICATIONS_CLIENT_ID_KEY) => {
            Error::conflict(Entity::Application, "client_id", &app.client_id.0)
        }
        Some(_) => Error::conflict(Entity::Application, "id", &app.id),
        None => e.into(),
    }
}

fn page_limit(limit: usize) -> Result<i64, Error> {
    if limit == 0 {
        return Err(Error::InvalidArgument("limit"));
    }
    Ok(i64::try_from(limit).unwrap_or(i64::MAX))
}

/// Row conversions and the [`Store`] implementation for one key type, over
/// `schema::$name` and `models::$name`.
macro_rules! key_store {
    ($name:ident, $key:ty) => {
        mod $name {
            use super::*;
            use super::models::$name as models;
            use super::schema::$name as schema;

            pub(super) fn application_to_row(
                app: &Application<$key>,
            ) -> Result<models::Application, Error> {
                Ok(models::Application {
                    id: app.id.clone(),
                    client_id: app.client_id.0.clone(),
                    client_type: app.client_type.0.clone(),
                    concurrency_token: app.concurrency_token.0.clone(),
                    client_secret: app.client_secret.as_ref().map(|s| s.0.clone()),
                    consent_type: app.consent_type.clone(),
                    display_name: app.display_name.clone(),
                    permissions: serde_json::to_string(&app.permissions)?,
                    redirect_uris: serde_json::to_string(&app.redirect_uris)?,
                    post_logout_redirect_uris: serde_json::to_string(
                        &app.post_logout_redirect_uris,
                    )?,
                })
            }

            pub(super) fn application_from_row(
                row: models::Application,
            ) -> Result<Application<$key>, Error> {
                Ok(Application {
                    id: row.id,
                    client_id: ClientId(row.client_id),
                    client_type: ClientType(row.client_type),
                    concurrency_token: ConcurrencyToken(row.concurrency_token),
                    client_secret: row.client_secret.map(HashedClientSecret),
                    consent_type: row.consent_type,
                    display_name: row.display_name,
                    permissions: serde_json::from_str(&row.permissions)?,
                    redirect_uris: serde_json::from_str(&row.redirect_uris)?,
                    post_logout_redirect_uris: serde_json::from_str(
                        &row.post_logout_redirect_uris,
                    )?,
                })
            }

            pub(super) fn authorization_to_row(a: &Authorization<$key>) -> models::Authorization {
                models::Authorization {
                    id: a.id.clone(),
                    application_id: a.application_id.clone(),
                    subject: a.subject.clone(),
                    status: a.status.clone(),
                    authorization_type: a.authorization_type.clone(),
                    scopes: a.scopes.as_joined(),
                    creation_date: a.creation_date.map(Into::into),
                    concurrency_token: a.concurrency_token.0.clone(),
                }
            }

            pub(super) fn authorization_from_row(row: models::Authorization) -> Authorization<$key> {
                Authorization {
                    id: row.id,
                    application_id: row.application_id,
                    subject: row.subject,
                    status: row.status,
                    authorization_type: row.authorization_type,
                    scopes: Scope::from_delimited_parts(&row.scopes),
                    creation_date: row.creation_date.map(Timestamp),
                    concurrency_token: ConcurrencyToken(row.concurrency_token),
                }
            }

            fn token_to_row(t: &Token<$key>) -> models::Token {
                models::Token {
                    id: t.id.clone(),
                    application_id: t.application_id.clone(),
                    authorization_id: t.authorization_id.clone(),
                    subject: t.subject.clone(),
                    status: t.status.clone(),
                    token_type: t.token_type.clone(),
                    payload: t.payload.clone(),
                    reference_id: t.reference_id.as_ref().map(|r| r.0.clone()),
                    creation_date: t.creation_date.map(Into::into),
                    expiration_date: t.expiration_date.map(Into::into),
                    concurrency_token: t.concurrency_token.0.clone(),
                }
            }

            fn token_from_row(row: models::Token) -> Token<$key> {
                Token {
                    id: row.id,
                    application_id: row.application_id,
                    authorization_id: row.authorization_id,
                    subject: row.subject,
                    status: row.status,
                    token_type: row.token_type,
                    payload: row.payload,
                    reference_id: row.reference_id.map(HashedReferenceId),
                    creation_date: row.creation_date.map(Timestamp),
                    expiration_date: row.expiration_date.map(Timestamp),
                    concurrency_token: ConcurrencyToken(row.concurrency_token),
                }
            }

            fn application_exists(conn: &PgConnection, id: &$key) -> Result<bool, Error> {
                use diesel::dsl::exists;
                use self::schema::applications::dsl::applications;

                Ok(diesel::select(exists(applications.find(id))).get_result::<bool>(conn)?)
            }

            impl DbStore<$key> {
                /// Every registered application, ordered by `client_id`.
                pub fn list_applications(&self) -> Result<Vec<Application<$key>>, Error> {
                    use self::schema::applications::dsl::{self, applications};

                    let conn = self.conn()?;
                    let rows = block_in_place(|| {
                        applications
                            .order(dsl::client_id.asc())
                            .get_results::<models::Application>(&conn)
                    })?;

                    rows.into_iter().map(application_from_row).collect()
                }
            }

            impl Store for DbStore<$key> {
                type Key = $key;

                #[tracing::instrument(skip_all, fields(client_id = %new.client_id))]
                fn create_application(&self, mut new: NewApplication<$key>) -> Result<$key, Error> {
                    use self::schema::applications::dsl::applications;

                    let conn = self.conn()?;
                    let id = match new.id.take() {
                        Some(id) => id,
                        None => block_in_place(|| <$key as DbKey>::next_key(&conn, "applications"))?,
                    };
                    let app = new.into_application(id.clone(), ConcurrencyToken::generate());
                    check_application(Some(&id), &app)?;
                    let row = application_to_row(&app)?;

                    block_in_place(|| diesel::insert_into(applications).values(&row).execute(&conn))
                        .map_err(|e| application_conflict(e, &app))?;

                    event!(Level::INFO, %id, "Registered application");
                    Ok(id)
                }

                fn find_application_by_id(&self, id: &$key) -> Result<Application<$key>, Error> {
                    use self::schema::applications::dsl::applications;

                    let conn = self.conn()?;
                    let row = block_in_place(|| {
                        applications
                            .find(id)
                            .first::<models::Application>(&conn)
                            .optional()
                    })?;

                    application_from_row(row.or_not_found(Entity::Application)?)
                }

                fn find_application_by_client_id(
                    &self,
                    client_id: &ClientId,
                ) -> Result<Application<$key>, Error> {
                    use self::schema::applications::dsl::{self, applications};

                    if client_id.0.is_empty() {
                        return Err(Error::InvalidArgument("client_id"));
                    }

                    let conn = self.conn()?;
                    let row = block_in_place(|| {
                        applications
                            .filter(dsl::client_id.eq(&client_id.0))
                            .first::<models::Application>(&conn)
                            .optional()
                    })?;

                    application_from_row(row.or_not_found(Entity::Application)?)
                }

                #[tracing::instrument(skip(self, changes, expected))]
                fn update_application(
                    &self,
                    id: &$key,
                    changes: ApplicationChanges,
                    expected: &ConcurrencyToken,
                ) -> Result<ConcurrencyToken, Error> {
                    use self::schema::applications::dsl::{self, applications};

                    if expected.0.is_empty() {
                        return Err(Error::InvalidArgument("expected_concurrency_token"));
                    }

                    let conn = self.conn()?;
                    let token = block_in_place(|| {
                        conn.transaction::<_, Error, _>(|| {
                            let current = applications
                                .find(id)
                                .first::<models::Application>(&conn)
                                .optional()?
                                .or_not_found(Entity::Application)?;
                            let current = application_from_row(current)?;

                            if &current.concurrency_token != expected {
                                event!(Level::DEBUG, "Stale concurrency token");
                                return Err(Error::ConcurrencyConflict(Entity::Application));
                            }

                            let mut updated = current.clone();
                            changes.apply_to(&mut updated);
                            updated.concurrency_token =
                                ConcurrencyToken::replacing(&current.concurrency_token);
                            check_application(Some(id), &updated)?;
                            let row = application_to_row(&updated)?;

                            let swapped = diesel::update(
                                applications
                                    .find(id)
                                    .filter(dsl::concurrency_token.eq(&expected.0)),
                            )
                            .set(&row)
                            .execute(&conn)
                            .map_err(|e| application_conflict(e, &updated))?;

                            if swapped == 0 {
                                return Err(Error::ConcurrencyConflict(Entity::Application));
                            }

                            Ok(updated.concurrency_token)
                        })
                    })?;

                    event!(Level::INFO, "Updated application");
                    Ok(token)
                }

                #[tracing::instrument(skip(self))]
                fn delete_application(&self, id: &$key) -> Result<(), Error> {
                    use self::schema::applications::dsl::applications;
                    use self::schema::authorizations::dsl::{self as authorizations_dsl, authorizations};
                    use self::schema::tokens::dsl::{self as tokens_dsl, tokens};

                    let conn = self.conn()?;
                    let detached = block_in_place(|| {
                        conn.transaction::<_, Error, _>(|| {
                            let mut detached = diesel::update(
                                authorizations.filter(authorizations_dsl::application_id.eq(id)),
                            )
                            .set(authorizations_dsl::application_id.eq(None::<$key>))
                            .execute(&conn)?;

                            detached +=
                                diesel::update(tokens.filter(tokens_dsl::application_id.eq(id)))
                                    .set(tokens_dsl::application_id.eq(None::<$key>))
                                    .execute(&conn)?;

                            let deleted = diesel::delete(applications.find(id)).execute(&conn)?;
                            if deleted == 0 {
                                return Err(Error::NotFound(Entity::Application));
                            }

                            Ok(detached)
                        })
                    })?;

                    event!(Level::INFO, detached, "Deleted application");
                    Ok(())
                }

                #[tracing::instrument(skip_all)]
                fn create_authorization(
                    &self,
                    mut new: NewAuthorization<$key>,
                ) -> Result<$key, Error> {
                    use self::schema::authorizations::dsl::authorizations;

                    check_new_authorization(&new)?;

                    let conn = self.conn()?;
                    let id = match new.id.take() {
                        Some(id) => id,
                        None => block_in_place(|| <$key as DbKey>::next_key(&conn, "authorizations"))?,
                    };
                    let authorization =
                        new.into_authorization(id.clone(), ConcurrencyToken::generate());
                    let row = authorization_to_row(&authorization);

                    block_in_place(|| {
                        if let Some(application_id) = &row.application_id {
                            if !application_exists(&conn, application_id)? {
                                return Err(Error::NotFound(Entity::Application));
                            }
                        }

                        diesel::insert_into(authorizations)
                            .values(&row)
                            .execute(&conn)
                            .map_err(|e| {
                                if unique_violation(&e).is_some() {
                                    Error::conflict(Entity::Authorization, "id", &row.id)
                                } else if foreign_key_violation(&e).is_some() {
                                    Error::NotFound(Entity::Application)
                                } else {
                                    e.into()
                                }
                            })
                    })?;

                    event!(Level::DEBUG, %id, "Stored authorization");
                    Ok(id)
                }

                fn find_authorization_by_id(&self, id: &$key) -> Result<Authorization<$key>, Error> {
                    use self::schema::authorizations::dsl::authorizations;

                    let conn = self.conn()?;
                    let row = block_in_place(|| {
                        authorizations
                            .find(id)
                            .first::<models::Authorization>(&conn)
                            .optional()
                    })?;

                    Ok(authorization_from_row(
                        row.or_not_found(Entity::Authorization)?,
                    ))
                }

                #[tracing::instrument(skip(self))]
                fn delete_authorization(&self, id: &$key) -> Result<(), Error> {
                    use self::schema::authorizations::dsl::authorizations;
                    use self::schema::tokens::dsl::{self as tokens_dsl, tokens};

                    let conn = self.conn()?;
                    block_in_place(|| {
                        conn.transaction::<_, Error, _>(|| {
                            diesel::update(tokens.filter(tokens_dsl::authorization_id.eq(id)))
                                .set(tokens_dsl::authorization_id.eq(None::<$key>))
                                .execute(&conn)?;

                            let deleted = diesel::delete(authorizations.find(id)).execute(&conn)?;
                            if deleted == 0 {
                                return Err(Error::NotFound(Entity::Authorization));
                            }
                            Ok(())
                        })
                    })
                }

                #[tracing::instrument(skip_all)]
                fn create_token(&self, mut new: NewToken<$key>) -> Result<$key, Error> {
                    use self::schema::tokens::dsl::tokens;

                    check_new_token(&new)?;

                    let conn = self.conn()?;
                    let id = match new.id.take() {
                        Some(id) => id,
                        None => block_in_place(|| <$key as DbKey>::next_key(&conn, "tokens"))?,
                    };
                    let token = new.into_token(id.clone(), ConcurrencyToken::generate());
                    let row = token_to_row(&token);

                    block_in_place(|| {
                        diesel::insert_into(tokens)
                            .values(&row)
                            .execute(&conn)
                            .map_err(|e| {
                                if let Some(constraint) = unique_violation(&e) {
                                    return if constraint == TOKENS_REFERENCE_ID_KEY {
                                        Error::conflict(
                                            Entity::Token,
                                            "reference_id",
                                            row.reference_id.as_deref().unwrap_or_default(),
                                        )
                                    } else {
                                        Error::conflict(Entity::Token, "id", &row.id)
                                    };
                                }
                                match foreign_key_violation(&e) {
                                    Some(TOKENS_AUTHORIZATION_ID_FKEY) => {
                                        Error::NotFound(Entity::Authorization)
                                    }
                                    Some(_) => Error::NotFound(Entity::Application),
                                    None => e.into(),
                                }
                            })
                    })?;

                    event!(Level::DEBUG, %id, "Stored token");
                    Ok(id)
                }

                fn find_token_by_id(&self, id: &$key) -> Result<Token<$key>, Error> {
                    use self::schema::tokens::dsl::tokens;

                    let conn = self.conn()?;
                    let row =
                        block_in_place(|| tokens.find(id).first::<models::Token>(&conn).optional())?;

                    Ok(token_from_row(row.or_not_found(Entity::Token)?))
                }

                fn find_token_by_reference_id(
                    &self,
                    reference_id: &HashedReferenceId,
                ) -> Result<Token<$key>, Error> {
                    use self::schema::tokens::dsl::{self, tokens};

                    if reference_id.0.is_empty() {
                        return Err(Error::InvalidArgument("reference_id"));
                    }

                    let conn = self.conn()?;
                    let row = block_in_place(|| {
                        tokens
                            .filter(dsl::reference_id.eq(&reference_id.0))
                            .first::<models::Token>(&conn)
                            .optional()
                    })?;

                    Ok(token_from_row(row.or_not_found(Entity::Token)?))
                }

                #[tracing::instrument(skip(self))]
                fn delete_token(&self, id: &$key) -> Result<(), Error> {
                    use self::schema::tokens::dsl::tokens;

                    let conn = self.conn()?;
                    let deleted = block_in_place(|| diesel::delete(tokens.find(id)).execute(&conn))?;
                    if deleted == 0 {
                        return Err(Error::NotFound(Entity::Token));
                    }
                    Ok(())
                }

                fn authorizations_page(
                    &self,
                    application: &$key,
                    after: Option<&$key>,
                    limit: usize,
                ) -> Result<Vec<Authorization<$key>>, Error> {
                    use self::schema::authorizations::dsl::{self, authorizations};

                    let limit = page_limit(limit)?;
                    let conn = self.conn()?;

                    let rows = block_in_place(|| {
                        if !application_exists(&conn, application)? {
                            return Err(Error::NotFound(Entity::Application));
                        }

                        let mut query = authorizations
                            .filter(dsl::application_id.eq(application))
                            .order(dsl::id.asc())
                            .limit(limit)
                            .into_boxed();
                        if let Some(after) = after {
                            query = query.filter(dsl::id.gt(after));
                        }

                        Ok(query.load::<models::Authorization>(&conn)?)
                    })?;

                    Ok(rows.into_iter().map(authorization_from_row).collect())
                }

                fn tokens_page(
                    &self,
                    application: &$key,
                    after: Option<&$key>,
                    limit: usize,
                ) -> Result<Vec<Token<$key>>, Error> {
                    use self::schema::tokens::dsl::{self, tokens};

                    let limit = page_limit(limit)?;
                    let conn = self.conn()?;

                    let rows = block_in_place(|| {
                        if !application_exists(&conn, application)? {
                            return Err(Error::NotFound(Entity::Application));
                        }

                        let mut query = tokens
                            .filter(dsl::application_id.eq(application))
                            .order(dsl::id.asc())
                            .limit(limit)
                            .into_boxed();
                        if let Some(after) = after {
                            query = query.filter(dsl::id.gt(after));
                        }

                        Ok(query.load::<models::Token>(&conn)?)
                    })?;

                    Ok(rows.into_iter().map(token_from_row).collect())
                }
            }
        }
    };
}

key_store!(text, String);
key_store!(bigint, i64);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::RedirectUri;

    #[test]
    fn application_rows_keep_list_columns_as_json() {
        let mut new = NewApplication::new(ClientId("app1".into()), ClientType::public());
        new.permissions = vec!["ept:token".into(), "gt:authorization_code".into()];
        new.redirect_uris = vec![RedirectUri("https://app1.example/cb".into())];
        let app = new.into_application("id-1".to_string(), ConcurrencyToken("t0".into()));

        let row = text::application_to_row(&app).unwrap();
        assert_eq!(row.permissions, r#"["ept:token","gt:authorization_code"]"#);
        assert_eq!(row.redirect_uris, r#"["https://app1.example/cb"]"#);
        assert_eq!(row.post_logout_redirect_uris, "[]");

        assert_eq!(text::application_from_row(row).unwrap(), app);
    }

    #[test]
    fn numeric_key_rows_carry_the_key_through() {
        let app = NewApplication::new(ClientId("app1".into()), ClientType::public())
            .into_application(17i64, ConcurrencyToken("t0".into()));

        let row = bigint::application_to_row(&app).unwrap();
        assert_eq!(row.id, 17);
        assert_eq!(bigint::application_from_row(row).unwrap(), app);

        let authorization = NewAuthorization::for_application(17i64)
            .into_authorization(3, ConcurrencyToken("t1".into()));
        let row = bigint::authorization_to_row(&authorization);
        assert_eq!(row.application_id, Some(17));
        assert_eq!(bigint::authorization_from_row(row), authorization);
    }

    #[test]
    fn corrupt_list_column_is_a_serde_error() {
        let app = NewApplication::new(ClientId("app1".into()), ClientType::public())
            .into_application("id-1".to_string(), ConcurrencyToken("t0".into()));
        let mut row = text::application_to_row(&app).unwrap();
        row.permissions = "not json".into();

        assert!(matches!(text::application_from_row(row), Err(Error::Serde(_))));
    }

    #[test]
    fn authorization_scopes_are_stored_space_delimited() {
        let mut new = NewAuthorization::for_application("app".to_string());
        new.scopes = Scope::from_delimited_parts("profile openid");
        let authorization = new.into_authorization("a1".to_string(), ConcurrencyToken("t".into()));

        let row = text::authorization_to_row(&authorization);
        assert_eq!(row.scopes, "openid profile");
        assert_eq!(text::authorization_from_row(row), authorization);
    }

    #[test]
    fn zero_page_limit_is_rejected() {
        assert!(matches!(page_limit(0), Err(Error::InvalidArgument("limit"))));
        assert_eq!(page_limit(25).unwrap(), 25);
    }
}
