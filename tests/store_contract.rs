use std::sync::Arc;

use diesel::{Connection, PgConnection, RunQueryDsl};
use tomiko_store::core::models::{ApplicationChanges, NewApplication, NewAuthorization, NewToken};
use tomiko_store::core::types::{ClientId, ClientType, HashedReferenceId, RedirectUri, Scope};
use tomiko_store::{DbConfig, DbKey, DbStore, Entity, Error, MemoryStore, Store};

fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}

fn registration_round_trips<S: Store>(store: &S) {
    let mut new = NewApplication::new(ClientId(unique("app")), ClientType::public());
    new.display_name = Some("Round trip".into());
    new.consent_type = Some("explicit".into());
    new.permissions = vec!["ept:authorization".into(), "ept:token".into()];
    new.redirect_uris = vec![RedirectUri("https://client.example/cb".into())];

    let id = store.create_application(new.clone()).unwrap();
    let found = store.find_application_by_id(&id).unwrap();

    assert!(!found.concurrency_token.0.is_empty());
    assert_eq!(found, new.into_application(id, found.concurrency_token.clone()));
}

fn client_id_is_unique<S: Store>(store: &S) {
    let client_id = ClientId(unique("app"));
    let id = store
        .create_application(NewApplication::new(client_id.clone(), ClientType::public()))
        .unwrap();

    let second =
        store.create_application(NewApplication::new(client_id.clone(), ClientType::confidential()));
    assert!(matches!(second, Err(Error::Conflict { field: "client_id", .. })));

    let stored = store.find_application_by_client_id(&client_id).unwrap();
    assert_eq!(stored.id, id);
    assert_eq!(stored.client_type, ClientType::public());
}

fn optimistic_update<S: Store>(store: &S) {
    let id = store
        .create_application(NewApplication::new(ClientId(unique("app")), ClientType::public()))
        .unwrap();
    let t0 = store.find_application_by_id(&id).unwrap().concurrency_token;

    let t1 = store
        .update_application(&id, ApplicationChanges::client_type(ClientType::confidential()), &t0)
        .unwrap();
    assert_ne!(t1, t0);

    let before = store.find_application_by_id(&id).unwrap();
    let stale =
        store.update_application(&id, ApplicationChanges::client_type(ClientType::public()), &t0);
    assert!(matches!(stale, Err(Error::ConcurrencyConflict(Entity::Application))));
    assert_eq!(store.find_application_by_id(&id).unwrap(), before);
    assert_eq!(before.client_type, ClientType::confidential());
    assert_eq!(before.concurrency_token, t1);
}

fn delete_detaches_dependents<S: Store>(store: &S) {
    let app = store
        .create_application(NewApplication::new(ClientId(unique("app")), ClientType::public()))
        .unwrap();

    let mut new_authorization = NewAuthorization::for_application(app.clone());
    new_authorization.subject = Some("alice".into());
    new_authorization.scopes = Scope::from_delimited_parts("openid profile");
    let authorization = store.create_authorization(new_authorization).unwrap();

    let mut new_token = NewToken::for_application(app.clone());
    new_token.authorization_id = Some(authorization.clone());
    new_token.reference_id = Some(HashedReferenceId(unique("ref")));
    let token = store.create_token(new_token).unwrap();

    let listed: Vec<_> = store
        .list_tokens_for_application(&app)
        .map(|t| t.unwrap().id)
        .collect();
    assert_eq!(listed, vec![token.clone()]);
    let listed: Vec<_> = store
        .list_authorizations_for_application(&app)
        .map(|a| a.unwrap().id)
        .collect();
    assert_eq!(listed, vec![authorization.clone()]);

    store.delete_application(&app).unwrap();

    assert!(matches!(
        store.find_application_by_id(&app),
        Err(Error::NotFound(Entity::Application))
    ));
    assert_eq!(store.find_authorization_by_id(&authorization).unwrap().application_id, None);
    let token = store.find_token_by_id(&token).unwrap();
    assert_eq!(token.application_id, None);
    assert_eq!(token.authorization_id, Some(authorization));
    assert!(matches!(
        store.delete_application(&app),
        Err(Error::NotFound(Entity::Application))
    ));
}

fn limits_are_enforced<S: Store>(store: &S) {
    let result =
        store.create_application(NewApplication::new(ClientId("x".repeat(101)), ClientType::public()));
    assert!(matches!(result, Err(Error::Validation { field: "client_id", .. })));

    let result = store.create_application(NewApplication::new(
        ClientId(unique("app")),
        ClientType("t".repeat(26)),
    ));
    assert!(matches!(result, Err(Error::Validation { field: "type", .. })));

    let result = store.create_application(NewApplication::new(ClientId(String::new()), ClientType::public()));
    assert!(matches!(result, Err(Error::Validation { field: "client_id", .. })));

    let app = store
        .create_application(NewApplication::new(ClientId(unique("app")), ClientType::public()))
        .unwrap();
    let mut new_token = NewToken::for_application(app.clone());
    new_token.reference_id = Some(HashedReferenceId("r".repeat(101)));
    assert!(matches!(
        store.create_token(new_token),
        Err(Error::Validation { field: "reference_id", .. })
    ));
    assert_eq!(store.list_tokens_for_application(&app).count(), 0);
}

fn racing_registrations_have_one_winner<S: Store + Send + Sync + 'static>(store: Arc<S>) {
    let client_id = ClientId(unique("race"));

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let store = Arc::clone(&store);
            let client_id = client_id.clone();
            std::thread::spawn(move || {
                store.create_application(NewApplication::new(client_id, ClientType::public()))
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter(|r| r.is_err())
        .all(|r| matches!(r, Err(Error::Conflict { field: "client_id", .. }))));

    let winner = results.into_iter().find_map(Result::ok).unwrap();
    assert_eq!(store.find_application_by_client_id(&client_id).unwrap().id, winner);
}

fn pages_through_tokens<S: Store>(store: &S) {
    let app = store
        .create_application(NewApplication::new(ClientId(unique("app")), ClientType::public()))
        .unwrap();

    let mut created: Vec<S::Key> = (0..5)
        .map(|_| store.create_token(NewToken::for_application(app.clone())).unwrap())
        .collect();
    created.sort();

    let mut listing = store.list_tokens_for_application(&app).with_page_size(2);
    let first: Vec<S::Key> = listing.by_ref().map(|t| t.unwrap().id).collect();
    assert_eq!(first, created);

    listing.rewind();
    assert_eq!(listing.count(), 5);
}

fn run_contract<S: Store + Send + Sync + 'static>(store: Arc<S>) {
    registration_round_trips(&*store);
    client_id_is_unique(&*store);
    optimistic_update(&*store);
    delete_detaches_dependents(&*store);
    limits_are_enforced(&*store);
    pages_through_tokens(&*store);
    racing_registrations_have_one_winner(store);
}

#[test]
fn memory_store_with_numeric_keys() {
    run_contract(Arc::new(MemoryStore::<i64>::new()));
}

#[test]
fn memory_store_with_text_keys() {
    run_contract(Arc::new(MemoryStore::<String>::new()));
}

#[test]
fn memory_store_with_guid_keys() {
    run_contract(Arc::new(MemoryStore::<uuid::Uuid>::new()));
}

#[test]
fn numeric_keys_follow_the_documented_example() {
    let store = MemoryStore::<i64>::new();
    let id = store
        .create_application(NewApplication::new(ClientId("app1".into()), ClientType::public()))
        .unwrap();
    assert_eq!(id, 1);

    let t0 = store.find_application_by_id(&1).unwrap().concurrency_token;
    let t1 = store
        .update_application(&1, ApplicationChanges::client_type(ClientType::confidential()), &t0)
        .unwrap();
    assert_ne!(t0, t1);

    let again = store.update_application(&1, ApplicationChanges::client_type(ClientType::public()), &t0);
    assert!(matches!(again, Err(Error::ConcurrencyConflict(_))));
}

fn database_url() -> String {
    std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must point at a scratch database")
}

fn db_store<K: DbKey>(url: &str) -> DbStore<K> {
    let store = DbStore::acquire(url, &DbConfig::default()).unwrap();
    store.migrate().unwrap();
    store
}

/// Points `search_path` at `schema` so each key type's tables live apart
/// inside the one scratch database.
fn in_schema(url: &str, schema: &str) -> String {
    let conn = PgConnection::establish(url).unwrap();
    diesel::sql_query(format!("CREATE SCHEMA IF NOT EXISTS {}", schema))
        .execute(&conn)
        .unwrap();

    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}options=-c%20search_path%3D{}", url, separator, schema)
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "needs a PostgreSQL database in TEST_DATABASE_URL"]
async fn db_store_contract_with_text_keys() {
    let url = in_schema(&database_url(), "tomiko_text_keys");
    run_contract(Arc::new(db_store::<String>(&url)));
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "needs a PostgreSQL database in TEST_DATABASE_URL"]
async fn db_store_contract_with_numeric_keys() {
    let url = in_schema(&database_url(), "tomiko_bigint_keys");
    let store = Arc::new(db_store::<i64>(&url));
    run_contract(Arc::clone(&store));

    let id = store
        .create_application(NewApplication::new(ClientId(unique("app")), ClientType::public()))
        .unwrap();
    assert!(id > 0);
    let next = store
        .create_application(NewApplication::new(ClientId(unique("app")), ClientType::public()))
        .unwrap();
    assert!(next > id);
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "needs a PostgreSQL database in TEST_DATABASE_URL"]
async fn db_store_maps_overlong_keys_to_validation_errors() {
    let url = in_schema(&database_url(), "tomiko_text_keys_limits");
    let store = db_store::<String>(&url);
    let new = NewApplication::new(ClientId(unique("app")), ClientType::public()).with_id("k".repeat(51));
    assert!(matches!(
        store.create_application(new),
        Err(Error::Validation { field: "id", .. })
    ));

    let new = NewToken::for_application("k".repeat(51));
    assert!(matches!(
        store.create_token(new),
        Err(Error::Validation { field: "application_id", .. })
    ));
}
