//! Column limits shared by every store.

use super::key::StoreKey;
use super::models::{Application, NewAuthorization, NewToken};
use super::types::RedirectUri;
use crate::store::error::Error;

/// Cap on textual primary and foreign keys, so they stay indexable on every
/// backend.
pub const MAX_KEY_LENGTH: usize = 50;
pub const MAX_CLIENT_ID_LENGTH: usize = 100;
pub const MAX_CLIENT_TYPE_LENGTH: usize = 25;
pub const MAX_CONCURRENCY_TOKEN_LENGTH: usize = 50;
/// Holds a hashed reference id, which is 86 characters long.
pub const MAX_REFERENCE_ID_LENGTH: usize = 100;

fn check_text(field: &'static str, value: &str, max: usize) -> Result<(), Error> {
    if value.is_empty() {
        return Err(Error::validation(field, "must not be empty"));
    }
    let len = value.chars().count();
    if len > max {
        return Err(Error::validation(
            field,
            format!("is {} characters long, at most {} allowed", len, max),
        ));
    }
    Ok(())
}

pub fn check_key<K: StoreKey>(field: &'static str, key: &K) -> Result<(), Error> {
    match key.text_len() {
        Some(0) => Err(Error::validation(field, "must not be empty")),
        Some(len) if len > MAX_KEY_LENGTH => Err(Error::validation(
            field,
            format!("is {} characters long, at most {} allowed", len, MAX_KEY_LENGTH),
        )),
        _ => Ok(()),
    }
}

fn check_optional_key<K: StoreKey>(field: &'static str, key: &Option<K>) -> Result<(), Error> {
    match key {
        Some(key) => check_key(field, key),
        None => Ok(()),
    }
}

fn check_uris(field: &'static str, uris: &[RedirectUri]) -> Result<(), Error> {
    for uri in uris {
        url::Url::parse(&uri.0)
            .map_err(|e| Error::validation(field, format!("{:?} is not an absolute URL: {}", uri.0, e)))?;
    }
    Ok(())
}

/// Checks every constrained column of an application record. The id is only
/// checked when present, so this also covers records the store has not
/// assigned a key to yet.
pub fn check_application<K: StoreKey>(id: Option<&K>, app: &Application<K>) -> Result<(), Error> {
    if let Some(id) = id {
        check_key("id", id)?;
    }
    check_text("client_id", &app.client_id.0, MAX_CLIENT_ID_LENGTH)?;
    check_text("type", &app.client_type.0, MAX_CLIENT_TYPE_LENGTH)?;
    check_text(
        "concurrency_token",
        &app.concurrency_token.0,
        MAX_CONCURRENCY_TOKEN_LENGTH,
    )?;
    check_uris("redirect_uris", &app.redirect_uris)?;
    check_uris("post_logout_redirect_uris", &app.post_logout_redirect_uris)?;
    Ok(())
}

pub fn check_new_authorization<K: StoreKey>(new: &NewAuthorization<K>) -> Result<(), Error> {
    check_optional_key("id", &new.id)?;
    check_optional_key("application_id", &new.application_id)
}

pub fn check_new_token<K: StoreKey>(new: &NewToken<K>) -> Result<(), Error> {
    check_optional_key("id", &new.id)?;
    check_optional_key("application_id", &new.application_id)?;
    check_optional_key("authorization_id", &new.authorization_id)?;
    if let Some(reference_id) = &new.reference_id {
        check_text("reference_id", &reference_id.0, MAX_REFERENCE_ID_LENGTH)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::NewApplication;
    use crate::core::types::{ClientId, ClientType, ConcurrencyToken, HashedReferenceId};

    fn app(client_id: &str, client_type: &str) -> Application<String> {
        NewApplication::new(ClientId(client_id.into()), ClientType(client_type.into()))
            .into_application(String::new(), ConcurrencyToken("token".into()))
    }

    fn field_of(e: Error) -> &'static str {
        match e {
            Error::Validation { field, .. } => field,
            other => panic!("expected a validation error, got {:?}", other),
        }
    }

    #[test]
    fn client_id_is_capped_at_one_hundred_characters() {
        assert!(check_application(None, &app(&"a".repeat(100), "public")).is_ok());
        let e = check_application(None, &app(&"a".repeat(101), "public")).unwrap_err();
        assert_eq!(field_of(e), "client_id");
    }

    #[test]
    fn required_fields_must_not_be_empty() {
        assert_eq!(field_of(check_application(None, &app("", "public")).unwrap_err()), "client_id");
        assert_eq!(field_of(check_application(None, &app("app", "")).unwrap_err()), "type");
    }

    #[test]
    fn client_type_is_capped_at_twenty_five_characters() {
        let e = check_application(None, &app("app", &"t".repeat(26))).unwrap_err();
        assert_eq!(field_of(e), "type");
    }

    #[test]
    fn textual_keys_are_capped_but_numeric_keys_are_not() {
        assert!(check_key("id", &"k".repeat(50)).is_ok());
        assert_eq!(field_of(check_key("id", &"k".repeat(51)).unwrap_err()), "id");
        assert!(check_key("id", &i64::MAX).is_ok());
        assert!(check_key("id", &uuid::Uuid::new_v4()).is_ok());
    }

    #[test]
    fn redirect_uris_must_be_absolute() {
        let mut app = app("app", "public");
        app.redirect_uris = vec![RedirectUri("/callback".into())];
        assert_eq!(field_of(check_application(None, &app).unwrap_err()), "redirect_uris");

        app.redirect_uris = vec![RedirectUri("https://client.example/callback".into())];
        assert!(check_application(None, &app).is_ok());
    }

    #[test]
    fn dependent_foreign_keys_are_capped() {
        let mut new = NewToken::<String>::default();
        new.authorization_id = Some("x".repeat(51));
        assert_eq!(field_of(check_new_token(&new).unwrap_err()), "authorization_id");

        let new = NewAuthorization::for_application("y".repeat(51));
        assert_eq!(field_of(check_new_authorization(&new).unwrap_err()), "application_id");
    }

    #[test]
    fn reference_ids_are_capped_at_one_hundred_characters() {
        let mut new = NewToken::for_application(7i64);
        new.reference_id = Some(HashedReferenceId("r".repeat(100)));
        assert!(check_new_token(&new).is_ok());

        new.reference_id = Some(HashedReferenceId("r".repeat(101)));
        assert_eq!(field_of(check_new_token(&new).unwrap_err()), "reference_id");

        new.reference_id = Some(HashedReferenceId(String::new()));
        assert_eq!(field_of(check_new_token(&new).unwrap_err()), "reference_id");
    }
}
