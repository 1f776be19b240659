/// Row types for the tables of `schema::$name`, keyed by `$key`.
macro_rules! key_rows {
    ($name:ident, $key:ty) => {
        pub mod $name {
            use crate::db::schema::$name::*;

            #[derive(Debug)]
            #[derive(Queryable, Insertable, AsChangeset)]
            #[table_name = "applications"]
            #[changeset_options(treat_none_as_null = "true")]
            pub struct Application {
                pub id: $key,
                pub client_id: String,
                pub client_type: String,
                pub concurrency_token: String,
                pub client_secret: Option<String>,
                pub consent_type: Option<String>,
                pub display_name: Option<String>,
                pub permissions: String,
                pub redirect_uris: String,
                pub post_logout_redirect_uris: String,
            }

            #[derive(Debug)]
            #[derive(Queryable, Insertable)]
            #[table_name = "authorizations"]
            pub struct Authorization {
                pub id: $key,
                pub application_id: Option<$key>,
                pub subject: Option<String>,
                pub status: Option<String>,
                pub authorization_type: Option<String>,
                pub scopes: String,
                pub creation_date: Option<i64>,
                pub concurrency_token: String,
            }

            #[derive(Debug)]
            #[derive(Queryable, Insertable)]
            #[table_name = "tokens"]
            pub struct Token {
                pub id: $key,
                pub application_id: Option<$key>,
                pub authorization_id: Option<$key>,
                pub subject: Option<String>,
                pub status: Option<String>,
                pub token_type: Option<String>,
                pub payload: Option<String>,
                pub reference_id: Option<String>,
                pub creation_date: Option<i64>,
                pub expiration_date: Option<i64>,
                pub concurrency_token: String,
            }
        }
    };
}

key_rows!(text, String);
key_rows!(bigint, i64);
