/// Declares the three tables with every key column of SQL type `$key`.
macro_rules! key_schema {
    ($name:ident, $key:ident) => {
        pub mod $name {
            table! {
                applications (id) {
                    id -> $key,
                    client_id -> Varchar,
                    client_type -> Varchar,
                    concurrency_token -> Varchar,
                    client_secret -> Nullable<Text>,
                    consent_type -> Nullable<Text>,
                    display_name -> Nullable<Text>,
                    permissions -> Text,
                    redirect_uris -> Text,
                    post_logout_redirect_uris -> Text,
                }
            }

            table! {
                authorizations (id) {
                    id -> $key,
                    application_id -> Nullable<$key>,
                    subject -> Nullable<Text>,
                    status -> Nullable<Text>,
                    authorization_type -> Nullable<Text>,
                    scopes -> Text,
                    creation_date -> Nullable<Int8>,
                    concurrency_token -> Varchar,
                }
            }

            table! {
                tokens (id) {
                    id -> $key,
                    application_id -> Nullable<$key>,
                    authorization_id -> Nullable<$key>,
                    subject -> Nullable<Text>,
                    status -> Nullable<Text>,
                    token_type -> Nullable<Text>,
                    payload -> Nullable<Text>,
                    reference_id -> Nullable<Varchar>,
                    creation_date -> Nullable<Int8>,
                    expiration_date -> Nullable<Int8>,
                    concurrency_token -> Varchar,
                }
            }

            allow_tables_to_appear_in_same_query!(applications, authorizations, tokens,);
        }
    };
}

key_schema!(text, Varchar);
key_schema!(bigint, Int8);
