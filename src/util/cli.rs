use crate::core::models::{ApplicationChanges, NewApplication};
use crate::core::types::{ClientId, ClientSecret, ClientType, ConcurrencyToken, RedirectUri, ReferenceId};
use crate::db::{DbConfig, DbStore};
use crate::store::{Error, Store};
use crate::util::hash::HashingService;

use clap::Parser;

#[derive(Parser)]
#[clap(
    name = "tomiko-store",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS")
)]
pub struct Options {
    #[clap(long, env = "DATABASE_URL")]
    database_url: String,
    #[clap(long, env = "HASH_SECRET")]
    hash_secret: Option<String>,
    #[clap(long, env = "POOL_SIZE", default_value = "4")]
    pool_size: u32,
    #[clap(subcommand)]
    command: SubCommand,
}

#[derive(Parser)]
enum SubCommand {
    Migrate,
    ListApplications,
    CreateApplication(CreateApplication),
    ShowApplication(ShowApplication),
    UpdateApplication(UpdateApplication),
    DeleteApplication(DeleteApplication),
    ListAuthorizations(ListAuthorizations),
    ListTokens(ListTokens),
    ShowToken(ShowToken),
}

#[derive(Parser)]
struct CreateApplication {
    #[clap(short, long)]
    client_id: String,
    #[clap(short = 't', long = "type", default_value = "confidential")]
    client_type: String,
    #[clap(short, long)]
    name: Option<String>,
    #[clap(short, long)]
    secret: Option<String>,
    #[clap(long)]
    consent_type: Option<String>,
    #[clap(short, long = "redirect-uri")]
    redirect_uris: Vec<String>,
    #[clap(short, long = "permission")]
    permissions: Vec<String>,
}

#[derive(Parser)]
struct ShowApplication {
    #[clap(short, long)]
    client_id: String,
}

#[derive(Parser)]
struct UpdateApplication {
    #[clap(short, long)]
    client_id: String,
    /// Concurrency token printed by show-application.
    #[clap(long)]
    token: String,
    #[clap(short = 't', long = "type")]
    client_type: Option<String>,
    #[clap(short, long)]
    name: Option<String>,
    #[clap(short, long)]
    secret: Option<String>,
    /// Replaces every redirect URI when given at least once.
    #[clap(short, long = "redirect-uri")]
    redirect_uris: Vec<String>,
}

#[derive(Parser)]
struct DeleteApplication {
    #[clap(short, long)]
    client_id: String,
}

#[derive(Parser)]
struct ListAuthorizations {
    #[clap(short, long)]
    client_id: String,
}

#[derive(Parser)]
struct ListTokens {
    #[clap(short, long)]
    client_id: String,
}

#[derive(Parser)]
struct ShowToken {
    #[clap(short, long)]
    reference_id: String,
}

fn get_store(opts: &Options) -> Result<DbStore, Error> {
    let config = DbConfig {
        pool_size: opts.pool_size,
    };
    DbStore::acquire(&opts.database_url, &config)
}

fn get_hasher(opts: &Options) -> Result<HashingService, Error> {
    opts.hash_secret
        .as_ref()
        .map(|secret| HashingService::with_secret_key(secret.to_string()))
        .ok_or(Error::InvalidArgument("HASH_SECRET"))
}

fn to_uris(uris: &[String]) -> Vec<RedirectUri> {
    uris.iter().map(|u| RedirectUri(u.to_string())).collect()
}

fn list_applications(opts: &Options) -> Result<(), Error> {
    let store = get_store(opts)?;

    for app in store.list_applications()? {
        println!(
            "{} (type: {}, name: {:?})",
            app.client_id,
            app.client_type,
            app.display_name.unwrap_or_default()
        );
    }
    Ok(())
}

fn create_application(c: &CreateApplication, opts: &Options) -> Result<(), Error> {
    let store = get_store(opts)?;

    let mut new = NewApplication::new(
        ClientId(c.client_id.to_string()),
        ClientType(c.client_type.to_string()),
    );
    new.display_name = c.name.clone();
    new.consent_type = c.consent_type.clone();
    new.redirect_uris = to_uris(&c.redirect_uris);
    new.permissions = c.permissions.clone();
    if let Some(secret) = &c.secret {
        new.client_secret = Some(get_hasher(opts)?.hash(&ClientSecret(secret.to_string()))?);
    }

    let id = store.create_application(new)?;
    println!("{}", id);
    Ok(())
}

fn show_application(c: &ShowApplication, opts: &Options) -> Result<(), Error> {
    let store = get_store(opts)?;
    let app = store.find_application_by_client_id(&ClientId(c.client_id.to_string()))?;

    println!("id: {}", app.id);
    println!("client_id: {}", app.client_id);
    println!("type: {}", app.client_type);
    println!("concurrency_token: {}", app.concurrency_token);
    println!("display_name: {}", app.display_name.unwrap_or_default());
    println!("consent_type: {}", app.consent_type.unwrap_or_default());
    println!("has_secret: {}", app.client_secret.is_some());
    for uri in app.redirect_uris {
        println!("redirect_uri: {}", uri.0);
    }
    for permission in app.permissions {
        println!("permission: {}", permission);
    }
    Ok(())
}

fn update_application(c: &UpdateApplication, opts: &Options) -> Result<(), Error> {
    let store = get_store(opts)?;
    let app = store.find_application_by_client_id(&ClientId(c.client_id.to_string()))?;

    let mut changes = ApplicationChanges {
        client_type: c.client_type.clone().map(ClientType),
        display_name: c.name.clone().map(Some),
        ..ApplicationChanges::default()
    };
    if !c.redirect_uris.is_empty() {
        changes.redirect_uris = Some(to_uris(&c.redirect_uris));
    }
    if let Some(secret) = &c.secret {
        let hashed = get_hasher(opts)?.hash(&ClientSecret(secret.to_string()))?;
        changes.client_secret = Some(Some(hashed));
    }

    let token = store.update_application(&app.id, changes, &ConcurrencyToken(c.token.to_string()))?;
    println!("concurrency_token: {}", token);
    Ok(())
}

fn delete_application(c: &DeleteApplication, opts: &Options) -> Result<(), Error> {
    let store = get_store(opts)?;
    let app = store.find_application_by_client_id(&ClientId(c.client_id.to_string()))?;
    store.delete_application(&app.id)
}

fn list_authorizations(c: &ListAuthorizations, opts: &Options) -> Result<(), Error> {
    let store = get_store(opts)?;
    let app = store.find_application_by_client_id(&ClientId(c.client_id.to_string()))?;

    for authorization in store.list_authorizations_for_application(&app.id) {
        let authorization = authorization?;
        println!(
            "{} (subject: {}, status: {}, scope: \"{}\")",
            authorization.id,
            authorization.subject.unwrap_or_default(),
            authorization.status.unwrap_or_default(),
            authorization.scopes.as_joined()
        );
    }
    Ok(())
}

fn list_tokens(c: &ListTokens, opts: &Options) -> Result<(), Error> {
    let store = get_store(opts)?;
    let app = store.find_application_by_client_id(&ClientId(c.client_id.to_string()))?;

    for token in store.list_tokens_for_application(&app.id) {
        let token = token?;
        println!(
            "{} (type: {}, subject: {}, status: {})",
            token.id,
            token.token_type.unwrap_or_default(),
            token.subject.unwrap_or_default(),
            token.status.unwrap_or_default()
        );
    }
    Ok(())
}

fn show_token(c: &ShowToken, opts: &Options) -> Result<(), Error> {
    let store = get_store(opts)?;
    let hashed = get_hasher(opts)?.hash_without_salt(&ReferenceId(c.reference_id.to_string()));
    let token = store.find_token_by_reference_id(&hashed)?;

    println!("id: {}", token.id);
    println!("application_id: {}", token.application_id.unwrap_or_default());
    println!("authorization_id: {}", token.authorization_id.unwrap_or_default());
    println!("type: {}", token.token_type.unwrap_or_default());
    println!("status: {}", token.status.unwrap_or_default());
    if let Some(expiry) = token.expiration_date {
        println!("expires: {}", expiry.0);
    }
    Ok(())
}

pub fn run_cli_action(opts: Options) -> Result<(), Error> {
    use SubCommand::*;

    match &opts.command {
        Migrate => get_store(&opts)?.migrate(),
        ListApplications => list_applications(&opts),
        CreateApplication(c) => create_application(c, &opts),
        ShowApplication(c) => show_application(c, &opts),
        UpdateApplication(c) => update_application(c, &opts),
        DeleteApplication(c) => delete_application(c, &opts),
        ListAuthorizations(c) => list_authorizations(c, &opts),
        ListTokens(c) => list_tokens(c, &opts),
        ShowToken(c) => show_token(c, &opts),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_create_application() {
        let opts = Options::try_parse_from(&[
            "tomiko-store",
            "--database-url",
            "postgres://localhost/tomiko",
            "create-application",
            "--client-id",
            "app1",
            "--type",
            "public",
            "--redirect-uri",
            "https://app1.example/cb",
            "--redirect-uri",
            "https://app1.example/cb2",
        ])
        .unwrap();

        match opts.command {
            SubCommand::CreateApplication(c) => {
                assert_eq!(c.client_id, "app1");
                assert_eq!(c.client_type, "public");
                assert_eq!(c.redirect_uris.len(), 2);
                assert!(c.secret.is_none());
            }
            _ => panic!("parsed the wrong subcommand"),
        }
    }

    #[test]
    fn update_requires_a_concurrency_token() {
        let result = Options::try_parse_from(&[
            "tomiko-store",
            "--database-url",
            "postgres://localhost/tomiko",
            "update-application",
            "--client-id",
            "app1",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn missing_hash_secret_is_reported() {
        let opts = Options::try_parse_from(&[
            "tomiko-store",
            "--database-url",
            "postgres://localhost/tomiko",
            "migrate",
        ])
        .unwrap();
        if opts.hash_secret.is_none() {
            assert!(matches!(get_hasher(&opts), Err(Error::InvalidArgument("HASH_SECRET"))));
        }
    }
}
