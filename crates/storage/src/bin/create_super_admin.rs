use std::env;
use std::process;

use picshare_domain::model::NewAdmin;
use picshare_domain::services::credentials::hash_password;
use picshare_domain::storage::AdminStore;
use picshare_domain::DatabaseConfig;
use picshare_storage::SeaOrmStorage;

#[tokio::main]
async fn main() {
    let mut args = env::args().skip(1);
    let (Some(username), Some(password)) = (args.next(), args.next()) else {
        eprintln!("Usage: create_super_admin <username> <password>");
        process::exit(1);
    };

    let config = match DatabaseConfig::load_from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            process::exit(1);
        }
    };

    let storage = match SeaOrmStorage::connect(config.database_url()).await {
        Ok(storage) => storage,
        Err(err) => {
            eprintln!("failed to connect to database: {err}");
            process::exit(1);
        }
    };

    match storage.username_exists(&username).await {
        Ok(false) => {}
        Ok(true) => {
            eprintln!("username `{username}` already exists");
            process::exit(1);
        }
        Err(err) => {
            eprintln!("failed to check username: {err}");
            process::exit(1);
        }
    }

    let password_hash = match hash_password(&password) {
        Ok(hash) => hash,
        Err(err) => {
            eprintln!("failed to hash password: {err}");
            process::exit(1);
        }
    };

    match storage
        .insert_admin(NewAdmin::super_admin(username, password_hash))
        .await
    {
        Ok(admin) => println!("Super admin created: {} ({})", admin.username, admin.id),
        Err(err) => {
            eprintln!("failed to create super admin: {err}");
            process::exit(1);
        }
    }
}
