use trestle::prelude::*;
use tracing_subscriber::EnvFilter;

mod infrastructure;
mod modules;

use infrastructure::database::Database;
use infrastructure::request_log::RequestLog;
use modules::user::{InMemoryUserRepository, UserController, UserRepository, UserService};

#[tokio::main]
async fn main() -> trestle::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("Starting example server...");

    App::new()
        .singleton::<Database>()
        .singleton_as::<dyn UserRepository, InMemoryUserRepository, _>(|repo| repo as Arc<dyn UserRepository>)
        .scoped::<RequestLog>()
        .scoped::<UserService>()
        .use_options(&JSON_RESULT_OPTIONS, &serde_json::json!({ "key_case": "camel" }))
        .controller::<UserController>()
        .run()
        .await
}
