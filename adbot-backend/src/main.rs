use actix_cors::Cors;
use actix_files::Files;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;
use std::time::Instant;

mod ai;
mod config;
mod controllers;
mod http;
mod models;
mod prompt;
mod store;

use ai::{ChatProvider, GeminiClient};
use config::Config;
use prompt::PromptTemplate;
use store::ContentStore;

pub struct AppState {
    pub config: Config,
    pub store: Arc<ContentStore>,
    /// `None` when no API key is configured
    pub provider: Option<Arc<dyn ChatProvider>>,
    pub prompt_template: Arc<PromptTemplate>,
    pub start_time: Instant,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    let host = config.host.clone();
    let port = config.port;

    let store = Arc::new(ContentStore::new(config.content_file_path.clone()));
    log::info!(
        "Content store {} holds {} records",
        store.path().display(),
        store.count().await
    );

    let prompt_template = match &config.prompt_template_path {
        Some(path) => {
            log::info!("Loading system prompt template from {}", path.display());
            PromptTemplate::from_file(path)?
        }
        None => PromptTemplate::default(),
    };
    let prompt_template = Arc::new(prompt_template);

    let provider = build_provider(&config);
    let start_time = Instant::now();

    log::info!("Starting adbot server on http://{}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(AppState {
                config: config.clone(),
                store: Arc::clone(&store),
                provider: provider.clone(),
                prompt_template: Arc::clone(&prompt_template),
                start_time,
            }))
            .app_data(controllers::json_config())
            .wrap(Logger::default())
            .wrap(cors)
            .configure(controllers::configure)
            .service(Files::new("/", &config.static_dir).index_file("index.html"))
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}

fn build_provider(config: &Config) -> Option<Arc<dyn ChatProvider>> {
    let Some(api_key) = config.gemini_api_key.as_deref() else {
        log::warn!("GEMINI_API_KEY is not set; /api/chat will answer 500");
        return None;
    };

    match GeminiClient::new(
        api_key,
        Some(&config.gemini_endpoint),
        Some(&config.gemini_model),
    ) {
        Ok(client) => {
            log::info!("Chat relay using Gemini model {}", client.model());
            Some(Arc::new(client))
        }
        Err(e) => {
            log::error!("Chat disabled: {}", e);
            None
        }
    }
}
