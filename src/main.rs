mod auth;
mod config;
mod database;
mod error;
mod feed;
mod identity;
mod model;
mod policy;
mod recipes;
mod users;
mod view;

#[cfg(test)]
mod test_support;

use actix_identity::IdentityService;
use actix_web::{middleware::Logger, web, App, HttpResponse, HttpServer};
use config::Config;
use error::Error;
use identity::BearerTokenPolicy;
use log::info;

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("API is running...")
}

// Extractor failures get the same `{message}` body as every other error.
fn extractor_errors(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _| {
        Error::InvalidRequest(err.to_string()).into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _| {
        Error::InvalidRequest(err.to_string()).into()
    }))
    .app_data(web::PathConfig::default().error_handler(|err, _| {
        Error::InvalidRequest(err.to_string()).into()
    }));
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    extractor_errors(cfg);
    cfg.route("/", web::get().to(health)).service(
        web::scope("/api")
            .configure(auth::configure)
            .configure(users::configure)
            .configure(recipes::configure),
    );
}

#[actix_rt::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("recipe_share=debug,actix_web=info"),
    )
    .init();

    let config = Config::load();
    let db = sled::open(&config.db_path)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;
    let bind = config.bind.clone();
    let config = web::Data::new(config);

    info!("listening on {}", bind);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(IdentityService::new(BearerTokenPolicy::new(db.clone())))
            .app_data(web::Data::new(db.clone()))
            .app_data(config.clone())
            .configure(routes)
    })
    .bind(bind)?
    .run()
    .await
}
