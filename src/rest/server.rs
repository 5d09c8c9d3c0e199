use actix_cors::Cors;
use actix_web::{web, App, HttpServer};

use super::api;
use crate::config::APIConfig;

pub async fn run_server(cfg: APIConfig, service: api::Service) -> anyhow::Result<()> {
    let address = format!("{}:{}", cfg.listen_address, cfg.port);
    info!("starting API server at http://{}", address);

    let service_data = web::Data::new(service);
    let cors_domain = cfg.cors_domain.clone();

    HttpServer::new(move || {
        let cors = if cors_domain == "*" {
            Cors::permissive()
        } else {
            Cors::default()
                .allowed_origin(&cors_domain)
                .allow_any_method()
                .allow_any_header()
                .max_age(3600)
        };

        App::new()
            .wrap(cors)
            .app_data(service_data.clone())
            .service(api::get_transaction_status)
            .service(api::get_address_history)
            .service(api::get_balance)
            .service(api::get_status)
            .default_service(web::route().to(api::not_found))
    })
    .bind(address)?
    .run()
    .await?;

    Ok(())
}
