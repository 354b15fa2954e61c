#[macro_use]
extern crate log;

mod colisten;
mod routes;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{App, HttpResponse, HttpServer, web};
use openssl::ssl::{SslAcceptor, SslFiletype, SslMethod};

use colisten::config::Config;
use colisten::music::MusicApi;
use colisten::registry::Registry;
use colisten::task::Dispatcher;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let _ = dotenvy::dotenv();

    env_logger::init_from_env(env_logger::Env::new().filter_or("LOG", "info"));

    let config = Config::load();
    serve(config).await
}

async fn serve(config: Config) -> std::io::Result<()> {
    let dispatcher = Arc::new(Dispatcher::new(config.token.clone()));
    let api = Arc::new(MusicApi::new(config.music.clone(), Arc::clone(&dispatcher)));
    let registry = Registry::new(api);
    registry.bootstrap(&config.persist);

    let debug = config.debug;
    let addr = bind_addr(&config.addr);
    let tls = config.tls.clone();

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::new("%a %r status %s %Dms"))
            .wrap(cors())
            .app_data(web::Data::new(Arc::clone(&registry)))
            .app_data(web::Data::new(Arc::clone(&dispatcher)))
            .app_data(web::Data::new(config.clone()))
            .default_service(web::to(HttpResponse::NotFound))
            .configure(routes::configure)
    });

    match debug {
        true => server.bind(("0.0.0.0", 8080))?.run().await,
        false => {
            let mut builder = SslAcceptor::mozilla_intermediate(SslMethod::tls())?;
            builder.set_private_key_file(&tls.key, SslFiletype::PEM)?;
            builder.set_certificate_chain_file(&tls.cert)?;
            server.bind_openssl(addr, builder)?.run().await
        }
    }
}

fn cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allowed_methods(vec!["POST", "GET", "OPTIONS", "PUT", "DELETE"])
        .allowed_headers(vec!["token", "content-type", "accesstoken"])
}

/// Config addresses may come as `:443`; fill in the wildcard host.
fn bind_addr(addr: &str) -> String {
    match addr {
        "" => "0.0.0.0:443".to_owned(),
        addr if addr.starts_with(':') => format!("0.0.0.0{addr}"),
        addr => addr.to_owned(),
    }
}
