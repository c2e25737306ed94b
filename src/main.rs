use actix_web::{web, App, HttpServer};

use parsegate::server::{config_routes, cors};
use parsegate::util::{env_bind_addr, init_tracing, AppState};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    init_tracing();

    let state = web::Data::new(AppState::from_env());
    let bind = env_bind_addr();
    tracing::info!("parsegate listening on {bind}");

    HttpServer::new(move || {
        App::new()
            .wrap(cors())
            .app_data(state.clone())
            .app_data(web::PayloadConfig::new(1024 * 1024))
            .configure(config_routes)
    })
    .bind(bind)?
    .run()
    .await
}
