mod backtrack;
mod config;
mod data;
mod driver;
mod dsatur;
mod enrollment;
mod error;
mod finisher;
mod repair;
mod server;
mod slot_order;
mod store;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    server::run_server().await;
}
