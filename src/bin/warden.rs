use anyhow::Result;
use warden::cli::{actions, actions::Action, start, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    let action = start()?;

    let result = match action {
        Action::Server(args) => actions::server::execute(args).await,
    };

    telemetry::shutdown_tracer();

    result
}
