use anyhow::Result;
use codenest::cli::{actions, actions::Action, start};

// Main function
#[tokio::main]
async fn main() -> Result<()> {
    // Start the program
    let (action, globals) = start()?;

    // Handle the action
    match action {
        Action::Recover { .. } => actions::recover::handle(action, &globals).await?,
        Action::CheckRoute { .. } => actions::route::handle(action, &globals).await?,
        _ => actions::session::handle(action, &globals).await?,
    }

    Ok(())
}
