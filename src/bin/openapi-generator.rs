//! Print the chess relay OpenAPI document as pretty JSON.

use anyhow::Context;
use chess_relay::services::documentation::ApiDoc;
use utoipa::OpenApi;

fn main() -> anyhow::Result<()> {
    let doc = ApiDoc::openapi()
        .to_pretty_json()
        .context("serializing OpenAPI document")?;
    println!("{doc}");
    Ok(())
}
