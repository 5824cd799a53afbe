use anyhow::Result;

fn main() -> Result<()> {
    let doc = shadowauth::api::openapi(shadowauth::api::DEFAULT_BASE_PATH);
    let json = serde_json::to_string_pretty(&doc)?;
    println!("{json}");
    Ok(())
}
