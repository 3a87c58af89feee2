#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    iapkit_observability::init();

    let config = iapkit_demo::DemoConfig::from_env()?;
    let report = iapkit_demo::run_flow(config).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
