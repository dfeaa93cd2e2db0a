use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = agent_bridge::BridgeOpt::parse();
    agent_bridge::run(opt).await
}
