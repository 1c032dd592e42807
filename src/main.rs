use anyhow::Result;
use holedns::run;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    run().await
}
