#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = writing_grader::run().await {
        eprintln!("writing-grader fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
