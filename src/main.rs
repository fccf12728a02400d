#[tokio::main]
async fn main() -> anyhow::Result<()> {
    spendbook_api::cli::run_with_sys_args().await
}
