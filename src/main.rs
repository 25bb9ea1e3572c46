// src/main.rs

use serverwrap::{cli, logging, run};

#[tokio::main]
async fn main() {
    // Exit explicitly: a pending read on our stdin would otherwise keep the
    // runtime from shutting down.
    let code = match run_main().await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("serverwrap error: {err:?}");
            1
        }
    };
    std::process::exit(code);
}

async fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await
}
