use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use wavec::driver::{self, Cli};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Deeply nested blocks recurse through the statement compiler. Spawn the
    // real work on a thread with a larger stack so pathological inputs don't
    // overflow the default 8 MiB.
    const STACK_SIZE: usize = 64 * 1024 * 1024; // 64 MB
    let handler = std::thread::Builder::new()
        .stack_size(STACK_SIZE)
        .spawn(move || driver::run(&cli))
        .expect("failed to spawn main thread");

    match handler.join() {
        Ok(result) => Ok(result?),
        Err(e) => {
            if let Some(s) = e.downcast_ref::<&str>() {
                anyhow::bail!("internal error: {}", s);
            } else if let Some(s) = e.downcast_ref::<String>() {
                anyhow::bail!("internal error: {}", s);
            }
            anyhow::bail!("internal error (thread panicked)");
        }
    }
}
