use mediscan::{Config, run};

fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    config.validate()?;

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all().thread_name("mediscan-worker");

    if config.general.worker_threads > 0 {
        builder.worker_threads(config.general.worker_threads);
    }

    builder.build()?.block_on(run(config))
}
