use anyhow::{anyhow, Result};
use clockwatch_core::config::LoggingConfig;
use clockwatch_core::context;
use std::sync::Barrier;
use std::thread;
use tracing_subscriber::EnvFilter;

/// Install a compact fmt subscriber for the test process.
///
/// `RUST_LOG` wins over the configured level. Safe to call from every test.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_lowercase()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.include_modules)
        .with_test_writer()
        .compact()
        .try_init();
}

/// Run `op(index)` on `threads` named threads that all start together.
///
/// The start barrier is invisible to the detector, so the accesses are as
/// unsynchronized as if the threads had raced for real.
pub fn storm<F>(name: &str, threads: usize, op: F) -> Result<()>
where
    F: Fn(usize) + Sync,
{
    tracing::debug!(storm = name, threads, "starting thread storm");
    let barrier = Barrier::new(threads);

    thread::scope(|scope| -> Result<()> {
        let mut handles = Vec::with_capacity(threads);
        for index in 0..threads {
            let barrier = &barrier;
            let op = &op;
            handles.push(context::spawn_scoped(
                scope,
                format!("{name}-{index}"),
                move || {
                    barrier.wait();
                    op(index);
                },
            )?);
        }

        for handle in handles {
            handle
                .join()
                .map_err(|_| anyhow!("{name} thread panicked"))?;
        }
        Ok(())
    })
}

/// Run two storms back to back: every thread of the first finishes before any
/// thread of the second starts.
pub fn phased<F, G>(first: (&str, usize, F), second: (&str, usize, G)) -> Result<()>
where
    F: Fn(usize) + Sync,
    G: Fn(usize) + Sync,
{
    let (name, threads, op) = first;
    storm(name, threads, op)?;
    let (name, threads, op) = second;
    storm(name, threads, op)
}
