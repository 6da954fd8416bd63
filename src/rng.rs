use std::sync::atomic::{AtomicU64, Ordering};

use rand::{rngs::StdRng, SeedableRng};

// streams handed out so far by `rng_from_env`
static NEXT_STREAM: AtomicU64 = AtomicU64::new(0);

fn env_seed() -> u64 {
    std::env::var("SEED")
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}

fn stream_seed(base: u64, stream: u64) -> u64 {
    base.wrapping_add(stream)
}

/// Random stream for table initialisation when no seed is configured.
///
/// The base comes from the `SEED` environment variable (0 if unset); every
/// call moves to the next stream so two tables never share draws.
pub fn rng_from_env() -> StdRng {
    let stream = NEXT_STREAM.fetch_add(1, Ordering::Relaxed);
    StdRng::seed_from_u64(stream_seed(env_seed(), stream))
}

/// Use `seed` when given, otherwise fall back to [`rng_from_env`].
pub fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => rng_from_env(),
    }
}
