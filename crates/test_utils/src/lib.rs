#![deny(missing_docs)]
//! Test utilities for the lassie retrieval client.

pub mod dag;
pub mod id;

/// Enable tracing with the RUST_LOG environment variable.
///
/// This is intended to be used in tests, so it defaults to DEBUG level.
pub fn enable_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::Level::DEBUG.into())
                .from_env_lossy(),
        )
        .try_init();
}

/// Create random bytes of the given length.
pub fn random_bytes(len: usize) -> Vec<u8> {
    use rand::Rng;
    let mut bytes = vec![0; len];
    rand::thread_rng().fill(&mut bytes[..]);
    bytes
}

/// Repeatedly run a block of code until it `break`s, failing the test if
/// that does not happen within a timeout.
///
/// - `iter_check!(timeout_ms, sleep_ms, { .. })`
/// - `iter_check!(timeout_ms, { .. })` sleeps 10ms between iterations.
/// - `iter_check!({ .. })` times out after 1s.
#[macro_export]
macro_rules! iter_check {
    ($timeout_ms:expr, $sleep_ms:expr, $code:block) => {
        tokio::time::timeout(
            std::time::Duration::from_millis($timeout_ms),
            async {
                loop {
                    $code
                    tokio::time::sleep(std::time::Duration::from_millis(
                        $sleep_ms,
                    ))
                    .await;
                }
            },
        )
        .await
        .expect("iter_check timed out")
    };
    ($timeout_ms:expr, $code:block) => {
        $crate::iter_check!($timeout_ms, 10, $code)
    };
    ($code:block) => {
        $crate::iter_check!(1000, $code)
    };
}
