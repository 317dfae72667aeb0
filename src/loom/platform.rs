use tokio::task::JoinError;

#[inline]
pub fn spawn<O, F>(future: F) -> tokio::task::JoinHandle<O>
where
    O: Send + 'static,
    F: std::future::Future<Output = O> + Send + 'static,
{
    tokio::spawn(future)
}

/// Runs a blocking kernel on the blocking thread pool and awaits its result.
#[inline]
pub async fn handle<F, R>(f: F) -> Result<R, JoinError>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f).await
}

pub type BoxFuture<'a, T> = futures::future::BoxFuture<'a, T>;
