use crate::error::StoreError;
use core::future::Future;

/// Spawns every future on the runtime and waits for all of them, returning
/// the results in input order.
pub async fn spawn_all_and_return<T, F>(futures: impl IntoIterator<Item = F>) -> Result<Vec<T>, StoreError>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let handles: Vec<_> = futures.into_iter().map(tokio::spawn).collect();
    let mut out = Vec::with_capacity(handles.len());
    for handle in handles {
        out.push(handle.await?);
    }
    Ok(out)
}

/// Wraps each fallible future so an error invokes `on_err` and yields `None`
/// instead of failing the whole batch.
pub fn with_error_capture<T, E, F, H>(futures: Vec<F>, on_err: H) -> Vec<impl Future<Output = Option<T>>>
where
    F: Future<Output = Result<T, E>>,
    H: Fn(&E) + Clone,
{
    futures
        .into_iter()
        .map(move |fut| {
            let on_err = on_err.clone();
            async move {
                match fut.await {
                    Ok(value) => Some(value),
                    Err(e) => {
                        on_err(&e);
                        None
                    }
                }
            }
        })
        .collect()
}
