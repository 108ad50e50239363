use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};
use vmdeploy_providers::{ConnectionParams, ProviderError, Session, VirtualizationProvider};

/// An authenticated session that is logged out when the scope ends.
///
/// Call [`ScopedSession::release`] to log out and observe the result. If the
/// value is dropped instead (early return, panic unwinding), a logout is
/// spawned on the current tokio runtime, when there is one.
pub struct ScopedSession {
    session: Arc<dyn Session>,
    host: String,
    released: bool,
}

impl ScopedSession {
    pub async fn acquire(
        provider: &dyn VirtualizationProvider,
        params: &ConnectionParams,
    ) -> Result<Self, ProviderError> {
        info!(provider = provider.name(), host = %params.host, user = %params.username, "connecting");
        let session = provider.connect(params).await?;
        info!(host = %params.host, "session established");
        Ok(Self {
            session,
            host: params.host.clone(),
            released: false,
        })
    }

    pub fn session(&self) -> &dyn Session {
        self.session.as_ref()
    }

    pub fn shared(&self) -> Arc<dyn Session> {
        self.session.clone()
    }

    pub async fn release(mut self) -> Result<(), ProviderError> {
        self.released = true;
        let result = self.session.disconnect().await;
        match &result {
            Ok(()) => info!(host = %self.host, "session closed"),
            Err(e) => warn!(host = %self.host, error = %e, "logout failed"),
        }
        result
    }
}

impl Drop for ScopedSession {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let session = self.session.clone();
        let host = std::mem::take(&mut self.host);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(host = %host, "session dropped without release, logging out");
                handle.spawn(async move {
                    if let Err(e) = session.disconnect().await {
                        warn!(host = %host, error = %e, "logout failed");
                    }
                });
            }
            Err(_) => warn!(host = %host, "session dropped outside a runtime, not logged out"),
        }
    }
}

/// Connect, run `body` with the session, then log out whatever `body` returned.
pub async fn with_session<F, Fut, T>(
    provider: &dyn VirtualizationProvider,
    params: &ConnectionParams,
    body: F,
) -> Result<T, ProviderError>
where
    F: FnOnce(Arc<dyn Session>) -> Fut,
    Fut: Future<Output = T>,
{
    let scope = ScopedSession::acquire(provider, params).await?;
    let out = body(scope.shared()).await;
    // A failed logout is logged by `release`; the body's result stands.
    let _ = scope.release().await;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmdeploy_providers::mock::{MockInventory, MockProvider};
    use std::sync::atomic::{AtomicBool, Ordering};
    use vmdeploy_providers::ObjectCategory;

    fn params() -> ConnectionParams {
        ConnectionParams {
            host: "mock".into(),
            port: 443,
            username: "admin".into(),
            password: "pw".into(),
            validate_certs: true,
        }
    }

    #[tokio::test]
    async fn release_logs_out_once() {
        let provider = MockProvider::new(MockInventory::new());
        let scope = ScopedSession::acquire(&provider, &params()).await.unwrap();
        assert!(provider.is_connected());
        scope.release().await.unwrap();
        assert!(!provider.is_connected());
        assert_eq!(provider.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn drop_without_release_still_logs_out() {
        let provider = MockProvider::new(MockInventory::new());
        {
            let _scope = ScopedSession::acquire(&provider, &params()).await.unwrap();
        }
        tokio::task::yield_now().await;
        for _ in 0..10 {
            if provider.disconnect_count() == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(provider.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn with_session_disconnects_after_body() {
        let provider = MockProvider::new(MockInventory::new().with_datastore("ds1"));
        let found = with_session(&provider, &params(), |session| async move {
            session
                .find_by_name(ObjectCategory::Datastore, "ds1")
                .await
                .map(|m| m.is_some())
        })
        .await
        .unwrap();
        assert!(found.unwrap());
        assert!(!provider.is_connected());
        assert_eq!(provider.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn auth_failure_never_runs_body() {
        let provider = MockProvider::new(MockInventory::new().with_credentials("admin", "other"));
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let err = with_session(&provider, &params(), move |_| async move {
            flag.store(true, Ordering::SeqCst);
        })
        .await
        .unwrap_err();
        assert!(err.is_authentication());
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(provider.disconnect_count(), 0);
    }
}
