use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use tokio::sync::watch;

/// Advisory stop flag shared between the operator and running work
///
/// A child token observes its own flag and every ancestor's, so stopping a
/// job reaches all of its partitions while one partition can signal its
/// siblings without touching the job.
#[derive(Debug, Clone)]
pub struct StopToken {
    flag: Arc<watch::Sender<bool>>,
    parent: Option<Box<StopToken>>,
}

impl Default for StopToken {
    fn default() -> Self {
        Self::new()
    }
}

impl StopToken {
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self {
            flag: Arc::new(flag),
            parent: None,
        }
    }

    pub fn child(&self) -> Self {
        Self {
            parent: Some(Box::new(self.clone())),
            ..Self::new()
        }
    }

    pub fn request_stop(&self) {
        self.flag.send_replace(true);
    }

    pub fn is_stop_requested(&self) -> bool {
        *self.flag.borrow()
            || self
                .parent
                .as_ref()
                .is_some_and(|parent| parent.is_stop_requested())
    }

    /// Resolves once this token or any ancestor is stopped
    pub fn stopped(&self) -> BoxFuture<'static, ()> {
        let mut receiver = self.flag.subscribe();
        let parent = self.parent.clone();

        async move {
            let own = async move {
                if receiver.wait_for(|stopped| *stopped).await.is_err() {
                    std::future::pending::<()>().await;
                }
            };

            match parent {
                Some(parent) => {
                    tokio::select! {
                        _ = own => {}
                        _ = parent.stopped() => {}
                    }
                }
                None => own.await,
            }
        }
        .boxed()
    }
}
