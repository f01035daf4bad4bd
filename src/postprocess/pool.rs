//! Bounded worker pool around the [`Postprocessor`]
//!
//! Trees arrive on one channel, are processed on blocking threads with at
//! most `workers_count` in flight, and leave on one output channel: first
//! the processed tree, then every outlink seed it produced. Stopping lets
//! in-flight trees finish, then closes the output channel.

use super::Postprocessor;
use crate::item::ItemTree;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

/// Errors from pool lifecycle calls
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("Postprocessor pool already initialized")]
    AlreadyInitialized,
    #[error("Postprocessor pool not started")]
    NotStarted,
}

struct Running {
    token: CancellationToken,
    tracker: TaskTracker,
}

pub struct PostprocessorPool {
    postprocessor: Arc<Postprocessor>,
    workers: usize,
    running: Mutex<Option<Running>>,
    started: AtomicBool,
}

impl PostprocessorPool {
    pub fn new(postprocessor: Postprocessor) -> Self {
        let workers = postprocessor.env().config.crawl.workers();
        Self {
            postprocessor: Arc::new(postprocessor),
            workers,
            running: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    pub fn postprocessor(&self) -> &Postprocessor {
        &self.postprocessor
    }

    /// Start consuming `input`. A pool can only be started once.
    pub fn start(
        &self,
        input: mpsc::Receiver<ItemTree>,
        output: mpsc::Sender<ItemTree>,
    ) -> Result<(), PoolError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(PoolError::AlreadyInitialized);
        }

        let token = CancellationToken::new();
        let tracker = TaskTracker::new();
        let semaphore = Arc::new(Semaphore::new(self.workers.max(1)));

        info!(workers = self.workers, "Starting postprocessor pool");
        tracker.spawn(run(
            Arc::clone(&self.postprocessor),
            input,
            output,
            semaphore,
            token.clone(),
            tracker.clone(),
        ));

        *self.running.lock() = Some(Running { token, tracker });
        Ok(())
    }

    /// Cancel, wait for in-flight trees, and close the output channel
    pub async fn stop(&self) -> Result<(), PoolError> {
        let running = self.running.lock().take().ok_or(PoolError::NotStarted)?;
        running.token.cancel();
        running.tracker.close();
        running.tracker.wait().await;
        info!("Postprocessor pool stopped");
        Ok(())
    }

    /// Wait until the input channel is drained and every tree is out
    pub async fn join(&self) -> Result<(), PoolError> {
        let tracker = self
            .running
            .lock()
            .as_ref()
            .map(|r| r.tracker.clone())
            .ok_or(PoolError::NotStarted)?;
        tracker.close();
        tracker.wait().await;
        Ok(())
    }
}

async fn run(
    postprocessor: Arc<Postprocessor>,
    mut input: mpsc::Receiver<ItemTree>,
    output: mpsc::Sender<ItemTree>,
    semaphore: Arc<Semaphore>,
    token: CancellationToken,
    tracker: TaskTracker,
) {
    loop {
        let permit = tokio::select! {
            _ = token.cancelled() => break,
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let tree = tokio::select! {
            _ = token.cancelled() => break,
            tree = input.recv() => match tree {
                Some(tree) => tree,
                None => break,
            },
        };

        let postprocessor = Arc::clone(&postprocessor);
        let output = output.clone();
        tracker.spawn(async move {
            let _permit = permit;
            let seed = tree.root().short_id();

            let processed = tokio::task::spawn_blocking(move || {
                let mut tree = tree;
                let outlinks = postprocessor.process_tree(&mut tree);
                (tree, outlinks)
            })
            .await;

            let (tree, outlinks) = match processed {
                Ok(result) => result,
                Err(e) => {
                    error!(seed = %seed, error = %e, "Postprocess task failed");
                    return;
                }
            };

            debug!(seed = %seed, outlinks = outlinks.len(), "Tree postprocessed");
            for tree in std::iter::once(tree).chain(outlinks) {
                if output.send(tree).await.is_err() {
                    debug!(seed = %seed, "Output channel closed");
                    return;
                }
            }
        });
    }
    debug!("Postprocessor input loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::item::{Item, ItemSource, ItemStatus};
    use crate::postprocess::Env;
    use crate::seencheck::SeenCheck;
    use crate::urls::{Body, CrawlUrl, Response};

    fn pool(workers: usize) -> PostprocessorPool {
        let mut config = Config::default();
        config.crawl.workers_count = workers;
        config.crawl.max_hops = 1;
        let env = Env::with_seencheck(config, SeenCheck::open(None).unwrap());
        PostprocessorPool::new(Postprocessor::new(env))
    }

    fn page(raw: &str, body: &[u8]) -> ItemTree {
        let mut url = CrawlUrl::parse(raw).unwrap();
        url.set_response(Response::new(200, url.parsed().clone()).with_header("Content-Type", "text/html"));
        url.set_body(Body::from_bytes(body).unwrap());
        ItemTree::new(Item::new(url, ItemSource::Queue).with_status(ItemStatus::Archived)).unwrap()
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let pool = pool(2);
        let (_in_tx, in_rx) = mpsc::channel(4);
        let (out_tx, _out_rx) = mpsc::channel(4);
        pool.start(in_rx, out_tx).unwrap();

        let (_in_tx2, in_rx2) = mpsc::channel(4);
        let (out_tx2, _out_rx2) = mpsc::channel(4);
        assert_eq!(pool.start(in_rx2, out_tx2), Err(PoolError::AlreadyInitialized));
        pool.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_before_start_fails() {
        assert_eq!(pool(1).stop().await, Err(PoolError::NotStarted));
    }

    #[tokio::test]
    async fn test_processes_and_closes_output() {
        let pool = pool(2);
        let (in_tx, in_rx) = mpsc::channel(4);
        let (out_tx, mut out_rx) = mpsc::channel(16);
        pool.start(in_rx, out_tx).unwrap();

        in_tx
            .send(page("http://example.com/", br#"<img src="a.png"><a href="/b">b</a>"#))
            .await
            .unwrap();
        drop(in_tx);
        pool.join().await.unwrap();

        let mut received = Vec::new();
        while let Some(tree) = out_rx.recv().await {
            received.push(tree);
        }
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].root().status, ItemStatus::GotChildren);
        assert_eq!(received[1].root().url.raw(), "http://example.com/b");
        assert_eq!(received[1].root().url.hops(), 1);
    }

    #[tokio::test]
    async fn test_stop_closes_output_with_open_input() {
        let pool = pool(1);
        let (_in_tx, in_rx) = mpsc::channel::<ItemTree>(4);
        let (out_tx, mut out_rx) = mpsc::channel(4);
        pool.start(in_rx, out_tx).unwrap();
        pool.stop().await.unwrap();
        assert!(out_rx.recv().await.is_none());
    }
}
