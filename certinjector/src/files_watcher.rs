use std::{path::Path, sync::Arc, time::Duration};

use futures::executor::block_on;
use notify::{
    Config as NotifyConfig, Event as NotifyEvent, EventHandler, PollWatcher, RecursiveMode,
    Result as NotifyResult, Watcher as INotifyWatcher,
};
use certinjector_macros::{ci_log, logger, with_dollar_sign};

use crate::tls::ReloadableCertResolver;

logger!("FilesWatcher");

struct TokioSenderHandler {
    pub sender: tokio::sync::mpsc::Sender<NotifyResult<NotifyEvent>>,
}

impl EventHandler for TokioSenderHandler {
    fn handle_event(&mut self, event: NotifyResult<NotifyEvent>) {
        debug!("Got notify event: {:?}", event);
        block_on(async {
            let _ = self.sender.send(event).await;
        });
    }
}

/// Polls a set of files for changes, comparing contents so rotated Secret
/// mounts are noticed too.
pub struct FilesWatcher {
    _watcher: PollWatcher,
    pub receiver: tokio::sync::mpsc::Receiver<NotifyResult<NotifyEvent>>,
}

impl FilesWatcher {
    pub fn new(paths: Vec<&str>, interval: Duration) -> NotifyResult<Self> {
        let (tx, rx) = tokio::sync::mpsc::channel::<NotifyResult<NotifyEvent>>(1);
        let mut watcher = PollWatcher::new(
            TokioSenderHandler { sender: tx },
            NotifyConfig::default()
                .with_compare_contents(true)
                .with_poll_interval(interval),
        )?;

        for p in paths {
            watcher.watch(Path::new(p), RecursiveMode::NonRecursive)?;
            info!("Watching for changes on path: {}", p);
        }
        Ok(FilesWatcher {
            _watcher: watcher,
            receiver: rx,
        })
    }
}

pub async fn watch_certificates(
    mut file_watcher: FilesWatcher,
    resolver: Arc<ReloadableCertResolver>,
) {
    while let Some(res) = file_watcher.receiver.recv().await {
        match res {
            Ok(NotifyEvent { kind, paths, .. }) if kind.is_modify() || kind.is_create() => {
                info!("Certificate files changed: {:?}", paths);
                if let Err(e) = resolver.reload() {
                    error!(
                        "Unable to reload certificate from {} and {}, keeping the current one: {}",
                        resolver.cert_file(),
                        resolver.key_file(),
                        e
                    );
                }
            }
            Ok(event) => {
                debug!("Ignoring notify event: {:?}", event);
            }
            Err(e) => {
                warn!("Notify error: {:?}", e);
            }
        }
    }
}
