//! Pipeline lifecycle: startup ordering and graceful shutdown.

use std::future::Future;

use anyhow::{Context, Result};
use tokio::io::AsyncWrite;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::config::MiniSyslogConfig;
use crate::dispatch;
use crate::receiver::Listener;
use crate::render::{RenderStats, run_render_loop};
use crate::style::Style;
use crate::template::TemplateProgram;

/// Owns the compiled template and the bound listener until they are wired
/// together by [`run`](Self::run).
///
/// Construction does all the fallible startup work, in order:
/// 1. Compile the output template
/// 2. Bind the listening socket
///
/// so a bad template is reported before any socket is opened.
#[derive(Debug)]
pub struct Runner {
    program: TemplateProgram,
    listener: Listener,
    shutdown: CancellationToken,
}

impl Runner {
    /// Compile the template and bind the listener described by `config`.
    pub async fn new(config: &MiniSyslogConfig) -> Result<Self> {
        let style = Style::new(config.output.color);

        let program = match &config.output.template {
            Some(source) => {
                TemplateProgram::compile(source, style).context("Invalid output template")?
            }
            None => TemplateProgram::default_with_style(style),
        };

        let listener = Listener::bind(&config.listener).await?;

        Ok(Self {
            program,
            listener,
            shutdown: CancellationToken::new(),
        })
    }

    /// The compiled output template.
    pub fn program(&self) -> &TemplateProgram {
        &self.program
    }

    /// The bound listener.
    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    /// Token that stops the pipeline when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until Ctrl+C, writing rendered lines to stdout.
    pub async fn run(self) -> Result<()> {
        let stats = self.run_until(tokio::io::stdout(), ctrl_c()).await?;
        tracing::info!(
            rendered = stats.rendered,
            failed = stats.failed,
            "minisyslog stopped"
        );
        Ok(())
    }

    /// Run until `signal` resolves or the shutdown token is cancelled,
    /// writing rendered lines to `out`.
    ///
    /// Shutdown stops the listener and every connection, then lets the
    /// render loop drain what was already received.
    pub async fn run_until<W, F>(self, out: W, signal: F) -> Result<RenderStats>
    where
        W: AsyncWrite + Unpin + Send + 'static,
        F: Future<Output = ()>,
    {
        let Self {
            program,
            listener,
            shutdown,
        } = self;

        let (tx, rx) = dispatch::channel();
        let listener_task = listener.spawn(tx, shutdown.clone());
        let mut render_task = tokio::spawn(async move {
            let mut out = out;
            run_render_loop(rx, &program, &mut out).await
        });

        tracing::info!("minisyslog running. Press Ctrl+C to stop.");

        let finished_early = tokio::select! {
            _ = signal => {
                tracing::info!("Received shutdown signal");
                None
            }
            _ = shutdown.cancelled() => None,
            result = &mut render_task => Some(result),
        };

        shutdown.cancel();

        listener_task.await.context("Listener task panicked")??;

        let rendered = match finished_early {
            Some(result) => result,
            None => render_task.await,
        };
        let stats = rendered
            .context("Render task panicked")?
            .context("Failed to write output")?;

        Ok(stats)
    }
}

async fn ctrl_c() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ListenerProtocol;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::net::UdpSocket;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl AsyncWrite for SharedBuf {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn udp_config() -> MiniSyslogConfig {
        let mut config = MiniSyslogConfig::default();
        config.listener.bind = "127.0.0.1:0".to_string();
        config.output.color = false;
        config
    }

    #[tokio::test]
    async fn test_invalid_template_fails_before_binding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("syslog.sock");

        let mut config = MiniSyslogConfig::default();
        config.listener.protocol = ListenerProtocol::Dgram;
        config.listener.bind = path.to_str().unwrap().to_string();
        config.output.template = Some("{{ nosuchfunc .message }}".to_string());

        let err = Runner::new(&config).await.unwrap_err();
        assert!(err.to_string().contains("Invalid output template"));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_default_template_is_used() {
        let runner = Runner::new(&udp_config()).await.unwrap();
        assert_eq!(
            runner.program().source(),
            crate::template::DEFAULT_TEMPLATE
        );
        assert!(!runner.program().style().is_enabled());
        assert_eq!(runner.listener().protocol(), ListenerProtocol::Udp);
    }

    #[tokio::test]
    async fn test_shutdown_drains_received_records() {
        let mut config = udp_config();
        config.output.template = Some("{{ .hostname }} {{ .content }}".to_string());

        let runner = Runner::new(&config).await.unwrap();
        let addr = runner.listener().local_addr().unwrap();
        let token = runner.shutdown_token();

        let out = SharedBuf::default();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(runner.run_until(out.clone(), async move {
            let _ = stop_rx.await;
        }));

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        for i in 0..3 {
            let msg = format!("<13>Oct 11 22:14:15 host{i} app: m{i}");
            sender.send_to(msg.as_bytes(), addr).await.unwrap();
        }

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while out.contents().lines().count() < 3 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        stop_tx.send(()).unwrap();
        let stats = task.await.unwrap().unwrap();

        assert_eq!(stats.rendered, 3);
        assert_eq!(out.contents(), "host0 m0\nhost1 m1\nhost2 m2\n");
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_token_stops_pipeline() {
        let runner = Runner::new(&udp_config()).await.unwrap();
        let token = runner.shutdown_token();

        let task = tokio::spawn(runner.run_until(SharedBuf::default(), std::future::pending()));
        token.cancel();

        let stats = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(stats, RenderStats::default());
    }
}
