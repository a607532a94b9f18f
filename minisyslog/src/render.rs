//! The render loop: sole consumer of the dispatch channel and sole writer
//! of the output sink.

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::dispatch::RecordReceiver;
use crate::template::TemplateProgram;

/// Counters reported when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Records written as a line.
    pub rendered: u64,
    /// Records dropped because the template failed on them.
    pub failed: u64,
}

/// Render records in arrival order until the channel is closed and drained.
///
/// A record the template fails on is logged and skipped; nothing of it
/// reaches `out`. Write errors on `out` end the loop.
pub async fn run_render_loop<W: AsyncWrite + Unpin>(
    mut rx: RecordReceiver,
    program: &TemplateProgram,
    out: &mut W,
) -> std::io::Result<RenderStats> {
    let mut stats = RenderStats::default();

    while let Some(record) = rx.recv().await {
        match program.render(&record) {
            Ok(mut line) => {
                line.push('\n');
                out.write_all(line.as_bytes()).await?;
                out.flush().await?;
                stats.rendered += 1;
            }
            Err(e) => {
                tracing::warn!("Failed to render message: {}", e);
                stats.failed += 1;
            }
        }
    }

    tracing::debug!(
        rendered = stats.rendered,
        failed = stats.failed,
        "render loop finished"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{self, channel};
    use crate::style::Style;
    use minisyslog_common::StructuredRecord;

    fn record(severity: i64, message: &str) -> StructuredRecord {
        StructuredRecord::new()
            .with_field("severity", severity)
            .with_field("message", message)
    }

    #[tokio::test]
    async fn test_lines_in_order() {
        let program =
            TemplateProgram::compile("{{ severity_name .severity }} {{ .message }}", Style::plain())
                .unwrap();
        let (tx, rx) = channel();
        dispatch::dispatch(&tx, record(3, "first"));
        dispatch::dispatch(&tx, record(6, "second"));
        drop(tx);

        let mut out = Vec::new();
        let stats = run_render_loop(rx, &program, &mut out).await.unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "error first\ninfo second\n");
        assert_eq!(stats, RenderStats { rendered: 2, failed: 0 });
    }

    #[tokio::test]
    async fn test_failed_record_is_skipped() {
        let program =
            TemplateProgram::compile("[{{ severity .severity }}] {{ .message }}", Style::plain())
                .unwrap();
        let (tx, rx) = channel();
        dispatch::dispatch(&tx, record(4, "before"));
        dispatch::dispatch(
            &tx,
            StructuredRecord::new()
                .with_field("severity", "high")
                .with_field("message", "broken"),
        );
        dispatch::dispatch(&tx, record(9, "after"));
        drop(tx);

        let mut out = Vec::new();
        let stats = run_render_loop(rx, &program, &mut out).await.unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "[warning] before\n[unknown (9)] after\n"
        );
        assert_eq!(stats, RenderStats { rendered: 2, failed: 1 });
    }

    #[tokio::test]
    async fn test_empty_channel() {
        let program = TemplateProgram::default_with_style(Style::plain());
        let (tx, rx) = channel();
        drop(tx);

        let mut out = Vec::new();
        let stats = run_render_loop(rx, &program, &mut out).await.unwrap();
        assert!(out.is_empty());
        assert_eq!(stats, RenderStats::default());
    }

    #[tokio::test]
    async fn test_write_error_ends_loop() {
        let program = TemplateProgram::compile("{{ .message }}", Style::plain()).unwrap();
        let (tx, rx) = channel();
        dispatch::dispatch(&tx, record(6, "first"));
        dispatch::dispatch(&tx, record(6, "second"));
        dispatch::dispatch(&tx, record(6, "third"));

        let mut out = tokio_test::io::Builder::new()
            .write(b"first\n")
            .write_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
            .build();
        let err = run_render_loop(rx, &program, &mut out).await.unwrap_err();

        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
        drop(tx);
    }

    #[tokio::test]
    async fn test_waits_for_late_records() {
        let program = TemplateProgram::compile("{{ .message }}", Style::plain()).unwrap();
        let (tx, rx) = channel();

        let producer = tokio::spawn(async move {
            for i in 0..50 {
                dispatch::dispatch(&tx, record(6, &format!("m{i}")));
                tokio::task::yield_now().await;
            }
        });

        let mut out = Vec::new();
        let stats = run_render_loop(rx, &program, &mut out).await.unwrap();
        producer.await.unwrap();

        let expected: String = (0..50).map(|i| format!("m{i}\n")).collect();
        assert_eq!(String::from_utf8(out).unwrap(), expected);
        assert_eq!(stats.rendered, 50);
    }
}
